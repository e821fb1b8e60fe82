//! [`GraphStore`] over Apache AGE.
//!
//! Typed operations compile into parameterized Cypher run through any
//! [`GraphClient`]. Layout inside the AGE graph:
//!
//! - every vertex carries a `uid` property holding a monotonic ULID, so
//!   ordering by `uid` is creation order
//! - a name in language `pt-br` lives in the property `name_pt_br`
//! - edge predicates are edge labels
//!
//! A mutation runs inside one transaction. Deleting a vertex also drops its
//! edges, which reads would skip anyway.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value as JsonValue};
use ulid::Generator;

use crate::error::StoreError;
use crate::graph::record::{name_matches, resolve_name};
use crate::graph::{
    Assigned, CypherExecutor, GraphClient, GraphStore, IndexKind, Mutation, MutationOp,
    NodeFilter, NodeQuery, NodeRecord, NodeRef, Params, Row, Schema, SqlExecutor, Transaction,
    NAME,
};
use crate::models::DEFAULT_LANGUAGE;

const NAME_PREFIX: &str = "name_";
const UID: &str = "uid";

/// Graph store backed by a Cypher-speaking [`GraphClient`].
pub struct AgeStore<C> {
    client: C,
    graph_name: String,
    ids: Mutex<Generator>,
}

impl<C> AgeStore<C>
where
    C: GraphClient + SqlExecutor,
{
    pub fn new(client: C, graph_name: &str) -> Self {
        Self {
            client,
            graph_name: graph_name.to_string(),
            ids: Mutex::new(Generator::new()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn next_uid(&self) -> Result<String, StoreError> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.generate()
            .map(|id| id.to_string())
            .map_err(|e| StoreError::Internal(format!("uid generation failed: {}", e)))
    }

    async fn fetch(&self, cypher: &str, params: Params) -> Result<Vec<Row>, StoreError> {
        self.client
            .execute_cypher(cypher, params)
            .await?
            .try_collect()
            .await
    }

    /// Vertices matching the query, before expansion.
    async fn vertices(&self, query: &NodeQuery) -> Result<Vec<Vertex>, StoreError> {
        let compiled = compile_fetch(query)?;
        let rows = self.fetch(&compiled.cypher, compiled.params).await?;
        let mut vertices = rows
            .iter()
            .map(|row| Vertex::from_row(row, "node"))
            .collect::<Result<Vec<_>, _>>()?;

        if !compiled.pushed_down {
            vertices.retain(|v| v.matches_name(query));
            vertices = query.apply_slice(vertices);
        }
        Ok(vertices)
    }

    async fn expand(
        &self,
        query: &NodeQuery,
        records: &mut [NodeRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let label = ident(&query.label)?;
        let uids: Vec<JsonValue> = records.iter().map(|r| JsonValue::from(r.uid.as_str())).collect();

        for predicate in &query.expand {
            let predicate = ident(predicate)?;
            let cypher = format!(
                "MATCH (n:{label})-[r:{predicate}]->(m) WHERE n.uid IN $uids \
                 RETURN n.uid AS source, m AS target ORDER BY id(r)"
            );
            let mut params = Params::new();
            params.insert("uids".to_string(), JsonValue::Array(uids.clone()));

            let mut targets: HashMap<String, Vec<NodeRecord>> = HashMap::new();
            for row in self.fetch(&cypher, params).await? {
                let source: String = row.get("source")?;
                let target = Vertex::from_row(&row, "target")?;
                targets
                    .entry(source)
                    .or_default()
                    .push(target.into_record(query.language.as_deref()));
            }

            for record in records.iter_mut() {
                let related = targets.remove(&record.uid).unwrap_or_default();
                record.edges.insert(predicate.to_string(), related);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C> GraphStore for AgeStore<C>
where
    C: GraphClient + SqlExecutor,
{
    async fn mutate(&self, mutation: Mutation) -> Result<Assigned, StoreError> {
        mutation.check_blanks()?;

        let mut assigned = Assigned::new();
        let mut statements = Vec::new();
        for op in mutation.ops() {
            if let MutationOp::SetNode(doc) = op {
                if let NodeRef::Blank(blank) = &doc.node {
                    if assigned.get(blank).is_none() {
                        let uid = self.next_uid()?;
                        statements.push(create_statement(&doc.label, &uid)?);
                        assigned.insert(blank, uid);
                    }
                }
            }
        }
        for op in mutation.ops() {
            statements.extend(compile_op(op, &assigned)?);
        }

        let tx = self.client.begin().await?;
        match run_statements(&tx, statements).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(assigned)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>, StoreError> {
        let language = query.language.as_deref();
        let mut records: Vec<NodeRecord> = self
            .vertices(query)
            .await?
            .into_iter()
            .map(|v| v.into_record(language))
            .collect();
        self.expand(query, &mut records).await?;
        Ok(records)
    }

    async fn count(&self, query: &NodeQuery) -> Result<u64, StoreError> {
        let unsliced = query.clone().slice(0, None);
        let compiled = compile_count(&unsliced)?;
        if !compiled.pushed_down {
            return Ok(self.vertices(&unsliced).await?.len() as u64);
        }
        let rows = self.fetch(&compiled.cypher, compiled.params).await?;
        match rows.first() {
            Some(row) => row.get("total"),
            None => Ok(0),
        }
    }

    async fn alter(&self, schema: &Schema) -> Result<(), StoreError> {
        for sql in schema_ddl(&self.graph_name, schema)? {
            self.client.execute_sql(&sql).await?;
        }
        tracing::debug!(label = %schema.label, graph = %self.graph_name, "schema applied");
        Ok(())
    }
}

/// One compiled Cypher statement.
#[derive(Debug, Clone, PartialEq)]
struct Statement {
    cypher: String,
    params: Params,
    /// Uid reported as unknown when the statement matches no rows.
    require: Option<String>,
}

impl Statement {
    fn new(cypher: String) -> Self {
        Self {
            cypher,
            params: Params::new(),
            require: None,
        }
    }

    fn param(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    fn require(mut self, uid: &str) -> Self {
        self.require = Some(uid.to_string());
        self
    }
}

async fn run_statements<E>(exec: &E, statements: Vec<Statement>) -> Result<(), StoreError>
where
    E: CypherExecutor + ?Sized,
{
    for statement in statements {
        let rows: Vec<Row> = exec
            .execute_cypher(&statement.cypher, statement.params)
            .await?
            .try_collect()
            .await?;
        if let Some(uid) = statement.require {
            if rows.is_empty() {
                return Err(StoreError::UnknownNode(uid));
            }
        }
    }
    Ok(())
}

/// Accepts only plain identifiers, since labels and keys are spliced into Cypher.
fn ident(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidMutation(format!(
            "'{}' is not a valid identifier",
            name
        )))
    }
}

fn name_key(language: &str) -> Result<String, StoreError> {
    let key = format!("{}{}", NAME_PREFIX, language.replace('-', "_"));
    ident(&key)?;
    Ok(key)
}

fn existence_check(uid: &str) -> Statement {
    Statement::new("MATCH (n {uid: $uid}) RETURN n.uid AS uid".to_string())
        .param("uid", uid)
        .require(uid)
}

fn labeled_existence_check(label: &str, uid: &str) -> Result<Statement, StoreError> {
    let label = ident(label)?;
    Ok(
        Statement::new(format!("MATCH (n:{label} {{uid: $uid}}) RETURN n.uid AS uid"))
            .param("uid", uid)
            .require(uid),
    )
}

fn create_statement(label: &str, uid: &str) -> Result<Statement, StoreError> {
    let label = ident(label)?;
    Ok(
        Statement::new(format!("CREATE (n:{label} {{uid: $uid}}) RETURN n.uid AS uid"))
            .param("uid", uid),
    )
}

fn edge_statement(from: &str, predicate: &str, to: &str) -> Result<Statement, StoreError> {
    let predicate = ident(predicate)?;
    Ok(Statement::new(format!(
        "MATCH (a {{uid: $from}}), (b {{uid: $to}}) MERGE (a)-[:{predicate}]->(b) RETURN b.uid AS uid"
    ))
    .param("from", from)
    .param("to", to)
    .require(to))
}

fn compile_op(op: &MutationOp, assigned: &Assigned) -> Result<Vec<Statement>, StoreError> {
    match op {
        MutationOp::SetNode(doc) => {
            let uid = assigned.resolve(&doc.node)?;
            let label = ident(&doc.label)?;
            let mut sets = Vec::new();
            let mut params = Params::new();
            params.insert(UID.to_string(), JsonValue::from(uid.as_str()));

            for (idx, (key, value)) in doc.properties.iter().enumerate() {
                let key = ident(key)?;
                if key == UID || key.starts_with(NAME_PREFIX) {
                    return Err(StoreError::InvalidMutation(format!(
                        "property '{}' is reserved",
                        key
                    )));
                }
                sets.push(format!("n.{key} = $p{idx}"));
                params.insert(format!("p{idx}"), value.clone());
            }
            for (idx, (language, value)) in doc.names.iter().enumerate() {
                let key = name_key(language)?;
                sets.push(format!("n.{key} = $n{idx}"));
                params.insert(format!("n{idx}"), JsonValue::from(value.as_str()));
            }

            let set_clause = if sets.is_empty() {
                String::new()
            } else {
                format!(" SET {}", sets.join(", "))
            };
            let mut statements = vec![Statement {
                cypher: format!("MATCH (n:{label} {{uid: $uid}}){set_clause} RETURN n.uid AS uid"),
                params,
                require: Some(uid.clone()),
            }];
            for (predicate, targets) in &doc.edges {
                for target in targets {
                    statements.push(edge_statement(&uid, predicate, &assigned.resolve(target)?)?);
                }
            }
            Ok(statements)
        }
        MutationOp::SetName {
            node,
            language,
            value,
        } => {
            let uid = assigned.resolve(node)?;
            let key = name_key(language)?;
            Ok(vec![Statement::new(format!(
                "MATCH (n {{uid: $uid}}) SET n.{key} = $value RETURN n.uid AS uid"
            ))
            .param("uid", uid.as_str())
            .param("value", value.as_str())
            .require(&uid)])
        }
        MutationOp::SetEdge(edge) => {
            let from = assigned.resolve(&edge.from)?;
            let to = assigned.resolve(&edge.to)?;
            Ok(vec![existence_check(&from), edge_statement(&from, &edge.predicate, &to)?])
        }
        MutationOp::DeleteEdge(edge) => {
            let from = assigned.resolve(&edge.from)?;
            let to = assigned.resolve(&edge.to)?;
            let predicate = ident(&edge.predicate)?;
            Ok(vec![
                existence_check(&from),
                Statement::new(format!(
                    "MATCH (a {{uid: $from}})-[r:{predicate}]->(b {{uid: $to}}) DELETE r"
                ))
                .param("from", from.as_str())
                .param("to", to.as_str()),
            ])
        }
        MutationOp::DeleteNode { uid, label } => Ok(vec![
            labeled_existence_check(label, uid)?,
            Statement::new(format!(
                "MATCH (n:{} {{uid: $uid}}) DETACH DELETE n",
                ident(label)?
            ))
            .param("uid", uid.as_str()),
        ]),
    }
}

/// A compiled read. When a name filter has no language it can not be
/// expressed over `name_*` properties, so filtering and slicing happen
/// after the fetch.
#[derive(Debug)]
struct CompiledQuery {
    cypher: String,
    params: Params,
    pushed_down: bool,
}

fn compile_where(query: &NodeQuery) -> Result<(String, Params, bool), StoreError> {
    let label = ident(&query.label)?;
    let mut conditions = Vec::new();
    let mut params = Params::new();
    let mut pushed_down = true;

    if query.active_only {
        conditions.push("n.is_active = true".to_string());
    }
    match (&query.filter, query.language.as_deref()) {
        (NodeFilter::All, _) => {}
        (NodeFilter::Uid(uid), _) => {
            conditions.push("n.uid = $uid".to_string());
            params.insert(UID.to_string(), JsonValue::from(uid.as_str()));
        }
        (NodeFilter::NameEquals(name), Some(language)) => {
            conditions.push(format!("n.{} = $name", name_key(language)?));
            params.insert("name".to_string(), JsonValue::from(name.as_str()));
        }
        (NodeFilter::NameContains(term), Some(language)) => {
            conditions.push(format!("toLower(n.{}) CONTAINS $term", name_key(language)?));
            params.insert("term".to_string(), JsonValue::from(term.to_lowercase()));
        }
        (NodeFilter::NameEquals(_) | NodeFilter::NameContains(_), None) => pushed_down = false,
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    Ok((format!("MATCH (n:{label}){where_clause}"), params, pushed_down))
}

fn compile_fetch(query: &NodeQuery) -> Result<CompiledQuery, StoreError> {
    let (matcher, params, pushed_down) = compile_where(query)?;
    let mut cypher = format!("{matcher} RETURN n AS node ORDER BY n.uid");
    if pushed_down {
        if query.offset > 0 {
            cypher.push_str(&format!(" SKIP {}", query.offset));
        }
        if let Some(limit) = query.limit {
            cypher.push_str(&format!(" LIMIT {}", limit));
        }
    }
    Ok(CompiledQuery {
        cypher,
        params,
        pushed_down,
    })
}

fn compile_count(query: &NodeQuery) -> Result<CompiledQuery, StoreError> {
    let (matcher, params, pushed_down) = compile_where(query)?;
    Ok(CompiledQuery {
        cypher: format!("{matcher} RETURN count(n) AS total"),
        params,
        pushed_down,
    })
}

fn schema_ddl(graph: &str, schema: &Schema) -> Result<Vec<String>, StoreError> {
    let graph = ident(graph)?;
    let label = ident(&schema.label)?;
    let ensure_label = |kind: &str, name: &str| {
        format!(
            "DO $$ BEGIN \
               IF NOT EXISTS (SELECT 1 FROM ag_catalog.ag_label l \
                 JOIN ag_catalog.ag_graph g ON l.graph = g.graphid \
                 WHERE g.name = '{graph}' AND l.name = '{name}') THEN \
                 PERFORM ag_catalog.create_{kind}('{graph}', '{name}'); \
               END IF; \
             END $$;"
        )
    };
    let index = |key: &str| {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{graph}_{lower}_{key} ON {graph}.\"{label}\" \
             ((ag_catalog.agtype_access_operator(properties, '\"{key}\"')::text))",
            lower = label.to_lowercase()
        )
    };

    let mut ddl = vec![ensure_label("vlabel", label), index(UID)];
    for entry in &schema.indexes {
        let predicate = ident(&entry.predicate)?;
        match entry.kind {
            IndexKind::Edge => ddl.push(ensure_label("elabel", predicate)),
            IndexKind::Exact | IndexKind::Term | IndexKind::Bool => {
                let key = if predicate == NAME {
                    name_key(DEFAULT_LANGUAGE)?
                } else {
                    predicate.to_string()
                };
                ddl.push(index(&key));
            }
        }
    }
    Ok(ddl)
}

/// A vertex as returned by AGE: `{id, label, properties}`.
#[derive(Debug, Clone, PartialEq)]
struct Vertex {
    uid: String,
    label: String,
    properties: BTreeMap<String, JsonValue>,
    names: BTreeMap<String, String>,
}

impl Vertex {
    fn from_row(row: &Row, column: &str) -> Result<Self, StoreError> {
        let value = row
            .get_raw(column)
            .ok_or_else(|| StoreError::decode("vertex", format!("missing column {}", column)))?;
        Self::from_json(value)
    }

    fn from_json(value: &JsonValue) -> Result<Self, StoreError> {
        let label = value
            .get("label")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| StoreError::decode("vertex", "missing label"))?
            .to_string();
        let raw: &Map<String, JsonValue> = value
            .get("properties")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| StoreError::decode("vertex", "missing properties"))?;

        let mut uid = None;
        let mut properties = BTreeMap::new();
        let mut names = BTreeMap::new();
        for (key, value) in raw {
            if key == UID {
                uid = value.as_str().map(str::to_string);
            } else if let Some(language) = key.strip_prefix(NAME_PREFIX) {
                let text = value.as_str().ok_or_else(|| {
                    StoreError::decode("vertex", format!("{} is not a string", key))
                })?;
                names.insert(language.replace('_', "-"), text.to_string());
            } else {
                properties.insert(key.clone(), value.clone());
            }
        }

        let uid = uid.ok_or_else(|| StoreError::decode("vertex", "missing uid"))?;
        Ok(Self {
            uid,
            label,
            properties,
            names,
        })
    }

    fn matches_name(&self, query: &NodeQuery) -> bool {
        let language = query.language.as_deref();
        match &query.filter {
            NodeFilter::NameEquals(name) => name_matches(&self.names, language, |v| v == name),
            NodeFilter::NameContains(term) => {
                let term = term.to_lowercase();
                name_matches(&self.names, language, |v| v.to_lowercase().contains(&term))
            }
            NodeFilter::All | NodeFilter::Uid(_) => true,
        }
    }

    fn into_record(self, language: Option<&str>) -> NodeRecord {
        NodeRecord {
            name: resolve_name(&self.names, language),
            uid: self.uid,
            label: self.label,
            properties: self.properties,
            edges: BTreeMap::new(),
        }
    }
}
