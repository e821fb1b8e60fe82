//! In-process graph store.
//!
//! Backs the development profile and the test suite. Mutations are applied
//! in place while an undo log keeps the prior state of every node they
//! touch. A failed mutation is rolled back from that log and leaves no trace.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::graph::record::{name_matches, resolve_name};
use crate::graph::{
    Assigned, GraphStore, Mutation, MutationOp, NodeFilter, NodeQuery, NodeRecord, NodeRef,
    Schema, IS_ACTIVE,
};

#[derive(Debug, Clone)]
struct StoredNode {
    uid: String,
    label: String,
    seq: u64,
    properties: BTreeMap<String, JsonValue>,
    names: BTreeMap<String, String>,
    edges: BTreeMap<String, Vec<String>>,
}

impl StoredNode {
    fn is_active(&self) -> bool {
        self.properties
            .get(IS_ACTIVE)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    fn add_edge(&mut self, predicate: &str, target: String) {
        let targets = self.edges.entry(predicate.to_string()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
}

#[derive(Debug, Default)]
struct Graph {
    next_seq: u64,
    nodes: HashMap<String, StoredNode>,
}

/// State of the nodes a mutation touched, as it was before the mutation.
/// `None` marks a node the mutation created.
struct UndoLog {
    next_seq: u64,
    nodes: HashMap<String, Option<StoredNode>>,
}

impl UndoLog {
    fn new(graph: &Graph) -> Self {
        Self {
            next_seq: graph.next_seq,
            nodes: HashMap::new(),
        }
    }

    fn rollback(self, graph: &mut Graph) {
        graph.next_seq = self.next_seq;
        for (uid, prior) in self.nodes {
            match prior {
                Some(node) => {
                    graph.nodes.insert(uid, node);
                }
                None => {
                    graph.nodes.remove(&uid);
                }
            }
        }
    }
}

impl Graph {
    /// Mutable access to `uid`, saving its current state on first touch.
    fn node_mut(&mut self, uid: &str, undo: &mut UndoLog) -> Result<&mut StoredNode, StoreError> {
        let node = self
            .nodes
            .get_mut(uid)
            .ok_or_else(|| StoreError::UnknownNode(uid.to_string()))?;
        undo.nodes
            .entry(uid.to_string())
            .or_insert_with(|| Some(node.clone()));
        Ok(node)
    }

    fn require(&self, uid: &str) -> Result<(), StoreError> {
        if self.nodes.contains_key(uid) {
            Ok(())
        } else {
            Err(StoreError::UnknownNode(uid.to_string()))
        }
    }

    fn allocate(&mut self, label: &str, undo: &mut UndoLog) -> String {
        self.next_seq += 1;
        let uid = format!("0x{:x}", self.next_seq);
        undo.nodes.insert(uid.clone(), None);
        self.nodes.insert(
            uid.clone(),
            StoredNode {
                uid: uid.clone(),
                label: label.to_string(),
                seq: self.next_seq,
                properties: BTreeMap::new(),
                names: BTreeMap::new(),
                edges: BTreeMap::new(),
            },
        );
        uid
    }

    fn apply(
        &mut self,
        op: &MutationOp,
        assigned: &Assigned,
        undo: &mut UndoLog,
    ) -> Result<(), StoreError> {
        match op {
            MutationOp::SetNode(doc) => {
                let uid = assigned.resolve(&doc.node)?;
                let mut targets = Vec::new();
                for (predicate, refs) in &doc.edges {
                    for target in refs {
                        let target = assigned.resolve(target)?;
                        self.require(&target)?;
                        targets.push((predicate.as_str(), target));
                    }
                }

                let node = self.node_mut(&uid, undo)?;
                if node.label != doc.label {
                    return Err(StoreError::InvalidMutation(format!(
                        "node {} is a {}, not a {}",
                        uid, node.label, doc.label
                    )));
                }
                node.properties
                    .extend(doc.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
                node.names
                    .extend(doc.names.iter().map(|(k, v)| (k.clone(), v.clone())));
                for (predicate, target) in targets {
                    node.add_edge(predicate, target);
                }
            }
            MutationOp::SetName {
                node,
                language,
                value,
            } => {
                let uid = assigned.resolve(node)?;
                self.node_mut(&uid, undo)?
                    .names
                    .insert(language.clone(), value.clone());
            }
            MutationOp::SetEdge(edge) => {
                let from = assigned.resolve(&edge.from)?;
                let to = assigned.resolve(&edge.to)?;
                self.require(&to)?;
                self.node_mut(&from, undo)?.add_edge(&edge.predicate, to);
            }
            MutationOp::DeleteEdge(edge) => {
                let from = assigned.resolve(&edge.from)?;
                let to = assigned.resolve(&edge.to)?;
                let node = self.node_mut(&from, undo)?;
                if let Some(targets) = node.edges.get_mut(&edge.predicate) {
                    targets.retain(|t| *t != to);
                    if targets.is_empty() {
                        node.edges.remove(&edge.predicate);
                    }
                }
            }
            MutationOp::DeleteNode { uid, label } => {
                match self.nodes.get(uid) {
                    Some(node) if node.label == *label => {}
                    _ => return Err(StoreError::UnknownNode(uid.clone())),
                }
                if let Some(node) = self.nodes.remove(uid) {
                    undo.nodes.entry(uid.clone()).or_insert(Some(node));
                }
            }
        }
        Ok(())
    }

    fn matching<'a>(&'a self, query: &'a NodeQuery) -> Vec<&'a StoredNode> {
        let language = query.language.as_deref();
        let mut nodes: Vec<&StoredNode> = self
            .nodes
            .values()
            .filter(|node| node.label == query.label)
            .filter(|node| !query.active_only || node.is_active())
            .filter(|node| match &query.filter {
                NodeFilter::All => true,
                NodeFilter::Uid(uid) => node.uid == *uid,
                NodeFilter::NameEquals(name) => name_matches(&node.names, language, |v| v == name),
                NodeFilter::NameContains(term) => {
                    let term = term.to_lowercase();
                    name_matches(&node.names, language, |v| v.to_lowercase().contains(&term))
                }
            })
            .collect();
        nodes.sort_by_key(|node| node.seq);
        nodes
    }

    fn record(&self, node: &StoredNode, query: &NodeQuery, depth: usize) -> NodeRecord {
        let language = query.language.as_deref();
        let mut edges = BTreeMap::new();

        if depth == 0 {
            for predicate in &query.expand {
                let targets: Vec<NodeRecord> = node
                    .edges
                    .get(predicate)
                    .into_iter()
                    .flatten()
                    .filter_map(|uid| self.nodes.get(uid))
                    .map(|target| self.record(target, query, depth + 1))
                    .collect();
                edges.insert(predicate.clone(), targets);
            }
        }

        NodeRecord {
            uid: node.uid.clone(),
            label: node.label.clone(),
            name: resolve_name(&node.names, language),
            properties: node.properties.clone(),
            edges,
        }
    }
}

/// Graph store held entirely in memory. Uids look like `0x1`, `0x2`, ...
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: RwLock<Graph>,
    schemas: RwLock<HashMap<String, Schema>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema last declared for `label`, if any.
    pub async fn schema(&self, label: &str) -> Option<Schema> {
        self.schemas.read().await.get(label).cloned()
    }

    /// Number of stored nodes of `label`, active or not.
    pub async fn node_count(&self, label: &str) -> usize {
        self.graph
            .read()
            .await
            .nodes
            .values()
            .filter(|n| n.label == label)
            .count()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn mutate(&self, mutation: Mutation) -> Result<Assigned, StoreError> {
        mutation.check_blanks()?;

        let mut graph = self.graph.write().await;
        let mut undo = UndoLog::new(&graph);
        let mut assigned = Assigned::new();

        for op in mutation.ops() {
            if let MutationOp::SetNode(doc) = op {
                if let NodeRef::Blank(label) = &doc.node {
                    if assigned.get(label).is_none() {
                        let uid = graph.allocate(&doc.label, &mut undo);
                        assigned.insert(label, uid);
                    }
                }
            }
        }

        for op in mutation.ops() {
            if let Err(err) = graph.apply(op, &assigned, &mut undo) {
                tracing::trace!(error = %err, touched = undo.nodes.len(), "mutation rolled back");
                undo.rollback(&mut graph);
                return Err(err);
            }
        }

        tracing::trace!(ops = mutation.ops().len(), created = assigned.len(), "mutation applied");
        Ok(assigned)
    }

    async fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>, StoreError> {
        let graph = self.graph.read().await;
        let nodes = query.apply_slice(graph.matching(query));
        Ok(nodes
            .into_iter()
            .map(|node| graph.record(node, query, 0))
            .collect())
    }

    async fn count(&self, query: &NodeQuery) -> Result<u64, StoreError> {
        let graph = self.graph.read().await;
        Ok(graph.matching(query).len() as u64)
    }

    async fn alter(&self, schema: &Schema) -> Result<(), StoreError> {
        tracing::debug!(label = %schema.label, predicates = schema.indexes.len(), "schema declared");
        self.schemas
            .write()
            .await
            .insert(schema.label.clone(), schema.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{IndexKind, NodeDoc};

    fn company(blank: &str, name: &str) -> NodeDoc {
        NodeDoc::new(NodeRef::blank(blank), "Company")
            .property(IS_ACTIVE, true)
            .name("en", name)
    }

    async fn uid_of(store: &MemoryStore, doc: NodeDoc) -> String {
        let blank = match &doc.node {
            NodeRef::Blank(label) => label.clone(),
            NodeRef::Uid(uid) => return uid.clone(),
        };
        let assigned = store.mutate(Mutation::new().set_node(doc)).await.unwrap();
        assigned.require(&blank).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_mutate_assigns_sequential_uids() {
        let store = MemoryStore::new();
        let assigned = store
            .mutate(
                Mutation::new()
                    .set_node(company("a", "Acme"))
                    .set_node(company("b", "Globex")),
            )
            .await
            .unwrap();

        assert_eq!(assigned.get("a"), Some("0x1"));
        assert_eq!(assigned.get("b"), Some("0x2"));
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_no_trace() {
        let store = MemoryStore::new();
        let err = store
            .mutate(
                Mutation::new()
                    .set_node(company("a", "Acme"))
                    .set_edge(NodeRef::blank("a"), "categories", NodeRef::uid("0x99")),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UnknownNode(uid) if uid == "0x99"));
        assert_eq!(store.node_count("Company").await, 0);
    }

    #[tokio::test]
    async fn test_failed_mutation_restores_touched_nodes() {
        let store = MemoryStore::new();
        let acme = uid_of(&store, company("a", "Acme")).await;
        let globex = uid_of(&store, company("b", "Globex")).await;
        store
            .mutate(Mutation::new().set_edge(
                NodeRef::uid(&acme),
                "partners",
                NodeRef::uid(&globex),
            ))
            .await
            .unwrap();

        let err = store
            .mutate(
                Mutation::new()
                    .set_name(NodeRef::uid(&acme), "de", "Acme GmbH")
                    .delete_edge(NodeRef::uid(&acme), "partners", NodeRef::uid(&globex))
                    .delete_node(&globex, "Company")
                    .set_node(company("c", "Initech"))
                    .set_edge(NodeRef::uid(&acme), "partners", NodeRef::uid("0x99")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownNode(uid) if uid == "0x99"));

        let query = NodeQuery::new("Company")
            .by_uid(&acme)
            .in_language("de")
            .expand(&["partners"]);
        let record = &store.query(&query).await.unwrap()[0];
        assert_eq!(record.name.as_ref().unwrap().value, "Acme");
        assert_eq!(record.edges["partners"].len(), 1);
        assert_eq!(record.edges["partners"][0].uid, globex);
        assert_eq!(store.node_count("Company").await, 2);

        // the uid taken by the rolled back node is handed out again
        let initech = uid_of(&store, company("c", "Initech")).await;
        assert_eq!(initech, "0x3");
    }

    #[tokio::test]
    async fn test_names_are_kept_per_language() {
        let store = MemoryStore::new();
        let uid = uid_of(&store, company("a", "Phones")).await;
        store
            .mutate(Mutation::new().set_name(NodeRef::uid(&uid), "ru", "Телефоны"))
            .await
            .unwrap();

        let en = store
            .query(&NodeQuery::new("Company").by_uid(&uid).in_language("en"))
            .await
            .unwrap();
        let ru = store
            .query(&NodeQuery::new("Company").by_uid(&uid).in_language("ru"))
            .await
            .unwrap();

        assert_eq!(en[0].name.as_ref().unwrap().value, "Phones");
        assert_eq!(ru[0].name.as_ref().unwrap().value, "Телефоны");
    }

    #[tokio::test]
    async fn test_name_filter_respects_language() {
        let store = MemoryStore::new();
        uid_of(&store, company("a", "Acme")).await;

        let en = NodeQuery::new("Company").name_equals("Acme").in_language("en");
        let de = NodeQuery::new("Company").name_equals("Acme").in_language("de");
        assert_eq!(store.count(&en).await.unwrap(), 1);
        assert_eq!(store.count(&de).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_active_only_excludes_inactive() {
        let store = MemoryStore::new();
        let uid = uid_of(&store, company("a", "Acme")).await;
        store
            .mutate(Mutation::new().set_node(
                NodeDoc::new(NodeRef::uid(&uid), "Company").property(IS_ACTIVE, false),
            ))
            .await
            .unwrap();

        let active = NodeQuery::new("Company").by_uid(&uid).active_only();
        assert!(store.query(&active).await.unwrap().is_empty());
        assert_eq!(
            store.query(&NodeQuery::new("Company").by_uid(&uid)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_expand_skips_deleted_targets() {
        let store = MemoryStore::new();
        let acme = uid_of(&store, company("a", "Acme")).await;
        let phones = uid_of(
            &store,
            NodeDoc::new(NodeRef::blank("c"), "Category")
                .property(IS_ACTIVE, true)
                .name("en", "Phones"),
        )
        .await;
        store
            .mutate(Mutation::new().set_edge(
                NodeRef::uid(&acme),
                "categories",
                NodeRef::uid(&phones),
            ))
            .await
            .unwrap();

        let query = NodeQuery::new("Company").by_uid(&acme).expand(&["categories"]);
        assert_eq!(store.query(&query).await.unwrap()[0].edges["categories"].len(), 1);

        store
            .mutate(Mutation::new().delete_node(&phones, "Category"))
            .await
            .unwrap();
        assert!(store.query(&query).await.unwrap()[0].edges["categories"].is_empty());
    }

    #[tokio::test]
    async fn test_set_edge_is_idempotent_and_delete_edge_removes() {
        let store = MemoryStore::new();
        let a = uid_of(&store, company("a", "Acme")).await;
        let b = uid_of(&store, company("b", "Globex")).await;
        let edge = Mutation::new()
            .set_edge(NodeRef::uid(&a), "partners", NodeRef::uid(&b))
            .set_edge(NodeRef::uid(&a), "partners", NodeRef::uid(&b));
        store.mutate(edge).await.unwrap();

        let query = NodeQuery::new("Company").by_uid(&a).expand(&["partners"]);
        assert_eq!(store.query(&query).await.unwrap()[0].edges["partners"].len(), 1);

        store
            .mutate(Mutation::new().delete_edge(NodeRef::uid(&a), "partners", NodeRef::uid(&b)))
            .await
            .unwrap();
        assert!(store.query(&query).await.unwrap()[0].edges["partners"].is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_node_fails() {
        let store = MemoryStore::new();
        let err = store
            .mutate(Mutation::new().delete_node("0x7", "City"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownNode(_)));
    }

    #[tokio::test]
    async fn test_delete_node_requires_matching_label() {
        let store = MemoryStore::new();
        let uid = uid_of(&store, company("a", "Acme")).await;

        let err = store
            .mutate(Mutation::new().delete_node(&uid, "City"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownNode(_)));
        assert_eq!(store.node_count("Company").await, 1);

        store
            .mutate(Mutation::new().delete_node(&uid, "Company"))
            .await
            .unwrap();
        assert_eq!(store.node_count("Company").await, 0);
    }

    #[tokio::test]
    async fn test_label_mismatch_is_rejected() {
        let store = MemoryStore::new();
        let uid = uid_of(&store, company("a", "Acme")).await;
        let err = store
            .mutate(Mutation::new().set_node(NodeDoc::new(NodeRef::uid(&uid), "City")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidMutation(_)));
    }

    #[tokio::test]
    async fn test_query_slices_in_creation_order() {
        let store = MemoryStore::new();
        for (i, name) in ["p1", "p2", "p3", "p4", "p5"].iter().enumerate() {
            uid_of(&store, company(&format!("c{}", i), name)).await;
        }

        let query = NodeQuery::new("Company").name_contains("P").slice(2, Some(2));
        let page: Vec<String> = store
            .query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name.unwrap().value)
            .collect();
        assert_eq!(page, vec!["p3", "p4"]);
        assert_eq!(store.count(&query).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_alter_records_schema() {
        let store = MemoryStore::new();
        store
            .alter(&Schema::new("City").index("name", IndexKind::Term))
            .await
            .unwrap();
        assert_eq!(store.schema("City").await.unwrap().indexes.len(), 1);
    }
}
