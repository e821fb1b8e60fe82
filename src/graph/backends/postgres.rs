//! PostgreSQL + Apache AGE client.
//!
//! Cypher runs through AGE's `cypher()` set-returning function. Parameters
//! travel as one agtype map bound through the extended query protocol, so
//! values are never spliced into statement text.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::TryStreamExt;
use serde_json::Value as JsonValue;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::NoTls;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::graph::cypher::{extract_return_columns, ParseError};
use crate::graph::row::{Params, Row, RowStream};
use crate::graph::traits::{CypherExecutor, GraphClient, SqlExecutor, Transaction};

const POOL_SIZE: usize = 16;

/// Agtype parameter: a version byte followed by JSON text.
#[derive(Debug, Clone)]
struct Agtype(String);

impl ToSql for Agtype {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        out.extend_from_slice(&[1]);
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        // agtype's OID differs per installation
        ty.name() == "agtype"
    }

    to_sql_checked!();
}

/// Agtype column value decoded into JSON.
#[derive(Debug)]
struct AgtypeValue(JsonValue);

impl<'a> FromSql<'a> for AgtypeValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let Some((&version, rest)) = raw.split_first() else {
            return Ok(AgtypeValue(JsonValue::Null));
        };
        let text = std::str::from_utf8(if version == 1 { rest } else { raw })?;
        let text = text
            .trim_end_matches("::vertex")
            .trim_end_matches("::edge")
            .trim_end_matches("::path");
        Ok(AgtypeValue(serde_json::from_str(text)?))
    }

    fn accepts(ty: &Type) -> bool {
        ty.name() == "agtype"
    }
}

/// Pooled PostgreSQL client bound to one AGE graph.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
    graph_name: Arc<str>,
}

impl PostgresClient {
    /// Builds a pool from a connection string. No connection is opened yet.
    pub fn connect(connection_string: &str, graph_name: &str) -> Result<Self, StoreError> {
        let pg_config: tokio_postgres::Config = connection_string
            .parse()
            .map_err(|e| StoreError::Connection(format!("invalid connection string: {}", e)))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to build pool: {}", e)))?;

        Ok(Self {
            pool,
            graph_name: Arc::from(graph_name),
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::connect(&config.connection_string(), &config.graph)
    }

    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    /// Creates the AGE graph unless it already exists.
    pub async fn ensure_graph_exists(&self) -> Result<(), StoreError> {
        let conn = self.connection().await?;
        // create_graph has no IF NOT EXISTS form
        let sql = format!(
            "DO $$ BEGIN \
               IF NOT EXISTS (SELECT 1 FROM ag_catalog.ag_graph WHERE name = '{0}') THEN \
                 PERFORM ag_catalog.create_graph('{0}'); \
               END IF; \
             END $$;",
            self.graph_name
        );
        conn.batch_execute(&sql).await.map_err(db_error)
    }

    async fn connection(&self) -> Result<Object, StoreError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.batch_execute("LOAD 'age'; SET search_path = ag_catalog, \"$user\", public;")
            .await
            .map_err(|e| StoreError::Connection(format!("AGE session setup failed: {}", e)))?;
        Ok(conn)
    }
}

#[async_trait]
impl CypherExecutor for PostgresClient {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, StoreError> {
        let conn = self.connection().await?;
        let (sql, param) = build_age_query(&self.graph_name, cypher, &params)?;
        let cypher = cypher.to_string();

        // The stream owns the pooled connection until it is dropped.
        Ok(Box::pin(try_stream! {
            let rows = query_raw(&conn, &sql, param.as_ref(), &cypher).await?;
            futures::pin_mut!(rows);
            while let Some(row) = rows.try_next().await.map_err(db_error)? {
                yield parse_pg_row(&row);
            }
        }))
    }
}

#[async_trait]
impl SqlExecutor for PostgresClient {
    async fn execute_sql(&self, sql: &str) -> Result<(), StoreError> {
        self.connection()
            .await?
            .batch_execute(sql)
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl GraphClient for PostgresClient {
    type Tx<'a> = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx<'_>, StoreError> {
        let conn = self.connection().await?;
        conn.batch_execute("BEGIN").await.map_err(db_error)?;
        Ok(PostgresTransaction {
            conn,
            graph_name: self.graph_name.clone(),
            finished: false,
        })
    }
}

/// An open transaction on a pooled connection.
///
/// Dropping it without `commit` or `rollback` leaves the connection in an
/// open transaction; a warning is logged.
pub struct PostgresTransaction {
    conn: Object,
    graph_name: Arc<str>,
    finished: bool,
}

impl PostgresTransaction {
    async fn finish(&mut self, statement: &str) -> Result<(), StoreError> {
        self.finished = true;
        self.conn.batch_execute(statement).await.map_err(db_error)
    }
}

#[async_trait]
impl CypherExecutor for PostgresTransaction {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, StoreError> {
        let (sql, param) = build_age_query(&self.graph_name, cypher, &params)?;
        let rows = query_raw(&self.conn, &sql, param.as_ref(), cypher).await?;
        Ok(Box::pin(rows.map_ok(|row| parse_pg_row(&row)).map_err(db_error)))
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(mut self) -> Result<(), StoreError> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("PostgresTransaction dropped without commit or rollback");
        }
    }
}

async fn query_raw(
    conn: &Object,
    sql: &str,
    param: Option<&Agtype>,
    cypher: &str,
) -> Result<tokio_postgres::RowStream, StoreError> {
    let result = match param {
        None => conn.query_raw::<_, &Agtype, _>(sql, std::iter::empty()).await,
        Some(param) => conn.query_raw(sql, std::iter::once(param)).await,
    };
    result.map_err(|e| StoreError::Query {
        message: describe(&e),
        query: cypher.to_string(),
    })
}

fn describe(err: &tokio_postgres::Error) -> String {
    err.as_db_error()
        .map(|db| {
            format!(
                "{}: {} ({})",
                db.severity(),
                db.message(),
                db.code().code()
            )
        })
        .unwrap_or_else(|| err.to_string())
}

fn db_error(err: tokio_postgres::Error) -> StoreError {
    StoreError::Internal(describe(&err))
}

/// Wraps a Cypher statement in AGE's `cypher()` call.
///
/// The SQL column list mirrors the RETURN items; write-only statements get
/// a single placeholder column.
fn build_age_query(
    graph_name: &str,
    cypher: &str,
    params: &Params,
) -> Result<(String, Option<Agtype>), StoreError> {
    let columns = match extract_return_columns(cypher) {
        Ok(columns) => columns
            .iter()
            .map(|name| format!("\"{}\" agtype", name.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(", "),
        Err(ParseError::NoReturnClause) => "result agtype".to_string(),
        Err(e) => {
            return Err(StoreError::Query {
                message: e.to_string(),
                query: cypher.to_string(),
            })
        }
    };

    if params.is_empty() {
        return Ok((
            format!(
                "SELECT * FROM cypher('{}', $$ {} $$) as ({})",
                graph_name, cypher, columns
            ),
            None,
        ));
    }

    let json = serde_json::to_string(params)
        .map_err(|e| StoreError::Internal(format!("failed to serialize parameters: {}", e)))?;
    Ok((
        format!(
            "SELECT * FROM cypher('{}', $$ {} $$, $1) as ({})",
            graph_name, cypher, columns
        ),
        Some(Agtype(json)),
    ))
}

/// Converts a result row into JSON columns. AGE only returns agtype
/// columns; other types come from plain SQL and fall back to text.
fn parse_pg_row(pg_row: &tokio_postgres::Row) -> Row {
    let mut data = HashMap::new();
    for (idx, column) in pg_row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "agtype" => pg_row.try_get::<_, AgtypeValue>(idx).ok().map(|v| v.0),
            "int8" => pg_row.try_get::<_, i64>(idx).ok().map(JsonValue::from),
            "int4" => pg_row.try_get::<_, i32>(idx).ok().map(JsonValue::from),
            "bool" => pg_row.try_get::<_, bool>(idx).ok().map(JsonValue::Bool),
            "json" | "jsonb" => pg_row.try_get::<_, JsonValue>(idx).ok(),
            _ => pg_row.try_get::<_, String>(idx).ok().map(JsonValue::String),
        };
        data.insert(column.name().to_string(), value.unwrap_or(JsonValue::Null));
    }
    Row::new(data)
}
