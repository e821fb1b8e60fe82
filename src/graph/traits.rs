//! Executor traits implemented by Cypher-speaking backends.
//!
//! [`AgeStore`](super::backends::age::AgeStore) is generic over these, so
//! the statement compiler can be exercised against any client that speaks
//! Cypher and plain SQL.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::graph::row::{Params, RowStream};

/// Executes Cypher statements.
#[async_trait]
pub trait CypherExecutor: Send + Sync {
    /// Runs a statement and streams its rows.
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, StoreError>;

    /// Runs a statement, discarding any rows.
    async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), StoreError> {
        use futures::StreamExt;

        let mut stream = self.execute_cypher(cypher, params).await?;
        while let Some(row) = stream.next().await {
            row?;
        }
        Ok(())
    }
}

/// Executes plain SQL, used for DDL such as index creation.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute_sql(&self, sql: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Transaction: Send + Sync {
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// A client that can open transactions.
///
/// Executor methods on the client itself auto-commit each statement.
#[async_trait]
pub trait GraphClient: CypherExecutor {
    type Tx<'a>: Transaction + CypherExecutor
    where
        Self: 'a;

    async fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;
}
