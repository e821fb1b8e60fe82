//! Graph store backends.
//!
//! | Backend | Module | Used by |
//! |---------|--------|---------|
//! | In-process map | [`memory`] | tests, development profile |
//! | PostgreSQL + Apache AGE | [`age`] over [`postgres`] | production profile |
//!
//! [`age::AgeStore`] compiles typed mutations into Cypher and runs them over
//! any client implementing [`GraphClient`](crate::graph::GraphClient) and
//! [`SqlExecutor`](crate::graph::SqlExecutor). [`postgres::PostgresClient`]
//! is the pooled client for a live database.

pub mod age;
pub mod memory;
pub mod postgres;
