//! Graph store abstraction.
//!
//! Repositories speak the typed [`GraphStore`] contract: a [`Mutation`] is an
//! ordered batch of node, name and edge operations committed as one unit, a
//! [`NodeQuery`] selects nodes of one label, and results come back as
//! [`NodeRecord`]s that decode strictly into models.
//!
//! Two backends implement the contract:
//!
//! - [`MemoryStore`](backends::memory::MemoryStore) keeps the graph in process
//! - [`AgeStore`](backends::age::AgeStore) compiles operations into Cypher
//!   and runs them through a [`GraphClient`], such as the PostgreSQL + Apache
//!   AGE [`PostgresClient`](backends::postgres::PostgresClient)
//!
//! # Usage
//!
//! ```ignore
//! use pricegraph::graph::backends::memory::MemoryStore;
//! use pricegraph::graph::{GraphStore, Mutation, NodeDoc, NodeQuery, NodeRef};
//!
//! let store = MemoryStore::new();
//! let assigned = store
//!     .mutate(
//!         Mutation::new().set_node(
//!             NodeDoc::new(NodeRef::blank("city"), "City")
//!                 .property("is_active", true)
//!                 .name("en", "Berlin"),
//!         ),
//!     )
//!     .await?;
//!
//! let cities = store.query(&NodeQuery::new("City").name_equals("Berlin")).await?;
//! assert_eq!(cities[0].uid, assigned.require("city")?);
//! ```

mod cypher;
mod query;
mod record;
mod row;
mod schema;
mod store;
mod traits;

pub mod backends;

pub use cypher::{extract_return_columns, ParseError};
pub use query::{NodeFilter, NodeQuery};
pub use record::{name_matches, resolve_name, LocalizedName, NodeRecord};
pub use row::{Params, Row, RowStream};
pub use schema::{IndexKind, PredicateIndex, Schema};
pub use store::{
    Assigned, Edge, GraphStore, Mutation, MutationOp, NodeDoc, NodeRef, IS_ACTIVE, NAME,
};
pub use traits::{CypherExecutor, GraphClient, SqlExecutor, Transaction};
