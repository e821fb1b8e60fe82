//! pricegraph - product and price history kept in a graph store.
//!
//! Entity repositories persist companies, categories, cities, scrape
//! instructions, products and prices as graph nodes. The reconciler turns
//! scraped observations into deduplicated products with append-only price
//! history.

pub mod broker;
pub mod cli;
pub mod config;
pub mod context;
pub mod deadline;
pub mod di;
pub mod error;
pub mod graph;
pub mod keyed_lock;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export FromRef at crate root for di-macros generated code
pub use di::FromRef;
