//! Workflows built on the repositories.
//!
//! Services resolve their repositories and handles from the context with
//! the `FromContext` derive macro.

mod reconciler;
mod scrape;

pub use reconciler::Reconciler;
pub use scrape::{ObservationWorker, ScrapeCoordinator, WorkerStats, CONSUMER_GROUP};
