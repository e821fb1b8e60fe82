//! Application context providing dependency injection root.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broker::{MemoryBroker, MessageBroker};
use crate::config::{Config, StoreBackend};
use crate::deadline::{DeadlineBroker, DeadlineStore};
use crate::di::Context as ContextDerive;
use crate::error::AppError;
use crate::graph::backends::age::AgeStore;
use crate::graph::backends::memory::MemoryStore;
use crate::graph::backends::postgres::PostgresClient;
use crate::graph::GraphStore;
use crate::keyed_lock::KeyedLocks;

/// Shared graph store handle.
pub type AppStore = Arc<dyn GraphStore>;

/// Shared message broker handle.
pub type AppBroker = Arc<dyn MessageBroker>;

/// Root application context for dependency injection.
///
/// `#[derive(Context)]` generates a `FromRef` implementation for each field,
/// so repositories and services resolve their handles from it at compile time.
#[derive(ContextDerive, Clone)]
pub struct Context {
    pub store: AppStore,
    pub broker: AppBroker,
    /// Per-key serialization point shared by every repository and service.
    pub locks: Arc<KeyedLocks>,
    pub config: Arc<Config>,
}

impl Context {
    /// Creates a context around already constructed collaborators.
    pub fn new(store: AppStore, broker: AppBroker, config: Config) -> Self {
        Self {
            store,
            broker,
            locks: Arc::new(KeyedLocks::new()),
            config: Arc::new(config),
        }
    }

    /// In-memory store and broker, without deadlines. Used by tests.
    pub fn in_memory(config: Config) -> Self {
        let capacity = config.worker.queue_capacity;
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBroker::new(capacity)),
            config,
        )
    }

    /// Builds the configured store backend and wraps every collaborator in
    /// the configured call deadline and `cancel`.
    pub async fn connect(config: Config, cancel: CancellationToken) -> Result<Self, AppError> {
        let store: AppStore = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Postgres => {
                let client = PostgresClient::from_config(&config.store)?;
                client.ensure_graph_exists().await?;
                let graph = client.graph_name().to_string();
                Arc::new(AgeStore::new(client, &graph))
            }
        };

        tracing::info!(
            backend = ?config.store.backend,
            broker = %format!("{}:{}", config.broker.host, config.broker.port),
            timeout = ?config.call_timeout(),
            "collaborators ready"
        );

        let timeout = config.call_timeout();
        let broker: AppBroker = Arc::new(MemoryBroker::new(config.worker.queue_capacity));

        Ok(Self::new(
            Arc::new(DeadlineStore::new(store, timeout, cancel.clone())),
            Arc::new(DeadlineBroker::new(broker, timeout, cancel)),
            config,
        ))
    }
}
