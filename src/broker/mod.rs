//! Message broker abstraction.
//!
//! Scrape requests leave through [`MessageBroker::publish`] and observations
//! come back through [`MessageBroker::subscribe`]. Delivery is at-least-once
//! and unordered across the members of a consumer group.

pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::BrokerError;

pub use memory::MemoryBroker;

/// Payloads delivered to one subscriber.
pub type Subscription = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes a payload, waiting while a consumer queue is full.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Joins `group` on `topic`.
    ///
    /// Every group receives each message once; members of one group compete.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BrokerError>;
}
