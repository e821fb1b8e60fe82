//! In-process broker with consumer-group semantics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, RwLock};

use super::{MessageBroker, Subscription};
use crate::error::BrokerError;

const DEFAULT_CAPACITY: usize = 64;

/// One consumer group: a bounded queue whose receiver is shared by members.
struct Group {
    sender: mpsc::Sender<Bytes>,
    receiver: Arc<Mutex<mpsc::Receiver<Bytes>>>,
}

impl Group {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

/// Broker keeping every topic in memory.
///
/// Messages published before any group subscribed to a topic are dropped.
#[derive(Clone)]
pub struct MemoryBroker {
    topics: Arc<RwLock<HashMap<String, HashMap<String, Group>>>>,
    capacity: usize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryBroker {
    /// Creates a broker whose group queues hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Closes every queue of `topic`; subscriptions end once drained.
    pub async fn close(&self, topic: &str) {
        self.topics.write().await.remove(topic);
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        let senders: Vec<mpsc::Sender<Bytes>> = {
            let topics = self.topics.read().await;
            match topics.get(topic) {
                Some(groups) => groups.values().map(|g| g.sender.clone()).collect(),
                None => Vec::new(),
            }
        };

        if senders.is_empty() {
            tracing::debug!(topic, "no subscribers, message dropped");
            return Ok(());
        }

        for sender in senders {
            sender
                .send(payload.clone())
                .await
                .map_err(|_| BrokerError::Closed(topic.to_string()))?;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BrokerError> {
        let receiver = {
            let mut topics = self.topics.write().await;
            topics
                .entry(topic.to_string())
                .or_default()
                .entry(group.to_string())
                .or_insert_with(|| Group::new(self.capacity))
                .receiver
                .clone()
        };
        tracing::debug!(topic, group, "subscribed");

        Ok(Box::pin(futures::stream::unfold(
            receiver,
            |receiver| async move {
                let next = receiver.lock().await.recv().await;
                next.map(|payload| (payload, receiver))
            },
        )))
    }
}
