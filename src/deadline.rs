//! Deadline and cancellation wrappers for collaborator calls.
//!
//! [`DeadlineStore`] and [`DeadlineBroker`] decorate any store or broker so
//! every call races a timeout and a shared [`CancellationToken`]. Whichever
//! fires first turns into a `Timeout` or `Cancelled` error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::broker::{MessageBroker, Subscription};
use crate::error::{BrokerError, StoreError};
use crate::graph::{Assigned, GraphStore, Mutation, NodeQuery, NodeRecord, Schema};

enum Outcome<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

async fn bounded<T>(
    timeout: Duration,
    cancel: &CancellationToken,
    call: impl Future<Output = T>,
) -> Outcome<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Outcome::Cancelled,
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(value) => Outcome::Done(value),
            Err(_) => Outcome::TimedOut,
        },
    }
}

/// A [`GraphStore`] whose calls are bounded by a deadline and a cancel token.
pub struct DeadlineStore {
    inner: Arc<dyn GraphStore>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl DeadlineStore {
    pub fn new(inner: Arc<dyn GraphStore>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            inner,
            timeout,
            cancel,
        }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match bounded(self.timeout, &self.cancel, call).await {
            Outcome::Done(result) => result,
            Outcome::TimedOut => {
                tracing::warn!(operation, timeout = ?self.timeout, "store call timed out");
                Err(StoreError::Timeout(self.timeout))
            }
            Outcome::Cancelled => Err(StoreError::Cancelled),
        }
    }
}

#[async_trait]
impl GraphStore for DeadlineStore {
    async fn mutate(&self, mutation: Mutation) -> Result<Assigned, StoreError> {
        self.call("mutate", self.inner.mutate(mutation)).await
    }

    async fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>, StoreError> {
        self.call("query", self.inner.query(query)).await
    }

    async fn count(&self, query: &NodeQuery) -> Result<u64, StoreError> {
        self.call("count", self.inner.count(query)).await
    }

    async fn alter(&self, schema: &Schema) -> Result<(), StoreError> {
        self.call("alter", self.inner.alter(schema)).await
    }
}

/// A [`MessageBroker`] whose calls are bounded by a deadline and a cancel token.
///
/// Subscriptions are not bounded by the deadline; they end when the token
/// is cancelled.
pub struct DeadlineBroker {
    inner: Arc<dyn MessageBroker>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl DeadlineBroker {
    pub fn new(
        inner: Arc<dyn MessageBroker>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            timeout,
            cancel,
        }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, BrokerError>>,
    ) -> Result<T, BrokerError> {
        match bounded(self.timeout, &self.cancel, call).await {
            Outcome::Done(result) => result,
            Outcome::TimedOut => {
                tracing::warn!(operation, timeout = ?self.timeout, "broker call timed out");
                Err(BrokerError::Timeout(self.timeout))
            }
            Outcome::Cancelled => Err(BrokerError::Cancelled),
        }
    }
}

#[async_trait]
impl MessageBroker for DeadlineBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.call("publish", self.inner.publish(topic, payload)).await
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BrokerError> {
        let stream = self
            .call("subscribe", self.inner.subscribe(topic, group))
            .await?;
        let token = self.cancel.clone();
        Ok(Box::pin(stream.take_until(async move {
            token.cancelled().await
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::graph::backends::memory::MemoryStore;

    struct StalledStore;

    #[async_trait]
    impl GraphStore for StalledStore {
        async fn mutate(&self, _mutation: Mutation) -> Result<Assigned, StoreError> {
            futures::future::pending().await
        }

        async fn query(&self, _query: &NodeQuery) -> Result<Vec<NodeRecord>, StoreError> {
            futures::future::pending().await
        }

        async fn count(&self, _query: &NodeQuery) -> Result<u64, StoreError> {
            futures::future::pending().await
        }

        async fn alter(&self, _schema: &Schema) -> Result<(), StoreError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_store_call_times_out() {
        let store = DeadlineStore::new(
            Arc::new(StalledStore),
            Duration::from_millis(20),
            CancellationToken::new(),
        );
        let err = store.count(&NodeQuery::new("City")).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_store_call_cancelled() {
        let cancel = CancellationToken::new();
        let store = DeadlineStore::new(
            Arc::new(StalledStore),
            Duration::from_secs(30),
            cancel.clone(),
        );
        cancel.cancel();
        let err = store.query(&NodeQuery::new("City")).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
    }

    #[tokio::test]
    async fn test_store_call_passes_through() {
        let store = DeadlineStore::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        assert_eq!(store.count(&NodeQuery::new("City")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_times_out_on_full_queue() {
        let inner = Arc::new(MemoryBroker::new(1));
        let _sub = inner.subscribe("scrape", "reconcilers").await.unwrap();
        let broker =
            DeadlineBroker::new(inner, Duration::from_millis(20), CancellationToken::new());

        broker.publish("scrape", Bytes::from_static(b"1")).await.unwrap();
        let err = broker
            .publish("scrape", Bytes::from_static(b"2"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_subscription_ends_on_cancel() {
        let cancel = CancellationToken::new();
        let broker = DeadlineBroker::new(
            Arc::new(MemoryBroker::default()),
            Duration::from_secs(1),
            cancel.clone(),
        );
        let mut sub = broker.subscribe("scrape", "reconcilers").await.unwrap();
        cancel.cancel();
        assert!(sub.next().await.is_none());
    }
}
