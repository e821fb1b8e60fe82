//! Scrape coordination over the message channel.
//!
//! [`ScrapeCoordinator`] publishes stored instructions for scrapers.
//! [`ObservationWorker`] consumes the observations they send back and feeds
//! them to the [`Reconciler`] through a bounded queue and a fixed pool of
//! handler tasks.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::Reconciler;
use crate::broker::Subscription;
use crate::config::Config;
use crate::context::{AppBroker, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{
    ChannelMessage, Instruction, PriceObservation, ProductObservation, DEFAULT_LANGUAGE,
};
use crate::repositories::InstructionRepository;

/// Consumer group shared by every observation worker.
pub const CONSUMER_GROUP: &str = "reconcilers";

/// Message ids remembered for duplicate detection.
const DEDUPE_WINDOW: usize = 4096;

/// Publishes scrape requests for stored instructions.
#[derive(FromContext, Clone)]
pub struct ScrapeCoordinator {
    instructions: InstructionRepository,
    broker: AppBroker,
    config: Arc<Config>,
}

impl ScrapeCoordinator {
    /// Publishes the active instruction `id` with its relations.
    ///
    /// Related names are resolved in the instruction's own language.
    pub async fn publish_instruction(&self, id: &str) -> Result<Instruction, AppError> {
        let instruction = self.instructions.read_by_id(id, None).await?;
        let instruction = if instruction.language == DEFAULT_LANGUAGE {
            instruction
        } else {
            self.instructions
                .read_by_id(id, Some(&instruction.language))
                .await?
        };

        self.publish(&instruction).await?;
        Ok(instruction)
    }

    /// Publishes every active instruction and returns how many were sent.
    pub async fn publish_active(&self) -> Result<usize, AppError> {
        let instructions = self.instructions.read_all(None).await?;
        let mut published = 0;
        for instruction in instructions {
            let Some(id) = instruction.id.as_deref() else {
                continue;
            };
            self.publish_instruction(id).await?;
            published += 1;
        }
        tracing::info!(published, channel = %self.config.scrape_channel, "instructions published");
        Ok(published)
    }

    async fn publish(&self, instruction: &Instruction) -> Result<(), AppError> {
        let message = ChannelMessage::ScrapeRequest {
            api_version: self.config.api_version.clone(),
            instruction: instruction.clone(),
        };
        self.broker
            .publish(&self.config.scrape_channel, message.encode()?)
            .await?;
        tracing::debug!(id = ?instruction.id, pages = instruction.page_instructions.len(), "scrape request published");
        Ok(())
    }
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Payloads taken from the subscription.
    pub received: u64,
    pub reconciled: u64,
    /// Undecodable payloads and failed reconciliations.
    pub failed: u64,
    pub duplicates: u64,
    /// Messages that are not observations.
    pub ignored: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    reconciled: AtomicU64,
    failed: AtomicU64,
    duplicates: AtomicU64,
    ignored: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            received: self.received.load(Ordering::Relaxed),
            reconciled: self.reconciled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

/// Bounded memory of recently seen message ids.
struct RecentIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false if `id` was already seen within the window.
    fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }

    /// Forgets `id` so a redelivery is processed again.
    fn remove(&mut self, id: &str) {
        if self.seen.remove(id) {
            self.order.retain(|seen| seen != id);
        }
    }
}

struct Observed {
    id: Option<String>,
    product: ProductObservation,
    price: PriceObservation,
}

/// Consumes observations from the scrape channel.
#[derive(FromContext, Clone)]
pub struct ObservationWorker {
    reconciler: Reconciler,
    broker: AppBroker,
    config: Arc<Config>,
}

impl ObservationWorker {
    /// Joins the consumer group on the scrape channel.
    pub async fn subscribe(&self) -> Result<Subscription, AppError> {
        let subscription = self
            .broker
            .subscribe(&self.config.scrape_channel, CONSUMER_GROUP)
            .await?;
        Ok(subscription)
    }

    /// Subscribes and processes observations until `cancel` fires or the
    /// subscription ends.
    pub async fn run(&self, cancel: CancellationToken) -> Result<WorkerStats, AppError> {
        let subscription = self.subscribe().await?;
        Ok(self.process(subscription, cancel).await)
    }

    /// Processes an existing subscription.
    ///
    /// Observations already queued when the loop stops are still handled
    /// before this returns.
    pub async fn process(
        &self,
        mut subscription: Subscription,
        cancel: CancellationToken,
    ) -> WorkerStats {
        let handlers = self.config.worker.handlers.max(1);
        let (queue, receiver) =
            mpsc::channel::<Observed>(self.config.worker.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        // Ids are claimed at dispatch and released again when reconciliation
        // fails, so only handled observations count as duplicates.
        let recent = Arc::new(Mutex::new(RecentIds::new(DEDUPE_WINDOW)));

        tracing::info!(
            channel = %self.config.scrape_channel,
            handlers,
            queue_capacity = self.config.worker.queue_capacity,
            "observation worker started"
        );

        let pool: Vec<_> = (0..handlers)
            .map(|handler| {
                let receiver = receiver.clone();
                let reconciler = self.reconciler.clone();
                let counters = counters.clone();
                let recent = recent.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(observed) = next else {
                            break;
                        };
                        match reconciler.reconcile(&observed.product, &observed.price).await {
                            Ok(product) => {
                                Counters::bump(&counters.reconciled);
                                tracing::debug!(handler, product = ?product.id, "observation handled");
                            }
                            Err(err) => {
                                Counters::bump(&counters.failed);
                                if let Some(id) = observed.id.as_deref() {
                                    recent.lock().await.remove(id);
                                }
                                tracing::error!(
                                    handler,
                                    error = %err,
                                    id = ?observed.id,
                                    name = %observed.product.name,
                                    "reconciliation failed"
                                );
                            }
                        }
                    }
                })
            })
            .collect();

        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = subscription.next() => match next {
                    Some(payload) => payload,
                    None => break,
                },
            };
            Counters::bump(&counters.received);

            let (id, product, price) = match ChannelMessage::decode(&payload) {
                Ok(ChannelMessage::Observation { id, product, price }) => (id, product, price),
                Ok(ChannelMessage::ScrapeRequest { .. }) => {
                    Counters::bump(&counters.ignored);
                    continue;
                }
                Err(err) => {
                    Counters::bump(&counters.failed);
                    tracing::warn!(error = %err, "undecodable message dropped");
                    continue;
                }
            };

            if let Some(id) = id.as_deref() {
                if !recent.lock().await.insert(id) {
                    Counters::bump(&counters.duplicates);
                    tracing::warn!(id, "duplicate observation skipped");
                    continue;
                }
            }

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = queue.send(Observed { id, product, price }) => sent,
            };
            if sent.is_err() {
                break;
            }
        }

        drop(queue);
        for handle in pool {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "observation handler panicked");
            }
        }

        let stats = counters.snapshot();
        tracing::info!(?stats, "observation worker stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_ids_window() {
        let mut recent = RecentIds::new(2);
        assert!(recent.insert("a"));
        assert!(!recent.insert("a"));
        assert!(recent.insert("b"));
        assert!(recent.insert("c"));
        // "a" fell out of the window
        assert!(recent.insert("a"));
        assert!(!recent.insert("c"));
    }

    #[test]
    fn test_recent_ids_remove_allows_redelivery() {
        let mut recent = RecentIds::new(2);
        assert!(recent.insert("a"));
        assert!(recent.insert("b"));
        recent.remove("a");
        assert!(recent.insert("a"));
        assert!(!recent.insert("a"));
        assert!(!recent.insert("b"));
        recent.remove("missing");
        assert!(!recent.insert("b"));
    }
}
