//! Identity Sync Consumer
//!
//! One long-lived task per subscription. It is the only owner of its
//! projection store: events are applied here and reads arrive as messages
//! through a [`SyncHandle`].
//!
//! Delivery is at-least-once and unordered. Applied, skipped and malformed
//! events are ACKed; events that fail on a transient store error are NACKed
//! so the broker redelivers them.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_common::{AckNack, QueuedMessage};
use warden_queue::{QueueConsumer, QueueError};

use crate::error::{IdentityError, Result};
use crate::sync::events::IdentityChangeEvent;
use crate::sync::projection::{AccountRecord, ApplyOutcome, ProjectionStore};

#[derive(Debug, Clone)]
pub struct SyncConsumerConfig {
    /// Messages requested per poll
    pub batch_size: u32,
    /// Pause after an empty poll or a broker error
    pub idle_interval: Duration,
    /// Capacity of the query channel
    pub query_buffer: usize,
}

impl Default for SyncConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_interval: Duration::from_millis(250),
            query_buffer: 64,
        }
    }
}

/// Counters for one consumer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub applied: u64,
    pub skipped: u64,
    pub malformed: u64,
    pub failed: u64,
}

impl SyncStats {
    fn record(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Applied => self.applied += 1,
            EventOutcome::Skipped => self.skipped += 1,
            EventOutcome::Malformed => self.malformed += 1,
            EventOutcome::Failed => self.failed += 1,
        }
    }
}

/// What happened to one delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Applied,
    Skipped,
    Malformed,
    Failed,
}

impl EventOutcome {
    /// Metric label
    fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Malformed => "malformed",
            Self::Failed => "failed",
        }
    }
}

enum ProjectionQuery {
    FindByUsername(String, oneshot::Sender<Result<Option<AccountRecord>>>),
    FindById(Uuid, oneshot::Sender<Result<Option<AccountRecord>>>),
    Count(oneshot::Sender<Result<u64>>),
}

/// Read access to a running consumer's projection
#[derive(Clone)]
pub struct SyncHandle {
    queries: mpsc::Sender<ProjectionQuery>,
}

impl SyncHandle {
    pub async fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>> {
        let (tx, rx) = oneshot::channel();
        self.ask(ProjectionQuery::FindByUsername(username.to_string(), tx), rx).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountRecord>> {
        let (tx, rx) = oneshot::channel();
        self.ask(ProjectionQuery::FindById(id, tx), rx).await
    }

    pub async fn count(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.ask(ProjectionQuery::Count(tx), rx).await
    }

    async fn ask<T>(&self, query: ProjectionQuery, reply: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.queries
            .send(query)
            .await
            .map_err(|_| IdentityError::internal("identity sync consumer is not running"))?;
        reply
            .await
            .map_err(|_| IdentityError::internal("identity sync consumer dropped the query"))?
    }
}

pub struct IdentitySyncConsumer {
    consumer: Arc<dyn QueueConsumer>,
    store: Box<dyn ProjectionStore>,
    config: SyncConsumerConfig,
    queries: mpsc::Receiver<ProjectionQuery>,
    stats: SyncStats,
}

impl IdentitySyncConsumer {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        store: Box<dyn ProjectionStore>,
        config: SyncConsumerConfig,
    ) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::channel(config.query_buffer.max(1));
        let consumer = Self {
            consumer,
            store,
            config,
            queries: rx,
            stats: SyncStats::default(),
        };
        (consumer, SyncHandle { queries: tx })
    }

    /// Run until `shutdown` fires (or its sender is dropped) or the broker
    /// consumer stops. Messages still unACKed at that point go back to the
    /// broker.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> SyncStats {
        info!(queue = self.consumer.identifier(), "Identity sync consumer started");
        // Queries never push the next poll back; the timer is reset only after a poll
        let poll_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(poll_timer);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("Identity sync consumer received shutdown signal");
                    break;
                }

                () = &mut poll_timer => {
                    let delay = match self.consumer.poll(self.config.batch_size).await {
                        Ok(batch) if batch.is_empty() => self.config.idle_interval,
                        Ok(batch) => {
                            if self.handle_batch(batch, &mut shutdown).await {
                                break;
                            }
                            self.answer_pending().await;
                            Duration::ZERO
                        }
                        Err(QueueError::Stopped) => {
                            warn!("Broker consumer stopped");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Error polling identity events");
                            self.config.idle_interval
                        }
                    };
                    poll_timer.as_mut().reset(Instant::now() + delay);
                }

                Some(query) = self.queries.recv() => {
                    self.answer(query).await;
                }
            }
        }

        self.consumer.stop().await;
        info!(
            applied = self.stats.applied,
            skipped = self.stats.skipped,
            malformed = self.stats.malformed,
            failed = self.stats.failed,
            "Identity sync consumer stopped"
        );
        self.stats
    }

    /// Process a batch one message at a time. Returns true when shutdown was
    /// requested mid-batch; the remainder is NACKed.
    async fn handle_batch(
        &mut self,
        batch: Vec<QueuedMessage>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        let mut messages = batch.into_iter();

        while let Some(msg) = messages.next() {
            if !matches!(shutdown.try_recv(), Err(broadcast::error::TryRecvError::Empty)) {
                self.settle(&msg, AckNack::Nack).await;
                for rest in messages {
                    self.settle(&rest, AckNack::Nack).await;
                }
                return true;
            }

            let decision = self.process(&msg).await;
            self.settle(&msg, decision).await;
        }
        false
    }

    async fn process(&mut self, msg: &QueuedMessage) -> AckNack {
        let message = &msg.message;

        let event = match IdentityChangeEvent::decode(&message.routing_key, &message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    routing_key = %message.routing_key,
                    error = %e,
                    "Dropping malformed identity event"
                );
                self.record(EventOutcome::Malformed);
                return AckNack::Ack;
            }
        };

        match self.apply(&event, message.occurred_at).await {
            Ok(ApplyOutcome::Applied) => {
                debug!(message_id = %message.id, kind = event.kind(), "Identity event applied");
                self.record(EventOutcome::Applied);
                AckNack::Ack
            }
            Ok(ApplyOutcome::Skipped) => {
                debug!(
                    message_id = %message.id,
                    kind = event.kind(),
                    redelivered = msg.redelivered,
                    "Identity event skipped"
                );
                self.record(EventOutcome::Skipped);
                AckNack::Ack
            }
            Err(e) if e.is_transient() => {
                warn!(message_id = %message.id, error = %e, "Projection update failed, requeueing");
                self.record(EventOutcome::Failed);
                AckNack::Nack
            }
            Err(e) => {
                error!(message_id = %message.id, error = %e, "Projection update failed, dropping event");
                self.record(EventOutcome::Failed);
                AckNack::Ack
            }
        }
    }

    async fn apply(
        &mut self,
        event: &IdentityChangeEvent,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<ApplyOutcome> {
        self.store.apply(event, occurred_at).await
    }

    fn record(&mut self, outcome: EventOutcome) {
        self.stats.record(outcome);
        metrics::counter!("identity.sync.events_total", "outcome" => outcome.as_str()).increment(1);
    }

    async fn settle(&self, msg: &QueuedMessage, decision: AckNack) {
        let result = match decision {
            AckNack::Ack => self.consumer.ack(&msg.receipt_handle).await,
            AckNack::Nack => self.consumer.nack(&msg.receipt_handle).await,
        };
        if let Err(e) = result {
            // The broker redelivers whatever was not settled.
            warn!(message_id = %msg.message.id, ?decision, error = %e, "Failed to settle message");
        }
    }

    /// Reads queued while a backlog is being worked through
    async fn answer_pending(&mut self) {
        for _ in 0..self.config.query_buffer.max(1) {
            let Ok(query) = self.queries.try_recv() else {
                break;
            };
            self.answer(query).await;
        }
    }

    async fn answer(&self, query: ProjectionQuery) {
        match query {
            ProjectionQuery::FindByUsername(username, reply) => {
                let _ = reply.send(self.store.find_by_username(&username).await);
            }
            ProjectionQuery::FindById(id, reply) => {
                let _ = reply.send(self.store.find_by_id(id).await);
            }
            ProjectionQuery::Count(reply) => {
                let _ = reply.send(self.store.count().await);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::projection::MemoryProjectionStore;
    use serde_json::json;
    use warden_common::Message;
    use warden_queue::{MemoryBroker, QueuePublisher};

    fn config() -> SyncConsumerConfig {
        SyncConsumerConfig {
            idle_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn wait_for<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_applies_events_and_answers_queries() {
        let broker = MemoryBroker::new("identity");
        let queue = broker.bind("sync", &["identity.#"]);
        let (consumer, handle) =
            IdentitySyncConsumer::new(queue.clone(), Box::new(MemoryProjectionStore::new()), config());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(consumer.run(shutdown_rx));

        let id = Uuid::new_v4();
        broker
            .publish(Message::new(
                "identity.created",
                json!({"id": id, "name": "alice", "email": "alice@example.com"}),
            ))
            .await
            .unwrap();

        wait_for(|| {
            let handle = handle.clone();
            async move { handle.count().await.unwrap() == 1 }
        })
        .await;

        assert_eq!(handle.find_by_username("alice").await.unwrap().unwrap().id, id);
        assert_eq!(handle.find_by_id(id).await.unwrap().unwrap().username, "alice");

        shutdown_tx.send(()).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.applied, 1);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_malformed_messages_are_dropped_not_fatal() {
        let broker = MemoryBroker::new("identity");
        let queue = broker.bind("sync", &["identity.#"]);
        let (consumer, handle) =
            IdentitySyncConsumer::new(queue.clone(), Box::new(MemoryProjectionStore::new()), config());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(consumer.run(shutdown_rx));

        broker
            .publish(Message::new("identity.username_changed", json!({"unexpected": true})))
            .await
            .unwrap();
        broker.publish(Message::new("identity.exploded", json!(42))).await.unwrap();
        broker
            .publish(Message::new(
                "identity.created",
                json!({"id": Uuid::new_v4(), "name": "bob", "email": "bob@example.com"}),
            ))
            .await
            .unwrap();

        wait_for(|| {
            let handle = handle.clone();
            async move { handle.count().await.unwrap() == 1 }
        })
        .await;

        shutdown_tx.send(()).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.applied, 1);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_steady_reads_do_not_hold_back_events() {
        let broker = MemoryBroker::new("identity");
        let queue = broker.bind("sync", &["identity.#"]);
        let idle_interval = Duration::from_millis(200);
        let (consumer, handle) = IdentitySyncConsumer::new(
            queue.clone(),
            Box::new(MemoryProjectionStore::new()),
            SyncConsumerConfig {
                idle_interval,
                ..Default::default()
            },
        );
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(consumer.run(shutdown_rx));

        // Let the first poll come back empty so the consumer is idling
        tokio::time::sleep(Duration::from_millis(50)).await;
        broker
            .publish(Message::new(
                "identity.created",
                json!({"id": Uuid::new_v4(), "name": "alice", "email": "alice@example.com"}),
            ))
            .await
            .unwrap();

        let mut count = 0;
        for _ in 0..40 {
            count = handle.count().await.unwrap();
            if count == 1 {
                break;
            }
            tokio::time::sleep(idle_interval / 4).await;
        }
        assert_eq!(count, 1);
        assert_eq!(queue.pending(), 0);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_outcomes_update_matching_counter() {
        let mut stats = SyncStats::default();
        for outcome in [
            EventOutcome::Applied,
            EventOutcome::Applied,
            EventOutcome::Skipped,
            EventOutcome::Malformed,
            EventOutcome::Failed,
        ] {
            stats.record(outcome);
        }
        assert_eq!(
            stats,
            SyncStats {
                applied: 2,
                skipped: 1,
                malformed: 1,
                failed: 1,
            }
        );
        assert_eq!(EventOutcome::Malformed.as_str(), "malformed");
        assert_eq!(EventOutcome::Failed.as_str(), "failed");
    }

    #[tokio::test]
    async fn test_handle_fails_after_consumer_stops() {
        let broker = MemoryBroker::new("identity");
        let queue = broker.bind("sync", &["identity.#"]);
        let (consumer, handle) =
            IdentitySyncConsumer::new(queue, Box::new(MemoryProjectionStore::new()), config());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(consumer.run(shutdown_rx));

        drop(shutdown_tx);
        task.await.unwrap();

        assert!(matches!(handle.count().await, Err(IdentityError::Internal { .. })));
    }
}
