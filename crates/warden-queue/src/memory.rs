//! Embedded in-process broker
//!
//! Topic exchange with queue bindings, manual acknowledgment and redelivery of
//! unacknowledged messages. Used for single-process deployments and tests; it
//! keeps the same at-least-once contract as the AMQP broker.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{routing_key_matches, QueueConsumer, QueueError, QueuePublisher, Result};
use warden_common::{Message, QueuedMessage};

/// In-process topic exchange
#[derive(Clone)]
pub struct MemoryBroker {
    exchange: String,
    queues: Arc<Mutex<Vec<Binding>>>,
}

struct Binding {
    pattern: String,
    queue: Arc<MemoryQueue>,
}

impl MemoryBroker {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queues: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Declare a queue bound to the given routing key patterns.
    pub fn bind(&self, queue_name: &str, patterns: &[&str]) -> Arc<MemoryQueue> {
        let queue = Arc::new(MemoryQueue::new(queue_name));
        let mut bindings = self.queues.lock();
        for pattern in patterns {
            bindings.push(Binding {
                pattern: pattern.to_string(),
                queue: queue.clone(),
            });
        }
        info!(exchange = %self.exchange, queue = %queue_name, ?patterns, "Bound in-memory queue");
        queue
    }

    fn route(&self, message: &Message) -> usize {
        let bindings = self.queues.lock();
        let mut delivered: Vec<&Arc<MemoryQueue>> = Vec::new();

        for binding in bindings.iter() {
            if routing_key_matches(&binding.pattern, &message.routing_key)
                && !delivered.iter().any(|q| Arc::ptr_eq(q, &binding.queue))
            {
                binding.queue.enqueue(message.clone(), false);
                delivered.push(&binding.queue);
            }
        }

        delivered.len()
    }
}

#[async_trait]
impl QueuePublisher for MemoryBroker {
    fn identifier(&self) -> &str {
        &self.exchange
    }

    async fn publish(&self, message: Message) -> Result<String> {
        let routed = self.route(&message);
        if routed == 0 {
            // Same as an AMQP topic exchange without a matching binding: dropped.
            warn!(
                exchange = %self.exchange,
                routing_key = %message.routing_key,
                "No queue bound for routing key"
            );
        }
        debug!(message_id = %message.id, routed, "Message published in-memory");
        Ok(message.id)
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<(Message, bool)>,
    in_flight: HashMap<String, Message>,
}

/// A queue bound to a [`MemoryBroker`]
pub struct MemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    running: AtomicBool,
}

impl MemoryQueue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(QueueState::default()),
            running: AtomicBool::new(true),
        }
    }

    fn enqueue(&self, message: Message, redelivered: bool) {
        self.state.lock().ready.push_back((message, redelivered));
    }

    /// Messages waiting to be polled
    pub fn pending(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Messages polled but neither ACKed nor NACKed
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Return every in-flight message to the queue, as a broker does when the
    /// consumer's connection drops before it acknowledges.
    pub fn requeue_unacked(&self) -> usize {
        let mut state = self.state.lock();
        let unacked: Vec<Message> = state.in_flight.drain().map(|(_, m)| m).collect();
        let count = unacked.len();
        for message in unacked {
            state.ready.push_front((message, true));
        }
        count
    }

    /// Resume a stopped queue (a new consumer attaching)
    pub fn restart(&self) {
        self.running.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    fn identifier(&self) -> &str {
        &self.name
    }

    async fn poll(&self, max_messages: u32) -> Result<Vec<QueuedMessage>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }

        let mut state = self.state.lock();
        let mut messages = Vec::new();

        while messages.len() < max_messages as usize {
            let Some((message, redelivered)) = state.ready.pop_front() else {
                break;
            };
            let receipt_handle = uuid::Uuid::new_v4().to_string();
            state.in_flight.insert(receipt_handle.clone(), message.clone());
            messages.push(QueuedMessage {
                message,
                receipt_handle,
                redelivered,
                queue_identifier: self.name.clone(),
            });
        }

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        self.state
            .lock()
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| QueueError::NotFound(receipt_handle.to_string()))
    }

    async fn nack(&self, receipt_handle: &str) -> Result<()> {
        let mut state = self.state.lock();
        let message = state
            .in_flight
            .remove(receipt_handle)
            .ok_or_else(|| QueueError::NotFound(receipt_handle.to_string()))?;
        state.ready.push_back((message, true));
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let requeued = self.requeue_unacked();
        info!(queue = %self.name, requeued, "In-memory consumer stopped");
    }
}
