use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod logging;

// ============================================================================
// Broker Message Types
// ============================================================================

/// A message as handed to (or received from) the broker.
///
/// The `payload` is the flat JSON object that travels as the message body.
/// `routing_key` selects the subscribers and `occurred_at` records when the
/// producing write happened; both travel as broker metadata, not in the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(routing_key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            routing_key: routing_key.into(),
            payload,
            occurred_at: Some(Utc::now()),
        }
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// A message that has been received from a queue with tracking metadata
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: Message,
    pub receipt_handle: String,
    /// Set when the broker has delivered this message before without an ACK
    pub redelivered: bool,
    pub queue_identifier: String,
}

/// ACK/NACK decision for a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckNack {
    Ack,
    Nack,
}
