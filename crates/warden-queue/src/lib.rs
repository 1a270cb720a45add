use async_trait::async_trait;
use warden_common::{Message, QueuedMessage};

pub mod error;
pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use error::QueueError;
pub use memory::{MemoryBroker, MemoryQueue};

pub type Result<T> = std::result::Result<T, QueueError>;

/// Trait for consuming messages from a queue.
///
/// Delivery is at-least-once: a message that is polled but never ACKed
/// (consumer crash, NACK, stop) is delivered again.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Get the unique identifier for this consumer
    fn identifier(&self) -> &str;

    /// Poll for up to `max_messages` messages. May return an empty batch.
    async fn poll(&self, max_messages: u32) -> Result<Vec<QueuedMessage>>;

    /// Acknowledge a message (remove from queue)
    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    /// Negative acknowledge a message; the broker redelivers it
    async fn nack(&self, receipt_handle: &str) -> Result<()>;

    /// Check if the consumer is healthy
    fn is_healthy(&self) -> bool;

    /// Stop the consumer. Unacknowledged messages go back to the broker.
    async fn stop(&self);
}

/// Trait for publishing messages to a topic
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Get the publisher identifier (exchange or topic name)
    fn identifier(&self) -> &str;

    /// Publish a single message under its routing key. Returns the message id.
    async fn publish(&self, message: Message) -> Result<String>;
}

/// AMQP-style topic pattern match.
///
/// Words are separated by `.`; `*` matches exactly one word and `#` matches
/// zero or more words.
pub fn routing_key_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&k, key_rest)) if word == "*" || word == k => matches_words(rest, key_rest),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_key_exact_match() {
        assert!(routing_key_matches("identity.created", "identity.created"));
        assert!(!routing_key_matches("identity.created", "identity.username_changed"));
    }

    #[test]
    fn test_routing_key_wildcards() {
        assert!(routing_key_matches("identity.*", "identity.created"));
        assert!(!routing_key_matches("identity.*", "identity.user.created"));
        assert!(routing_key_matches("identity.#", "identity.user.created"));
        assert!(routing_key_matches("identity.#", "identity"));
        assert!(routing_key_matches("#", "anything.at.all"));
        assert!(!routing_key_matches("account.*", "identity.created"));
    }
}
