//! Identity Change Publisher

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use warden_common::Message;
use warden_queue::QueuePublisher;

use crate::error::Result;
use crate::sync::events::IdentityChangeEvent;

#[derive(Clone)]
pub struct IdentityChangePublisher {
    publisher: Arc<dyn QueuePublisher>,
}

impl IdentityChangePublisher {
    pub fn new(publisher: Arc<dyn QueuePublisher>) -> Self {
        Self { publisher }
    }

    /// Publish under the event's routing key. Returns the message id.
    pub async fn publish(&self, event: &IdentityChangeEvent) -> Result<String> {
        self.publish_at(event, Utc::now()).await
    }

    pub async fn publish_at(&self, event: &IdentityChangeEvent, occurred_at: DateTime<Utc>) -> Result<String> {
        let message = Message::new(event.routing_key(), event.to_payload()).with_occurred_at(occurred_at);
        let message_id = self.publisher.publish(message).await?;

        debug!(
            message_id = %message_id,
            kind = event.kind(),
            exchange = self.publisher.identifier(),
            "Identity change published"
        );
        Ok(message_id)
    }
}
