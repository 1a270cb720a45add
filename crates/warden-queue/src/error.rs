use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Queue is stopped")]
    Stopped,

    #[error("Configuration error: {0}")]
    Config(String),
}
