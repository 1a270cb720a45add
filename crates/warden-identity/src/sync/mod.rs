//! Cross-service identity synchronization
//!
//! - `events` - identity change events and their wire payloads
//! - `publisher` - emits events after the write that caused them
//! - `projection` - the local account projection and its stores
//! - `consumer` - the subscription loop that applies events to the projection

pub mod consumer;
pub mod events;
pub mod projection;
pub mod publisher;

pub use consumer::{IdentitySyncConsumer, SyncConsumerConfig, SyncHandle, SyncStats};
pub use events::IdentityChangeEvent;
pub use projection::{AccountRecord, ApplyOutcome, ProjectionState, ProjectionStore};
pub use publisher::IdentityChangePublisher;
