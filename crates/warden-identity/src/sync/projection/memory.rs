//! In-memory projection store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::sync::events::IdentityChangeEvent;
use crate::sync::projection::{AccountRecord, ApplyOutcome, ProjectionState, ProjectionStore};

/// Holds a [`ProjectionState`] value and replaces it on every event
#[derive(Debug, Default)]
pub struct MemoryProjectionStore {
    state: ProjectionState,
}

impl MemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ProjectionState {
        &self.state
    }
}

#[async_trait]
impl ProjectionStore for MemoryProjectionStore {
    async fn apply(
        &mut self,
        event: &IdentityChangeEvent,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<ApplyOutcome> {
        let (next, outcome) = std::mem::take(&mut self.state).apply(event, occurred_at);
        self.state = next;
        Ok(outcome)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>> {
        Ok(self.state.find_by_username(username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountRecord>> {
        Ok(self.state.get(id).cloned())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.len() as u64)
    }

    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }
}
