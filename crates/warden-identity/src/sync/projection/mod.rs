//! Account projection
//!
//! The local, denormalized copy of identity attributes kept up to date by the
//! sync consumer. Conflict policy is last-write-wins by event time: a rename
//! older than the record's last applied change is skipped. Events without a
//! timestamp are applied as received.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::sync::events::IdentityChangeEvent;

pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use memory::MemoryProjectionStore;
pub use postgres::PostgresProjectionStore;
pub use sqlite::SqliteProjectionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub last_changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The projection changed
    Applied,
    /// Already applied, no matching record, stale, or would collide; state unchanged
    Skipped,
}

/// Projection contents as a value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionState {
    accounts: HashMap<Uuid, AccountRecord>,
}

impl ProjectionState {
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&AccountRecord> {
        self.accounts.get(&id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&AccountRecord> {
        self.accounts.values().find(|a| a.username == username)
    }

    /// `(state, event) -> state`. Applying the same event twice leaves the
    /// state as applying it once.
    pub fn apply(
        mut self,
        event: &IdentityChangeEvent,
        occurred_at: Option<DateTime<Utc>>,
    ) -> (Self, ApplyOutcome) {
        match event {
            IdentityChangeEvent::Created { id, name, email } => {
                if self.accounts.contains_key(id) || self.find_by_username(name).is_some() {
                    return (self, ApplyOutcome::Skipped);
                }
                self.accounts.insert(
                    *id,
                    AccountRecord {
                        id: *id,
                        username: name.clone(),
                        email: email.clone(),
                        last_changed_at: occurred_at,
                    },
                );
                (self, ApplyOutcome::Applied)
            }
            IdentityChangeEvent::UsernameChanged {
                old_value,
                new_value,
            } => {
                let Some((id, last_changed_at)) = self
                    .find_by_username(old_value)
                    .map(|current| (current.id, current.last_changed_at))
                else {
                    return (self, ApplyOutcome::Skipped);
                };
                if is_stale(last_changed_at, occurred_at) || self.find_by_username(new_value).is_some() {
                    return (self, ApplyOutcome::Skipped);
                }

                if let Some(record) = self.accounts.get_mut(&id) {
                    record.username = new_value.clone();
                    record.last_changed_at = occurred_at.or(record.last_changed_at);
                }
                (self, ApplyOutcome::Applied)
            }
        }
    }
}

/// A change stamped strictly earlier than the record's last change loses
fn is_stale(last_changed_at: Option<DateTime<Utc>>, occurred_at: Option<DateTime<Utc>>) -> bool {
    matches!((last_changed_at, occurred_at), (Some(last), Some(at)) if at < last)
}

/// Storage behind the projection. Owned by exactly one sync consumer task;
/// every `apply` is one atomic store operation.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    async fn apply(
        &mut self,
        event: &IdentityChangeEvent,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<ApplyOutcome>;

    async fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountRecord>>;

    async fn count(&self) -> Result<u64>;

    async fn init_schema(&self) -> Result<()>;
}

pub(crate) const CREATE_ACCOUNT_PROJECTION: &str = r#"
    CREATE TABLE IF NOT EXISTS account_projection (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL,
        last_changed_at BIGINT
    )
"#;

pub(crate) fn record_from_row(
    id: String,
    username: String,
    email: String,
    last_changed_at: Option<i64>,
) -> Result<AccountRecord> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| IdentityError::internal(format!("Invalid account id {}: {}", id, e)))?;
    Ok(AccountRecord {
        id,
        username,
        email,
        last_changed_at: last_changed_at.and_then(DateTime::from_timestamp_millis),
    })
}

/// Unique collisions on write mean the event cannot apply; anything else is an error
pub(crate) fn skipped_on_unique_violation(err: sqlx::Error) -> Result<ApplyOutcome> {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => Ok(ApplyOutcome::Skipped),
        _ => Err(IdentityError::Database(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn created(id: Uuid, name: &str) -> IdentityChangeEvent {
        IdentityChangeEvent::Created {
            id,
            name: name.into(),
            email: format!("{}@example.com", name),
        }
    }

    fn renamed(old: &str, new: &str) -> IdentityChangeEvent {
        IdentityChangeEvent::UsernameChanged {
            old_value: old.into(),
            new_value: new.into(),
        }
    }

    #[test]
    fn test_rename_twice_equals_once() {
        let id = Uuid::new_v4();
        let (state, _) = ProjectionState::default().apply(&created(id, "alice"), None);
        let event = renamed("alice", "alice2");

        let (once, first) = state.apply(&event, None);
        let (twice, second) = once.clone().apply(&event, None);

        assert_eq!(first, ApplyOutcome::Applied);
        assert_eq!(second, ApplyOutcome::Skipped);
        assert_eq!(once, twice);
        assert_eq!(twice.find_by_username("alice2").unwrap().id, id);
        assert!(twice.find_by_username("alice").is_none());
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_created_is_idempotent() {
        let id = Uuid::new_v4();
        let (state, _) = ProjectionState::default().apply(&created(id, "alice"), None);
        let (again, outcome) = state.clone().apply(&created(id, "alice"), None);

        assert_eq!(outcome, ApplyOutcome::Skipped);
        assert_eq!(state, again);
    }

    #[test]
    fn test_stale_rename_loses_to_newer_one() {
        let t0 = Utc::now();
        let id = Uuid::new_v4();
        let (state, _) = ProjectionState::default().apply(&created(id, "alice"), Some(t0));

        // alice -> bob at t1, bob -> alice at t2, then alice -> bob (t1) redelivered
        let t1 = t0 + Duration::seconds(1);
        let t2 = t0 + Duration::seconds(2);
        let (state, _) = state.apply(&renamed("alice", "bob"), Some(t1));
        let (state, _) = state.apply(&renamed("bob", "alice"), Some(t2));
        let (state, outcome) = state.apply(&renamed("alice", "bob"), Some(t1));

        assert_eq!(outcome, ApplyOutcome::Skipped);
        let record = state.get(id).unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.last_changed_at, Some(t2));
    }

    #[test]
    fn test_untimestamped_events_apply_as_received() {
        let id = Uuid::new_v4();
        let (state, _) = ProjectionState::default().apply(&created(id, "alice"), Some(Utc::now()));
        let (state, outcome) = state.apply(&renamed("alice", "alice2"), None);

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(state.get(id).unwrap().username, "alice2");
        assert!(state.get(id).unwrap().last_changed_at.is_some());
    }

    #[test]
    fn test_rename_onto_taken_name_is_skipped() {
        let (state, _) = ProjectionState::default().apply(&created(Uuid::new_v4(), "alice"), None);
        let (state, _) = state.apply(&created(Uuid::new_v4(), "bob"), None);
        let (state, outcome) = state.apply(&renamed("alice", "bob"), None);

        assert_eq!(outcome, ApplyOutcome::Skipped);
        assert!(state.find_by_username("alice").is_some());
    }

    #[test]
    fn test_rename_of_unknown_account_is_skipped() {
        let (state, outcome) = ProjectionState::default().apply(&renamed("ghost", "ghost2"), None);
        assert_eq!(outcome, ApplyOutcome::Skipped);
        assert!(state.is_empty());
    }
}
