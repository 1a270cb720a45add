//! Session Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::session::entity::Session;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<()>;

    /// The stored session, expired or not
    async fn find(&self, id: &str) -> Result<Option<Session>>;

    /// Returns whether a row was removed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every session with `expires_at <= now`. Cleanup only; validity
    /// never depends on it.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn init_schema(&self) -> Result<()>;
}

pub(crate) const CREATE_SESSIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        principal_id TEXT NOT NULL,
        expires_at BIGINT NOT NULL
    )
"#;

pub(crate) const CREATE_SESSIONS_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)";

pub(crate) fn session_from_row(id: String, principal_id: String, expires_at: i64) -> Result<Session> {
    let principal_id = Uuid::parse_str(&principal_id)
        .map_err(|e| IdentityError::internal(format!("Invalid principal id {}: {}", principal_id, e)))?;
    let expires_at = DateTime::from_timestamp_millis(expires_at)
        .ok_or_else(|| IdentityError::internal("Invalid expires_at timestamp"))?;

    Ok(Session {
        id,
        principal_id,
        expires_at,
    })
}
