//! Session Entity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-held proof of a completed authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque handle given to the client
    pub id: String,
    pub principal_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle state of a session id at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    Absent,
}

impl Session {
    /// `expires_at` is truncated to whole milliseconds, the precision the
    /// stores keep, so the caller sees exactly the instant that is enforced.
    pub fn new(principal_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = now + ttl;
        let sub_millis = i64::from(expires_at.timestamp_subsec_nanos() % 1_000_000);
        Self {
            id: Uuid::new_v4().to_string(),
            principal_id,
            expires_at: expires_at - Duration::nanoseconds(sub_millis),
        }
    }

    /// Valid strictly before `expires_at`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn state_at(session: Option<&Session>, now: DateTime<Utc>) -> SessionState {
        match session {
            None => SessionState::Absent,
            Some(s) if s.is_active_at(now) => SessionState::Active,
            Some(_) => SessionState::Expired,
        }
    }
}
