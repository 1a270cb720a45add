//! Credential Store
//!
//! Durable principal records. Lookups are exact, case-sensitive matches and
//! always hit the store, so a principal is visible to the next lookup as soon
//! as `add` returns.

use async_trait::async_trait;
use chrono::DateTime;
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::principal::entity::Principal;

pub(crate) const ENTITY: &str = "Principal";

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a principal. `Conflict` when the name or email is taken.
    async fn add(&self, principal: &Principal) -> Result<()>;

    async fn get_by_name(&self, name: &str) -> Result<Principal>;

    async fn get_by_id(&self, id: Uuid) -> Result<Principal>;

    async fn get_by_email(&self, email: &str) -> Result<Principal>;

    /// Rename a principal whose name is still `current_name`. `Conflict` when
    /// the new name is taken or the principal was renamed meanwhile.
    async fn update_name(&self, id: Uuid, current_name: &str, new_name: &str) -> Result<()>;

    async fn set_activated(&self, id: Uuid, activated: bool) -> Result<()>;

    /// Create the `principals` table if it does not exist
    async fn init_schema(&self) -> Result<()>;
}

pub(crate) const CREATE_PRINCIPALS: &str = r#"
    CREATE TABLE IF NOT EXISTS principals (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        secret_hash TEXT NOT NULL,
        joined_at BIGINT NOT NULL,
        activated BOOLEAN NOT NULL DEFAULT FALSE
    )
"#;

/// Row columns as stored: text ids and millisecond timestamps
pub(crate) struct PrincipalRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub secret_hash: String,
    pub joined_at: i64,
    pub activated: bool,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = IdentityError;

    fn try_from(row: PrincipalRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| IdentityError::internal(format!("Invalid principal id {}: {}", row.id, e)))?;
        let joined_at = DateTime::from_timestamp_millis(row.joined_at)
            .ok_or_else(|| IdentityError::internal("Invalid joined_at timestamp"))?;

        Ok(Principal {
            id,
            name: row.name,
            email: row.email,
            secret_hash: row.secret_hash,
            joined_at,
            activated: row.activated,
        })
    }
}

/// Map a unique-constraint violation to `Conflict` on the offending field.
///
/// Postgres names the constraint (`principals_email_key`), SQLite names the
/// column in the message (`UNIQUE constraint failed: principals.email`).
pub(crate) fn map_write_error(err: sqlx::Error, name: &str, email: &str) -> IdentityError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let detail = db_err
                .constraint()
                .map(str::to_string)
                .unwrap_or_else(|| db_err.message().to_string());
            return if detail.contains("email") {
                IdentityError::conflict(ENTITY, "email", email)
            } else {
                IdentityError::conflict(ENTITY, "name", name)
            };
        }
    }
    IdentityError::Database(err)
}

pub(crate) fn not_found_by(field: &str, value: &str) -> IdentityError {
    IdentityError::not_found(ENTITY, format!("{}={}", field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion() {
        let id = Uuid::new_v4();
        let principal = Principal::try_from(PrincipalRow {
            id: id.to_string(),
            name: "alice".into(),
            email: "alice@example.com".into(),
            secret_hash: "hash".into(),
            joined_at: 1_700_000_000_000,
            activated: true,
        })
        .unwrap();

        assert_eq!(principal.id, id);
        assert_eq!(principal.joined_at.timestamp_millis(), 1_700_000_000_000);
        assert!(principal.activated);
    }

    #[test]
    fn test_row_with_bad_id_is_internal() {
        let result = Principal::try_from(PrincipalRow {
            id: "not-a-uuid".into(),
            name: "alice".into(),
            email: "alice@example.com".into(),
            secret_hash: "hash".into(),
            joined_at: 0,
            activated: false,
        });
        assert!(matches!(result, Err(IdentityError::Internal { .. })));
    }

    #[test]
    fn test_non_unique_errors_stay_database_errors() {
        let err = map_write_error(sqlx::Error::PoolTimedOut, "alice", "alice@example.com");
        assert!(matches!(err, IdentityError::Database(_)));
    }
}
