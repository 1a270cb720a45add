//! SQLite projection store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::sync::events::IdentityChangeEvent;
use crate::sync::projection::{
    record_from_row, skipped_on_unique_violation, AccountRecord, ApplyOutcome, ProjectionStore,
    CREATE_ACCOUNT_PROJECTION,
};

const SELECT_ACCOUNT: &str = "SELECT id, username, email, last_changed_at FROM account_projection";

pub struct SqliteProjectionStore {
    pool: SqlitePool,
}

impl SqliteProjectionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &SqliteRow) -> Result<AccountRecord> {
        record_from_row(
            row.try_get("id")?,
            row.try_get("username")?,
            row.try_get("email")?,
            row.try_get("last_changed_at")?,
        )
    }
}

#[async_trait]
impl ProjectionStore for SqliteProjectionStore {
    async fn apply(
        &mut self,
        event: &IdentityChangeEvent,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<ApplyOutcome> {
        let at = occurred_at.map(|t| t.timestamp_millis());

        let result = match event {
            IdentityChangeEvent::Created { id, name, email } => {
                sqlx::query(
                    "INSERT INTO account_projection (id, username, email, last_changed_at) \
                     VALUES (?, ?, ?, ?) ON CONFLICT DO NOTHING",
                )
                .bind(id.to_string())
                .bind(name)
                .bind(email)
                .bind(at)
                .execute(&self.pool)
                .await
            }
            IdentityChangeEvent::UsernameChanged {
                old_value,
                new_value,
            } => {
                if old_value == new_value {
                    return Ok(ApplyOutcome::Skipped);
                }
                sqlx::query(
                    "UPDATE account_projection \
                     SET username = ?, last_changed_at = COALESCE(?, last_changed_at) \
                     WHERE username = ? \
                       AND (? IS NULL OR last_changed_at IS NULL OR last_changed_at <= ?)",
                )
                .bind(new_value)
                .bind(at)
                .bind(old_value)
                .bind(at)
                .bind(at)
                .execute(&self.pool)
                .await
            }
        };

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(ApplyOutcome::Applied),
            Ok(_) => Ok(ApplyOutcome::Skipped),
            Err(e) => skipped_on_unique_violation(e),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>> {
        let query = format!("{} WHERE username = ?", SELECT_ACCOUNT);
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountRecord>> {
        let query = format!("{} WHERE id = ?", SELECT_ACCOUNT);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM account_projection")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_ACCOUNT_PROJECTION).execute(&self.pool).await?;
        info!("SQLite account projection schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteProjectionStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteProjectionStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

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

    #[tokio::test]
    async fn test_duplicate_rename_is_a_no_op() {
        let mut store = store().await;
        let id = Uuid::new_v4();
        store.apply(&created(id, "alice"), None).await.unwrap();

        let event = renamed("alice", "alice2");
        assert_eq!(store.apply(&event, None).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(store.apply(&event, None).await.unwrap(), ApplyOutcome::Skipped);

        assert_eq!(store.find_by_username("alice2").await.unwrap().unwrap().id, id);
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_created_twice_keeps_one_row() {
        let mut store = store().await;
        let id = Uuid::new_v4();

        assert_eq!(store.apply(&created(id, "alice"), None).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(store.apply(&created(id, "alice"), None).await.unwrap(), ApplyOutcome::Skipped);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let mut store = store().await;
        let id = Uuid::new_v4();
        let t0 = Utc::now();
        store.apply(&created(id, "alice"), Some(t0)).await.unwrap();

        let t1 = t0 + Duration::seconds(1);
        let t2 = t0 + Duration::seconds(2);
        store.apply(&renamed("alice", "bob"), Some(t1)).await.unwrap();
        store.apply(&renamed("bob", "alice"), Some(t2)).await.unwrap();

        assert_eq!(
            store.apply(&renamed("alice", "bob"), Some(t1)).await.unwrap(),
            ApplyOutcome::Skipped
        );
        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(
            record.last_changed_at.map(|t| t.timestamp_millis()),
            Some(t2.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_rename_onto_taken_name_is_skipped() {
        let mut store = store().await;
        store.apply(&created(Uuid::new_v4(), "alice"), None).await.unwrap();
        store.apply(&created(Uuid::new_v4(), "bob"), None).await.unwrap();

        assert_eq!(
            store.apply(&renamed("alice", "bob"), None).await.unwrap(),
            ApplyOutcome::Skipped
        );
        assert!(store.find_by_username("alice").await.unwrap().is_some());
    }
}
