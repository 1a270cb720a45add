//! PostgreSQL projection store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::sync::events::IdentityChangeEvent;
use crate::sync::projection::{
    record_from_row, skipped_on_unique_violation, AccountRecord, ApplyOutcome, ProjectionStore,
    CREATE_ACCOUNT_PROJECTION,
};

const SELECT_ACCOUNT: &str = "SELECT id, username, email, last_changed_at FROM account_projection";

pub struct PostgresProjectionStore {
    pool: PgPool,
}

impl PostgresProjectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<AccountRecord> {
        record_from_row(
            row.try_get("id")?,
            row.try_get("username")?,
            row.try_get("email")?,
            row.try_get("last_changed_at")?,
        )
    }
}

#[async_trait]
impl ProjectionStore for PostgresProjectionStore {
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
                     VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
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
                     SET username = $1, last_changed_at = COALESCE($2, last_changed_at) \
                     WHERE username = $3 \
                       AND ($2::BIGINT IS NULL OR last_changed_at IS NULL OR last_changed_at <= $2)",
                )
                .bind(new_value)
                .bind(at)
                .bind(old_value)
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
        let query = format!("{} WHERE username = $1", SELECT_ACCOUNT);
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountRecord>> {
        let query = format!("{} WHERE id = $1", SELECT_ACCOUNT);
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
        info!("PostgreSQL account projection schema initialized");
        Ok(())
    }
}
