//! SQLite Session Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::Result;
use crate::session::entity::Session;
use crate::session::repository::{
    session_from_row, SessionRepository, CREATE_SESSIONS, CREATE_SESSIONS_EXPIRY_INDEX,
};

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> Result<()> {
        sqlx::query("INSERT INTO sessions (id, principal_id, expires_at) VALUES (?, ?, ?)")
            .bind(&session.id)
            .bind(session.principal_id.to_string())
            .bind(session.expires_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT id, principal_id, expires_at FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(session_from_row(
                row.try_get("id")?,
                row.try_get("principal_id")?,
                row.try_get("expires_at")?,
            )?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!(removed, "Removed expired sessions");
        }
        Ok(removed)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_SESSIONS).execute(&self.pool).await?;
        sqlx::query(CREATE_SESSIONS_EXPIRY_INDEX).execute(&self.pool).await?;
        info!("SQLite sessions schema initialized");
        Ok(())
    }
}
