//! PostgreSQL Credential Store

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::principal::entity::Principal;
use crate::principal::repository::{
    map_write_error, not_found_by, CredentialStore, PrincipalRow, CREATE_PRINCIPALS, ENTITY,
};

const SELECT_PRINCIPAL: &str =
    "SELECT id, name, email, secret_hash, joined_at, activated FROM principals";

pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn parse_row(row: &PgRow) -> Result<Principal> {
        Principal::try_from(PrincipalRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            secret_hash: row.try_get("secret_hash")?,
            joined_at: row.try_get("joined_at")?,
            activated: row.try_get("activated")?,
        })
    }

    async fn find_one(&self, field: &str, value: &str) -> Result<Principal> {
        let query = format!("{} WHERE {} = $1", SELECT_PRINCIPAL, field);
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::parse_row(&row),
            None => Err(not_found_by(field, value)),
        }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn add(&self, principal: &Principal) -> Result<()> {
        sqlx::query(
            "INSERT INTO principals (id, name, email, secret_hash, joined_at, activated) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(principal.id.to_string())
        .bind(&principal.name)
        .bind(&principal.email)
        .bind(&principal.secret_hash)
        .bind(principal.joined_at.timestamp_millis())
        .bind(principal.activated)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &principal.name, &principal.email))?;

        debug!(principal_id = %principal.id, "Inserted principal");
        Ok(())
    }

    async fn get_by_name(&self, name: &str) -> Result<Principal> {
        self.find_one("name", name).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Principal> {
        self.find_one("id", &id.to_string()).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Principal> {
        self.find_one("email", email).await
    }

    async fn update_name(&self, id: Uuid, current_name: &str, new_name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE principals SET name = $1 WHERE id = $2 AND name = $3")
            .bind(new_name)
            .bind(id.to_string())
            .bind(current_name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, new_name, ""))?;

        if result.rows_affected() == 0 {
            // NotFound if absent, otherwise someone renamed it first
            self.get_by_id(id).await?;
            return Err(IdentityError::conflict(ENTITY, "name", current_name));
        }
        Ok(())
    }

    async fn set_activated(&self, id: Uuid, activated: bool) -> Result<()> {
        let result = sqlx::query("UPDATE principals SET activated = $1 WHERE id = $2")
            .bind(activated)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::not_found(ENTITY, id.to_string()));
        }
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_PRINCIPALS).execute(&self.pool).await?;
        info!("PostgreSQL principals schema initialized");
        Ok(())
    }
}
