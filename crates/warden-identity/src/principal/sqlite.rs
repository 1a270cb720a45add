//! SQLite Credential Store
//!
//! Embedded store for single-node deployments and tests.

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::principal::entity::Principal;
use crate::principal::repository::{
    map_write_error, not_found_by, CredentialStore, PrincipalRow, CREATE_PRINCIPALS, ENTITY,
};

const SELECT_PRINCIPAL: &str =
    "SELECT id, name, email, secret_hash, joined_at, activated FROM principals";

pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn parse_row(row: &SqliteRow) -> Result<Principal> {
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
        let query = format!("{} WHERE {} = ?", SELECT_PRINCIPAL, field);
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
impl CredentialStore for SqliteCredentialStore {
    async fn add(&self, principal: &Principal) -> Result<()> {
        sqlx::query(
            "INSERT INTO principals (id, name, email, secret_hash, joined_at, activated) \
             VALUES (?, ?, ?, ?, ?, ?)",
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
        let result = sqlx::query("UPDATE principals SET name = ? WHERE id = ? AND name = ?")
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
        let result = sqlx::query("UPDATE principals SET activated = ? WHERE id = ?")
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
        info!("SQLite principals schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteCredentialStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteCredentialStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn alice() -> Principal {
        Principal::new("alice", "alice@example.com", "hash".to_string())
    }

    #[tokio::test]
    async fn test_add_then_lookup_by_every_key() {
        let store = store().await;
        let principal = alice();
        store.add(&principal).await.unwrap();

        assert_eq!(store.get_by_name("alice").await.unwrap().id, principal.id);
        assert_eq!(store.get_by_email("alice@example.com").await.unwrap().id, principal.id);

        let by_id = store.get_by_id(principal.id).await.unwrap();
        assert_eq!(by_id.secret_hash, "hash");
        assert_eq!(by_id.joined_at.timestamp_millis(), principal.joined_at.timestamp_millis());
        assert!(!by_id.activated);
    }

    #[tokio::test]
    async fn test_lookups_are_case_sensitive() {
        let store = store().await;
        store.add(&alice()).await.unwrap();

        assert!(matches!(
            store.get_by_name("Alice").await,
            Err(IdentityError::NotFound { .. })
        ));
        assert!(matches!(
            store.get_by_email("ALICE@example.com").await,
            Err(IdentityError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name_and_email_conflict() {
        let store = store().await;
        store.add(&alice()).await.unwrap();

        let same_name = Principal::new("alice", "other@example.com", "hash".to_string());
        match store.add(&same_name).await {
            Err(IdentityError::Conflict { field, .. }) => assert_eq!(field, "name"),
            other => panic!("expected name conflict, got {:?}", other),
        }

        let same_email = Principal::new("bob", "alice@example.com", "hash".to_string());
        match store.add(&same_email).await {
            Err(IdentityError::Conflict { field, .. }) => assert_eq!(field, "email"),
            other => panic!("expected email conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_name_and_activation() {
        let store = store().await;
        let principal = alice();
        store.add(&principal).await.unwrap();
        store.add(&Principal::new("bob", "bob@example.com", "hash".to_string())).await.unwrap();

        store.update_name(principal.id, "alice", "alice2").await.unwrap();
        assert_eq!(store.get_by_id(principal.id).await.unwrap().name, "alice2");
        assert!(store.get_by_name("alice").await.is_err());

        assert!(matches!(
            store.update_name(principal.id, "alice2", "bob").await,
            Err(IdentityError::Conflict { .. })
        ));

        // Renamed meanwhile: the expected current name no longer matches
        assert!(matches!(
            store.update_name(principal.id, "alice", "alice3").await,
            Err(IdentityError::Conflict { ref field, .. }) if field == "name"
        ));
        assert_eq!(store.get_by_id(principal.id).await.unwrap().name, "alice2");
        assert!(matches!(
            store.update_name(Uuid::new_v4(), "alice", "alice3").await,
            Err(IdentityError::NotFound { .. })
        ));

        store.set_activated(principal.id, true).await.unwrap();
        assert!(store.get_by_id(principal.id).await.unwrap().activated);

        assert!(matches!(
            store.set_activated(Uuid::new_v4(), true).await,
            Err(IdentityError::NotFound { .. })
        ));
    }
}
