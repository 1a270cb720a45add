//! Shared wiring for integration tests: SQLite in memory, embedded broker,
//! fixture RSA keys and the low-cost Argon2 profile.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use warden_identity::principal::SqliteCredentialStore;
use warden_identity::session::SqliteSessionRepository;
use warden_identity::token::NoRoleLookup;
use warden_identity::{
    AccountService, Argon2Config, AuthService, CredentialStore, IdentityChangePublisher,
    PasswordService, RoleLookup, SessionManager, SessionRepository, TokenConfig, TokenKeyMaterial,
    TokenService,
};
use warden_queue::{MemoryBroker, MemoryQueue};

pub const RSA_PRIVATE: &str = include_str!("../fixtures/rsa_private.pem");
pub const RSA_PUBLIC: &str = include_str!("../fixtures/rsa_public.pem");

pub struct Harness {
    pub pool: SqlitePool,
    pub broker: MemoryBroker,
    pub sync_queue: Arc<MemoryQueue>,
    pub principals: Arc<SqliteCredentialStore>,
    pub sessions: Arc<SessionManager>,
    pub tokens: Arc<TokenService>,
    pub auth: AuthService,
    pub accounts: AccountService,
}

pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

pub fn rsa_keys() -> TokenKeyMaterial {
    TokenKeyMaterial::rsa(RSA_PRIVATE, RSA_PUBLIC)
}

pub async fn harness() -> Harness {
    harness_with_roles(Arc::new(NoRoleLookup)).await
}

pub async fn harness_with_roles(roles: Arc<dyn RoleLookup>) -> Harness {
    let pool = memory_pool().await;

    let principals = Arc::new(SqliteCredentialStore::new(pool.clone()));
    principals.init_schema().await.unwrap();
    let session_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
    session_repo.init_schema().await.unwrap();

    let passwords = Arc::new(PasswordService::new(Argon2Config::testing()).unwrap());

    let broker = MemoryBroker::new("identity");
    let sync_queue = broker.bind("identity_sync", &["identity.#"]);

    let sessions = Arc::new(SessionManager::new(
        principals.clone(),
        session_repo,
        passwords.clone(),
    ));
    let tokens = Arc::new(TokenService::new(TokenConfig::default(), &rsa_keys()).unwrap());
    let auth = AuthService::new(sessions.clone(), tokens.clone(), roles);
    let accounts = AccountService::new(
        principals.clone(),
        passwords,
        IdentityChangePublisher::new(Arc::new(broker.clone())),
    );

    Harness {
        pool,
        broker,
        sync_queue,
        principals,
        sessions,
        tokens,
        auth,
        accounts,
    }
}
