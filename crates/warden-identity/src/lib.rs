//! Warden Identity
//!
//! - Credential store and verifier (Argon2id)
//! - Sessions: server-held, revocable, lazily expired
//! - Signed tokens (RS256 / HS256) validated without a store lookup,
//!   with best-effort role augmentation
//! - Identity change events: publisher, account projection and the
//!   sync consumer that keeps it up to date
//!
//! ## Module Organization
//!
//! - `principal` - principal entity and credential stores
//! - `session` - session entity, stores and the session manager
//! - `token` - token issuer/validator and role lookup
//! - `auth` - secret hashing and the authentication service
//! - `account` - registration and rename workflows
//! - `sync` - identity change publisher, projection and consumer

pub mod account;
pub mod auth;
pub mod error;
pub mod principal;
pub mod session;
pub mod sync;
pub mod token;

pub use error::{IdentityError, Result};

pub use account::{AccountService, Registration};
pub use auth::{Argon2Config, AuthService, PasswordService, SecretPolicy};
pub use principal::{CredentialStore, Identifier, Principal};
pub use session::{Session, SessionManager, SessionRepository};
pub use sync::{
    AccountRecord, IdentityChangeEvent, IdentityChangePublisher, IdentitySyncConsumer,
    ProjectionStore, SyncConsumerConfig, SyncHandle,
};
pub use token::{Claims, RoleLookup, SignedToken, TokenConfig, TokenKeyMaterial, TokenService};
