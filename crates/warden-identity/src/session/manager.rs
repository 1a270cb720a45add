//! Session Manager
//!
//! Issues, looks up, lazily expires and revokes sessions.
//!
//! ```text
//!   authenticate ──► Active ──(now >= expires_at)──► Expired
//!                      │                               │
//!                      └──────────── revoke ───────────┴──► Absent
//! ```
//!
//! Every successful authentication mints a new session; concurrent sessions
//! for one principal are normal. Expiry is checked on read and never extended.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::password_service::PasswordService;
use crate::error::{IdentityError, Result};
use crate::principal::{CredentialStore, Identifier, Principal};
use crate::session::entity::{Session, SessionState};
use crate::session::repository::SessionRepository;

pub const DEFAULT_SESSION_TTL_SECS: i64 = 86400;

pub struct SessionManager {
    principals: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionRepository>,
    passwords: Arc<PasswordService>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(
        principals: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionRepository>,
        passwords: Arc<PasswordService>,
    ) -> Self {
        Self {
            principals,
            sessions,
            passwords,
            ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Authenticate by name or email and open a new session.
    ///
    /// Unknown identifiers and wrong secrets both fail with `Unauthenticated`.
    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<Session> {
        if identifier.is_empty() || secret.is_empty() {
            return Err(IdentityError::invalid_input("identifier and secret are required"));
        }

        let identifier = Identifier::classify(identifier);
        let lookup = match identifier {
            Identifier::Email(email) => self.principals.get_by_email(email).await,
            Identifier::Name(name) => self.principals.get_by_name(name).await,
        };

        let principal = match lookup {
            Ok(principal) => Some(principal),
            Err(IdentityError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let verified = self.check_secret(principal.as_ref(), secret).await?;
        let principal = match (principal, verified) {
            (Some(principal), true) => principal,
            _ => {
                metrics::counter!("identity.auth.attempts_total", "outcome" => "rejected")
                    .increment(1);
                debug!("Authentication rejected");
                return Err(IdentityError::Unauthenticated);
            }
        };

        let session = Session::new(principal.id, Utc::now(), self.ttl);
        self.sessions.create(&session).await?;

        metrics::counter!("identity.auth.attempts_total", "outcome" => "success").increment(1);
        info!(principal_id = %principal.id, expires_at = %session.expires_at, "Session created");
        Ok(session)
    }

    /// Argon2 is CPU bound; keep it off the async workers.
    async fn check_secret(&self, principal: Option<&Principal>, secret: &str) -> Result<bool> {
        let passwords = self.passwords.clone();
        let secret = secret.to_string();
        let hash = principal.map(|p| p.secret_hash.clone());

        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => passwords.verify_secret(&secret, &hash),
            None => Ok(passwords.verify_decoy(&secret)),
        })
        .await
        .map_err(|e| IdentityError::internal(format!("Secret verification task failed: {}", e)))?
    }

    /// The principal behind an active session
    pub async fn verify(&self, session_id: &str) -> Result<Uuid> {
        self.verify_at(session_id, Utc::now()).await
    }

    pub async fn verify_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<Uuid> {
        let session = self.sessions.find(session_id).await?;

        match Session::state_at(session.as_ref(), now) {
            SessionState::Active => session
                .map(|s| s.principal_id)
                .ok_or(IdentityError::InvalidSession),
            SessionState::Expired => {
                debug!("Session expired");
                Err(IdentityError::InvalidSession)
            }
            SessionState::Absent => Err(IdentityError::InvalidSession),
        }
    }

    /// Idempotent: revoking an absent session is not an error
    pub async fn revoke(&self, session_id: &str) -> Result<()> {
        if self.sessions.delete(session_id).await? {
            info!("Session revoked");
        }
        Ok(())
    }

    /// Optional cleanup of expired rows
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self.sessions.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }
}
