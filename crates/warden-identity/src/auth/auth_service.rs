//! Authentication Service
//!
//! Entry point for the three caller-facing operations: authenticate into a
//! session, exchange a session for a signed token, validate a token.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{IdentityError, Result};
use crate::session::{Session, SessionManager};
use crate::token::{Claims, RoleLookup, SignedToken, TokenService};

pub struct AuthService {
    sessions: Arc<SessionManager>,
    tokens: Arc<TokenService>,
    roles: Arc<dyn RoleLookup>,
}

impl AuthService {
    pub fn new(
        sessions: Arc<SessionManager>,
        tokens: Arc<TokenService>,
        roles: Arc<dyn RoleLookup>,
    ) -> Self {
        Self {
            sessions,
            tokens,
            roles,
        }
    }

    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<Session> {
        self.sessions.authenticate(identifier, secret).await
    }

    /// Issue a token for the principal behind an active session.
    ///
    /// Revoking the session afterwards does not invalidate the token.
    pub async fn exchange(&self, session_id: &str) -> Result<SignedToken> {
        if !self.tokens.can_issue() {
            return Err(IdentityError::configuration("No token signing key configured"));
        }

        let principal_id = self.sessions.verify(session_id).await?;

        let roles = match self.roles.roles_for(principal_id).await {
            Some(roles) => roles,
            None => {
                metrics::counter!("identity.roles.lookup_degraded_total").increment(1);
                warn!(principal_id = %principal_id, "Issuing token without roles");
                Vec::new()
            }
        };

        let token = self.tokens.issue(principal_id, roles)?;
        info!(principal_id = %principal_id, expires_at = %token.claims.expires_at, "Session exchanged for token");
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        self.tokens.validate(token)
    }

    pub async fn logout(&self, session_id: &str) -> Result<()> {
        self.sessions.revoke(session_id).await
    }
}
