//! Role lookup
//!
//! Best-effort side call to the role service made before a token is issued.
//! A lookup that cannot answer returns `None`; the caller decides how to
//! degrade.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{IdentityError, Result};

pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 2000;

#[async_trait]
pub trait RoleLookup: Send + Sync {
    /// Role names for the principal, or `None` when the role service could
    /// not be reached or gave an unusable answer.
    async fn roles_for(&self, principal_id: Uuid) -> Option<Vec<String>>;
}

/// Used when no role service is configured: every principal has no roles
pub struct NoRoleLookup;

#[async_trait]
impl RoleLookup for NoRoleLookup {
    async fn roles_for(&self, _principal_id: Uuid) -> Option<Vec<String>> {
        Some(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    name: String,
}

/// `GET {base_url}/users/{id}/roles` returning `[{"id": .., "name": ..}]`
pub struct HttpRoleLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRoleLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| IdentityError::configuration(format!("Failed to build role lookup client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, principal_id: Uuid) -> String {
        format!("{}/users/{}/roles", self.base_url, principal_id)
    }

    async fn fetch(&self, principal_id: Uuid) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url_for(principal_id))
            .send()
            .await
            .map_err(|e| IdentityError::Lookup {
                message: format!("role service unreachable: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(IdentityError::Lookup {
                message: format!("role service returned {}", response.status()),
            });
        }

        let entries: Vec<RoleEntry> = response.json().await.map_err(|e| IdentityError::Lookup {
            message: format!("unreadable role response: {}", e),
        })?;

        Ok(entries.into_iter().map(|r| r.name).collect())
    }
}

#[async_trait]
impl RoleLookup for HttpRoleLookup {
    async fn roles_for(&self, principal_id: Uuid) -> Option<Vec<String>> {
        match self.fetch(principal_id).await {
            Ok(roles) => {
                debug!(principal_id = %principal_id, count = roles.len(), "Fetched roles");
                Some(roles)
            }
            Err(e) => {
                warn!(principal_id = %principal_id, error = %e, "Role lookup failed");
                None
            }
        }
    }
}
