//! Account Service
//!
//! Registration and rename workflows. The principal write is committed first;
//! the identity change event is published afterwards. A failed publish is
//! reported in the result and never undoes the write.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password_service::{PasswordService, SecretPolicy};
use crate::error::{IdentityError, Result};
use crate::principal::entity::{validate_email, validate_name};
use crate::principal::{CredentialStore, Principal};
use crate::sync::{IdentityChangeEvent, IdentityChangePublisher};

/// Outcome of a committed account write
#[derive(Debug, Clone)]
pub struct Registration {
    pub principal: Principal,
    /// False when the write is committed but its sync event was not published
    pub sync_published: bool,
}

pub struct AccountService {
    principals: Arc<dyn CredentialStore>,
    passwords: Arc<PasswordService>,
    policy: SecretPolicy,
    publisher: IdentityChangePublisher,
}

impl AccountService {
    pub fn new(
        principals: Arc<dyn CredentialStore>,
        passwords: Arc<PasswordService>,
        publisher: IdentityChangePublisher,
    ) -> Self {
        Self {
            principals,
            passwords,
            policy: SecretPolicy::default(),
            publisher,
        }
    }

    pub fn with_policy(mut self, policy: SecretPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn register(&self, name: &str, email: &str, secret: &str) -> Result<Registration> {
        validate_name(name)?;
        validate_email(email)?;
        self.policy.validate(secret)?;

        let passwords = self.passwords.clone();
        let owned_secret = secret.to_string();
        let secret_hash = tokio::task::spawn_blocking(move || passwords.hash_secret(&owned_secret))
            .await
            .map_err(|e| IdentityError::internal(format!("Secret hashing task failed: {}", e)))??;

        let principal = Principal::new(name, email, secret_hash);
        self.principals.add(&principal).await?;
        info!(principal_id = %principal.id, "Principal registered");

        let event = IdentityChangeEvent::Created {
            id: principal.id,
            name: principal.name.clone(),
            email: principal.email.clone(),
        };
        let sync_published = self.publish(&event, principal.id).await;

        Ok(Registration {
            principal,
            sync_published,
        })
    }

    pub async fn rename(&self, principal_id: Uuid, new_name: &str) -> Result<Registration> {
        validate_name(new_name)?;

        let current = self.principals.get_by_id(principal_id).await?;
        if current.name == new_name {
            return Ok(Registration {
                principal: current,
                sync_published: true,
            });
        }

        // Guarded on the name read above, so `old_value` is always the replaced name
        self.principals
            .update_name(principal_id, &current.name, new_name)
            .await?;
        info!(principal_id = %principal_id, "Principal renamed");

        let event = IdentityChangeEvent::UsernameChanged {
            old_value: current.name.clone(),
            new_value: new_name.to_string(),
        };
        let sync_published = self.publish(&event, principal_id).await;

        Ok(Registration {
            principal: Principal {
                name: new_name.to_string(),
                ..current
            },
            sync_published,
        })
    }

    /// Set by the external activation workflow
    pub async fn set_activated(&self, principal_id: Uuid, activated: bool) -> Result<()> {
        self.principals.set_activated(principal_id, activated).await?;
        info!(principal_id = %principal_id, activated, "Principal activation changed");
        Ok(())
    }

    /// Best effort: the write is already committed
    async fn publish(&self, event: &IdentityChangeEvent, principal_id: Uuid) -> bool {
        match self.publisher.publish(event).await {
            Ok(_) => true,
            Err(e) => {
                metrics::counter!("identity.publish.failures_total").increment(1);
                warn!(
                    principal_id = %principal_id,
                    kind = event.kind(),
                    error = %e,
                    "Identity change not published; projections will miss this change"
                );
                false
            }
        }
    }
}
