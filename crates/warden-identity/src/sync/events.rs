//! Identity change events
//!
//! Flat, versionless JSON payloads, one routing key per change kind:
//!
//! | Routing key                 | Payload                        |
//! |-----------------------------|--------------------------------|
//! | `identity.created`          | `{id, name, email}`            |
//! | `identity.username_changed` | `{oldValue, newValue}`         |
//!
//! Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IdentityError, Result};

pub const CREATED_ROUTING_KEY: &str = "identity.created";
pub const USERNAME_CHANGED_ROUTING_KEY: &str = "identity.username_changed";

/// Every routing key this service publishes
pub const ALL_ROUTING_KEYS: &[&str] = &[CREATED_ROUTING_KEY, USERNAME_CHANGED_ROUTING_KEY];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChangeEvent {
    Created {
        id: Uuid,
        name: String,
        email: String,
    },
    UsernameChanged {
        old_value: String,
        new_value: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct CreatedPayload {
    id: Uuid,
    name: String,
    email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsernameChangedPayload {
    #[serde(alias = "oldUsername")]
    old_value: String,
    #[serde(alias = "newUsername")]
    new_value: String,
}

impl IdentityChangeEvent {
    pub fn routing_key(&self) -> &'static str {
        match self {
            Self::Created { .. } => CREATED_ROUTING_KEY,
            Self::UsernameChanged { .. } => USERNAME_CHANGED_ROUTING_KEY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::UsernameChanged { .. } => "username_changed",
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Created { id, name, email } => serde_json::json!({
                "id": id,
                "name": name,
                "email": email,
            }),
            Self::UsernameChanged {
                old_value,
                new_value,
            } => serde_json::json!({
                "oldValue": old_value,
                "newValue": new_value,
            }),
        }
    }

    /// Decode a delivered payload. Fails with `InvalidInput` for unknown
    /// routing keys, payloads of the wrong shape and empty names.
    pub fn decode(routing_key: &str, payload: &serde_json::Value) -> Result<Self> {
        match routing_key {
            CREATED_ROUTING_KEY => {
                let p: CreatedPayload = serde_json::from_value(payload.clone())
                    .map_err(|e| IdentityError::invalid_input(format!("bad created payload: {}", e)))?;
                if p.name.is_empty() {
                    return Err(IdentityError::invalid_input("created event without a name"));
                }
                Ok(Self::Created {
                    id: p.id,
                    name: p.name,
                    email: p.email,
                })
            }
            USERNAME_CHANGED_ROUTING_KEY => {
                let p: UsernameChangedPayload = serde_json::from_value(payload.clone()).map_err(|e| {
                    IdentityError::invalid_input(format!("bad username_changed payload: {}", e))
                })?;
                if p.old_value.is_empty() || p.new_value.is_empty() {
                    return Err(IdentityError::invalid_input("username_changed event with an empty name"));
                }
                Ok(Self::UsernameChanged {
                    old_value: p.old_value,
                    new_value: p.new_value,
                })
            }
            other => Err(IdentityError::invalid_input(format!(
                "unknown routing key '{}'",
                other
            ))),
        }
    }
}
