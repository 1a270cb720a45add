//! Identity Error Types

use thiserror::Error;
use warden_queue::QueueError;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid credential: {message}")]
    InvalidCredential { message: String },

    /// Unknown identifier and wrong secret both surface as this variant
    #[error("Authentication failed")]
    Unauthenticated,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Token signature does not verify")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Malformed token: {message}")]
    MalformedToken { message: String },

    #[error("Duplicate {entity_type} with {field}={value}")]
    Conflict {
        entity_type: String,
        field: String,
        value: String,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] QueueError),

    #[error("Lookup error: {message}")]
    Lookup { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl IdentityError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    pub fn conflict(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Transient I/O failures against the store, the broker or the role
    /// service. Callers may retry these with backoff; nothing in this crate
    /// retries internally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Broker(_) | Self::Lookup { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
