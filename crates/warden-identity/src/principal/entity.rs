//! Principal Entity
//!
//! The authenticated identity: a unique name, a unique email and a salted
//! secret hash that never leaves the credential store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{IdentityError, Result};

pub const MAX_NAME_LEN: usize = 64;
pub const MIN_EMAIL_LEN: usize = 3;
pub const MAX_EMAIL_LEN: usize = 254;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
    pub joined_at: DateTime<Utc>,
    pub activated: bool,
}

impl Principal {
    /// A freshly registered principal, not yet activated
    pub fn new(name: impl Into<String>, email: impl Into<String>, secret_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            secret_hash,
            joined_at: Utc::now(),
            activated: false,
        }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("secret_hash", &"<redacted>")
            .field("joined_at", &self.joined_at)
            .field("activated", &self.activated)
            .finish()
    }
}

/// How a login identifier is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    Email(&'a str),
    Name(&'a str),
}

impl<'a> Identifier<'a> {
    /// Anything containing `@` is an email, everything else a name.
    pub fn classify(raw: &'a str) -> Self {
        if raw.contains('@') {
            Self::Email(raw)
        } else {
            Self::Name(raw)
        }
    }

    pub fn as_str(&self) -> &'a str {
        match self {
            Self::Email(s) | Self::Name(s) => s,
        }
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(IdentityError::invalid_input("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(IdentityError::invalid_input(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(IdentityError::invalid_input("name must not contain whitespace"));
    }
    if name.contains('@') {
        // Would be classified as an email at login.
        return Err(IdentityError::invalid_input("name must not contain '@'"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let len = email.chars().count();
    if !(MIN_EMAIL_LEN..=MAX_EMAIL_LEN).contains(&len) {
        return Err(IdentityError::invalid_input(format!(
            "email must be between {} and {} characters",
            MIN_EMAIL_LEN, MAX_EMAIL_LEN
        )));
    }

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(IdentityError::invalid_input("email must contain exactly one '@'")),
    };

    if local.is_empty() || domain.is_empty() {
        return Err(IdentityError::invalid_input("email must have a local part and a domain"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(IdentityError::invalid_input("email must not contain whitespace"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_classification() {
        assert_eq!(Identifier::classify("alice@example.com"), Identifier::Email("alice@example.com"));
        assert_eq!(Identifier::classify("alice"), Identifier::Name("alice"));
        assert_eq!(Identifier::classify("@"), Identifier::Email("@"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alice").is_ok());
        assert!(validate_name(&"a".repeat(MAX_NAME_LEN)).is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("alice smith").is_err());
        assert!(validate_name("alice@home").is_err());
        assert!(validate_name(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a@b").is_ok());

        assert!(validate_email("ab").is_err());
        assert!(validate_email("alice.example.com").is_err());
        assert!(validate_email("alice@@example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("alice @example.com").is_err());
        assert!(validate_email(&format!("{}@example.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn test_secret_hash_never_serialized_or_debugged() {
        let principal = Principal::new("alice", "alice@example.com", "$argon2id$secret".to_string());

        let json = serde_json::to_value(&principal).unwrap();
        assert!(json.get("secretHash").is_none());
        assert_eq!(json["name"], "alice");
        assert_eq!(json["activated"], false);

        assert!(!format!("{:?}", principal).contains("argon2id"));
    }
}
