//! Authentication
//!
//! - `password_service` - secret hashing and the secret acceptance policy
//! - `auth_service` - authenticate, session-to-token exchange, validation

pub mod auth_service;
pub mod password_service;

pub use auth_service::AuthService;
pub use password_service::{Argon2Config, PasswordService, SecretPolicy};
