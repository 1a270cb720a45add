//! Credential Verifier
//!
//! Salted Argon2id hashing of principal secrets.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::debug;

use crate::error::{IdentityError, Result};

/// Secret acceptance policy, checked by the registration workflow before hashing
#[derive(Debug, Clone)]
pub struct SecretPolicy {
    /// Minimum length in characters
    pub min_length: usize,
    pub allow_whitespace: bool,
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            allow_whitespace: false,
        }
    }
}

impl SecretPolicy {
    pub fn validate(&self, secret: &str) -> Result<()> {
        if secret.chars().count() < self.min_length {
            return Err(IdentityError::invalid_credential(format!(
                "secret must be at least {} characters",
                self.min_length
            )));
        }
        if !self.allow_whitespace && secret.chars().any(char::is_whitespace) {
            return Err(IdentityError::invalid_credential(
                "secret must not contain whitespace",
            ));
        }
        Ok(())
    }
}

/// Argon2id configuration
#[derive(Debug, Clone)]
pub struct Argon2Config {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations) (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
    /// Output hash length in bytes (default: 32)
    pub output_len: usize,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
            output_len: 32,
        }
    }
}

impl Argon2Config {
    /// Low memory config for testing (faster but less secure)
    pub fn testing() -> Self {
        Self {
            memory_cost: 4096, // 4 MiB
            time_cost: 1,
            parallelism: 1,
            output_len: 32,
        }
    }

    fn to_params(&self) -> Result<Params> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(self.output_len),
        )
        .map_err(|e| IdentityError::configuration(format!("Invalid Argon2 params: {}", e)))
    }
}

/// Hashes and verifies secrets
pub struct PasswordService {
    argon2: Argon2<'static>,
    /// Hash of a throwaway secret, verified against when the principal is unknown
    /// so that lookups for missing and existing identifiers cost the same.
    decoy_hash: String,
}

impl PasswordService {
    pub fn new(config: Argon2Config) -> Result<Self> {
        let params = config.to_params()?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut service = Self {
            argon2,
            decoy_hash: String::new(),
        };
        service.decoy_hash = service.hash_secret(&uuid::Uuid::new_v4().to_string())?;
        Ok(service)
    }

    /// Hash a secret using Argon2id with a fresh salt
    pub fn hash_secret(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| IdentityError::internal(format!("Failed to hash secret: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Verify a secret against a stored hash
    pub fn verify_secret(&self, secret: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| IdentityError::internal(format!("Invalid secret hash format: {}", e)))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => {
                debug!("Secret verification failed");
                Ok(false)
            }
            Err(e) => Err(IdentityError::internal(format!(
                "Secret verification error: {}",
                e
            ))),
        }
    }

    /// Burn the same work as a real verification. Always false.
    pub fn verify_decoy(&self, secret: &str) -> bool {
        let _ = self.verify_secret(secret, &self.decoy_hash);
        false
    }
}
