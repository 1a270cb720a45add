//! Token Issuer/Validator
//!
//! Stateless signed tokens. RS256 when RSA key material is configured (the
//! public key alone is enough to validate), HS256 with a shared secret
//! otherwise.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{IdentityError, Result};

pub const DEFAULT_ISSUER: &str = "auth-service";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 86400;

/// Signing and verification key material, resolved by the caller.
///
/// RSA material takes precedence over the HMAC secret when both are set.
#[derive(Clone, Default)]
pub struct TokenKeyMaterial {
    /// PKCS#8 or PKCS#1 PEM
    pub rsa_private_pem: Option<String>,
    /// SPKI or PKCS#1 PEM
    pub rsa_public_pem: Option<String>,
    pub hmac_secret: Option<String>,
}

impl TokenKeyMaterial {
    pub fn rsa(private_pem: impl Into<String>, public_pem: impl Into<String>) -> Self {
        Self {
            rsa_private_pem: Some(private_pem.into()),
            rsa_public_pem: Some(public_pem.into()),
            hmac_secret: None,
        }
    }

    pub fn hmac(secret: impl Into<String>) -> Self {
        Self {
            hmac_secret: Some(secret.into()),
            ..Default::default()
        }
    }

    fn secret(&self) -> Option<&str> {
        self.hmac_secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
        }
    }
}

/// JWT payload as it travels
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
    #[serde(default)]
    roles: Vec<String>,
}

/// Verified token contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: Uuid,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub roles: Vec<String>,
}

/// A freshly issued token and the claims it carries
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

pub struct TokenService {
    config: TokenConfig,
    /// None for verify-only instances
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    key_id: Option<String>,
}

impl TokenService {
    /// Issuer and validator. Fails with `Configuration` when no usable signing
    /// key is present or the PEM does not parse.
    pub fn new(config: TokenConfig, keys: &TokenKeyMaterial) -> Result<Self> {
        match (&keys.rsa_private_pem, &keys.rsa_public_pem) {
            (Some(private_pem), Some(public_pem)) => {
                let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| {
                    IdentityError::configuration(format!("Invalid RSA private key: {}", e))
                })?;
                let mut service = Self::rsa_verifier(config, public_pem)?;
                service.encoding_key = Some(encoding_key);
                Ok(service)
            }
            (Some(_), None) => Err(IdentityError::configuration(
                "RSA private key configured without its public key",
            )),
            _ => match keys.secret() {
                Some(secret) => {
                    info!("TokenService initialized with HS256");
                    Ok(Self {
                        config,
                        encoding_key: Some(EncodingKey::from_secret(secret.as_bytes())),
                        decoding_key: DecodingKey::from_secret(secret.as_bytes()),
                        algorithm: Algorithm::HS256,
                        key_id: None,
                    })
                }
                None => Err(IdentityError::configuration("No token signing key configured")),
            },
        }
    }

    /// Validate-only instance for resource servers holding just the public
    /// key (or the shared secret). `issue` fails with `Configuration`.
    pub fn verifier(config: TokenConfig, keys: &TokenKeyMaterial) -> Result<Self> {
        if let Some(public_pem) = &keys.rsa_public_pem {
            return Self::rsa_verifier(config, public_pem);
        }
        match keys.secret() {
            Some(secret) => Ok(Self {
                config,
                encoding_key: None,
                decoding_key: DecodingKey::from_secret(secret.as_bytes()),
                algorithm: Algorithm::HS256,
                key_id: None,
            }),
            None => Err(IdentityError::configuration("No token verification key configured")),
        }
    }

    fn rsa_verifier(config: TokenConfig, public_pem: &str) -> Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| IdentityError::configuration(format!("Invalid RSA public key: {}", e)))?;

        let key_id = Self::generate_key_id(public_pem);
        info!(key_id = %key_id, "TokenService initialized with RS256");

        Ok(Self {
            config,
            encoding_key: None,
            decoding_key,
            algorithm: Algorithm::RS256,
            key_id: Some(key_id),
        })
    }

    /// Key ID from the public key (SHA-256, first 6 bytes, base64url)
    fn generate_key_id(public_key_pem: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(public_key_pem.trim().as_bytes());
        let hash = hasher.finalize();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&hash[..6])
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn can_issue(&self) -> bool {
        self.encoding_key.is_some()
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    pub fn issue(&self, principal_id: Uuid, roles: Vec<String>) -> Result<SignedToken> {
        self.issue_at(principal_id, roles, Utc::now())
    }

    pub fn issue_at(&self, principal_id: Uuid, roles: Vec<String>, now: DateTime<Utc>) -> Result<SignedToken> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| IdentityError::configuration("No token signing key configured"))?;

        if principal_id.is_nil() {
            return Err(IdentityError::invalid_input("principal id must not be nil"));
        }

        let expires_at = now + self.config.ttl;
        let wire = WireClaims {
            sub: principal_id.to_string(),
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            roles,
        };

        let mut header = Header::new(self.algorithm);
        header.kid = self.key_id.clone();

        let token = encode(&header, &wire, encoding_key)
            .map_err(|e| IdentityError::internal(format!("Failed to encode token: {}", e)))?;

        metrics::counter!("identity.tokens.issued_total").increment(1);
        debug!(principal_id = %principal_id, roles = wire.roles.len(), "Token issued");

        Ok(SignedToken {
            token,
            claims: Self::to_claims(wire)?,
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        self.validate_at(token, Utc::now())
    }

    /// Segments first, then signature, then claim checks, then expiry against `now`
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        Self::check_segments(token)?;

        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Expiry is checked below without leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let wire = decode::<WireClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                // Header and payload already parsed; these concern the signature segment
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::Base64(_)
                | ErrorKind::Crypto(_) => IdentityError::InvalidSignature,
                ErrorKind::ExpiredSignature => IdentityError::Expired,
                _ => IdentityError::malformed(e.to_string()),
            })?;

        if now.timestamp() >= wire.exp {
            return Err(IdentityError::Expired);
        }

        Self::to_claims(wire)
    }

    /// Header and payload must parse before the signature is looked at, so
    /// a damaged signature segment is never reported as a malformed token.
    fn check_segments(token: &str) -> Result<()> {
        let segments: Vec<&str> = token.split('.').collect();
        let [_, payload, signature] = segments.as_slice() else {
            return Err(IdentityError::malformed("token must have three segments"));
        };
        if signature.is_empty() {
            return Err(IdentityError::malformed("token has no signature"));
        }

        jsonwebtoken::decode_header(token)
            .map_err(|e| IdentityError::malformed(format!("invalid header: {}", e)))?;

        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| IdentityError::malformed(format!("invalid payload encoding: {}", e)))?;
        serde_json::from_slice::<WireClaims>(&payload)
            .map_err(|e| IdentityError::malformed(format!("invalid claims: {}", e)))?;
        Ok(())
    }

    fn to_claims(wire: WireClaims) -> Result<Claims> {
        let subject = Uuid::parse_str(&wire.sub)
            .map_err(|e| IdentityError::malformed(format!("subject is not a UUID: {}", e)))?;
        let issued_at = DateTime::from_timestamp(wire.iat, 0)
            .ok_or_else(|| IdentityError::malformed("iat out of range"))?;
        let expires_at = DateTime::from_timestamp(wire.exp, 0)
            .ok_or_else(|| IdentityError::malformed("exp out of range"))?;

        Ok(Claims {
            subject,
            issuer: wire.iss,
            issued_at,
            expires_at,
            roles: wire.roles,
        })
    }
}
