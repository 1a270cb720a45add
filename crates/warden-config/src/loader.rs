//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "warden.toml",
    "config.toml",
    "./config/warden.toml",
    "/etc/warden/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("WARDEN_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `WARDEN_*` overrides using the given variable lookup.
///
/// Unparseable numeric values are ignored and the previous value is kept.
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
        var(key).and_then(|v| v.parse().ok())
    }

    // Database
    if let Some(val) = var("WARDEN_DATABASE_URL") {
        config.database.url = val;
    }
    if let Some(n) = parsed(&var, "WARDEN_DATABASE_MAX_CONNECTIONS") {
        config.database.max_connections = n;
    }
    if let Some(ms) = parsed(&var, "WARDEN_DATABASE_ACQUIRE_TIMEOUT_MS") {
        config.database.acquire_timeout_ms = ms;
    }

    // Broker
    if let Some(val) = var("WARDEN_BROKER_TYPE") {
        config.broker.broker_type = val;
    }
    if let Some(val) = var("WARDEN_AMQP_URI") {
        config.broker.amqp_uri = val;
    }
    if let Some(val) = var("WARDEN_AMQP_EXCHANGE") {
        config.broker.exchange = val;
    }
    if let Some(val) = var("WARDEN_AMQP_QUEUE") {
        config.broker.queue = val;
    }

    // Token
    if let Some(val) = var("WARDEN_TOKEN_ISSUER") {
        config.token.issuer = val;
    }
    if let Some(secs) = parsed(&var, "WARDEN_TOKEN_TTL_SECS") {
        config.token.ttl_secs = secs;
    }
    if let Some(val) = var("WARDEN_SIGN_KEY") {
        config.token.secret = val;
    }
    if let Some(val) = var("WARDEN_JWT_PRIVATE_KEY_PATH") {
        config.token.private_key_path = val;
    }
    if let Some(val) = var("WARDEN_JWT_PUBLIC_KEY_PATH") {
        config.token.public_key_path = val;
    }

    // Session
    if let Some(secs) = parsed(&var, "WARDEN_SESSION_TTL_SECS") {
        config.session.ttl_secs = secs;
    }

    // Roles
    if let Some(val) = var("WARDEN_ROLES_URL") {
        config.roles.base_url = val;
    }
    if let Some(ms) = parsed(&var, "WARDEN_ROLES_TIMEOUT_MS") {
        config.roles.timeout_ms = ms;
    }

    // Sync
    if let Some(n) = parsed(&var, "WARDEN_SYNC_POLL_BATCH") {
        config.sync.poll_batch_size = n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            lookup(&[
                ("WARDEN_DATABASE_URL", "sqlite::memory:"),
                ("WARDEN_BROKER_TYPE", "amqp"),
                ("WARDEN_SIGN_KEY", "secret"),
                ("WARDEN_SESSION_TTL_SECS", "120"),
                ("WARDEN_ROLES_URL", "http://localhost:4001"),
            ]),
        );

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.broker.broker_type, "amqp");
        assert_eq!(config.token.secret, "secret");
        assert_eq!(config.session.ttl_secs, 120);
        assert_eq!(config.roles.base_url, "http://localhost:4001");
    }

    #[test]
    fn test_unparseable_numbers_are_ignored() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, lookup(&[("WARDEN_TOKEN_TTL_SECS", "soon")]));
        assert_eq!(config.token.ttl_secs, 86400);
    }

    #[test]
    fn test_explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[token]\nissuer = \"warden-test\"\n\n[roles]\ntimeout_ms = 500\n").unwrap();

        let config = ConfigLoader::with_path(file.path()).load().unwrap();
        assert_eq!(config.token.issuer, "warden-test");
        assert_eq!(config.roles.timeout_ms, 500);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[session]\nttl_secs = 0\n").unwrap();

        let result = ConfigLoader::with_path(file.path()).load();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
