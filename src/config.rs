/*
 * Responsibility
 * - Load PoP signer settings from the environment (.env supported)
 * - Validate them (a configured key file that cannot be read fails startup)
 */
use std::{env, fmt, fs};

use uuid::Uuid;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone)]
pub struct Config {
    // Ed25519 PKCS#8 PEM used as the pinned PoP key.
    pub private_key_pem: Option<String>,
    // Correlation id attached to every request built from this config.
    pub correlation_id: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let private_key_pem = match lookup("POP_PRIVATE_KEY_PEM") {
            Some(pem) => Some(pem.replace("\\n", "\n")),
            None => match lookup("POP_PRIVATE_KEY_FILE") {
                Some(path) => Some(
                    fs::read_to_string(&path)
                        .map_err(|_| ConfigError::Invalid("POP_PRIVATE_KEY_FILE"))?,
                ),
                None => None,
            },
        };

        let correlation_id = lookup("POP_CORRELATION_ID")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            private_key_pem,
            correlation_id,
        })
    }

    /// The pinned key PEM, or `ConfigError::Missing` when none is configured.
    pub fn require_private_key_pem(&self) -> Result<&str, ConfigError> {
        self.private_key_pem
            .as_deref()
            .ok_or(ConfigError::Missing("POP_PRIVATE_KEY_PEM"))
    }
}
