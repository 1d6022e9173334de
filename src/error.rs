use thiserror::Error;

use crate::services::crypto::CryptoError;

/// Errors surfaced by `PopTokenGenerator`.
///
/// Capability failures are passed through unchanged; the only error this crate
/// raises on its own is an unparsable resource URI.
#[derive(Debug, Error)]
pub enum PopError {
    #[error("invalid resource request uri {uri:?}: {reason}")]
    UrlParse { uri: String, reason: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("failed to serialize claims: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PopError {
    pub fn url_parse(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UrlParse {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}
