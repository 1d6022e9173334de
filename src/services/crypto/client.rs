//! Crypto capability interface consumed by the PoP token generator.
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::services::pop::ShrParameters;

/// Result type for capability operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Capability-layer errors (key store, encoding, signing).
///
/// Note:
/// - `PopTokenGenerator` never inspects these; they reach the caller unchanged
///   wrapped in `PopError::Crypto`.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("no signing key registered for kid {0}")]
    KeyNotFound(String),
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("jwt signing failed: {0}")]
    Signing(String),
    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// Key material and primitive operations behind PoP token generation.
///
/// Implementations must be safe for concurrent use: a single instance is shared
/// (typically as `Arc<dyn PopCrypto>`) by every in-flight request.
#[async_trait]
pub trait PopCrypto: Send + Sync {
    // Backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Encode UTF-8 text as base64.
    async fn base64_encode(&self, input: &str) -> CryptoResult<String>;

    // Deterministic digest of `input`, returned as an opaque string.
    async fn hash_string(&self, input: &str) -> CryptoResult<String>;

    // RFC 7638 thumbprint of the public key implied by `request`.
    async fn get_public_key_thumbprint(&self, request: &ShrParameters) -> CryptoResult<String>;

    // Random identifier, used as the SHR nonce when the caller supplies none.
    async fn create_new_guid(&self) -> CryptoResult<String>;

    // Sign `claims` as a compact JWT with the key registered under `key_id`.
    async fn sign_jwt(
        &self,
        claims: &Map<String, Value>,
        key_id: &str,
        correlation_id: &str,
    ) -> CryptoResult<String>;
}
