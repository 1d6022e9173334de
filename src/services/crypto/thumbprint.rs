//! JWK thumbprint computation (RFC 7638) for Ed25519 public keys.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::VerifyingKey;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Public half of an Ed25519 key as an OKP JWK (RFC 8037).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OkpPublicJwk {
    pub kty: &'static str,
    pub crv: &'static str,
    pub x: String,
}

impl OkpPublicJwk {
    pub fn new(x: impl Into<String>) -> Self {
        Self {
            kty: "OKP",
            crv: "Ed25519",
            x: x.into(),
        }
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self::new(URL_SAFE_NO_PAD.encode(key.as_bytes()))
    }

    /// base64url(SHA-256(canonical JWK)).
    pub fn thumbprint(&self) -> String {
        // RFC7638 canonical JSON for OKP keys uses only {crv,kty,x}.
        // Members must be in lexicographic order with no whitespace.
        let canonical = format!(
            "{{\"crv\":\"{}\",\"kty\":\"{}\",\"x\":\"{}\"}}",
            self.crv, self.kty, self.x
        );

        let digest = Sha256::digest(canonical.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}
