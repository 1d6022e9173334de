use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{
    SECRET_KEY_LENGTH, SigningKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::services::crypto::client::{CryptoError, CryptoResult, PopCrypto};
use crate::services::crypto::thumbprint::OkpPublicJwk;
use crate::services::pop::ShrParameters;

struct StoredKey {
    encoding_key: EncodingKey,
    public_jwk: OkpPublicJwk,
}

/// Software-backed PoP key store (Ed25519, in-process memory).
///
/// Two modes:
/// - pinned: built from a PKCS#8 PEM; every thumbprint request returns that key.
/// - ephemeral: every thumbprint request generates and registers a fresh key pair.
///
/// Cheap to clone; clones share the same key store.
#[derive(Clone)]
pub struct SoftwareCrypto {
    keys: Arc<RwLock<HashMap<String, Arc<StoredKey>>>>,
    pinned_kid: Option<String>,
}

impl fmt::Debug for SoftwareCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareCrypto")
            .field("pinned_kid", &self.pinned_kid)
            .finish()
    }
}

impl Default for SoftwareCrypto {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareCrypto {
    /// Ephemeral mode: a new key pair per `get_public_key_thumbprint` call.
    ///
    /// Keys are never evicted; the store grows by one entry per call.
    pub fn new() -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            pinned_kid: None,
        }
    }

    /// Pinned mode. `private_key_pem` must be an Ed25519 private key in PKCS#8 PEM format.
    pub fn from_pkcs8_pem(private_key_pem: &str) -> CryptoResult<Self> {
        let signing_key = SigningKey::from_pkcs8_pem(private_key_pem).map_err(|e| {
            warn!(error = %e, "failed to parse PoP private key PEM (expected Ed25519 PKCS#8 PEM)");
            CryptoError::InvalidKey(e.to_string())
        })?;

        Self::from_signing_key(&signing_key)
    }

    /// Pinned mode from an in-memory key.
    pub fn from_signing_key(signing_key: &SigningKey) -> CryptoResult<Self> {
        let (kid, stored) = stored_key(signing_key)?;

        let mut keys = HashMap::new();
        keys.insert(kid.clone(), Arc::new(stored));

        Ok(Self {
            keys: Arc::new(RwLock::new(keys)),
            pinned_kid: Some(kid),
        })
    }

    /// Thumbprint of the pinned key, if any.
    pub fn pinned_kid(&self) -> Option<&str> {
        self.pinned_kid.as_deref()
    }

    /// Public JWK registered under `kid`.
    pub async fn public_jwk(&self, kid: &str) -> Option<OkpPublicJwk> {
        let keys = self.keys.read().await;
        keys.get(kid).map(|k| k.public_jwk.clone())
    }

    async fn register_new_key(&self) -> CryptoResult<String> {
        let signing_key = generate_signing_key()?;
        let (kid, stored) = stored_key(&signing_key)?;

        let mut keys = self.keys.write().await;
        keys.insert(kid.clone(), Arc::new(stored));

        Ok(kid)
    }
}

#[async_trait]
impl PopCrypto for SoftwareCrypto {
    fn backend_name(&self) -> &'static str {
        "software"
    }

    async fn base64_encode(&self, input: &str) -> CryptoResult<String> {
        Ok(URL_SAFE_NO_PAD.encode(input.as_bytes()))
    }

    async fn hash_string(&self, input: &str) -> CryptoResult<String> {
        let digest = Sha256::digest(input.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    async fn get_public_key_thumbprint(&self, request: &ShrParameters) -> CryptoResult<String> {
        if let Some(kid) = &self.pinned_kid {
            return Ok(kid.clone());
        }

        let kid = self.register_new_key().await?;
        debug!(
            correlation_id = %request.correlation_id,
            kid = %kid,
            "Generated ephemeral PoP key"
        );

        Ok(kid)
    }

    async fn create_new_guid(&self) -> CryptoResult<String> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn sign_jwt(
        &self,
        claims: &Map<String, Value>,
        key_id: &str,
        correlation_id: &str,
    ) -> CryptoResult<String> {
        let stored = {
            let keys = self.keys.read().await;
            keys.get(key_id).cloned()
        };
        let stored = stored.ok_or_else(|| {
            warn!(correlation_id = %correlation_id, kid = %key_id, "PoP key not found");
            CryptoError::KeyNotFound(key_id.to_string())
        })?;

        // Bind the public key so the resource server can verify the signature.
        let jwk = serde_json::to_value(&stored.public_jwk)
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        let mut payload = claims.clone();
        payload.insert("cnf".to_string(), json!({ "jwk": jwk }));

        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(key_id.to_string());

        jsonwebtoken::encode(&header, &payload, &stored.encoding_key).map_err(|e| {
            error!(correlation_id = %correlation_id, error = %e, "failed to sign SHR");
            CryptoError::Signing(e.to_string())
        })
    }
}

fn generate_signing_key() -> CryptoResult<SigningKey> {
    let mut seed = [0u8; SECRET_KEY_LENGTH];
    getrandom::fill(&mut seed).map_err(|e| {
        error!(error = %e, "OS randomness unavailable");
        CryptoError::KeyGeneration(e.to_string())
    })?;

    Ok(SigningKey::from_bytes(&seed))
}

fn stored_key(signing_key: &SigningKey) -> CryptoResult<(String, StoredKey)> {
    let der = signing_key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let encoding_key = EncodingKey::from_ed_der(der.as_bytes());

    let public_jwk = OkpPublicJwk::from_verifying_key(&signing_key.verifying_key());
    let kid = public_jwk.thumbprint();

    Ok((
        kid,
        StoredKey {
            encoding_key,
            public_jwk,
        },
    ))
}
