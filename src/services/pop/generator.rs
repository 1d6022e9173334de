//! `req_cnf` and Signed HTTP Request (SHR) generation.
//!
//! This module is "core-only": key material, hashing and JWT signing are delegated
//! to `PopCrypto`, so the claim canonicalization below stays testable with a fake signer.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::PopError;
use crate::services::crypto::PopCrypto;
use crate::services::pop::clock::{Clock, SystemClock};
use crate::services::pop::types::{KeyLocation, ReqCnf, ReqCnfData, ShrParameters};
use crate::services::pop::uri::url_components;

#[derive(Clone)]
pub struct PopTokenGenerator {
    crypto: Arc<dyn PopCrypto>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PopTokenGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopTokenGenerator")
            .field("backend", &self.crypto.backend_name())
            .finish()
    }
}

impl PopTokenGenerator {
    pub fn new(crypto: Arc<dyn PopCrypto>) -> Self {
        Self::with_clock(crypto, Arc::new(SystemClock))
    }

    pub fn with_clock(crypto: Arc<dyn PopCrypto>, clock: Arc<dyn Clock>) -> Self {
        Self { crypto, clock }
    }

    /// Build the `req_cnf` for the key implied by `request`.
    ///
    /// Returns the key id, base64(JSON(req_cnf)) and its hash. All or nothing.
    pub async fn generate_cnf(&self, request: &ShrParameters) -> Result<ReqCnfData, PopError> {
        let req_cnf = self.generate_kid(request).await?;

        let req_cnf_json = serde_json::to_string(&req_cnf)?;
        let req_cnf_string = self.crypto.base64_encode(&req_cnf_json).await?;
        let req_cnf_hash = self.crypto.hash_string(&req_cnf_string).await?;

        debug!(
            correlation_id = %request.correlation_id,
            kid = %req_cnf.kid,
            "Generated req_cnf"
        );

        Ok(ReqCnfData {
            kid: req_cnf.kid,
            req_cnf_string,
            req_cnf_hash,
        })
    }

    /// Key id (public key thumbprint) for a SHR token request.
    pub async fn generate_kid(&self, request: &ShrParameters) -> Result<ReqCnf, PopError> {
        let kid = self
            .crypto
            .get_public_key_thumbprint(request)
            .await
            .map_err(|e| {
                warn!(
                    correlation_id = %request.correlation_id,
                    backend = self.crypto.backend_name(),
                    error = %e,
                    "Failed to derive PoP key thumbprint"
                );
                e
            })?;

        // Hardware-backed keys are not produced yet.
        Ok(ReqCnf {
            kid,
            xms_ksl: KeyLocation::Sw,
        })
    }

    /// Bind `access_token` to the request described by `request`.
    pub async fn sign_pop_token(
        &self,
        access_token: &str,
        key_id: &str,
        request: &ShrParameters,
    ) -> Result<String, PopError> {
        self.sign_payload(access_token, key_id, request, None).await
    }

    /// Sign the SHR claim set for `payload`.
    ///
    /// `claims` are merged last and override same-named SHR claims.
    pub async fn sign_payload(
        &self,
        payload: &str,
        key_id: &str,
        request: &ShrParameters,
        claims: Option<&Map<String, Value>>,
    ) -> Result<String, PopError> {
        let shr_claims = self.build_shr_claims(payload, request, claims).await?;

        let jwt = self
            .crypto
            .sign_jwt(&shr_claims, key_id, &request.correlation_id)
            .await
            .map_err(|e| {
                warn!(
                    correlation_id = %request.correlation_id,
                    kid = %key_id,
                    backend = self.crypto.backend_name(),
                    error = %e,
                    "Failed to sign SHR"
                );
                e
            })?;

        debug!(correlation_id = %request.correlation_id, kid = %key_id, "Signed SHR");

        Ok(jwt)
    }

    /// Assemble the unsigned SHR claim set.
    ///
    /// Member order: at, ts, m, u, nonce, p, q, client_claims, then `claims`.
    /// Absent values are omitted, never serialized as null.
    pub async fn build_shr_claims(
        &self,
        payload: &str,
        request: &ShrParameters,
        claims: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, PopError> {
        let components = match non_empty(&request.resource_request_uri) {
            Some(uri) => Some(url_components(uri).map_err(|e| {
                warn!(correlation_id = %request.correlation_id, error = %e, "Invalid SHR resource uri");
                e
            })?),
            None => None,
        };

        let mut shr = Map::new();
        shr.insert("at".to_string(), Value::String(payload.to_string()));
        shr.insert("ts".to_string(), Value::from(self.clock.now_seconds()));

        if let Some(method) = &request.resource_request_method {
            shr.insert("m".to_string(), Value::String(method.to_uppercase()));
        }
        if let Some(c) = &components {
            shr.insert("u".to_string(), Value::String(c.host_and_port.clone()));
        }

        // Exactly one nonce source per call.
        let nonce = match non_empty(&request.shr_nonce) {
            Some(nonce) => nonce.to_string(),
            None => self.crypto.create_new_guid().await?,
        };
        shr.insert("nonce".to_string(), Value::String(nonce));

        if let Some(c) = &components {
            shr.insert("p".to_string(), Value::String(c.absolute_path.clone()));

            // First slot is reserved for enumerated query parameter names; always empty.
            if let Some(query) = c.query_string.as_deref().filter(|q| !q.is_empty()) {
                shr.insert("q".to_string(), json!([[], query]));
            }
        }

        if let Some(client_claims) = non_empty(&request.shr_claims) {
            shr.insert(
                "client_claims".to_string(),
                Value::String(client_claims.to_string()),
            );
        }

        if let Some(extra) = claims {
            for (name, value) in extra {
                shr.insert(name.clone(), value.clone());
            }
        }

        Ok(shr)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use sha2::{Digest, Sha256};

    use super::*;
    use crate::services::crypto::{CryptoError, CryptoResult};

    const NOW: i64 = 1_700_000_000;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now_seconds(&self) -> i64 {
            NOW
        }
    }

    #[derive(Default)]
    struct FakeCrypto {
        thumbprint: Option<String>,
        fail_signing: bool,
        guids: AtomicUsize,
        signed: Mutex<Vec<(Map<String, Value>, String, String)>>,
    }

    impl FakeCrypto {
        fn with_thumbprint(kid: &str) -> Self {
            Self {
                thumbprint: Some(kid.to_string()),
                ..Self::default()
            }
        }

        fn last_signed(&self) -> (Map<String, Value>, String, String) {
            self.signed.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl PopCrypto for FakeCrypto {
        fn backend_name(&self) -> &'static str {
            "fake"
        }

        async fn base64_encode(&self, input: &str) -> CryptoResult<String> {
            Ok(URL_SAFE_NO_PAD.encode(input))
        }

        async fn hash_string(&self, input: &str) -> CryptoResult<String> {
            Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(input.as_bytes())))
        }

        async fn get_public_key_thumbprint(&self, _: &ShrParameters) -> CryptoResult<String> {
            self.thumbprint
                .clone()
                .ok_or_else(|| CryptoError::KeyGeneration("no key".into()))
        }

        async fn create_new_guid(&self) -> CryptoResult<String> {
            let n = self.guids.fetch_add(1, Ordering::SeqCst);
            Ok(format!("guid-{n}"))
        }

        async fn sign_jwt(
            &self,
            claims: &Map<String, Value>,
            key_id: &str,
            correlation_id: &str,
        ) -> CryptoResult<String> {
            if self.fail_signing {
                return Err(CryptoError::Signing("boom".into()));
            }
            self.signed.lock().unwrap().push((
                claims.clone(),
                key_id.to_string(),
                correlation_id.to_string(),
            ));
            Ok(format!("jwt-for-{key_id}"))
        }
    }

    fn generator(crypto: Arc<FakeCrypto>) -> PopTokenGenerator {
        PopTokenGenerator::with_clock(crypto, Arc::new(FixedClock))
    }

    fn keys(claims: &Map<String, Value>) -> Vec<&str> {
        claims.keys().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn generate_kid_reports_software_storage() {
        let crypto = Arc::new(FakeCrypto::with_thumbprint("thumb-1"));
        let cnf = generator(crypto).generate_kid(&ShrParameters::new("c")).await.unwrap();

        assert_eq!(cnf.kid, "thumb-1");
        assert_eq!(cnf.xms_ksl, KeyLocation::Sw);
    }

    #[tokio::test]
    async fn req_cnf_string_decodes_to_kid_and_location() {
        let crypto = Arc::new(FakeCrypto::with_thumbprint("thumb-1"));
        let data = generator(crypto).generate_cnf(&ShrParameters::new("c")).await.unwrap();

        let decoded = URL_SAFE_NO_PAD.decode(&data.req_cnf_string).unwrap();
        assert_eq!(decoded, br#"{"kid":"thumb-1","xms_ksl":"sw"}"#);

        let cnf: ReqCnf = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(
            cnf,
            ReqCnf {
                kid: "thumb-1".into(),
                xms_ksl: KeyLocation::Sw
            }
        );
        assert_eq!(data.kid, "thumb-1");
    }

    #[tokio::test]
    async fn req_cnf_hash_is_a_pure_function_of_the_string() {
        let crypto = Arc::new(FakeCrypto::with_thumbprint("thumb-1"));
        let generator = generator(crypto);

        let a = generator.generate_cnf(&ShrParameters::new("c1")).await.unwrap();
        let b = generator.generate_cnf(&ShrParameters::new("c2")).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(
            a.req_cnf_hash,
            URL_SAFE_NO_PAD.encode(Sha256::digest(a.req_cnf_string.as_bytes()))
        );
    }

    #[tokio::test]
    async fn thumbprint_failure_propagates() {
        let crypto = Arc::new(FakeCrypto::default());
        let err = generator(crypto).generate_cnf(&ShrParameters::new("c")).await.unwrap_err();

        assert!(matches!(err, PopError::Crypto(CryptoError::KeyGeneration(_))));
    }

    #[tokio::test]
    async fn canonical_claim_set_for_full_request() {
        let crypto = Arc::new(FakeCrypto::default());
        let request = ShrParameters::new("corr-1")
            .with_method("get")
            .with_uri("https://api.example.com/v1/res?x=9")
            .with_nonce("N1");

        let jwt = generator(crypto.clone())
            .sign_pop_token("AT1", "K1", &request)
            .await
            .unwrap();
        assert_eq!(jwt, "jwt-for-K1");

        let (claims, kid, correlation_id) = crypto.last_signed();
        assert_eq!(kid, "K1");
        assert_eq!(correlation_id, "corr-1");
        assert_eq!(
            Value::Object(claims.clone()),
            json!({
                "at": "AT1",
                "ts": NOW,
                "m": "GET",
                "u": "api.example.com",
                "nonce": "N1",
                "p": "/v1/res",
                "q": [[], "x=9"],
            })
        );
        assert_eq!(keys(&claims), ["at", "ts", "m", "u", "nonce", "p", "q"]);
        assert_eq!(crypto.guids.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_uri_means_no_url_claims() {
        let crypto = Arc::new(FakeCrypto::default());
        generator(crypto.clone())
            .sign_pop_token("AT", "K", &ShrParameters::new("c"))
            .await
            .unwrap();

        let (claims, _, _) = crypto.last_signed();
        assert_eq!(keys(&claims), ["at", "ts", "nonce"]);
    }

    #[tokio::test]
    async fn empty_uri_is_treated_as_absent() {
        let crypto = Arc::new(FakeCrypto::default());
        let request = ShrParameters::new("c").with_uri("");
        generator(crypto.clone())
            .sign_pop_token("AT", "K", &request)
            .await
            .unwrap();

        let (claims, _, _) = crypto.last_signed();
        assert!(!claims.contains_key("u"));
        assert!(!claims.contains_key("p"));
    }

    #[tokio::test]
    async fn method_without_uri_is_still_uppercased() {
        let crypto = Arc::new(FakeCrypto::default());
        let request = ShrParameters::new("c").with_method("post");
        generator(crypto.clone())
            .sign_pop_token("AT", "K", &request)
            .await
            .unwrap();

        let (claims, _, _) = crypto.last_signed();
        assert_eq!(claims["m"], "POST");
        assert!(!claims.contains_key("u"));
    }

    #[tokio::test]
    async fn query_claim_only_when_query_present() {
        let crypto = Arc::new(FakeCrypto::default());
        let generator = generator(crypto.clone());

        for uri in ["https://h.example/p", "https://h.example/p?"] {
            let request = ShrParameters::new("c").with_uri(uri);
            generator.sign_pop_token("AT", "K", &request).await.unwrap();
            let (claims, _, _) = crypto.last_signed();
            assert!(!claims.contains_key("q"), "unexpected q for {uri}");
        }

        let request = ShrParameters::new("c").with_uri("https://h.example/p?a=1&b=2");
        generator.sign_pop_token("AT", "K", &request).await.unwrap();
        let (claims, _, _) = crypto.last_signed();
        assert_eq!(claims["q"], json!([[], "a=1&b=2"]));
    }

    #[tokio::test]
    async fn url_claims_carry_the_request_text_verbatim() {
        let crypto = Arc::new(FakeCrypto::default());
        let request = ShrParameters::new("c")
            .with_uri("https://API.Example.com:443/v1/../admin?name=a b&x=é&y='1'");

        generator(crypto.clone())
            .sign_pop_token("AT", "K", &request)
            .await
            .unwrap();

        let (claims, _, _) = crypto.last_signed();
        assert_eq!(claims["u"], "API.Example.com:443");
        assert_eq!(claims["p"], "/v1/../admin");
        assert_eq!(claims["q"], json!([[], "name=a b&x=é&y='1'"]));
    }

    #[tokio::test]
    async fn generated_nonce_differs_between_calls() {
        let crypto = Arc::new(FakeCrypto::default());
        let generator = generator(crypto.clone());
        let request = ShrParameters::new("c");

        generator.sign_pop_token("AT", "K", &request).await.unwrap();
        let (first, _, _) = crypto.last_signed();
        generator.sign_pop_token("AT", "K", &request).await.unwrap();
        let (second, _, _) = crypto.last_signed();

        assert_ne!(first["nonce"], second["nonce"]);
        assert_eq!(crypto.guids.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_nonce_falls_back_to_guid() {
        let crypto = Arc::new(FakeCrypto::default());
        let request = ShrParameters::new("c").with_nonce("");
        generator(crypto.clone())
            .sign_pop_token("AT", "K", &request)
            .await
            .unwrap();

        let (claims, _, _) = crypto.last_signed();
        assert_eq!(claims["nonce"], "guid-0");
    }

    #[tokio::test]
    async fn client_claims_included_when_non_empty() {
        let crypto = Arc::new(FakeCrypto::default());
        let generator = generator(crypto.clone());

        let request = ShrParameters::new("c").with_claims(r#"{"app":"x"}"#);
        generator.sign_pop_token("AT", "K", &request).await.unwrap();
        let (claims, _, _) = crypto.last_signed();
        assert_eq!(claims["client_claims"], r#"{"app":"x"}"#);

        let request = ShrParameters::new("c").with_claims("");
        generator.sign_pop_token("AT", "K", &request).await.unwrap();
        let (claims, _, _) = crypto.last_signed();
        assert!(!claims.contains_key("client_claims"));
    }

    #[tokio::test]
    async fn extra_claims_override_in_place_and_append() {
        let crypto = Arc::new(FakeCrypto::default());
        let request = ShrParameters::new("c").with_nonce("N1");

        let mut extra = Map::new();
        extra.insert("ts".to_string(), json!(42));
        extra.insert("aud".to_string(), json!("rs"));

        generator(crypto.clone())
            .sign_payload("AT", "K", &request, Some(&extra))
            .await
            .unwrap();

        let (claims, _, _) = crypto.last_signed();
        assert_eq!(claims["ts"], 42);
        assert_eq!(claims["aud"], "rs");
        assert_eq!(keys(&claims), ["at", "ts", "nonce", "aud"]);
    }

    #[tokio::test]
    async fn unparsable_uri_fails_before_signing() {
        let crypto = Arc::new(FakeCrypto::default());
        let request = ShrParameters::new("c").with_uri("not a url");

        let err = generator(crypto.clone())
            .sign_pop_token("AT", "K", &request)
            .await
            .unwrap_err();

        assert!(matches!(err, PopError::UrlParse { .. }));
        assert!(crypto.signed.lock().unwrap().is_empty());
        assert_eq!(crypto.guids.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signing_failure_propagates_unchanged() {
        let crypto = Arc::new(FakeCrypto {
            fail_signing: true,
            ..FakeCrypto::default()
        });

        let err = generator(crypto)
            .sign_pop_token("AT", "K", &ShrParameters::new("c"))
            .await
            .unwrap_err();

        assert!(matches!(err, PopError::Crypto(CryptoError::Signing(m)) if m == "boom"));
    }
}
