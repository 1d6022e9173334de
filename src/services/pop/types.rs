use serde::{Deserialize, Serialize};

/// Where the secret half of the PoP key lives (`xms_ksl`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyLocation {
    #[serde(rename = "sw")]
    Sw, // software storage
    #[serde(rename = "uhw")]
    Uhw, // hardware storage
}

/// `req_cnf` confirmation claim. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqCnf {
    pub kid: String,
    pub xms_ksl: KeyLocation,
}

/// `req_cnf` in the forms needed by token acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqCnfData {
    pub kid: String,
    // base64(JSON(ReqCnf))
    pub req_cnf_string: String,
    // hash(req_cnf_string)
    pub req_cnf_hash: String,
}

/// Signed HTTP Request parameters supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShrParameters {
    pub resource_request_method: Option<String>,
    pub resource_request_uri: Option<String>,
    // Opaque application claims, sent as `client_claims`.
    pub shr_claims: Option<String>,
    pub shr_nonce: Option<String>,
    pub correlation_id: String,
}

impl ShrParameters {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.resource_request_method = Some(method.into());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.resource_request_uri = Some(uri.into());
        self
    }

    pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
        self.shr_claims = Some(claims.into());
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.shr_nonce = Some(nonce.into());
        self
    }
}
