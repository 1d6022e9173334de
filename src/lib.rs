//! Proof-of-Possession (PoP) artifacts for OAuth access tokens.
//!
//! - `req_cnf` confirmation claim bound to a client-held key (`PopTokenGenerator::generate_cnf`)
//! - Signed HTTP Request (SHR) JWT binding an access token to one HTTP request
//!   (`PopTokenGenerator::sign_pop_token` / `sign_payload`)
//!
//! Key material, hashing, encoding and JWT signing live behind the `PopCrypto` trait.
//! `SoftwareCrypto` is the in-process Ed25519 implementation.
pub mod config;
pub mod error;
pub mod services;

pub use error::PopError;
pub use services::crypto::{CryptoError, CryptoResult, OkpPublicJwk, PopCrypto, SoftwareCrypto};
pub use services::pop::{
    Clock, KeyLocation, PopTokenGenerator, ReqCnf, ReqCnfData, ShrParameters, SystemClock,
    UrlComponents, url_components,
};
