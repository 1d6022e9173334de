pub mod client;
pub mod software;
pub mod thumbprint;

pub use client::{CryptoError, CryptoResult, PopCrypto};
pub use software::SoftwareCrypto;
pub use thumbprint::OkpPublicJwk;
