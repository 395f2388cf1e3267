//! # fed-crypto
//!
//! Cryptographic primitives for federation messages, backed by aws-lc-rs.
//!
//! SAML partners in the wild still sign with RSA-SHA256 and ECDSA P-256, and
//! artifact handles are defined over SHA-1, so this crate exposes those
//! algorithms alongside the SHA-384/512 family.
//!
//! - [`hash`] - Digests and HMAC
//! - [`keys`] - Private and public key handling
//! - [`algorithm`] - XML-DSig signature algorithm identifiers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod hash;
pub mod keys;

pub use algorithm::SignatureAlgorithm;
pub use hash::{hmac_sha256, hmac_sha256_verify, sha1, sha256, sha384, sha512, to_hex};
pub use keys::{KeyKind, PrivateKey, PublicKey};

use thiserror::Error;

/// Error type for key and signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Key material could not be parsed.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The key cannot produce the requested algorithm.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}
