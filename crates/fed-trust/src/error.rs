//! Trust error types.

use fed_core::error::{Classify, ErrorKind};
use thiserror::Error;

/// Result type for trust operations.
pub type TrustResult<T> = Result<T, TrustError>;

/// Trust validation errors.
#[derive(Debug, Clone, Error)]
pub enum TrustError {
    /// Certificate validity ended.
    #[error("certificate expired: {0}")]
    Expired(String),

    /// Certificate validity has not started.
    #[error("certificate not yet valid: {0}")]
    NotYetValid(String),

    /// No trust anchor issued the certificate.
    #[error("certificate not issued by a trusted CA: {0}")]
    UntrustedIssuer(String),

    /// The issuing CA is outside its validity window.
    #[error("issuing CA expired or not yet valid: {0}")]
    CaExpired(String),

    /// The issuing CA does not chain to a trusted root.
    #[error("issuing CA not trusted: {0}")]
    UntrustedCa(String),

    /// Certificate bytes could not be parsed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// The trust store could not be loaded.
    #[error("trust store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Classify for TrustError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreUnavailable(_) => ErrorKind::Configuration,
            _ => ErrorKind::Trust,
        }
    }
}
