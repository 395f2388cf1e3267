//! SAML error types.
//!
//! Provides error types for protocol message handling, bindings and
//! signature checks, with their mapping to SAML status codes.

use fed_core::error::{Classify, ErrorKind};
use thiserror::Error;

use crate::types::{status_codes, sub_status_codes};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Invalid SAML request format or content.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid SAML response format or content.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Signature missing or not valid for any trusted key.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// Signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Message validity window has passed.
    #[error("message expired")]
    MessageExpired,

    /// Message issued too far in the future.
    #[error("message not yet valid")]
    MessageNotYetValid,

    /// Message ID already seen.
    #[error("message replayed: {0}")]
    Replayed(String),

    /// Invalid destination.
    #[error("invalid destination: expected {expected}, got {actual}")]
    InvalidDestination {
        /// The expected destination URL.
        expected: String,
        /// The actual destination URL.
        actual: String,
    },

    /// Unknown or unsupported binding.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Unknown or untrusted partner.
    #[error("unknown partner: {0}")]
    UnknownPartner(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Invalid local configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage operation error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SamlError {
    /// Returns the top-level SAML status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::Configuration(_)
            | Self::SignatureCreation(_)
            | Self::Storage(_)
            | Self::Internal(_) => status_codes::RESPONDER,
            _ => status_codes::REQUESTER,
        }
    }

    /// Returns a second-level status code if applicable.
    #[must_use]
    pub const fn sub_status_code(&self) -> Option<&'static str> {
        match self {
            Self::SignatureInvalid(_) | Self::Replayed(_) => Some(sub_status_codes::REQUEST_DENIED),
            Self::UnknownPartner(_) => Some(sub_status_codes::UNKNOWN_PRINCIPAL),
            Self::UnsupportedBinding(_) => Some(sub_status_codes::REQUEST_UNSUPPORTED),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidResponse(_)
            | Self::MissingElement(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::XmlParse(_)
            | Self::MessageExpired
            | Self::MessageNotYetValid
            | Self::InvalidDestination { .. }
            | Self::UnsupportedBinding(_) => 400,
            Self::SignatureInvalid(_) => 401,
            Self::Replayed(_) => 403,
            Self::UnknownPartner(_) => 404,
            _ => 500,
        }
    }
}

impl Classify for SamlError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::UnknownPartner(_) => ErrorKind::Trust,
            Self::SignatureCreation(_) | Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
            _ => ErrorKind::Protocol,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<fed_cache::CacheError> for SamlError {
    fn from(err: fed_cache::CacheError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<fed_crypto::SignatureError> for SamlError {
    fn from(err: fed_crypto::SignatureError) -> Self {
        Self::SignatureCreation(err.to_string())
    }
}
