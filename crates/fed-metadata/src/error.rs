//! Metadata error types.

use fed_core::error::{Classify, ErrorKind};
use fed_trust::TrustError;
use thiserror::Error;

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while obtaining a partner's metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The document could not be retrieved.
    #[error("failed to fetch metadata from {location}: {message}")]
    Fetch {
        /// URL or path.
        location: String,
        /// Transport or I/O message.
        message: String,
    },

    /// The document is not well-formed metadata.
    #[error("invalid metadata: {0}")]
    Parse(String),

    /// The document does not describe the expected entity.
    #[error("metadata does not describe {expected}")]
    EntityNotFound {
        /// Entity ID that was looked for.
        expected: String,
    },

    /// No signing certificate survived trust checks.
    #[error("no trusted signing key for {entity_id}")]
    NoTrustedKey {
        /// Partner entity ID.
        entity_id: String,
        /// Last trust failure, if a certificate was present.
        #[source]
        source: Option<TrustError>,
    },

    /// A certificate inside the document could not be parsed.
    #[error("invalid certificate in metadata: {0}")]
    Certificate(#[from] TrustError),
}

impl Classify for MetadataError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch { .. } => ErrorKind::Transport,
            Self::Parse(_) | Self::EntityNotFound { .. } => ErrorKind::Configuration,
            Self::NoTrustedKey { .. } | Self::Certificate(_) => ErrorKind::Trust,
        }
    }
}
