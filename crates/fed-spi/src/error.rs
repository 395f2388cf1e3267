//! Error type for adapter operations.

use fed_core::error::{Classify, ErrorKind};
use fed_protocol_saml::SamlError;
use thiserror::Error;

/// Result type for adapter operations.
pub type SpiResult<T> = Result<T, SpiError>;

/// Adapter and registry errors.
#[derive(Debug, Error)]
pub enum SpiError {
    /// No factory is registered for this kind.
    #[error("unknown adapter kind: {0}")]
    UnknownKind(String),

    /// No configured adapter has this name.
    #[error("adapter not found: {0}")]
    AdapterNotFound(String),

    /// No configured adapter satisfies the level.
    #[error("no adapter for assurance level {0}")]
    NoAdapterForLevel(String),

    /// Adapter initialization failed.
    #[error("adapter {name} failed to initialize: {reason}")]
    InitializationFailed {
        /// Instance name.
        name: String,
        /// Failure description.
        reason: String,
    },

    /// A setting is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The back end could not be reached.
    #[error("back end unavailable: {0}")]
    Unavailable(String),

    /// Signing or verifying the adapter response failed.
    #[error(transparent)]
    Protocol(#[from] SamlError),
}

impl Classify for SpiError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownKind(_)
            | Self::AdapterNotFound(_)
            | Self::NoAdapterForLevel(_)
            | Self::InitializationFailed { .. }
            | Self::Configuration(_) => ErrorKind::Configuration,
            Self::Unavailable(_) => ErrorKind::Transport,
            Self::Protocol(err) => err.kind(),
        }
    }
}
