//! Logout error types.

use fed_core::error::{Classify, ErrorKind};
use fed_protocol_saml::SamlError;
use fed_session::SessionError;
use thiserror::Error;

/// Result type for logout operations.
pub type LogoutResult<T> = Result<T, LogoutError>;

/// Errors raised while running a logout saga.
///
/// Only [`LogoutError::Session`] and [`LogoutError::Internal`] escape the
/// orchestrator; the others are scoped to one partner and end up as an
/// abandoned entry in the summary.
#[derive(Debug, Error)]
pub enum LogoutError {
    /// Session store failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Message could not be built, parsed or verified.
    #[error(transparent)]
    Protocol(#[from] SamlError),

    /// Partner unreachable.
    #[error("transport error talking to {endpoint}: {message}")]
    Transport {
        /// Endpoint called.
        endpoint: String,
        /// Failure description.
        message: String,
    },

    /// Partner answered but did not log the user out.
    #[error("partner {entity_id} answered {status}")]
    PartnerRefused {
        /// Partner entity ID.
        entity_id: String,
        /// Top-level status code.
        status: String,
    },

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Classify for LogoutError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Session(err) => err.kind(),
            Self::Protocol(err) => err.kind(),
            Self::Transport { .. } | Self::PartnerRefused { .. } => ErrorKind::Transport,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
