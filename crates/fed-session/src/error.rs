//! Session error types.

use fed_core::error::{Classify, ErrorKind};
use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session not found.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A session with this key already exists.
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// Operation not allowed in the session's current state.
    #[error("Session {key} is {state}: {operation} not allowed")]
    InvalidState {
        /// Session key.
        key: String,
        /// Current state.
        state: &'static str,
        /// Rejected operation.
        operation: &'static str,
    },

    /// Storage error.
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Classify for SessionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidState { .. } => ErrorKind::Protocol,
            _ => ErrorKind::Internal,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
