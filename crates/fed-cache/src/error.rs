//! Cache error types.

use std::fmt;

use fed_core::error::{Classify, ErrorKind};

/// Cache operation errors.
#[derive(Debug)]
pub enum CacheError {
    /// Connection to cache backend failed.
    Connection(String),
    /// Stored value could not be interpreted.
    Serialization(String),
    /// Cache operation timed out.
    Timeout,
    /// Internal cache error.
    Internal(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "cache connection error: {msg}"),
            Self::Serialization(msg) => write!(f, "cache serialization error: {msg}"),
            Self::Timeout => write!(f, "cache operation timed out"),
            Self::Internal(msg) => write!(f, "internal cache error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl Classify for CacheError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
