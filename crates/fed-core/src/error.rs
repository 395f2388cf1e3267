//! Error handling for the federation server.
//!
//! Every crate owns its own error enum. Each of those enums reports an
//! [`ErrorKind`] through [`Classify`], and callers use the kind to decide how
//! far a failure may propagate.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure category.
///
/// Trust and transport failures are scoped to a single partner. Protocol
/// failures reject a single inbound message. Configuration failures are fatal
/// for the affected partner at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration.
    Configuration,
    /// Untrusted or expired certificate.
    Trust,
    /// Malformed, unsigned, forged, replayed or expired message.
    Protocol,
    /// Partner unreachable or answered with garbage.
    Transport,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Returns true if a failure of this kind only affects one partner.
    #[must_use]
    pub const fn is_partner_scoped(self) -> bool {
        matches!(self, Self::Trust | Self::Transport)
    }

    /// Returns a short label for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Trust => "trust",
            Self::Protocol => "protocol",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an error into the federation taxonomy.
pub trait Classify {
    /// Returns the category of this error.
    fn kind(&self) -> ErrorKind;
}

/// Core errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for the expected schema.
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}
