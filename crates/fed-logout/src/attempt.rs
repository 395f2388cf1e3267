//! Per-partner logout attempts.

use chrono::{DateTime, Utc};
use fed_metadata::Binding;
use fed_protocol_saml::NameId;
use fed_session::SessionKey;
use tokio::time::Instant;

/// Identifies one partner within one saga.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    /// Saga the attempt belongs to.
    pub saga_id: String,
    /// Partner entity ID.
    pub entity_id: String,
}

impl AttemptKey {
    /// Creates a key.
    pub fn new(saga_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            saga_id: saga_id.into(),
            entity_id: entity_id.into(),
        }
    }
}

/// A front-channel request awaiting either the partner's response or its
/// fallback deadline. Present while pending, removed when settled.
#[derive(Debug, Clone)]
pub struct LogoutAttempt {
    /// Saga and partner.
    pub key: AttemptKey,
    /// Session being logged out.
    pub session_key: SessionKey,
    /// ID of the LogoutRequest sent.
    pub request_id: String,
    /// Binding used for the request.
    pub binding: Binding,
    /// Subject the request named.
    pub name_id: NameId,
    /// Session indexes the request named.
    pub session_indexes: Vec<String>,
    /// When the request left.
    pub dispatched_at: DateTime<Utc>,
    /// When the fallback runs.
    pub deadline: Instant,
}

/// How a partner was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The partner's response came back through the browser.
    RedirectCompleted,
    /// The partner confirmed over SOAP.
    BackchannelCompleted,
    /// Logout at the partner could not be confirmed.
    Abandoned(String),
}

impl AttemptOutcome {
    /// Label for logs and audit events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RedirectCompleted => "redirect-completed",
            Self::BackchannelCompleted => "backchannel-completed",
            Self::Abandoned(_) => "abandoned",
        }
    }
}
