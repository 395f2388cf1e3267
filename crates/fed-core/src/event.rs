//! Audit events for federation activity.
//!
//! Logout sagas and trust decisions are security relevant: every partner
//! dispatch, every settlement and every rejected certificate or signature is
//! recorded. Events are emitted on the `audit` tracing target so a subscriber
//! can route them separately from operational logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A logout saga started for a session.
    LogoutStarted,
    /// A logout request was sent to a partner.
    PartnerDispatched,
    /// A partner confirmed logout.
    PartnerSettled,
    /// A partner could not be logged out.
    PartnerAbandoned,
    /// A partner was skipped (no endpoint or logout unsupported).
    PartnerSkipped,
    /// The saga reached its terminal state.
    LogoutCompleted,
    /// A logout request referenced no known session.
    LogoutNoSession,
    /// A partner certificate failed trust validation.
    TrustRejected,
    /// An inbound message failed signature verification.
    SignatureRejected,
    /// An inbound message ID was seen before.
    ReplayRejected,
    /// An artifact was resolved by a partner.
    ArtifactResolved,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A federation audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationEvent {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Outcome of the event.
    pub outcome: EventOutcome,

    /// Local session key, when the event belongs to a session.
    pub session_key: Option<String>,

    /// Partner entity id, when the event concerns one partner.
    pub entity_id: Option<String>,

    /// Error message (for failure events).
    pub error: Option<String>,

    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl FederationEvent {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Writes the event to the `audit` tracing target.
    pub fn emit(&self) {
        let details = serde_json::to_string(&self.details).unwrap_or_default();
        match self.outcome {
            EventOutcome::Success => tracing::info!(
                target: "audit",
                event_id = %self.id,
                event_type = ?self.event_type,
                session = self.session_key.as_deref().unwrap_or("-"),
                entity_id = self.entity_id.as_deref().unwrap_or("-"),
                details = %details,
                "federation event"
            ),
            EventOutcome::Failure => tracing::warn!(
                target: "audit",
                event_id = %self.id,
                event_type = ?self.event_type,
                session = self.session_key.as_deref().unwrap_or("-"),
                entity_id = self.entity_id.as_deref().unwrap_or("-"),
                error = self.error.as_deref().unwrap_or("-"),
                details = %details,
                "federation event"
            ),
        }
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    session_key: Option<String>,
    entity_id: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            session_key: None,
            entity_id: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the session key.
    #[must_use]
    pub fn session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    /// Sets the partner entity id.
    #[must_use]
    pub fn partner(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> FederationEvent {
        FederationEvent {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            session_key: self.session_key,
            entity_id: self.entity_id,
            error: self.error,
            details: self.details,
        }
    }

    /// Builds and emits the event.
    pub fn emit(self) {
        self.build().emit();
    }
}
