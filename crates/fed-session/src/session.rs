//! Federation session model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Local session key (the TGT handle), distinct from the partner-facing NameID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wraps a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A service provider that received an assertion in this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProviderParticipant {
    /// Partner entity ID.
    pub entity_id: String,
    /// Session indexes issued to the partner.
    #[serde(default)]
    pub session_indexes: Vec<String>,
}

impl ServiceProviderParticipant {
    /// Creates a participant with no session index.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            session_indexes: Vec::new(),
        }
    }

    /// Adds a session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }
}

/// Session lifecycle. A terminated session is simply absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Authenticated and accepting new participants.
    Active,
    /// Logout saga in progress.
    LoggingOut,
}

impl SessionState {
    /// Name used in logs and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::LoggingOut => "LOGGING_OUT",
        }
    }
}

/// How the saga reaches partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutChannel {
    /// Browser redirects, falling back to SOAP.
    #[default]
    Front,
    /// SOAP only; the browser is no longer involved.
    Back,
}

/// One authenticated user context spanning several partners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationSession {
    /// Local session key.
    pub key: SessionKey,
    /// Partner-facing subject handle.
    pub name_id: String,
    /// NameID format URI, if one was negotiated.
    pub name_id_format: Option<String>,
    /// Remaining participants, in dispatch order.
    pub service_providers: Vec<ServiceProviderParticipant>,
    /// Lifecycle state.
    pub state: SessionState,
    /// Partner that started logout. `None` when idle or locally initiated.
    pub logout_initiator: Option<String>,
    /// ID of the LogoutRequest that started logout.
    pub logout_initiating_request_id: Option<String>,
    /// RelayState sent by the initiator, echoed in the final response.
    pub initiator_relay_state: Option<String>,
    /// Caller-supplied URL for the final redirect of a local logout.
    pub return_to: Option<String>,
    /// Channel used for the remaining partners.
    pub channel: LogoutChannel,
    /// Partners whose logout could not be confirmed.
    pub abandoned: Vec<String>,
    /// Correlates browser round trips with this saga.
    pub saga_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl FederationSession {
    /// Creates an active session with no participants.
    pub fn new(key: impl Into<SessionKey>, name_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name_id: name_id.into(),
            name_id_format: None,
            service_providers: Vec::new(),
            state: SessionState::Active,
            logout_initiator: None,
            logout_initiating_request_id: None,
            initiator_relay_state: None,
            return_to: None,
            channel: LogoutChannel::Front,
            abandoned: Vec::new(),
            saga_id: None,
            created_at: Utc::now(),
        }
    }

    /// Records that `entity_id` received an assertion with `session_index`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidState`] once logout has started.
    pub fn add_participant(
        &mut self,
        entity_id: &str,
        session_index: Option<&str>,
    ) -> SessionResult<()> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidState {
                key: self.key.to_string(),
                state: self.state.as_str(),
                operation: "add participant",
            });
        }

        let position = self
            .service_providers
            .iter()
            .position(|sp| sp.entity_id == entity_id);
        let participant = match position {
            Some(i) => &mut self.service_providers[i],
            None => {
                self.service_providers
                    .push(ServiceProviderParticipant::new(entity_id));
                let last = self.service_providers.len() - 1;
                &mut self.service_providers[last]
            }
        };
        if let Some(index) = session_index {
            if !participant.session_indexes.iter().any(|i| i == index) {
                participant.session_indexes.push(index.to_string());
            }
        }
        Ok(())
    }

    /// Looks up a remaining participant.
    #[must_use]
    pub fn participant(&self, entity_id: &str) -> Option<&ServiceProviderParticipant> {
        self.service_providers
            .iter()
            .find(|sp| sp.entity_id == entity_id)
    }

    /// Enters `LOGGING_OUT`, recording the initiator and dropping its entry.
    ///
    /// Returns the initiator's participant entry if it had one.
    pub fn begin_logout(
        &mut self,
        initiator: Option<&str>,
        request_id: Option<&str>,
        relay_state: Option<&str>,
        saga_id: &str,
    ) -> Option<ServiceProviderParticipant> {
        self.state = SessionState::LoggingOut;
        self.logout_initiator = initiator.map(str::to_string);
        self.logout_initiating_request_id = request_id.map(str::to_string);
        self.initiator_relay_state = relay_state.map(str::to_string);
        self.saga_id = Some(saga_id.to_string());
        initiator.and_then(|id| self.remove_participant(id))
    }

    /// Removes and returns the first remaining participant.
    pub fn take_next_participant(&mut self) -> Option<ServiceProviderParticipant> {
        if self.service_providers.is_empty() {
            None
        } else {
            Some(self.service_providers.remove(0))
        }
    }

    /// Removes a participant wherever it is in the list.
    pub fn remove_participant(&mut self, entity_id: &str) -> Option<ServiceProviderParticipant> {
        let position = self
            .service_providers
            .iter()
            .position(|sp| sp.entity_id == entity_id)?;
        Some(self.service_providers.remove(position))
    }

    /// Records a partner whose logout was not confirmed.
    pub fn mark_abandoned(&mut self, entity_id: &str) {
        if !self.abandoned.iter().any(|e| e == entity_id) {
            self.abandoned.push(entity_id.to_string());
        }
    }

    /// Returns true while the logout saga runs.
    #[must_use]
    pub fn is_logging_out(&self) -> bool {
        self.state == SessionState::LoggingOut
    }

    /// Returns true if participants remain.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        !self.service_providers.is_empty()
    }
}
