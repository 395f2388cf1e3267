//! The logout saga.
//!
//! A saga owns one session from the moment logout begins until the session
//! is removed. Each step takes the next participant off the session and
//! either settles it on the spot (SOAP, skip, abandon) or hands the HTTP
//! layer a browser step and waits. Steps of one saga never overlap: every
//! entry point that advances a saga holds that saga's driver lock.
//!
//! A browser attempt is settled exactly once. The returning response and
//! the fallback deadline both start by removing the attempt from the
//! pending table; whichever gets it continues the saga.
//!
//! A saga finished by the deadline has no browser to answer the initiator
//! through. Its answer is held until the browser comes back with the late
//! response, or until `HELD_ANSWER_TTL` passes.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use fed_core::config::FederationConfig;
use fed_core::event::{EventType, FederationEvent};
use fed_metadata::{Binding, Endpoint};
use fed_protocol_saml::bindings::{
    HttpArtifactBinding, HttpPostBinding, HttpPostSimpleSignBinding, HttpRedirectBinding,
    SamlMessageType, SoapBinding,
};
use fed_protocol_saml::{
    logout_reasons, ArtifactStore, LogoutRequest, LogoutResponse, NameId, ProtocolMessage,
    SamlError, SignatureEngine,
};
use fed_session::{
    FederationSession, LogoutChannel, ServiceProviderParticipant, SessionKey, SessionStore,
};
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use crate::attempt::{AttemptKey, AttemptOutcome, LogoutAttempt};
use crate::error::{LogoutError, LogoutResult};
use crate::scheduler::{FallbackHandler, FallbackScheduler};
use crate::step::{LogoutStep, LogoutSummary};
use crate::transport::LogoutTransport;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct LogoutSettings {
    /// Issuer of outbound logout messages.
    pub entity_id: String,
    /// How long a browser attempt may take before the SOAP fallback runs.
    pub redirect_timeout: Duration,
}

impl LogoutSettings {
    /// Reads settings from the federation configuration.
    #[must_use]
    pub fn from_config(config: &FederationConfig) -> Self {
        Self {
            entity_id: config.server.entity_id.clone(),
            redirect_timeout: config.logout.redirect_timeout(),
        }
    }
}

/// How long a saga finished by the fallback deadline keeps its answer for
/// the browser.
const HELD_ANSWER_TTL: Duration = Duration::from_secs(600);

#[derive(Clone)]
struct Saga {
    session_key: SessionKey,
    driver: Arc<Mutex<()>>,
}

/// Who gets the final answer, and how.
#[derive(Debug, Clone, Default)]
struct Completion {
    initiator: Option<String>,
    request_id: Option<String>,
    relay_state: Option<String>,
    return_to: Option<String>,
    channel: LogoutChannel,
}

impl Completion {
    fn from_session(session: FederationSession) -> Self {
        Self {
            initiator: session.logout_initiator,
            request_id: session.logout_initiating_request_id,
            relay_state: session.initiator_relay_state,
            return_to: session.return_to,
            channel: session.channel,
        }
    }
}

/// Answer of a saga whose browser step timed out.
#[derive(Debug)]
struct HeldAnswer {
    partner: String,
    request_id: String,
    completion: Completion,
    summary: LogoutSummary,
    expires_at: Instant,
}

/// Runs logout sagas.
pub struct LogoutOrchestrator {
    settings: LogoutSettings,
    sessions: Arc<dyn SessionStore>,
    signer: Arc<SignatureEngine>,
    artifacts: ArtifactStore,
    transport: Arc<dyn LogoutTransport>,
    scheduler: FallbackScheduler,
    attempts: DashMap<AttemptKey, LogoutAttempt>,
    sagas: DashMap<String, Saga>,
    held: DashMap<String, HeldAnswer>,
}

impl std::fmt::Debug for LogoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutOrchestrator")
            .field("settings", &self.settings)
            .field("pending_attempts", &self.attempts.len())
            .field("active_sagas", &self.sagas.len())
            .field("held_answers", &self.held.len())
            .finish_non_exhaustive()
    }
}

impl LogoutOrchestrator {
    /// Creates the orchestrator and starts its fallback scheduler.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        settings: LogoutSettings,
        sessions: Arc<dyn SessionStore>,
        signer: Arc<SignatureEngine>,
        artifacts: ArtifactStore,
        transport: Arc<dyn LogoutTransport>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let handler: Weak<dyn FallbackHandler> = this.clone();
            Self {
                settings,
                sessions,
                signer,
                artifacts,
                transport,
                scheduler: FallbackScheduler::spawn(handler),
                attempts: DashMap::new(),
                sagas: DashMap::new(),
                held: DashMap::new(),
            }
        })
    }

    /// Browser attempts still waiting to be settled.
    #[must_use]
    pub fn pending_attempts(&self) -> usize {
        self.attempts.len()
    }

    /// Sagas that have not finished.
    #[must_use]
    pub fn active_sagas(&self) -> usize {
        self.sagas.len()
    }

    /// Answers held for browsers that have not come back.
    #[must_use]
    pub fn held_answers(&self) -> usize {
        self.held.len()
    }

    /// Looks up a pending attempt.
    #[must_use]
    pub fn attempt(&self, key: &AttemptKey) -> Option<LogoutAttempt> {
        self.attempts.get(key).map(|a| a.clone())
    }

    /// Starts logout for a request received from a partner.
    ///
    /// The session is found by the request's NameID. `channel` is the
    /// channel the request arrived on and decides how the initiator is
    /// answered. A request naming no session, or a session already logging
    /// out, is answered with success straight away.
    ///
    /// # Errors
    ///
    /// Fails only if the session store fails or the final response cannot
    /// be signed.
    pub async fn begin_from_partner(
        &self,
        request: &LogoutRequest,
        relay_state: Option<&str>,
        channel: LogoutChannel,
    ) -> LogoutResult<LogoutStep> {
        let completion = Completion {
            initiator: Some(request.issuer.clone()),
            request_id: Some(request.id.clone()),
            relay_state: relay_state.map(str::to_string),
            return_to: None,
            channel,
        };
        let session = self.sessions.find_by_name_id(&request.name_id.value).await?;
        self.begin(session, completion).await
    }

    /// Starts logout for a local session, such as a user pressing sign out.
    ///
    /// # Errors
    ///
    /// Fails only if the session store fails.
    pub async fn begin_local(
        &self,
        key: &SessionKey,
        return_to: Option<String>,
    ) -> LogoutResult<LogoutStep> {
        let completion = Completion {
            return_to,
            ..Completion::default()
        };
        let session = self.sessions.get(key).await?;
        self.begin(session, completion).await
    }

    async fn begin(
        &self,
        session: Option<FederationSession>,
        completion: Completion,
    ) -> LogoutResult<LogoutStep> {
        let Some(session) = session else {
            tracing::info!(initiator = ?completion.initiator, "Logout requested without a session");
            let mut event = FederationEvent::builder(EventType::LogoutNoSession);
            if let Some(initiator) = &completion.initiator {
                event = event.partner(initiator.clone());
            }
            event.emit();
            return self.complete(&completion, LogoutSummary::NotLoggedIn).await;
        };

        let saga_id = uuid::Uuid::now_v7().to_string();
        let (started_tx, started_rx) = oneshot::channel();
        let update = {
            let completion = completion.clone();
            let saga_id = saga_id.clone();
            Box::new(move |s: &mut FederationSession| {
                if s.is_logging_out() {
                    let _ = started_tx.send(false);
                    return;
                }
                s.begin_logout(
                    completion.initiator.as_deref(),
                    completion.request_id.as_deref(),
                    completion.relay_state.as_deref(),
                    &saga_id,
                );
                s.return_to = completion.return_to;
                s.channel = completion.channel;
                let _ = started_tx.send(true);
            })
        };
        let updated = self.sessions.modify(&session.key, update).await?;
        let started = started_rx.await.unwrap_or(false);
        let Some(updated) = updated.filter(|_| started) else {
            tracing::info!(session = %session.key, "Session already logging out or gone");
            return self.complete(&completion, LogoutSummary::NotLoggedIn).await;
        };

        self.sagas.insert(
            saga_id.clone(),
            Saga {
                session_key: updated.key.clone(),
                driver: Arc::default(),
            },
        );
        tracing::info!(
            session = %updated.key,
            saga = %saga_id,
            participants = updated.service_providers.len(),
            initiator = ?updated.logout_initiator,
            "Logout started"
        );
        let mut event = FederationEvent::builder(EventType::LogoutStarted)
            .session(updated.key.as_str())
            .detail("saga", saga_id.as_str())
            .detail("participants", updated.service_providers.len().to_string());
        if let Some(initiator) = &updated.logout_initiator {
            event = event.partner(initiator.clone());
        }
        event.emit();

        self.advance(&saga_id).await
    }

    /// Continues a saga until it needs the browser or finishes.
    ///
    /// An unknown saga, or one whose session vanished, reports
    /// [`LogoutSummary::NotLoggedIn`].
    ///
    /// # Errors
    ///
    /// Fails only if the session store fails.
    pub async fn advance(&self, saga_id: &str) -> LogoutResult<LogoutStep> {
        let Some(saga) = self.sagas.get(saga_id).map(|s| s.clone()) else {
            return Ok(LogoutStep::not_logged_in());
        };
        let _driver = saga.driver.lock().await;
        self.drive(saga_id, &saga, None).await
    }

    /// Runs the saga until it needs the browser or finishes. The caller holds
    /// the driver lock. `timed_out` is the browser attempt the deadline just
    /// settled, if that is what woke the saga.
    async fn drive(
        &self,
        saga_id: &str,
        saga: &Saga,
        timed_out: Option<&LogoutAttempt>,
    ) -> LogoutResult<LogoutStep> {
        loop {
            let (taken_tx, taken_rx) = oneshot::channel();
            let updated = self
                .sessions
                .modify(
                    &saga.session_key,
                    Box::new(move |s: &mut FederationSession| {
                        let _ = taken_tx.send(s.take_next_participant());
                    }),
                )
                .await?;
            let Some(session) = updated else {
                tracing::warn!(saga = %saga_id, session = %saga.session_key, "Session vanished during logout");
                self.sagas.remove(saga_id);
                return Ok(LogoutStep::not_logged_in());
            };
            let Some(participant) = taken_rx.await.ok().flatten() else {
                return self.finish(saga_id, &saga.session_key, timed_out).await;
            };

            if let Some(step) = self.dispatch(saga_id, &session, participant).await? {
                return Ok(step);
            }
        }
    }

    /// Settles one participant or returns the browser step that contacts it.
    async fn dispatch(
        &self,
        saga_id: &str,
        session: &FederationSession,
        participant: ServiceProviderParticipant,
    ) -> LogoutResult<Option<LogoutStep>> {
        let entity_id = participant.entity_id.as_str();
        let Some(partner) = self.signer.metadata().entity(entity_id).await else {
            self.abandon(&session.key, entity_id, "no trusted metadata").await?;
            return Ok(None);
        };
        if !partner.logout_supported {
            self.skip(&session.key, entity_id, "logout not supported");
            return Ok(None);
        }

        if session.channel == LogoutChannel::Front {
            if let Some(endpoint) = partner.front_channel_logout() {
                match self.dispatch_front(saga_id, session, &participant, endpoint).await {
                    Ok(step) => return Ok(Some(step)),
                    Err(err) => {
                        self.abandon(&session.key, entity_id, &err.to_string()).await?;
                        return Ok(None);
                    }
                }
            }
        }

        if let Some(endpoint) = partner.back_channel_logout() {
            let outcome = match self
                .soap_logout(
                    entity_id,
                    session_name_id(session),
                    &participant.session_indexes,
                    endpoint,
                )
                .await
            {
                Ok(()) => AttemptOutcome::BackchannelCompleted,
                Err(err) => AttemptOutcome::Abandoned(err.to_string()),
            };
            self.record(&session.key, entity_id, outcome).await?;
        } else if partner.front_channel_logout().is_some() {
            self.abandon(&session.key, entity_id, "browser no longer available")
                .await?;
        } else {
            self.skip(&session.key, entity_id, "no logout endpoint");
        }
        Ok(None)
    }

    async fn dispatch_front(
        &self,
        saga_id: &str,
        session: &FederationSession,
        participant: &ServiceProviderParticipant,
        endpoint: &Endpoint,
    ) -> LogoutResult<LogoutStep> {
        let name_id = session_name_id(session);
        let request = self.logout_request(
            name_id.clone(),
            &participant.session_indexes,
            &endpoint.location,
        );
        let request_id = request.id.clone();
        let step = self
            .encode_front(
                request.into(),
                endpoint.binding,
                &endpoint.location,
                Some(saga_id),
                &participant.entity_id,
            )
            .await?;

        let key = AttemptKey::new(saga_id, participant.entity_id.as_str());
        let deadline = Instant::now() + self.settings.redirect_timeout;
        self.attempts.insert(
            key.clone(),
            LogoutAttempt {
                key: key.clone(),
                session_key: session.key.clone(),
                request_id: request_id.clone(),
                binding: endpoint.binding,
                name_id,
                session_indexes: participant.session_indexes.clone(),
                dispatched_at: Utc::now(),
                deadline,
            },
        );
        if !self.scheduler.schedule(deadline, key) {
            tracing::warn!(saga = %saga_id, "Fallback scheduler is not running");
        }

        tracing::info!(
            saga = %saga_id,
            partner = %participant.entity_id,
            binding = %endpoint.binding,
            request_id = %request_id,
            "Logout request sent through the browser"
        );
        FederationEvent::builder(EventType::PartnerDispatched)
            .session(session.key.as_str())
            .partner(participant.entity_id.as_str())
            .detail("binding", endpoint.binding.uri())
            .detail("request_id", request_id)
            .emit();
        Ok(step)
    }

    /// Signs `message` for `partner` and renders it for a browser binding.
    async fn encode_front(
        &self,
        message: ProtocolMessage,
        binding: Binding,
        destination: &str,
        relay_state: Option<&str>,
        partner: &str,
    ) -> LogoutResult<LogoutStep> {
        let message_type = if message.is_request() {
            SamlMessageType::Request
        } else {
            SamlMessageType::Response
        };
        let partner = Some(partner);

        let step = match binding {
            Binding::HttpRedirect => LogoutStep::Redirect(HttpRedirectBinding::encode_signed(
                &message.to_xml(),
                destination,
                relay_state,
                message_type,
                &self.signer,
                partner,
            )?),
            Binding::HttpPostSimpleSign => {
                LogoutStep::PostForm(HttpPostSimpleSignBinding::encode_signed(
                    &message.to_xml(),
                    destination,
                    relay_state,
                    message_type,
                    &self.signer,
                    partner,
                )?)
            }
            Binding::HttpPost => {
                let mut message = message;
                self.signer.sign_message(&mut message, partner)?;
                LogoutStep::PostForm(HttpPostBinding::encode(
                    &message.to_xml(),
                    destination,
                    relay_state,
                    message_type,
                ))
            }
            Binding::HttpArtifact => {
                let mut message = message;
                self.signer.sign_message(&mut message, partner)?;
                let artifact = self.artifacts.put(&message).await?;
                LogoutStep::Redirect(HttpArtifactBinding::redirect_url(
                    &artifact,
                    destination,
                    relay_state,
                ))
            }
            Binding::Soap => {
                return Err(SamlError::UnsupportedBinding(binding.uri().to_string()).into())
            }
        };
        Ok(step)
    }

    fn logout_request(
        &self,
        name_id: NameId,
        session_indexes: &[String],
        destination: &str,
    ) -> LogoutRequest {
        LogoutRequest::new(&self.settings.entity_id, name_id)
            .with_destination(destination)
            .with_session_indexes(session_indexes.iter().cloned())
            .with_reason(logout_reasons::USER)
            .valid_for(self.settings.redirect_timeout)
    }

    /// Logs the subject out at `entity_id` over SOAP and checks the answer.
    async fn soap_logout(
        &self,
        entity_id: &str,
        name_id: NameId,
        session_indexes: &[String],
        endpoint: &Endpoint,
    ) -> LogoutResult<()> {
        let mut request = self.logout_request(name_id, session_indexes, &endpoint.location);
        self.signer.sign_message(&mut request, Some(entity_id))?;

        let reply = self
            .transport
            .call(&endpoint.location, SoapBinding::wrap(&request.to_xml()))
            .await?;
        let response = LogoutResponse::from_xml(&SoapBinding::unwrap(&reply)?)?;

        if response.issuer != entity_id {
            return Err(SamlError::InvalidResponse(format!(
                "logout answered by {} instead of {entity_id}",
                response.issuer
            ))
            .into());
        }
        self.signer.verify_message(&response).await?;
        if response.in_response_to.as_deref() != Some(request.id.as_str()) {
            return Err(
                SamlError::InvalidResponse("InResponseTo does not match".to_string()).into(),
            );
        }
        if !response.is_success() {
            return Err(LogoutError::PartnerRefused {
                entity_id: entity_id.to_string(),
                status: response.status.status_code.value,
            });
        }
        Ok(())
    }

    async fn record(
        &self,
        session_key: &SessionKey,
        entity_id: &str,
        outcome: AttemptOutcome,
    ) -> LogoutResult<()> {
        match &outcome {
            AttemptOutcome::Abandoned(reason) => self.abandon(session_key, entity_id, reason).await,
            _ => {
                tracing::info!(
                    session = %session_key,
                    partner = %entity_id,
                    outcome = outcome.as_str(),
                    "Partner logged out"
                );
                FederationEvent::builder(EventType::PartnerSettled)
                    .session(session_key.as_str())
                    .partner(entity_id)
                    .detail("outcome", outcome.as_str())
                    .emit();
                Ok(())
            }
        }
    }

    async fn abandon(
        &self,
        session_key: &SessionKey,
        entity_id: &str,
        reason: &str,
    ) -> LogoutResult<()> {
        tracing::warn!(
            session = %session_key,
            partner = %entity_id,
            reason = %reason,
            "Partner logout abandoned"
        );
        let id = entity_id.to_string();
        self.sessions
            .modify(
                session_key,
                Box::new(move |s: &mut FederationSession| s.mark_abandoned(&id)),
            )
            .await?;
        FederationEvent::builder(EventType::PartnerAbandoned)
            .failure(reason)
            .session(session_key.as_str())
            .partner(entity_id)
            .emit();
        Ok(())
    }

    fn skip(&self, session_key: &SessionKey, entity_id: &str, reason: &str) {
        tracing::info!(session = %session_key, partner = %entity_id, reason = %reason, "Partner skipped");
        FederationEvent::builder(EventType::PartnerSkipped)
            .session(session_key.as_str())
            .partner(entity_id)
            .detail("reason", reason)
            .emit();
    }

    /// Removes the session and answers whoever started the saga.
    ///
    /// When the deadline finished the saga, the answer is held for the
    /// browser instead.
    async fn finish(
        &self,
        saga_id: &str,
        session_key: &SessionKey,
        timed_out: Option<&LogoutAttempt>,
    ) -> LogoutResult<LogoutStep> {
        let removed = self.sessions.remove(session_key).await?;
        self.sagas.remove(saga_id);
        let Some(session) = removed else {
            return Ok(LogoutStep::not_logged_in());
        };

        let summary = if session.abandoned.is_empty() {
            LogoutSummary::Full
        } else {
            LogoutSummary::Partial(session.abandoned.clone())
        };
        tracing::info!(
            session = %session.key,
            saga = %saga_id,
            summary = summary.as_str(),
            abandoned = ?summary.abandoned(),
            "Logout finished"
        );
        let mut event = FederationEvent::builder(EventType::LogoutCompleted)
            .session(session.key.as_str())
            .detail("summary", summary.as_str());
        if !summary.is_complete() {
            event = event.detail("abandoned", summary.abandoned().join(","));
        }
        event.emit();

        let completion = Completion::from_session(session);
        if let Some(attempt) = timed_out {
            return Ok(self.hold_answer(saga_id, attempt, completion, summary));
        }
        self.complete(&completion, summary).await
    }

    fn hold_answer(
        &self,
        saga_id: &str,
        attempt: &LogoutAttempt,
        mut completion: Completion,
        summary: LogoutSummary,
    ) -> LogoutStep {
        let now = Instant::now();
        self.held.retain(|_, held| held.expires_at > now);

        // The saga ran on the front channel until the deadline moved it.
        completion.channel = LogoutChannel::Front;
        let step = LogoutStep::Finished {
            summary: summary.clone(),
            return_to: completion.return_to.clone(),
        };
        tracing::info!(
            saga = %saga_id,
            partner = %attempt.key.entity_id,
            "Holding the logout answer for the browser"
        );
        self.held.insert(
            saga_id.to_string(),
            HeldAnswer {
                partner: attempt.key.entity_id.clone(),
                request_id: attempt.request_id.clone(),
                completion,
                summary,
                expires_at: now + HELD_ANSWER_TTL,
            },
        );
        step
    }

    /// Builds the answer to the saga's initiator.
    async fn complete(
        &self,
        completion: &Completion,
        summary: LogoutSummary,
    ) -> LogoutResult<LogoutStep> {
        let Some(initiator) = completion.initiator.as_deref() else {
            return Ok(LogoutStep::Finished {
                summary,
                return_to: completion.return_to.clone(),
            });
        };

        let mut response = LogoutResponse::new(&self.settings.entity_id, summary.status());
        if let Some(request_id) = &completion.request_id {
            response = response.in_response_to(request_id.clone());
        }

        match completion.channel {
            LogoutChannel::Back => {
                self.signer.sign_message(&mut response, Some(initiator))?;
                Ok(LogoutStep::SoapResponse(SoapBinding::wrap(&response.to_xml())))
            }
            LogoutChannel::Front => {
                let endpoint = match self.signer.metadata().entity(initiator).await {
                    Some(partner) => partner.front_channel_logout().cloned(),
                    None => None,
                };
                let Some(endpoint) = endpoint else {
                    tracing::warn!(partner = %initiator, "No front-channel endpoint to answer the initiator");
                    return Ok(LogoutStep::Finished {
                        summary,
                        return_to: completion.return_to.clone(),
                    });
                };
                let destination = endpoint.response_url().to_string();
                let response = response.with_destination(destination.as_str());
                let encoded = self
                    .encode_front(
                        response.into(),
                        endpoint.binding,
                        &destination,
                        completion.relay_state.as_deref(),
                        initiator,
                    )
                    .await;
                match encoded {
                    Ok(step) => Ok(step),
                    Err(err) => {
                        tracing::warn!(partner = %initiator, error = %err, "Could not answer the initiator");
                        Ok(LogoutStep::Finished {
                            summary,
                            return_to: completion.return_to.clone(),
                        })
                    }
                }
            }
        }
    }

    /// Handles a partner's LogoutResponse that came back through the browser.
    ///
    /// The caller has already checked the signature and the issuer. The
    /// attempt is found by the saga ID carried in `relay_state`, or else by
    /// `InResponseTo`. A response for an attempt that is already settled, or
    /// that matches nothing, changes nothing. A late response for an attempt
    /// the deadline settled gets the saga's held answer.
    ///
    /// # Errors
    ///
    /// Fails only if the session store fails.
    pub async fn handle_response(
        &self,
        response: &LogoutResponse,
        relay_state: Option<&str>,
    ) -> LogoutResult<LogoutStep> {
        let Some(key) = self.find_attempt(response, relay_state) else {
            return self.answer_late(response, relay_state).await;
        };
        let Some((_, attempt)) = self.attempts.remove(&key) else {
            tracing::debug!(saga = %key.saga_id, partner = %key.entity_id, "Attempt already settled");
            return self.answer_late(response, relay_state).await;
        };

        let outcome = if response.is_success() {
            AttemptOutcome::RedirectCompleted
        } else {
            AttemptOutcome::Abandoned(format!("partner answered {}", response.status.status_code.value))
        };
        self.record(&attempt.session_key, &key.entity_id, outcome).await?;
        self.advance(&key.saga_id).await
    }

    /// Hands a browser that came back after the deadline the answer its saga
    /// held.
    async fn answer_late(
        &self,
        response: &LogoutResponse,
        relay_state: Option<&str>,
    ) -> LogoutResult<LogoutStep> {
        let Some(saga_id) = relay_state else {
            tracing::debug!(
                partner = %response.issuer,
                in_response_to = ?response.in_response_to,
                "LogoutResponse matches no pending attempt"
            );
            return Ok(LogoutStep::not_logged_in());
        };

        // A running fallback holds the driver until the saga finishes.
        let driver = self.sagas.get(saga_id).map(|s| s.driver.clone());
        if let Some(driver) = driver {
            drop(driver.lock().await);
        }

        let now = Instant::now();
        let held = self.held.remove_if(saga_id, |_, held| {
            held.expires_at > now
                && held.partner == response.issuer
                && response
                    .in_response_to
                    .as_deref()
                    .map_or(true, |id| id == held.request_id)
        });
        let Some((_, held)) = held else {
            tracing::debug!(
                saga = %saga_id,
                partner = %response.issuer,
                in_response_to = ?response.in_response_to,
                "LogoutResponse matches no pending attempt"
            );
            return Ok(LogoutStep::not_logged_in());
        };

        tracing::info!(
            saga = %saga_id,
            partner = %response.issuer,
            summary = held.summary.as_str(),
            "Late logout response, answering the initiator"
        );
        self.complete(&held.completion, held.summary).await
    }

    fn find_attempt(&self, response: &LogoutResponse, relay_state: Option<&str>) -> Option<AttemptKey> {
        let matches = |attempt: &LogoutAttempt| {
            response
                .in_response_to
                .as_deref()
                .map_or(true, |id| id == attempt.request_id)
        };
        if let Some(saga_id) = relay_state {
            let key = AttemptKey::new(saga_id, response.issuer.as_str());
            if let Some(attempt) = self.attempts.get(&key) {
                return matches(attempt.value()).then(|| key.clone());
            }
        }
        let in_response_to = response.in_response_to.as_deref()?;
        self.attempts
            .iter()
            .find(|a| a.request_id == in_response_to && a.key.entity_id == response.issuer)
            .map(|a| a.key.clone())
    }

    async fn fallback(&self, attempt: &LogoutAttempt) -> AttemptOutcome {
        let endpoint = match self.signer.metadata().entity(&attempt.key.entity_id).await {
            Some(partner) => partner.back_channel_logout().cloned(),
            None => None,
        };
        let Some(endpoint) = endpoint else {
            return AttemptOutcome::Abandoned("no answer and no back-channel endpoint".to_string());
        };
        match self
            .soap_logout(
                &attempt.key.entity_id,
                attempt.name_id.clone(),
                &attempt.session_indexes,
                &endpoint,
            )
            .await
        {
            Ok(()) => AttemptOutcome::BackchannelCompleted,
            Err(err) => AttemptOutcome::Abandoned(err.to_string()),
        }
    }
}

#[async_trait]
impl FallbackHandler for LogoutOrchestrator {
    /// Settles an attempt the browser did not bring back in time, then
    /// finishes the saga over the back channel.
    async fn on_deadline(&self, key: AttemptKey) {
        let Some(saga) = self.sagas.get(&key.saga_id).map(|s| s.clone()) else {
            self.attempts.remove(&key);
            return;
        };
        // Held from before the attempt is taken so a late response waits
        // for the held answer.
        let _driver = saga.driver.lock().await;
        let Some((_, attempt)) = self.attempts.remove(&key) else {
            return;
        };
        tracing::warn!(
            saga = %key.saga_id,
            partner = %key.entity_id,
            "No logout response in time, falling back to SOAP"
        );

        let outcome = self.fallback(&attempt).await;
        if let Err(err) = self.record(&attempt.session_key, &key.entity_id, outcome).await {
            tracing::warn!(saga = %key.saga_id, error = %err, "Could not record fallback outcome");
        }
        if let Err(err) = self
            .sessions
            .modify(
                &attempt.session_key,
                Box::new(|s: &mut FederationSession| s.channel = LogoutChannel::Back),
            )
            .await
        {
            tracing::warn!(saga = %key.saga_id, error = %err, "Could not switch saga to the back channel");
        }

        match self.drive(&key.saga_id, &saga, Some(&attempt)).await {
            Ok(step) => tracing::debug!(saga = %key.saga_id, step = ?step, "Saga continued after fallback"),
            Err(err) => tracing::warn!(saga = %key.saga_id, error = %err, "Saga failed after fallback"),
        }
    }
}

fn session_name_id(session: &FederationSession) -> NameId {
    NameId::new(session.name_id.clone()).with_format_uri(session.name_id_format.clone())
}

#[cfg(test)]
mod tests;
