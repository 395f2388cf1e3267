//! Single Logout Service endpoints.
//!
//! Front-channel requests and responses arrive on `/saml/slo` in any of the
//! front-channel bindings. Back-channel requests arrive as SOAP on
//! `/saml/slo/soap`. `/saml/logout` starts logout for a local session.

use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Form;
use fed_logout::{LogoutError, LogoutResult, LogoutStep};
use fed_protocol_saml::bindings::{
    Artifact, HttpPostBinding, HttpPostSimpleSignBinding, HttpRedirectBinding, SoapBinding,
};
use fed_protocol_saml::{LogoutRequest, LogoutResponse, ProtocolMessage, SamlError, Status};
use fed_session::{LogoutChannel, SessionKey};
use serde::Deserialize;

use super::inbound::{verify_decoded, verify_embedded, VerifiedMessage};
use super::response::{browser_step, error_page, soap, soap_fault};
use crate::state::AppState;

/// Parameters of a front-channel message, from the query string or a form.
#[derive(Debug, Default, Deserialize)]
pub struct SloParams {
    /// Logout request (base64; deflated for Redirect).
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,

    /// Logout response (base64; deflated for Redirect).
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,

    /// Artifact standing in for either.
    #[serde(rename = "SAMLart")]
    pub saml_art: Option<String>,

    /// Relay state.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,

    /// Signature algorithm (Redirect, SimpleSign).
    #[serde(rename = "SigAlg")]
    pub sig_alg: Option<String>,

    /// Signature (Redirect, SimpleSign).
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
}

/// Query parameters for a locally started logout.
#[derive(Debug, Deserialize)]
pub struct LocalLogoutParams {
    /// Session key.
    pub session: String,

    /// Where to send the browser afterwards.
    pub return_to: Option<String>,
}

/// GET handler for `/saml/slo` (HTTP-Redirect and HTTP-Artifact).
pub async fn slo_redirect(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    Query(params): Query<SloParams>,
) -> Response {
    match handle_redirect(&state, raw.as_deref(), params).await {
        Ok(step) => browser_step(step),
        Err(e) => error_page(&e),
    }
}

async fn handle_redirect(
    state: &AppState,
    raw_query: Option<&str>,
    params: SloParams,
) -> LogoutResult<LogoutStep> {
    let inbound = match params.saml_art {
        Some(art) => resolve_artifact(state, &art, params.relay_state).await?,
        None => {
            let decoded = HttpRedirectBinding::decode_query(raw_query.unwrap_or_default())?;
            verify_decoded(state, decoded, &state.config.slo_url()).await?
        }
    };
    handle_front(state, inbound).await
}

/// POST handler for `/saml/slo` (HTTP-POST, HTTP-POST-SimpleSign and
/// HTTP-Artifact).
pub async fn slo_post(State(state): State<AppState>, Form(form): Form<SloParams>) -> Response {
    match handle_post(&state, form).await {
        Ok(step) => browser_step(step),
        Err(e) => error_page(&e),
    }
}

async fn handle_post(state: &AppState, form: SloParams) -> LogoutResult<LogoutStep> {
    if let Some(art) = &form.saml_art {
        let inbound = resolve_artifact(state, art, form.relay_state).await?;
        return handle_front(state, inbound).await;
    }

    let decoded = if form.sig_alg.is_some() || form.signature.is_some() {
        HttpPostSimpleSignBinding::decode(
            form.saml_request.as_deref(),
            form.saml_response.as_deref(),
            form.relay_state.as_deref(),
            form.sig_alg.as_deref(),
            form.signature.as_deref(),
        )?
    } else {
        HttpPostBinding::decode(
            form.saml_request.as_deref(),
            form.saml_response.as_deref(),
            form.relay_state.as_deref(),
        )?
    };
    let inbound = verify_decoded(state, decoded, &state.config.slo_url()).await?;
    handle_front(state, inbound).await
}

/// Dereferences an artifact and checks the message behind it.
async fn resolve_artifact(
    state: &AppState,
    encoded: &str,
    relay_state: Option<String>,
) -> LogoutResult<VerifiedMessage> {
    let artifact = Artifact::from_base64(encoded)?;
    let message = state.resolver.resolve(&artifact).await?;
    verify_embedded(state, &message, &state.config.slo_url()).await?;
    Ok(VerifiedMessage {
        message,
        relay_state,
    })
}

async fn handle_front(state: &AppState, inbound: VerifiedMessage) -> LogoutResult<LogoutStep> {
    let relay_state = inbound.relay_state.as_deref();
    match inbound.message {
        ProtocolMessage::LogoutRequest(request) => {
            tracing::info!(
                partner = %request.issuer,
                request_id = %request.id,
                "Front-channel logout requested"
            );
            state
                .orchestrator
                .begin_from_partner(&request, relay_state, LogoutChannel::Front)
                .await
        }
        ProtocolMessage::LogoutResponse(response) => {
            state.orchestrator.handle_response(&response, relay_state).await
        }
    }
}

/// POST handler for `/saml/slo/soap`.
///
/// A body that is not a logout request gets a SOAP fault. A logout request
/// that fails a check gets a signed `LogoutResponse` carrying the matching
/// status.
pub async fn slo_soap(State(state): State<AppState>, body: String) -> Response {
    let request = match SoapBinding::unwrap(&body).and_then(|xml| LogoutRequest::from_xml(&xml)) {
        Ok(request) => request,
        Err(e) => return soap_fault(&e.into()),
    };

    match handle_soap(&state, &request).await {
        Ok(LogoutStep::SoapResponse(envelope)) => soap(StatusCode::OK, envelope),
        Ok(step) => {
            tracing::error!(?step, "SOAP logout finished without a SOAP answer");
            soap_fault(&LogoutError::Internal("no response to send".to_string()))
        }
        Err(err) => refuse_soap(&state, &request, &err),
    }
}

async fn handle_soap(state: &AppState, request: &LogoutRequest) -> LogoutResult<LogoutStep> {
    let message = ProtocolMessage::LogoutRequest(request.clone());
    verify_embedded(state, &message, &state.config.slo_soap_url()).await?;
    tracing::info!(
        partner = %request.issuer,
        request_id = %request.id,
        "Back-channel logout requested"
    );
    state
        .orchestrator
        .begin_from_partner(request, None, LogoutChannel::Back)
        .await
}

fn refuse_soap(state: &AppState, request: &LogoutRequest, err: &LogoutError) -> Response {
    tracing::info!(partner = %request.issuer, error = %err, "Back-channel logout refused");
    let status = match err {
        LogoutError::Protocol(e) => Status::from_error(e),
        other => Status::responder_error(other.to_string()),
    };
    let mut response =
        LogoutResponse::new(&state.config.server.entity_id, status).in_response_to(&request.id);
    match state.signer.sign_message(&mut response, Some(&request.issuer)) {
        Ok(()) => soap(StatusCode::OK, SoapBinding::wrap(&response.to_xml())),
        Err(e) => soap_fault(&e.into()),
    }
}

/// GET handler for `/saml/logout`.
pub async fn local_logout(
    State(state): State<AppState>,
    Query(params): Query<LocalLogoutParams>,
) -> Response {
    if let Some(url) = &params.return_to {
        if !is_local_url(&state.config.server.base_url, url) {
            let err = SamlError::InvalidRequest(format!("return_to {url} is not on this server"));
            return error_page(&err.into());
        }
    }

    let key = SessionKey::new(params.session);
    match state.orchestrator.begin_local(&key, params.return_to).await {
        Ok(step) => browser_step(step),
        Err(e) => error_page(&e),
    }
}

/// True for a path on this server or an absolute URL under `base_url`.
fn is_local_url(base_url: &str, url: &str) -> bool {
    if url.starts_with('/') {
        return !url.starts_with("//") && !url.starts_with("/\\");
    }
    let base = base_url.trim_end_matches('/');
    url.strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
}
