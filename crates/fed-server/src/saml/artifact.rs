//! Artifact resolution endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use fed_logout::LogoutResult;
use fed_protocol_saml::bindings::{Artifact, SoapBinding};
use fed_protocol_saml::{ArtifactResolve, ArtifactResponse, SamlError};

use super::inbound::check_destination;
use super::response::{soap, soap_fault};
use crate::state::AppState;

/// POST handler for `/saml/artifact`.
///
/// Any trusted partner may dereference an artifact this server issued, once.
/// An unknown, foreign or already used artifact is answered with success and
/// no message.
pub async fn artifact_resolve(State(state): State<AppState>, body: String) -> Response {
    match resolve(&state, &body).await {
        Ok(envelope) => soap(StatusCode::OK, envelope),
        Err(e) => {
            tracing::info!(error = %e, "ArtifactResolve refused");
            soap_fault(&e)
        }
    }
}

async fn resolve(state: &AppState, body: &str) -> LogoutResult<String> {
    let request = ArtifactResolve::from_xml(&SoapBinding::unwrap(body)?)?;
    if !state.metadata.is_configured(&request.issuer) {
        return Err(SamlError::UnknownPartner(request.issuer).into());
    }
    state.signer.verify_message(&request).await?;
    check_destination(request.destination.as_deref(), &state.config.artifact_url())?;
    state
        .replay
        .check(&request.issuer, &request.id, request.issue_instant, None)
        .await?;

    let artifact = Artifact::from_base64(&request.artifact)?;
    let message = if state.artifacts.issued_here(&artifact) {
        state.artifacts.take(&artifact).await?
    } else {
        None
    };
    tracing::debug!(
        partner = %request.issuer,
        found = message.is_some(),
        "Artifact dereferenced"
    );

    let mut response = ArtifactResponse::new(&state.config.server.entity_id, &request, message);
    state.signer.sign_message(&mut response, Some(&request.issuer))?;
    Ok(SoapBinding::wrap(&response.to_xml()))
}
