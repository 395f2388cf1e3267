//! Checks every inbound message passes before it reaches the orchestrator.

use fed_protocol_saml::bindings::{DecodedMessage, SamlMessageType};
use fed_protocol_saml::{ProtocolMessage, SamlError, SamlResult, Signable};

use crate::state::AppState;

/// A message that passed every check.
#[derive(Debug, Clone)]
pub struct VerifiedMessage {
    /// The message.
    pub message: ProtocolMessage,
    /// RelayState that came with it.
    pub relay_state: Option<String>,
}

/// Parses and checks a message decoded from a front-channel binding.
///
/// A signature carried by the binding (Redirect, SimpleSign) takes the
/// place of one embedded in the message.
///
/// # Errors
///
/// Returns the first failed check: parse, issuer, signature, destination,
/// validity window, replay.
pub async fn verify_decoded(
    state: &AppState,
    decoded: DecodedMessage,
    expected_destination: &str,
) -> SamlResult<VerifiedMessage> {
    let message = ProtocolMessage::from_xml(&decoded.xml)?;
    let carried_as_request = decoded.message_type == SamlMessageType::Request;
    if message.is_request() != carried_as_request {
        return Err(SamlError::InvalidRequest(format!(
            "{} parameter does not carry a {}",
            decoded.message_type.form_param(),
            if carried_as_request { "LogoutRequest" } else { "LogoutResponse" }
        )));
    }

    check_issuer(state, message.issuer())?;
    match decoded.binding_signature()? {
        Some((payload, signature)) => {
            state
                .signer
                .verify_from(message.issuer(), &payload, &signature)
                .await?;
        }
        None => state.signer.verify_message(&message).await?,
    }
    check_message(state, &message, expected_destination).await?;

    Ok(VerifiedMessage {
        message,
        relay_state: decoded.relay_state,
    })
}

/// Checks a message that arrived with its own embedded signature, such as a
/// SOAP body or a resolved artifact.
///
/// # Errors
///
/// See [`verify_decoded`].
pub async fn verify_embedded(
    state: &AppState,
    message: &ProtocolMessage,
    expected_destination: &str,
) -> SamlResult<()> {
    check_issuer(state, message.issuer())?;
    state.signer.verify_message(message).await?;
    check_message(state, message, expected_destination).await
}

fn check_issuer(state: &AppState, issuer: &str) -> SamlResult<()> {
    if state.metadata.is_configured(issuer) {
        Ok(())
    } else {
        Err(SamlError::UnknownPartner(issuer.to_string()))
    }
}

/// Destination, validity window and replay.
async fn check_message(
    state: &AppState,
    message: &ProtocolMessage,
    expected_destination: &str,
) -> SamlResult<()> {
    let (destination, issue_instant, not_on_or_after) = match message {
        ProtocolMessage::LogoutRequest(m) => (&m.destination, m.issue_instant, m.not_on_or_after),
        ProtocolMessage::LogoutResponse(m) => (&m.destination, m.issue_instant, None),
    };
    check_destination(destination.as_deref(), expected_destination)?;
    state
        .replay
        .check(message.issuer(), message.id(), issue_instant, not_on_or_after)
        .await
}

/// An absent `Destination` is accepted; a present one must name this
/// endpoint.
pub(crate) fn check_destination(actual: Option<&str>, expected: &str) -> SamlResult<()> {
    match actual {
        Some(actual) if actual != expected => Err(SamlError::InvalidDestination {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}
