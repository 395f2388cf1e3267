//! HTTP-POST-SimpleSign Binding implementation.
//!
//! Like HTTP-POST, but the signature travels as `SigAlg` and `Signature`
//! form fields computed over `SAMLRequest=…[&RelayState=…]&SigAlg=…` built
//! from the form values as posted (not URL-encoded).

use base64::Engine;

use crate::error::SamlResult;
use crate::signature::{SignatureEngine, SigningPayload};

use super::post::{auto_post_form, decode_base64_xml, select_message};
use super::{DecodedMessage, SamlMessageType};

/// HTTP-POST-SimpleSign binding encoder/decoder.
pub struct HttpPostSimpleSignBinding;

impl HttpPostSimpleSignBinding {
    /// Encodes and signs a message as an auto-submitting HTML form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SamlError::SignatureCreation`] if signing
    /// fails.
    pub fn encode_signed(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        engine: &SignatureEngine,
        partner: Option<&str>,
    ) -> SamlResult<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);
        let algorithm = engine.algorithm_for(partner);
        let octets = signed_octets(message_type, &encoded, relay_state, algorithm.uri());
        let payload = SigningPayload::raw(message_type.message_kind(), octets.into_bytes());
        let signature = SignatureEngine::sign(&payload, engine.key_for(partner), algorithm)?;
        let signature = signature.to_base64();

        let mut fields = vec![(message_type.form_param(), encoded.as_str())];
        if let Some(rs) = relay_state {
            fields.push(("RelayState", rs));
        }
        fields.push(("SigAlg", algorithm.uri()));
        fields.push(("Signature", signature.as_str()));
        Ok(auto_post_form(destination, &fields))
    }

    /// Decodes posted form values.
    ///
    /// # Errors
    ///
    /// Returns an error if neither message parameter is present or the value
    /// is not base64-encoded UTF-8.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
        sig_alg: Option<&str>,
        signature: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = select_message(saml_request, saml_response)?;
        Ok(DecodedMessage {
            xml: decode_base64_xml(encoded)?,
            message_type,
            relay_state: relay_state.map(String::from),
            signature: signature.map(String::from),
            sig_alg: sig_alg.map(String::from),
            signed_octets: sig_alg
                .map(|alg| signed_octets(message_type, encoded, relay_state, alg)),
        })
    }
}

fn signed_octets(
    message_type: SamlMessageType,
    encoded: &str,
    relay_state: Option<&str>,
    sig_alg: &str,
) -> String {
    let mut octets = format!("{}={encoded}", message_type.form_param());
    if let Some(rs) = relay_state {
        octets.push_str(&format!("&RelayState={rs}"));
    }
    octets.push_str(&format!("&SigAlg={sig_alg}"));
    octets
}
