//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST. Messages sent this way carry their signature inside
//! the XML.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::xml::MAX_MESSAGE_SIZE;

use super::{DecodedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a message as an auto-submitting HTML form.
    #[must_use]
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);
        let mut fields = vec![(message_type.form_param(), encoded.as_str())];
        if let Some(rs) = relay_state {
            fields.push(("RelayState", rs));
        }
        auto_post_form(destination, &fields)
    }

    /// Decodes a SAML message from HTTP-POST form data.
    ///
    /// # Arguments
    ///
    /// * `saml_request` - The SAMLRequest parameter value (if present)
    /// * `saml_response` - The SAMLResponse parameter value (if present)
    /// * `relay_state` - The RelayState parameter value (if present)
    ///
    /// # Errors
    ///
    /// Returns an error if neither message parameter is present or the value
    /// is not base64-encoded UTF-8.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = select_message(saml_request, saml_response)?;
        Ok(DecodedMessage {
            xml: decode_base64_xml(encoded)?,
            message_type,
            relay_state: relay_state.map(String::from),
            signature: None,
            sig_alg: None,
            signed_octets: None,
        })
    }
}

pub(crate) fn select_message<'a>(
    saml_request: Option<&'a str>,
    saml_response: Option<&'a str>,
) -> SamlResult<(&'a str, SamlMessageType)> {
    if let Some(req) = saml_request {
        Ok((req, SamlMessageType::Request))
    } else if let Some(resp) = saml_response {
        Ok((resp, SamlMessageType::Response))
    } else {
        Err(SamlError::InvalidRequest(
            "No SAMLRequest or SAMLResponse parameter".to_string(),
        ))
    }
}

pub(crate) fn decode_base64_xml(encoded: &str) -> SamlResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() > MAX_MESSAGE_SIZE * 4 / 3 + 4 {
        return Err(SamlError::InvalidRequest("message too large".to_string()));
    }
    let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
    String::from_utf8(decoded)
        .map_err(|e| SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}")))
}

/// Builds an HTML page whose form posts `fields` to `destination` on load.
#[must_use]
pub fn auto_post_form(destination: &str, fields: &[(&str, &str)]) -> String {
    let inputs: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                r#"
        <input type="hidden" name="{}" value="{}"/>"#,
                html_escape(name),
                html_escape(value)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">{inputs}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
        html_escape(destination)
    )
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
