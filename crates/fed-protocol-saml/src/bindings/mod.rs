//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings used for logout and
//! artifact exchange:
//!
//! - **HTTP-Redirect** - deflated, base64 and URL encoded, signed over the
//!   query string
//! - **HTTP-POST** - base64 in an auto-submitting form, signature embedded
//!   in the message
//! - **HTTP-POST-SimpleSign** - base64 in a form, signed over the raw form
//!   values
//! - **HTTP-Artifact** - a 42-byte reference dereferenced over SOAP
//! - **SOAP** - SOAP 1.1 envelopes for back-channel calls

mod artifact;
mod post;
mod redirect;
mod simple_sign;
mod soap;

pub use artifact::*;
pub use post::*;
pub use redirect::*;
pub use simple_sign::*;
pub use soap::*;

use crate::error::SamlResult;
use crate::signature::{MessageKind, SignatureValue, SigningPayload};

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// `LogoutRequest`.
    Request,
    /// `LogoutResponse`.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }

    /// Payload kind of a logout message of this type.
    #[must_use]
    pub const fn message_kind(&self) -> MessageKind {
        match self {
            Self::Request => MessageKind::LogoutRequest,
            Self::Response => MessageKind::LogoutResponse,
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// The `Signature` parameter (Redirect and SimpleSign).
    pub signature: Option<String>,
    /// The `SigAlg` parameter (Redirect and SimpleSign).
    pub sig_alg: Option<String>,
    /// The octets covered by `signature`.
    pub signed_octets: Option<String>,
}

impl DecodedMessage {
    /// Signature carried by the binding rather than the message.
    ///
    /// Returns `None` when the binding carried no `Signature` parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if `Signature` is present without `SigAlg`, or
    /// either is malformed.
    pub fn binding_signature(&self) -> SamlResult<Option<(SigningPayload, SignatureValue)>> {
        let Some(signature) = &self.signature else {
            return Ok(None);
        };
        let (Some(sig_alg), Some(octets)) = (&self.sig_alg, &self.signed_octets) else {
            return Err(crate::error::SamlError::SignatureInvalid(
                "Signature without SigAlg".to_string(),
            ));
        };
        let value = SignatureValue::from_parts(sig_alg, signature)?;
        let payload = SigningPayload::raw(self.message_type.message_kind(), octets.as_bytes());
        Ok(Some((payload, value)))
    }
}
