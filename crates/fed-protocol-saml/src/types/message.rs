//! Protocol messages by root element.

use super::{LogoutRequest, LogoutResponse};
use crate::error::{SamlError, SamlResult};
use crate::signature::{Signable, SignatureValue};
use crate::xml::XmlElement;

/// A logout message of either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// `LogoutRequest`.
    LogoutRequest(LogoutRequest),
    /// `LogoutResponse`.
    LogoutResponse(LogoutResponse),
}

impl ProtocolMessage {
    /// Parses a document, dispatching on its root element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] for an unsupported root and
    /// the parser's error otherwise.
    pub fn from_xml(input: &str) -> SamlResult<Self> {
        Self::from_element(&XmlElement::parse(input)?)
    }

    /// Reads a message from a parsed element.
    ///
    /// # Errors
    ///
    /// See [`ProtocolMessage::from_xml`].
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        match element.name.as_str() {
            "LogoutRequest" => LogoutRequest::from_element(element).map(Self::LogoutRequest),
            "LogoutResponse" => LogoutResponse::from_element(element).map(Self::LogoutResponse),
            other => Err(SamlError::InvalidRequest(format!(
                "unsupported message {other}"
            ))),
        }
    }

    /// Renders the message.
    #[must_use]
    pub fn to_xml(&self) -> String {
        match self {
            Self::LogoutRequest(m) => m.to_xml(),
            Self::LogoutResponse(m) => m.to_xml(),
        }
    }

    /// Message ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::LogoutRequest(m) => &m.id,
            Self::LogoutResponse(m) => &m.id,
        }
    }

    /// Returns true for requests.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self, Self::LogoutRequest(_))
    }

    /// Form and query parameter name for this message.
    #[must_use]
    pub const fn parameter_name(&self) -> &'static str {
        if self.is_request() {
            "SAMLRequest"
        } else {
            "SAMLResponse"
        }
    }

    pub(crate) fn signable(&self) -> &dyn Signable {
        match self {
            Self::LogoutRequest(m) => m,
            Self::LogoutResponse(m) => m,
        }
    }

    pub(crate) fn signable_mut(&mut self) -> &mut dyn Signable {
        match self {
            Self::LogoutRequest(m) => m,
            Self::LogoutResponse(m) => m,
        }
    }
}

impl Signable for ProtocolMessage {
    fn kind(&self) -> crate::signature::MessageKind {
        self.signable().kind()
    }

    fn signing_fields(&self) -> crate::signature::PayloadFields {
        self.signable().signing_fields()
    }

    fn issuer(&self) -> &str {
        self.signable().issuer()
    }

    fn signature(&self) -> Option<&SignatureValue> {
        self.signable().signature()
    }

    fn set_signature(&mut self, signature: Option<SignatureValue>) {
        self.signable_mut().set_signature(signature);
    }
}

impl From<LogoutRequest> for ProtocolMessage {
    fn from(request: LogoutRequest) -> Self {
        Self::LogoutRequest(request)
    }
}

impl From<LogoutResponse> for ProtocolMessage {
    fn from(response: LogoutResponse) -> Self {
        Self::LogoutResponse(response)
    }
}
