//! Artifact resolution messages.

use chrono::{DateTime, Utc};

use super::{ProtocolMessage, Status};
use crate::error::{SamlError, SamlResult};
use crate::signature::{MessageKind, PayloadFields, Signable, SignatureValue};
use crate::types::logout::check_version;
use crate::types::{SAMLP_NS, SAML_NS};
use crate::xml::{self, escape, instant_text, parse_wire_instant, XmlElement};

/// Request to dereference an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactResolve {
    /// Unique identifier.
    pub id: String,
    /// Issue time.
    pub issue_instant: DateTime<Utc>,
    /// Requesting entity.
    pub issuer: String,
    /// Resolution endpoint.
    pub destination: Option<String>,
    /// Base64 artifact.
    pub artifact: String,
    /// `IssueInstant` as received, when not in canonical form.
    pub issue_instant_wire: Option<String>,
    /// Embedded field signature.
    pub signature: Option<SignatureValue>,
}

impl ArtifactResolve {
    /// Creates a resolve request for `artifact`.
    #[must_use]
    pub fn new(issuer: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            id: xml::new_id(),
            issue_instant: xml::now(),
            issuer: issuer.into(),
            destination: None,
            artifact: artifact.into(),
            issue_instant_wire: None,
            signature: None,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Renders the request.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let destination = self
            .destination
            .as_deref()
            .map(|d| format!(r#" Destination="{}""#, escape(d)))
            .unwrap_or_default();
        let extensions = self
            .signature
            .as_ref()
            .map(SignatureValue::to_extensions_xml)
            .unwrap_or_default();
        format!(
            r#"<samlp:ArtifactResolve xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="2.0" IssueInstant="{}"{destination}><saml:Issuer>{}</saml:Issuer>{extensions}<samlp:Artifact>{}</samlp:Artifact></samlp:ArtifactResolve>"#,
            escape(&self.id),
            escape(&instant_text(&self.issue_instant, self.issue_instant_wire.as_deref())),
            escape(&self.issuer),
            escape(&self.artifact)
        )
    }

    /// Parses a resolve request.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed XML or missing parts.
    pub fn from_xml(input: &str) -> SamlResult<Self> {
        Self::from_element(&XmlElement::parse(input)?)
    }

    /// Reads a resolve request from a parsed element.
    ///
    /// # Errors
    ///
    /// Returns an error for another root element or a missing part.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        if element.name != "ArtifactResolve" {
            return Err(SamlError::InvalidRequest(format!(
                "expected ArtifactResolve, got {}",
                element.name
            )));
        }
        check_version(element)?;
        let (issue_instant, issue_instant_wire) =
            parse_wire_instant(element.required_attr("IssueInstant")?)?;
        Ok(Self {
            id: element.required_attr("ID")?.to_string(),
            issue_instant,
            issuer: element.required_child_text("Issuer")?.to_string(),
            destination: element.attr("Destination").map(str::to_string),
            artifact: element.required_child_text("Artifact")?.to_string(),
            issue_instant_wire,
            signature: SignatureValue::from_message_element(element)?,
        })
    }
}

impl Signable for ArtifactResolve {
    fn kind(&self) -> MessageKind {
        MessageKind::ArtifactResolve
    }

    fn signing_fields(&self) -> PayloadFields {
        PayloadFields::new()
            .text("ID", &self.id)
            .opt_text("Destination", self.destination.as_deref())
            .text(
                "IssueInstant",
                instant_text(&self.issue_instant, self.issue_instant_wire.as_deref()),
            )
            .text("Issuer", &self.issuer)
            .text("Artifact", &self.artifact)
    }

    fn issuer(&self) -> &str {
        &self.issuer
    }

    fn signature(&self) -> Option<&SignatureValue> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: Option<SignatureValue>) {
        self.signature = signature;
    }
}

/// Answer to an [`ArtifactResolve`], carrying the referenced message.
///
/// A success status with no message means the artifact was unknown or had
/// expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactResponse {
    /// Unique identifier.
    pub id: String,
    /// The resolve request answered.
    pub in_response_to: String,
    /// Requesting party's endpoint, if known.
    pub destination: Option<String>,
    /// Issue time.
    pub issue_instant: DateTime<Utc>,
    /// Responding entity.
    pub issuer: String,
    /// Status.
    pub status: Status,
    /// Dereferenced message.
    pub message: Option<ProtocolMessage>,
    /// `IssueInstant` as received, when not in canonical form.
    pub issue_instant_wire: Option<String>,
    /// Embedded field signature.
    pub signature: Option<SignatureValue>,
}

impl ArtifactResponse {
    /// Answers `request` with `message`.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        request: &ArtifactResolve,
        message: Option<ProtocolMessage>,
    ) -> Self {
        Self {
            id: xml::new_id(),
            in_response_to: request.id.clone(),
            destination: None,
            issue_instant: xml::now(),
            issuer: issuer.into(),
            status: Status::success(),
            message,
            issue_instant_wire: None,
            signature: None,
        }
    }

    /// Renders the response.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let destination = self
            .destination
            .as_deref()
            .map(|d| format!(r#" Destination="{}""#, escape(d)))
            .unwrap_or_default();
        let extensions = self
            .signature
            .as_ref()
            .map(SignatureValue::to_extensions_xml)
            .unwrap_or_default();
        let message = self
            .message
            .as_ref()
            .map(ProtocolMessage::to_xml)
            .unwrap_or_default();
        format!(
            r#"<samlp:ArtifactResponse xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" InResponseTo="{}" Version="2.0" IssueInstant="{}"{destination}><saml:Issuer>{}</saml:Issuer>{extensions}{}{message}</samlp:ArtifactResponse>"#,
            escape(&self.id),
            escape(&self.in_response_to),
            escape(&instant_text(&self.issue_instant, self.issue_instant_wire.as_deref())),
            escape(&self.issuer),
            self.status.to_xml()
        )
    }

    /// Parses a response document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed XML or missing parts.
    pub fn from_xml(input: &str) -> SamlResult<Self> {
        Self::from_element(&XmlElement::parse(input)?)
    }

    /// Reads a response from a parsed element.
    ///
    /// # Errors
    ///
    /// See [`ArtifactResponse::from_xml`].
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        if element.name != "ArtifactResponse" {
            return Err(SamlError::InvalidResponse(format!(
                "expected ArtifactResponse, got {}",
                element.name
            )));
        }
        check_version(element)?;
        let message = element
            .children
            .iter()
            .find(|c| matches!(c.name.as_str(), "LogoutRequest" | "LogoutResponse"))
            .map(ProtocolMessage::from_element)
            .transpose()?;
        let (issue_instant, issue_instant_wire) =
            parse_wire_instant(element.required_attr("IssueInstant")?)?;
        Ok(Self {
            id: element.required_attr("ID")?.to_string(),
            in_response_to: element.required_attr("InResponseTo")?.to_string(),
            destination: element.attr("Destination").map(str::to_string),
            issue_instant,
            issuer: element.required_child_text("Issuer")?.to_string(),
            status: Status::from_element(element)?,
            message,
            issue_instant_wire,
            signature: SignatureValue::from_message_element(element)?,
        })
    }
}

impl Signable for ArtifactResponse {
    fn kind(&self) -> MessageKind {
        MessageKind::ArtifactResponse
    }

    fn signing_fields(&self) -> PayloadFields {
        let fields = PayloadFields::new()
            .text("ID", &self.id)
            .text("InResponseTo", &self.in_response_to)
            .opt_text("Destination", self.destination.as_deref())
            .text(
                "IssueInstant",
                instant_text(&self.issue_instant, self.issue_instant_wire.as_deref()),
            )
            .text("Issuer", &self.issuer)
            .text("StatusCode", &self.status.status_code.value);
        match &self.message {
            Some(message) => fields.bytes("Message", message.to_xml().into_bytes()),
            None => fields,
        }
    }

    fn issuer(&self) -> &str {
        &self.issuer
    }

    fn signature(&self) -> Option<&SignatureValue> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: Option<SignatureValue>) {
        self.signature = signature;
    }
}
