//! SAML Logout types.
//!
//! Single Logout (SLO) request and response messages.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{NameId, Status};
use crate::error::{SamlError, SamlResult};
use crate::signature::{MessageKind, PayloadFields, Signable, SignatureValue};
use crate::types::{SAMLP_NS, SAML_NS};
use crate::xml::{self, escape, instant_text, parse_wire_instant, XmlElement};

/// SAML Logout Request.
///
/// A request to terminate an existing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the requester.
    pub issuer: String,

    /// The URL where this request was sent.
    pub destination: Option<String>,

    /// The name identifier of the principal to log out.
    pub name_id: NameId,

    /// Session indexes to terminate.
    pub session_indexes: Vec<String>,

    /// Reason for the logout.
    pub reason: Option<String>,

    /// Time after which the request is no longer valid.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// `IssueInstant` as received, when not in canonical form.
    pub issue_instant_wire: Option<String>,

    /// `NotOnOrAfter` as received, when not in canonical form.
    pub not_on_or_after_wire: Option<String>,

    /// Embedded field signature.
    pub signature: Option<SignatureValue>,
}

impl LogoutRequest {
    /// Creates a new logout request.
    #[must_use]
    pub fn new(issuer: impl Into<String>, name_id: NameId) -> Self {
        Self {
            id: xml::new_id(),
            issue_instant: xml::now(),
            issuer: issuer.into(),
            destination: None,
            name_id,
            session_indexes: Vec::new(),
            reason: None,
            not_on_or_after: None,
            issue_instant_wire: None,
            not_on_or_after_wire: None,
            signature: None,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Adds session indexes to terminate.
    #[must_use]
    pub fn with_session_indexes(mut self, indexes: impl IntoIterator<Item = String>) -> Self {
        self.session_indexes.extend(indexes);
        self
    }

    /// Sets the logout reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the validity period.
    #[must_use]
    pub fn valid_for(mut self, lifetime: Duration) -> Self {
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::zero());
        self.not_on_or_after = Some(self.issue_instant + lifetime);
        self.not_on_or_after_wire = None;
        self
    }

    /// Renders the request.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut attrs = format!(
            r#" ID="{}" Version="2.0" IssueInstant="{}""#,
            escape(&self.id),
            escape(&instant_text(&self.issue_instant, self.issue_instant_wire.as_deref()))
        );
        if let Some(destination) = &self.destination {
            attrs.push_str(&format!(r#" Destination="{}""#, escape(destination)));
        }
        if let Some(reason) = &self.reason {
            attrs.push_str(&format!(r#" Reason="{}""#, escape(reason)));
        }
        if let Some(not_on_or_after) = &self.not_on_or_after {
            attrs.push_str(&format!(
                r#" NotOnOrAfter="{}""#,
                escape(&instant_text(not_on_or_after, self.not_on_or_after_wire.as_deref()))
            ));
        }

        let extensions = self
            .signature
            .as_ref()
            .map(SignatureValue::to_extensions_xml)
            .unwrap_or_default();
        let indexes: String = self
            .session_indexes
            .iter()
            .map(|i| format!("<samlp:SessionIndex>{}</samlp:SessionIndex>", escape(i)))
            .collect();

        format!(
            r#"<samlp:LogoutRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}"{attrs}><saml:Issuer>{}</saml:Issuer>{extensions}{}{indexes}</samlp:LogoutRequest>"#,
            escape(&self.issuer),
            self.name_id.to_xml()
        )
    }

    /// Parses a request document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed XML, another root element or a missing
    /// `ID`, `IssueInstant`, `Issuer` or `NameID`.
    pub fn from_xml(input: &str) -> SamlResult<Self> {
        Self::from_element(&XmlElement::parse(input)?)
    }

    /// Reads a request from a parsed element.
    ///
    /// # Errors
    ///
    /// See [`LogoutRequest::from_xml`].
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        if element.name != "LogoutRequest" {
            return Err(SamlError::InvalidRequest(format!(
                "expected LogoutRequest, got {}",
                element.name
            )));
        }
        check_version(element)?;
        let (issue_instant, issue_instant_wire) =
            parse_wire_instant(element.required_attr("IssueInstant")?)?;
        let (not_on_or_after, not_on_or_after_wire) = match element.attr("NotOnOrAfter") {
            Some(value) => {
                let (instant, wire) = parse_wire_instant(value)?;
                (Some(instant), wire)
            }
            None => (None, None),
        };
        Ok(Self {
            id: element.required_attr("ID")?.to_string(),
            issue_instant,
            issuer: element.required_child_text("Issuer")?.to_string(),
            destination: element.attr("Destination").map(str::to_string),
            name_id: NameId::from_element(element)?,
            session_indexes: element
                .children_named("SessionIndex")
                .filter(|c| !c.text.is_empty())
                .map(|c| c.text.clone())
                .collect(),
            reason: element.attr("Reason").map(str::to_string),
            not_on_or_after,
            issue_instant_wire,
            not_on_or_after_wire,
            signature: SignatureValue::from_message_element(element)?,
        })
    }
}

impl Signable for LogoutRequest {
    fn kind(&self) -> MessageKind {
        MessageKind::LogoutRequest
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
            .text("NameID", &self.name_id.value)
            .opt_text("Reason", self.reason.as_deref())
            .list("SessionIndex", self.session_indexes.clone())
            .opt_text(
                "NotOnOrAfter",
                self.not_on_or_after
                    .as_ref()
                    .map(|t| instant_text(t, self.not_on_or_after_wire.as_deref())),
            )
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

/// SAML Logout Response.
///
/// A response to a logout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the responder.
    pub issuer: String,

    /// The ID of the request this response is for.
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,

    /// `IssueInstant` as received, when not in canonical form.
    pub issue_instant_wire: Option<String>,

    /// Embedded field signature.
    pub signature: Option<SignatureValue>,
}

impl LogoutResponse {
    /// Creates a response with the given status.
    #[must_use]
    pub fn new(issuer: impl Into<String>, status: Status) -> Self {
        Self {
            id: xml::new_id(),
            issue_instant: xml::now(),
            issuer: issuer.into(),
            in_response_to: None,
            destination: None,
            status,
            issue_instant_wire: None,
            signature: None,
        }
    }

    /// Creates a new success logout response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self::new(issuer, Status::success())
    }

    /// Sets the request this responds to.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Renders the response.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut attrs = format!(
            r#" ID="{}" Version="2.0" IssueInstant="{}""#,
            escape(&self.id),
            escape(&instant_text(&self.issue_instant, self.issue_instant_wire.as_deref()))
        );
        if let Some(in_response_to) = &self.in_response_to {
            attrs.push_str(&format!(r#" InResponseTo="{}""#, escape(in_response_to)));
        }
        if let Some(destination) = &self.destination {
            attrs.push_str(&format!(r#" Destination="{}""#, escape(destination)));
        }
        let extensions = self
            .signature
            .as_ref()
            .map(SignatureValue::to_extensions_xml)
            .unwrap_or_default();

        format!(
            r#"<samlp:LogoutResponse xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}"{attrs}><saml:Issuer>{}</saml:Issuer>{extensions}{}</samlp:LogoutResponse>"#,
            escape(&self.issuer),
            self.status.to_xml()
        )
    }

    /// Parses a response document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed XML, another root element or missing
    /// required parts.
    pub fn from_xml(input: &str) -> SamlResult<Self> {
        Self::from_element(&XmlElement::parse(input)?)
    }

    /// Reads a response from a parsed element.
    ///
    /// # Errors
    ///
    /// See [`LogoutResponse::from_xml`].
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        if element.name != "LogoutResponse" {
            return Err(SamlError::InvalidResponse(format!(
                "expected LogoutResponse, got {}",
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
            in_response_to: element.attr("InResponseTo").map(str::to_string),
            destination: element.attr("Destination").map(str::to_string),
            status: Status::from_element(element)?,
            issue_instant_wire,
            signature: SignatureValue::from_message_element(element)?,
        })
    }
}

impl Signable for LogoutResponse {
    fn kind(&self) -> MessageKind {
        MessageKind::LogoutResponse
    }

    fn signing_fields(&self) -> PayloadFields {
        PayloadFields::new()
            .text("ID", &self.id)
            .opt_text("InResponseTo", self.in_response_to.as_deref())
            .opt_text("Destination", self.destination.as_deref())
            .text(
                "IssueInstant",
                instant_text(&self.issue_instant, self.issue_instant_wire.as_deref()),
            )
            .text("Issuer", &self.issuer)
            .text("StatusCode", &self.status.status_code.value)
            .opt_text("SubStatusCode", self.status.status_code.sub_status_value())
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

pub(crate) fn check_version(element: &XmlElement) -> SamlResult<()> {
    match element.attr("Version") {
        None | Some("2.0") => Ok(()),
        Some(other) => Err(SamlError::InvalidRequest(format!(
            "unsupported SAML version {other}"
        ))),
    }
}
