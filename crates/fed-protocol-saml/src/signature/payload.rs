//! Canonical signing payloads.
//!
//! A payload is the plain concatenation of a message's field values in a
//! fixed order per message kind. There is no separator. Absent optional
//! fields contribute nothing. Binary fields are base64-encoded first. The
//! order below is a wire contract with partners and must not change.

use base64::Engine;

use crate::error::{SamlError, SamlResult};

/// How a field's value becomes payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    /// UTF-8 bytes as-is.
    Plain,
    /// Standard base64 of the value's bytes.
    Base64,
    /// Each list item's UTF-8 bytes, in order.
    List,
}

/// One position in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Whether a message without it is rejected.
    pub required: bool,
    /// Encoding.
    pub encoding: FieldEncoding,
}

const fn required(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        required: true,
        encoding: FieldEncoding::Plain,
    }
}

const fn optional(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        encoding: FieldEncoding::Plain,
    }
}

const fn optional_list(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        encoding: FieldEncoding::List,
    }
}

const fn optional_base64(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        encoding: FieldEncoding::Base64,
    }
}

// Destination is optional on the SOAP binding.
const LOGOUT_REQUEST: &[FieldSpec] = &[
    required("ID"),
    optional("Destination"),
    required("IssueInstant"),
    required("Issuer"),
    required("NameID"),
    optional("Reason"),
    optional_list("SessionIndex"),
    optional("NotOnOrAfter"),
];

const LOGOUT_RESPONSE: &[FieldSpec] = &[
    required("ID"),
    optional("InResponseTo"),
    optional("Destination"),
    required("IssueInstant"),
    required("Issuer"),
    required("StatusCode"),
    optional("SubStatusCode"),
];

const ARTIFACT_RESOLVE: &[FieldSpec] = &[
    required("ID"),
    required("Destination"),
    required("IssueInstant"),
    required("Issuer"),
    required("Artifact"),
];

const ARTIFACT_RESPONSE: &[FieldSpec] = &[
    required("ID"),
    required("InResponseTo"),
    optional("Destination"),
    required("IssueInstant"),
    required("Issuer"),
    required("StatusCode"),
    optional_base64("Message"),
];

const ADAPTER_RESPONSE: &[FieldSpec] = &[
    required("RequestID"),
    required("Destination"),
    required("ResultCode"),
    required("ServerID"),
    optional("UID"),
    optional_base64("Attributes"),
];

/// Message kinds with a defined payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `LogoutRequest`.
    LogoutRequest,
    /// `LogoutResponse`.
    LogoutResponse,
    /// `ArtifactResolve`.
    ArtifactResolve,
    /// `ArtifactResponse`.
    ArtifactResponse,
    /// Result of a back-end authentication adapter.
    AdapterResponse,
}

impl MessageKind {
    /// Field layout, in payload order.
    #[must_use]
    pub const fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::LogoutRequest => LOGOUT_REQUEST,
            Self::LogoutResponse => LOGOUT_RESPONSE,
            Self::ArtifactResolve => ARTIFACT_RESOLVE,
            Self::ArtifactResponse => ARTIFACT_RESPONSE,
            Self::AdapterResponse => ADAPTER_RESPONSE,
        }
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Repeated text values.
    List(Vec<String>),
}

impl FieldValue {
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Bytes(b) => b.clone(),
            Self::List(items) => items.concat().into_bytes(),
        }
    }
}

/// Named field values collected from a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFields {
    values: Vec<(&'static str, FieldValue)>,
}

impl PayloadFields {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field.
    #[must_use]
    pub fn text(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.push((name, FieldValue::Text(value.into())));
        self
    }

    /// Adds a text field if present.
    #[must_use]
    pub fn opt_text(self, name: &'static str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.text(name, value),
            None => self,
        }
    }

    /// Adds a binary field.
    #[must_use]
    pub fn bytes(mut self, name: &'static str, value: impl Into<Vec<u8>>) -> Self {
        self.values.push((name, FieldValue::Bytes(value.into())));
        self
    }

    /// Adds a list field.
    #[must_use]
    pub fn list(mut self, name: &'static str, values: Vec<String>) -> Self {
        self.values.push((name, FieldValue::List(values)));
        self
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

/// Bytes that are signed and verified for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPayload {
    kind: MessageKind,
    bytes: Vec<u8>,
}

impl SigningPayload {
    /// Concatenates `fields` in the order `kind` defines.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] naming the first required field
    /// that is absent or empty.
    pub fn build(kind: MessageKind, fields: &PayloadFields) -> SamlResult<Self> {
        let mut bytes = Vec::new();
        for spec in kind.fields() {
            let value = fields.get(spec.name).filter(|v| !v.is_empty());
            let Some(value) = value else {
                if spec.required {
                    return Err(SamlError::MissingElement(spec.name.to_string()));
                }
                continue;
            };
            match spec.encoding {
                FieldEncoding::Plain | FieldEncoding::List => bytes.extend(value.bytes()),
                FieldEncoding::Base64 => bytes.extend(
                    base64::engine::general_purpose::STANDARD
                        .encode(value.bytes())
                        .into_bytes(),
                ),
            }
        }
        Ok(Self { kind, bytes })
    }

    /// Wraps bytes signed as-is, such as a Redirect query string.
    #[must_use]
    pub fn raw(kind: MessageKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }

    /// Message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
