//! Message signatures.
//!
//! Messages are signed over a [`SigningPayload`] built from their fields.
//! POST, SOAP and Artifact messages carry the result inside
//! `<samlp:Extensions>` as a `MessageSignature` element. Redirect and
//! POST-SimpleSign messages are signed over the binding's parameter string
//! instead (see [`crate::bindings`]).

mod engine;
mod payload;

use base64::Engine;
pub use engine::SignatureEngine;
pub use fed_crypto::SignatureAlgorithm;
pub use payload::{
    FieldEncoding, FieldSpec, FieldValue, MessageKind, PayloadFields, SigningPayload,
};

use crate::error::{SamlError, SamlResult};
use crate::types::MESSAGE_SIGNATURE_NS;
use crate::xml::{escape, XmlElement};

/// A signature and the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureValue {
    /// Algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Raw signature bytes.
    pub value: Vec<u8>,
}

impl SignatureValue {
    /// Signature bytes as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.value)
    }

    /// Rebuilds a signature from its transported form.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] for an unknown algorithm URI
    /// and [`SamlError::Base64Decode`] for a malformed value.
    pub fn from_parts(algorithm_uri: &str, value_b64: &str) -> SamlResult<Self> {
        let algorithm = SignatureAlgorithm::from_uri(algorithm_uri).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("unsupported algorithm {algorithm_uri}"))
        })?;
        let compact: String = value_b64.chars().filter(|c| !c.is_whitespace()).collect();
        let value = base64::engine::general_purpose::STANDARD.decode(compact)?;
        Ok(Self { algorithm, value })
    }

    /// `<samlp:Extensions>` element carrying this signature.
    #[must_use]
    pub fn to_extensions_xml(&self) -> String {
        format!(
            r#"<samlp:Extensions><fsig:MessageSignature xmlns:fsig="{MESSAGE_SIGNATURE_NS}" Algorithm="{}">{}</fsig:MessageSignature></samlp:Extensions>"#,
            escape(self.algorithm.uri()),
            self.to_base64()
        )
    }

    /// Reads the signature from a message's `Extensions` child, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a `MessageSignature` element is present but
    /// malformed.
    pub fn from_message_element(message: &XmlElement) -> SamlResult<Option<Self>> {
        let Some(signature) = message
            .child("Extensions")
            .and_then(|ext| ext.child("MessageSignature"))
        else {
            return Ok(None);
        };
        let algorithm = signature.required_attr("Algorithm")?;
        Self::from_parts(algorithm, &signature.text).map(Some)
    }
}

/// A message with a defined signing payload.
pub trait Signable {
    /// Payload layout.
    fn kind(&self) -> MessageKind;

    /// Field values that go into the payload.
    fn signing_fields(&self) -> PayloadFields;

    /// Entity that issued the message.
    fn issuer(&self) -> &str;

    /// Attached signature.
    fn signature(&self) -> Option<&SignatureValue>;

    /// Replaces the attached signature.
    fn set_signature(&mut self, signature: Option<SignatureValue>);

    /// Builds the payload, rejecting messages without a required field.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`].
    fn signing_payload(&self) -> SamlResult<SigningPayload> {
        SigningPayload::build(self.kind(), &self.signing_fields())
    }
}
