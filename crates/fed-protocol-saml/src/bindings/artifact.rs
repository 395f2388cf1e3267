//! HTTP-Artifact Binding implementation.
//!
//! The browser carries a short reference (`SAMLart`) instead of the message;
//! the receiver dereferences it with a SOAP `ArtifactResolve` call to the
//! issuer's artifact resolution endpoint.

use base64::Engine;

use crate::error::{SamlError, SamlResult};

use super::post::auto_post_form;

/// Type code of the artifacts issued here.
pub const ARTIFACT_TYPE_CODE: [u8; 2] = [0x00, 0x04];

/// Length of a decoded artifact.
pub const ARTIFACT_LENGTH: usize = 42;

/// Binary artifact: type code, SHA-1 of the issuer's resolution endpoint
/// and SHA-1 of the referenced message ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Artifact([u8; ARTIFACT_LENGTH]);

impl Artifact {
    /// Builds the artifact referencing `message_id` at `issuer_endpoint`.
    #[must_use]
    pub fn new(issuer_endpoint: &str, message_id: &str) -> Self {
        let mut bytes = [0u8; ARTIFACT_LENGTH];
        bytes[..2].copy_from_slice(&ARTIFACT_TYPE_CODE);
        bytes[2..22].copy_from_slice(&fed_crypto::sha1(issuer_endpoint.as_bytes()));
        bytes[22..].copy_from_slice(&fed_crypto::sha1(message_id.as_bytes()));
        Self(bytes)
    }

    /// Decodes the transported form.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Base64Decode`] for bad base64 and
    /// [`SamlError::InvalidRequest`] for a wrong length or type code.
    pub fn from_base64(encoded: &str) -> SamlResult<Self> {
        let raw = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        let bytes: [u8; ARTIFACT_LENGTH] = raw.as_slice().try_into().map_err(|_| {
            SamlError::InvalidRequest(format!("artifact must be {ARTIFACT_LENGTH} bytes"))
        })?;
        if bytes[..2] != ARTIFACT_TYPE_CODE {
            return Err(SamlError::InvalidRequest(format!(
                "unsupported artifact type {:02x}{:02x}",
                bytes[0], bytes[1]
            )));
        }
        Ok(Self(bytes))
    }

    /// Transported form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// SHA-1 of the issuer's resolution endpoint.
    #[must_use]
    pub fn source_id(&self) -> &[u8] {
        &self.0[2..22]
    }

    /// Returns true if the artifact was issued by `endpoint`.
    #[must_use]
    pub fn is_from(&self, endpoint: &str) -> bool {
        self.source_id() == fed_crypto::sha1(endpoint.as_bytes()).as_slice()
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ARTIFACT_LENGTH] {
        &self.0
    }
}

/// HTTP-Artifact binding encoder.
pub struct HttpArtifactBinding;

impl HttpArtifactBinding {
    /// Redirect URL carrying `artifact`.
    #[must_use]
    pub fn redirect_url(artifact: &Artifact, destination: &str, relay_state: Option<&str>) -> String {
        let separator = if destination.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{destination}{separator}SAMLart={}",
            urlencoding::encode(&artifact.to_base64())
        );
        if let Some(rs) = relay_state {
            url.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }
        url
    }

    /// Auto-submitting form carrying `artifact`.
    #[must_use]
    pub fn post_form(artifact: &Artifact, destination: &str, relay_state: Option<&str>) -> String {
        let encoded = artifact.to_base64();
        let mut fields = vec![("SAMLart", encoded.as_str())];
        if let Some(rs) = relay_state {
            fields.push(("RelayState", rs));
        }
        auto_post_form(destination, &fields)
    }
}
