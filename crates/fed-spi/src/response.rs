//! Signed adapter results.
//!
//! The payload order is `RequestID, Destination, ResultCode, ServerID`
//! followed by the optional `UID` and `Attributes`. Attributes are
//! serialized as a JSON object of name to value list and base64-encoded
//! before concatenation.

use std::collections::BTreeMap;

use base64::Engine;
use fed_crypto::PublicKey;
use fed_protocol_saml::signature::{MessageKind, PayloadFields};
use fed_protocol_saml::{SamlError, Signable, SignatureEngine, SignatureValue};

use crate::adapter::{AdapterOutcome, AdapterRequest, ResultCode};
use crate::error::{SpiError, SpiResult};

/// Result of an adapter run, signed by this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterResponse {
    /// Request this answers.
    pub request_id: String,
    /// Delivery URL.
    pub destination: String,
    /// Outcome.
    pub result_code: ResultCode,
    /// Entity ID of the signing server.
    pub server_id: String,
    /// Authenticated user.
    pub uid: Option<String>,
    /// Released attributes.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Signature over the payload.
    pub signature: Option<SignatureValue>,
}

impl AdapterResponse {
    /// Builds an unsigned response for `request`.
    #[must_use]
    pub fn from_outcome(request: &AdapterRequest, outcome: AdapterOutcome) -> Self {
        Self {
            request_id: request.request_id.clone(),
            destination: request.destination.clone(),
            result_code: outcome.result_code,
            server_id: request.server_id.clone(),
            uid: outcome.uid,
            attributes: outcome.attributes,
            signature: None,
        }
    }

    fn attribute_bytes(&self) -> Option<Vec<u8>> {
        if self.attributes.is_empty() {
            return None;
        }
        serde_json::to_vec(&self.attributes).ok()
    }

    /// Signs with the server key.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is empty or signing fails.
    pub fn sign(&mut self, engine: &SignatureEngine) -> SpiResult<()> {
        engine.sign_message(self, None)?;
        Ok(())
    }

    /// Checks the signature against `keys`.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a missing field, and
    /// [`SamlError::SignatureInvalid`] when unsigned or not verifiable.
    pub fn verify(&self, keys: &[PublicKey]) -> SpiResult<()> {
        let payload = self.signing_payload()?;
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| SamlError::SignatureInvalid("unsigned adapter response".to_string()))?;
        if SignatureEngine::verify(&payload, signature, keys) {
            Ok(())
        } else {
            Err(SamlError::SignatureInvalid(format!(
                "adapter response {} from {}",
                self.request_id, self.server_id
            ))
            .into())
        }
    }

    /// Form parameters carrying the response.
    #[must_use]
    pub fn to_parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("RequestID", self.request_id.clone()),
            ("Destination", self.destination.clone()),
            ("ResultCode", self.result_code.code().to_string()),
            ("ServerID", self.server_id.clone()),
        ];
        if let Some(uid) = &self.uid {
            params.push(("UID", uid.clone()));
        }
        if let Some(bytes) = self.attribute_bytes() {
            params.push((
                "Attributes",
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ));
        }
        if let Some(signature) = &self.signature {
            params.push(("SigAlg", signature.algorithm.uri().to_string()));
            params.push(("Signature", signature.to_base64()));
        }
        params
    }

    /// Reads a response from form parameters.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a missing or malformed field.
    pub fn from_parameters(params: &BTreeMap<String, String>) -> SpiResult<Self> {
        let field = |name: &str| {
            params
                .get(name)
                .cloned()
                .ok_or_else(|| SamlError::MissingElement(name.to_string()))
        };
        let code = field("ResultCode")?;
        let result_code = ResultCode::from_code(&code)
            .ok_or_else(|| SamlError::InvalidResponse(format!("unknown result code {code}")))?;
        let attributes = match params.get("Attributes") {
            Some(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(SamlError::from)?;
                serde_json::from_slice(&bytes).map_err(|e| {
                    SpiError::Protocol(SamlError::InvalidResponse(format!(
                        "malformed attributes: {e}"
                    )))
                })?
            }
            None => BTreeMap::new(),
        };
        let signature = match (params.get("SigAlg"), params.get("Signature")) {
            (Some(alg), Some(value)) => Some(SignatureValue::from_parts(alg, value)?),
            _ => None,
        };

        Ok(Self {
            request_id: field("RequestID")?,
            destination: field("Destination")?,
            result_code,
            server_id: field("ServerID")?,
            uid: params.get("UID").cloned(),
            attributes,
            signature,
        })
    }
}

impl Signable for AdapterResponse {
    fn kind(&self) -> MessageKind {
        MessageKind::AdapterResponse
    }

    fn signing_fields(&self) -> PayloadFields {
        let fields = PayloadFields::new()
            .text("RequestID", self.request_id.clone())
            .text("Destination", self.destination.clone())
            .text("ResultCode", self.result_code.code())
            .text("ServerID", self.server_id.clone())
            .opt_text("UID", self.uid.clone());
        match self.attribute_bytes() {
            Some(bytes) => fields.bytes("Attributes", bytes),
            None => fields,
        }
    }

    fn issuer(&self) -> &str {
        &self.server_id
    }

    fn signature(&self) -> Option<&SignatureValue> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: Option<SignatureValue>) {
        self.signature = signature;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fed_crypto::PrivateKey;
    use fed_metadata::{HttpMetadataFetcher, MetadataCache};
    use fed_trust::{TrustPolicy, TrustStore};
    use rcgen::KeyPair;

    use super::*;

    fn engine() -> SignatureEngine {
        let fetcher = HttpMetadataFetcher::new(Duration::from_secs(1)).unwrap();
        let metadata = Arc::new(MetadataCache::new(
            Vec::new(),
            Arc::new(TrustStore::new(None, None)),
            TrustPolicy::permissive(),
            Arc::new(fetcher),
        ));
        let pair = KeyPair::generate().unwrap();
        SignatureEngine::new(PrivateKey::from_der(&pair.serialize_der()).unwrap(), None, metadata)
            .unwrap()
    }

    fn response() -> AdapterResponse {
        let request = AdapterRequest {
            request_id: "req-7".to_string(),
            destination: "https://idp.example.com/adapter".to_string(),
            server_id: "https://idp.example.com".to_string(),
            level: 10,
        };
        AdapterResponse::from_outcome(
            &request,
            AdapterOutcome::success("alice").with_attribute("mail", "alice@example.com"),
        )
    }

    #[test]
    fn signed_response_verifies_and_detects_tampering() {
        let engine = engine();
        let mut response = response();
        response.sign(&engine).unwrap();
        let keys = [engine.server_public_key()];
        response.verify(&keys).unwrap();

        let mut tampered = response.clone();
        tampered.uid = Some("mallory".to_string());
        assert!(matches!(
            tampered.verify(&keys),
            Err(SpiError::Protocol(SamlError::SignatureInvalid(_)))
        ));

        let mut tampered = response;
        tampered
            .attributes
            .insert("role".to_string(), vec!["admin".to_string()]);
        assert!(tampered.verify(&keys).is_err());
    }

    #[test]
    fn missing_field_is_rejected_before_signature() {
        let engine = engine();
        let mut response = response();
        response.sign(&engine).unwrap();
        response.server_id.clear();
        assert!(matches!(
            response.verify(&[engine.server_public_key()]),
            Err(SpiError::Protocol(SamlError::MissingElement(name))) if name == "ServerID"
        ));
    }

    #[test]
    fn travels_as_form_parameters() {
        let engine = engine();
        let mut response = response();
        response.sign(&engine).unwrap();

        let params: BTreeMap<String, String> = response
            .to_parameters()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = AdapterResponse::from_parameters(&params).unwrap();
        assert_eq!(parsed, response);
        parsed.verify(&[engine.server_public_key()]).unwrap();
    }

    #[test]
    fn failed_outcome_carries_no_uid() {
        let request = AdapterRequest {
            request_id: "req-8".to_string(),
            destination: "https://idp/adapter".to_string(),
            server_id: "https://idp".to_string(),
            level: 5,
        };
        let response =
            AdapterResponse::from_outcome(&request, AdapterOutcome::failure(ResultCode::Failed));
        let payload = response.signing_payload().unwrap();
        assert_eq!(payload.as_bytes(), b"req-8https://idp/adapter1https://idp");
    }
}
