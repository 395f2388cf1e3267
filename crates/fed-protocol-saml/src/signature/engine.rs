//! Signing with local keys and verification against partner keys.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use fed_core::config::FederationConfig;
use fed_core::event::{EventType, FederationEvent};
use fed_crypto::{PrivateKey, PublicKey, SignatureAlgorithm};
use fed_metadata::MetadataCache;

use super::{Signable, SignatureValue, SigningPayload};
use crate::error::{SamlError, SamlResult};

/// Signs outbound messages and verifies inbound ones.
///
/// Outbound messages use the server key unless a partner has a key of its
/// own. Inbound messages are checked against the signing keys the partner
/// currently publishes in trusted metadata; any one of them may match, which
/// keeps verification working through a key rollover.
pub struct SignatureEngine {
    server_key: Arc<PrivateKey>,
    algorithm: SignatureAlgorithm,
    partner_keys: HashMap<String, Arc<PrivateKey>>,
    metadata: Arc<MetadataCache>,
}

impl std::fmt::Debug for SignatureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureEngine")
            .field("algorithm", &self.algorithm)
            .field("partner_keys", &self.partner_keys.len())
            .finish_non_exhaustive()
    }
}

impl SignatureEngine {
    /// Creates an engine around the server key.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if `algorithm` cannot be produced
    /// by the key.
    pub fn new(
        server_key: PrivateKey,
        algorithm: Option<SignatureAlgorithm>,
        metadata: Arc<MetadataCache>,
    ) -> SamlResult<Self> {
        let algorithm = algorithm.unwrap_or_else(|| SignatureAlgorithm::default_for(server_key.kind()));
        if !algorithm.matches_key(server_key.kind()) {
            return Err(SamlError::Configuration(format!(
                "{} does not match the server key",
                algorithm.uri()
            )));
        }
        Ok(Self {
            server_key: Arc::new(server_key),
            algorithm,
            partner_keys: HashMap::new(),
            metadata,
        })
    }

    /// Loads the server key and any partner-specific keys named in
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if a key file cannot be read or
    /// parsed, or the configured algorithm is unknown.
    pub fn from_config(config: &FederationConfig, metadata: Arc<MetadataCache>) -> SamlResult<Self> {
        let algorithm = config
            .server
            .signature_algorithm
            .as_deref()
            .map(|uri| {
                SignatureAlgorithm::from_uri(uri).ok_or_else(|| {
                    SamlError::Configuration(format!("unknown signature algorithm {uri}"))
                })
            })
            .transpose()?;

        let mut engine = Self::new(read_key(&config.server.signing_key)?, algorithm, metadata)?;
        for partner in &config.partners {
            if let Some(path) = &partner.signing_key {
                engine = engine.with_partner_key(&partner.entity_id, read_key(path)?);
                tracing::debug!(entity_id = %partner.entity_id, "Loaded partner signing key");
            }
        }
        Ok(engine)
    }

    /// Uses `key` instead of the server key for messages to `entity_id`.
    #[must_use]
    pub fn with_partner_key(mut self, entity_id: impl Into<String>, key: PrivateKey) -> Self {
        self.partner_keys.insert(entity_id.into(), Arc::new(key));
        self
    }

    /// Partner metadata used for verification.
    #[must_use]
    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    /// Key used for messages to `partner`.
    #[must_use]
    pub fn key_for(&self, partner: Option<&str>) -> &PrivateKey {
        partner
            .and_then(|p| self.partner_keys.get(p))
            .unwrap_or(&self.server_key)
    }

    /// Algorithm used for messages to `partner`.
    ///
    /// A partner key of another family falls back to that family's default.
    #[must_use]
    pub fn algorithm_for(&self, partner: Option<&str>) -> SignatureAlgorithm {
        let kind = self.key_for(partner).kind();
        if self.algorithm.matches_key(kind) {
            self.algorithm
        } else {
            SignatureAlgorithm::default_for(kind)
        }
    }

    /// Public half of the server key.
    #[must_use]
    pub fn server_public_key(&self) -> PublicKey {
        self.server_key.public_key()
    }

    /// Signs `payload` with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] on a key failure.
    pub fn sign(
        payload: &SigningPayload,
        key: &PrivateKey,
        algorithm: SignatureAlgorithm,
    ) -> SamlResult<SignatureValue> {
        let value = key.sign(algorithm, payload.as_bytes())?;
        Ok(SignatureValue { algorithm, value })
    }

    /// Signs `payload` with the key chosen for `partner`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] on a key failure.
    pub fn sign_for(
        &self,
        payload: &SigningPayload,
        partner: Option<&str>,
    ) -> SamlResult<SignatureValue> {
        Self::sign(payload, self.key_for(partner), self.algorithm_for(partner))
    }

    /// Returns true if any of `candidates` verifies `signature`.
    #[must_use]
    pub fn verify(
        payload: &SigningPayload,
        signature: &SignatureValue,
        candidates: &[PublicKey],
    ) -> bool {
        candidates
            .iter()
            .filter(|key| signature.algorithm.matches_key(key.kind()))
            .any(|key| key.verify(signature.algorithm, payload.as_bytes(), &signature.value))
    }

    /// Verifies `signature` against the keys `entity_id` currently publishes.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnknownPartner`] when the partner has no trusted
    /// metadata and [`SamlError::SignatureInvalid`] when no key matches.
    pub async fn verify_from(
        &self,
        entity_id: &str,
        payload: &SigningPayload,
        signature: &SignatureValue,
    ) -> SamlResult<()> {
        let Some(keys) = self.metadata.resolve_signing_keys(entity_id).await else {
            return Err(SamlError::UnknownPartner(entity_id.to_string()));
        };
        if Self::verify(payload, signature, &keys) {
            return Ok(());
        }

        tracing::warn!(
            entity_id = %entity_id,
            kind = ?payload.kind(),
            candidates = keys.len(),
            "Signature did not verify"
        );
        FederationEvent::builder(EventType::SignatureRejected)
            .failure("no trusted key verifies the signature")
            .partner(entity_id)
            .detail("message", format!("{:?}", payload.kind()))
            .emit();
        Err(SamlError::SignatureInvalid(format!(
            "{:?} from {entity_id}",
            payload.kind()
        )))
    }

    /// Attaches a signature to `message`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] if a required field is empty,
    /// or [`SamlError::SignatureCreation`].
    pub fn sign_message<M: Signable>(&self, message: &mut M, partner: Option<&str>) -> SamlResult<()> {
        message.set_signature(None);
        let payload = message.signing_payload()?;
        let signature = self.sign_for(&payload, partner)?;
        message.set_signature(Some(signature));
        Ok(())
    }

    /// Verifies the signature attached to `message` against its issuer.
    ///
    /// Required fields are checked before the signature is looked at.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] for an incomplete message,
    /// [`SamlError::SignatureInvalid`] if unsigned or not verifiable, and
    /// [`SamlError::UnknownPartner`] if the issuer is not trusted.
    pub async fn verify_message<M: Signable + Sync>(&self, message: &M) -> SamlResult<()> {
        let payload = message.signing_payload()?;
        let Some(signature) = message.signature() else {
            return Err(SamlError::SignatureInvalid(format!(
                "unsigned {:?} from {}",
                payload.kind(),
                message.issuer()
            )));
        };
        self.verify_from(message.issuer(), &payload, signature).await
    }
}

fn read_key(path: &Path) -> SamlResult<PrivateKey> {
    let pem = std::fs::read_to_string(path).map_err(|e| {
        SamlError::Configuration(format!("cannot read key {}: {e}", path.display()))
    })?;
    PrivateKey::from_pem(&pem)
        .map_err(|e| SamlError::Configuration(format!("invalid key {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use fed_metadata::HttpMetadataFetcher;
    use fed_trust::{TrustPolicy, TrustStore};
    use rcgen::KeyPair;

    use super::*;
    use crate::signature::{MessageKind, PayloadFields};

    fn metadata() -> Arc<MetadataCache> {
        let fetcher = HttpMetadataFetcher::new(std::time::Duration::from_secs(1)).unwrap();
        Arc::new(MetadataCache::new(
            Vec::new(),
            Arc::new(TrustStore::new(None, None)),
            TrustPolicy::permissive(),
            Arc::new(fetcher),
        ))
    }

    fn key() -> PrivateKey {
        let pair = KeyPair::generate().unwrap();
        PrivateKey::from_der(&pair.serialize_der()).unwrap()
    }

    fn payload() -> SigningPayload {
        SigningPayload::build(
            MessageKind::ArtifactResolve,
            &PayloadFields::new()
                .text("ID", "_r1")
                .text("Destination", "https://idp/saml/artifact")
                .text("IssueInstant", "2026-01-01T00:00:00Z")
                .text("Issuer", "https://sp")
                .text("Artifact", "AAQ="),
        )
        .unwrap()
    }

    #[test]
    fn verifies_with_any_published_key() {
        let engine = SignatureEngine::new(key(), None, metadata()).unwrap();
        let signature = engine.sign_for(&payload(), None).unwrap();
        assert_eq!(signature.algorithm, SignatureAlgorithm::EcdsaSha256);

        let old = key().public_key();
        let current = engine.server_public_key();
        assert!(SignatureEngine::verify(&payload(), &signature, &[old.clone(), current]));
        assert!(!SignatureEngine::verify(&payload(), &signature, &[old]));
        assert!(!SignatureEngine::verify(&payload(), &signature, &[]));
    }

    #[test]
    fn tampered_payload_fails() {
        let engine = SignatureEngine::new(key(), None, metadata()).unwrap();
        let signature = engine.sign_for(&payload(), None).unwrap();
        let tampered = SigningPayload::raw(MessageKind::ArtifactResolve, b"something else".to_vec());
        assert!(!SignatureEngine::verify(
            &tampered,
            &signature,
            &[engine.server_public_key()]
        ));
    }

    fn build(kind: MessageKind, fields: &[(&'static str, Vec<u8>)]) -> SigningPayload {
        let fields = fields
            .iter()
            .fold(PayloadFields::new(), |acc, (name, value)| acc.bytes(*name, value.clone()));
        SigningPayload::build(kind, &fields).unwrap()
    }

    fn assert_every_field_is_covered(kind: MessageKind, fields: &[(&'static str, Vec<u8>)]) {
        let engine = SignatureEngine::new(key(), None, metadata()).unwrap();
        let keys = [engine.server_public_key()];
        let signature = engine.sign_for(&build(kind, fields), None).unwrap();
        assert!(SignatureEngine::verify(&build(kind, fields), &signature, &keys));

        for index in 0..fields.len() {
            let mut altered = fields.to_vec();
            let value = &mut altered[index].1;
            let middle = value.len() / 2;
            value[middle] ^= 0x01;
            assert!(
                !SignatureEngine::verify(&build(kind, &altered), &signature, &keys),
                "{kind:?} still verifies with {} altered",
                fields[index].0
            );
        }
    }

    #[test]
    fn altering_any_logout_request_field_breaks_the_signature() {
        assert_every_field_is_covered(
            MessageKind::LogoutRequest,
            &[
                ("ID", b"_5f1c0e7a9b".to_vec()),
                ("Destination", b"https://sp.example.com/saml/slo".to_vec()),
                ("IssueInstant", b"2026-10-18T10:00:00.5Z".to_vec()),
                ("Issuer", b"https://idp.example.com".to_vec()),
                ("NameID", b"alice".to_vec()),
                ("Reason", b"urn:oasis:names:tc:SAML:2.0:logout:user".to_vec()),
                ("SessionIndex", b"idx-0".to_vec()),
                ("NotOnOrAfter", b"2026-10-18T10:05:00Z".to_vec()),
            ],
        );
    }

    #[test]
    fn altering_any_adapter_response_field_breaks_the_signature() {
        assert_every_field_is_covered(
            MessageKind::AdapterResponse,
            &[
                ("RequestID", b"req-7".to_vec()),
                ("Destination", b"https://idp.example.com/adapter/response".to_vec()),
                ("ResultCode", b"0".to_vec()),
                ("ServerID", b"adapter-1".to_vec()),
                ("UID", b"alice".to_vec()),
                ("Attributes", b"mail=alice@example.com".to_vec()),
            ],
        );
    }

    #[test]
    fn partner_key_overrides_server_key() {
        let partner_key = key();
        let partner_public = partner_key.public_key();
        let engine = SignatureEngine::new(key(), None, metadata())
            .unwrap()
            .with_partner_key("https://sp", partner_key);

        let signature = engine.sign_for(&payload(), Some("https://sp")).unwrap();
        assert!(SignatureEngine::verify(&payload(), &signature, &[partner_public]));
        assert!(!SignatureEngine::verify(
            &payload(),
            &signature,
            &[engine.server_public_key()]
        ));
    }

    #[test]
    fn mismatched_algorithm_is_rejected() {
        let result = SignatureEngine::new(key(), Some(SignatureAlgorithm::RsaSha256), metadata());
        assert!(matches!(result, Err(SamlError::Configuration(_))));
    }

    #[tokio::test]
    async fn unknown_partner_cannot_verify() {
        let engine = SignatureEngine::new(key(), None, metadata()).unwrap();
        let signature = engine.sign_for(&payload(), None).unwrap();
        let result = engine
            .verify_from("https://stranger", &payload(), &signature)
            .await;
        assert!(matches!(result, Err(SamlError::UnknownPartner(_))));
    }
}
