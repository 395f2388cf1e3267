//! Dereferencing artifacts issued by partners.

use std::sync::Arc;

use fed_core::event::{EventType, FederationEvent};
use fed_metadata::{Binding, Endpoint, ServiceType};
use fed_protocol_saml::bindings::{Artifact, SoapBinding};
use fed_protocol_saml::{ArtifactResolve, ArtifactResponse, ProtocolMessage, SamlError, SignatureEngine};

use crate::error::{LogoutError, LogoutResult};
use crate::transport::LogoutTransport;

/// Resolves an artifact received through the browser by calling back the
/// partner that issued it.
///
/// The returned message still carries its own signature; callers verify it
/// like any other inbound message.
pub struct ArtifactResolver {
    entity_id: String,
    signer: Arc<SignatureEngine>,
    transport: Arc<dyn LogoutTransport>,
}

impl std::fmt::Debug for ArtifactResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactResolver")
            .field("entity_id", &self.entity_id)
            .finish_non_exhaustive()
    }
}

impl ArtifactResolver {
    /// Creates a resolver that issues requests as `entity_id`.
    pub fn new(
        entity_id: impl Into<String>,
        signer: Arc<SignatureEngine>,
        transport: Arc<dyn LogoutTransport>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            signer,
            transport,
        }
    }

    /// Finds the configured partner whose SOAP artifact resolution endpoint
    /// issued `artifact`.
    pub async fn issuer_of(&self, artifact: &Artifact) -> Option<(String, Endpoint)> {
        let metadata = self.signer.metadata();
        let partners: Vec<String> = metadata.configured_partners().map(str::to_string).collect();
        for entity_id in partners {
            let Some(partner) = metadata.entity(&entity_id).await else {
                continue;
            };
            if let Some(endpoint) = partner.endpoint(ServiceType::ArtifactResolution, Binding::Soap) {
                if artifact.is_from(&endpoint.location) {
                    return Some((entity_id, endpoint.clone()));
                }
            }
        }
        None
    }

    /// Fetches the message behind `artifact`.
    ///
    /// # Errors
    ///
    /// Fails if no trusted partner issued the artifact, the call fails, the
    /// answer is not signed by that partner or does not answer this request,
    /// or the artifact was unknown or expired at the partner.
    pub async fn resolve(&self, artifact: &Artifact) -> LogoutResult<ProtocolMessage> {
        let (entity_id, endpoint) = self.issuer_of(artifact).await.ok_or_else(|| {
            SamlError::UnknownPartner("no trusted partner issued this artifact".to_string())
        })?;

        let mut request = ArtifactResolve::new(&self.entity_id, artifact.to_base64())
            .with_destination(&endpoint.location);
        self.signer.sign_message(&mut request, Some(&entity_id))?;

        let reply = self
            .transport
            .call(&endpoint.location, SoapBinding::wrap(&request.to_xml()))
            .await?;
        let response = ArtifactResponse::from_xml(&SoapBinding::unwrap(&reply)?)?;

        if response.issuer != entity_id {
            return Err(SamlError::InvalidResponse(format!(
                "artifact answered by {} instead of {entity_id}",
                response.issuer
            ))
            .into());
        }
        self.signer.verify_message(&response).await?;
        if response.in_response_to != request.id {
            return Err(
                SamlError::InvalidResponse("InResponseTo does not match".to_string()).into(),
            );
        }
        if !response.status.is_success() {
            return Err(LogoutError::PartnerRefused {
                entity_id,
                status: response.status.status_code.value,
            });
        }
        let message = response.message.ok_or_else(|| {
            SamlError::InvalidResponse("artifact unknown or expired".to_string())
        })?;

        tracing::debug!(partner = %entity_id, message_id = %message.id(), "Artifact resolved");
        FederationEvent::builder(EventType::ArtifactResolved)
            .partner(entity_id)
            .detail("message_id", message.id())
            .emit();
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use fed_metadata::Binding;
    use fed_protocol_saml::LogoutResponse;

    use super::*;
    use crate::testing::*;

    fn resolver(harness: &Harness) -> ArtifactResolver {
        ArtifactResolver::new(IDP, Arc::clone(&harness.signer), harness.peer.clone())
    }

    #[tokio::test]
    async fn resolves_message_from_issuing_partner() {
        let harness = Harness::new(&[
            Partner::new(SP1, &[Binding::Soap]),
            Partner::new(SP2, &[Binding::HttpRedirect]).resolving_artifacts(),
        ]);
        let mut message: ProtocolMessage = LogoutResponse::success(SP2).into();
        harness.peer.signer(SP2).sign_message(&mut message, None).unwrap();
        let artifact = Artifact::new(&artifact_url(SP2), message.id());
        harness
            .peer
            .artifacts
            .lock()
            .insert(artifact.to_base64(), message.clone());

        let resolver = resolver(&harness);
        let (issuer, _) = resolver.issuer_of(&artifact).await.unwrap();
        assert_eq!(issuer, SP2);

        let resolved = resolver.resolve(&artifact).await.unwrap();
        assert_eq!(resolved, message);
        assert_eq!(harness.peer.calls(), vec![artifact_url(SP2)]);

        // The partner hands each artifact out once.
        let again = resolver.resolve(&artifact).await;
        assert!(matches!(
            again,
            Err(LogoutError::Protocol(SamlError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn artifact_from_unknown_source_is_refused() {
        let harness = Harness::new(&[Partner::new(SP1, &[Binding::Soap]).resolving_artifacts()]);
        let artifact = Artifact::new("https://rogue.example.com/artifact", "_m1");

        let result = resolver(&harness).resolve(&artifact).await;

        assert!(matches!(
            result,
            Err(LogoutError::Protocol(SamlError::UnknownPartner(_)))
        ));
        assert!(harness.peer.calls().is_empty());
    }
}
