//! Partners, metadata and a scripted SOAP peer for the crate's tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fed_cache::InMemoryCache;
use fed_core::config::{MetadataLocation, PartnerConfig, PartnerRole};
use fed_crypto::PrivateKey;
use fed_metadata::{Binding, MetadataCache, MetadataError, MetadataFetcher, MetadataResult};
use fed_protocol_saml::bindings::SoapBinding;
use fed_protocol_saml::{
    ArtifactResolve, ArtifactResponse, ArtifactStore, LogoutRequest, LogoutResponse,
    ProtocolMessage, SignatureEngine,
};
use fed_session::{FederationSession, InMemorySessionStore, SessionKey, SessionStore};
use fed_trust::{CertificateInfo, TrustPolicy, TrustStore};
use parking_lot::Mutex;
use rcgen::{date_time_ymd, CertificateParams, DistinguishedName, DnType, KeyPair};

use crate::error::{LogoutError, LogoutResult};
use crate::orchestrator::{LogoutOrchestrator, LogoutSettings};
use crate::transport::LogoutTransport;

pub const IDP: &str = "https://idp.example.com";
pub const ARTIFACT_URL: &str = "https://idp.example.com/saml/artifact";
pub const SP1: &str = "https://sp1.example.com";
pub const SP2: &str = "https://sp2.example.com";
pub const SP3: &str = "https://sp3.example.com";
pub const REDIRECT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn soap_url(entity_id: &str) -> String {
    format!("{entity_id}/slo/soap")
}

pub fn front_url(entity_id: &str) -> String {
    format!("{entity_id}/slo")
}

pub fn artifact_url(entity_id: &str) -> String {
    format!("{entity_id}/artifact")
}

/// How one partner appears in metadata and configuration.
#[derive(Debug, Clone)]
pub struct Partner {
    pub entity_id: &'static str,
    pub bindings: Vec<Binding>,
    pub logout_supported: bool,
    pub artifact_resolution: bool,
}

impl Partner {
    pub fn new(entity_id: &'static str, bindings: &[Binding]) -> Self {
        Self {
            entity_id,
            bindings: bindings.to_vec(),
            logout_supported: true,
            artifact_resolution: false,
        }
    }

    pub fn without_logout(mut self) -> Self {
        self.logout_supported = false;
        self
    }

    pub fn resolving_artifacts(mut self) -> Self {
        self.artifact_resolution = true;
        self
    }

    fn config(&self) -> PartnerConfig {
        PartnerConfig {
            entity_id: self.entity_id.to_string(),
            role: PartnerRole::Sp,
            metadata: format!("{}/metadata", self.entity_id),
            logout_supported: self.logout_supported,
            signing_key: None,
            trust: None,
        }
    }

    fn metadata(&self, cert: &CertificateInfo) -> String {
        let mut services: String = self
            .bindings
            .iter()
            .map(|binding| {
                let location = if *binding == Binding::Soap {
                    soap_url(self.entity_id)
                } else {
                    front_url(self.entity_id)
                };
                format!(
                    r#"<md:SingleLogoutService Binding="{}" Location="{location}"/>"#,
                    binding.uri()
                )
            })
            .collect();
        if self.artifact_resolution {
            services.push_str(&format!(
                r#"<md:ArtifactResolutionService Binding="{}" Location="{}" index="0"/>"#,
                Binding::Soap.uri(),
                artifact_url(self.entity_id)
            ));
        }
        format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata"
    xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="{}">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data>
      <ds:X509Certificate>{}</ds:X509Certificate>
    </ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    {services}
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
            self.entity_id,
            cert.to_base64()
        )
    }
}

#[derive(Default)]
struct StaticFetcher {
    documents: HashMap<String, String>,
}

#[async_trait]
impl MetadataFetcher for StaticFetcher {
    async fn fetch(&self, location: &MetadataLocation) -> MetadataResult<String> {
        self.documents
            .get(&location.to_string())
            .cloned()
            .ok_or_else(|| MetadataError::Fetch {
                location: location.to_string(),
                message: "connection refused".to_string(),
            })
    }
}

fn empty_metadata() -> Arc<MetadataCache> {
    Arc::new(MetadataCache::new(
        Vec::new(),
        Arc::new(TrustStore::new(None, None)),
        TrustPolicy::permissive(),
        Arc::new(StaticFetcher::default()),
    ))
}

/// Returns a key pair and its self-signed certificate.
fn credentials(cn: &str) -> (PrivateKey, CertificateInfo) {
    let pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = date_time_ymd(2090, 1, 1);
    let cert = CertificateInfo::from_der(params.self_signed(&pair).unwrap().der()).unwrap();
    (PrivateKey::from_der(&pair.serialize_der()).unwrap(), cert)
}

/// Plays every partner's SOAP endpoints.
pub struct MockPeer {
    /// Partner signer by entity ID.
    signers: HashMap<String, Arc<SignatureEngine>>,
    /// Endpoints that refuse connections.
    pub down: Mutex<HashSet<String>>,
    /// Endpoints called, in order.
    pub calls: Mutex<Vec<String>>,
    /// Messages a partner will hand out for an artifact, by base64 artifact.
    pub artifacts: Mutex<HashMap<String, ProtocolMessage>>,
}

impl MockPeer {
    pub fn signer(&self, entity_id: &str) -> Arc<SignatureEngine> {
        Arc::clone(&self.signers[entity_id])
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn owner(endpoint: &str) -> Option<&'static str> {
        [SP1, SP2, SP3]
            .into_iter()
            .find(|sp| endpoint.starts_with(&format!("{sp}/")))
    }
}

#[async_trait]
impl LogoutTransport for MockPeer {
    async fn call(&self, endpoint: &str, envelope: String) -> LogoutResult<String> {
        self.calls.lock().push(endpoint.to_string());
        if self.down.lock().contains(endpoint) {
            return Err(LogoutError::Transport {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            });
        }
        let entity_id = Self::owner(endpoint).ok_or_else(|| LogoutError::Transport {
            endpoint: endpoint.to_string(),
            message: "no such host".to_string(),
        })?;
        let signer = self.signer(entity_id);
        let body = SoapBinding::unwrap(&envelope)?;

        if body.contains("ArtifactResolve") {
            let resolve = ArtifactResolve::from_xml(&body)?;
            let message = self.artifacts.lock().remove(&resolve.artifact);
            let mut response = ArtifactResponse::new(entity_id, &resolve, message);
            signer.sign_message(&mut response, None)?;
            return Ok(SoapBinding::wrap(&response.to_xml()));
        }

        let request = LogoutRequest::from_xml(&body)?;
        let mut response = LogoutResponse::success(entity_id).in_response_to(request.id);
        signer.sign_message(&mut response, None)?;
        Ok(SoapBinding::wrap(&response.to_xml()))
    }
}

/// An orchestrator wired to in-memory stores and [`MockPeer`].
pub struct Harness {
    pub orchestrator: Arc<LogoutOrchestrator>,
    pub sessions: Arc<InMemorySessionStore>,
    pub peer: Arc<MockPeer>,
    pub signer: Arc<SignatureEngine>,
    pub artifacts: ArtifactStore,
}

impl Harness {
    pub fn new(partners: &[Partner]) -> Self {
        let mut documents = HashMap::new();
        let mut signers = HashMap::new();
        for partner in partners {
            let (key, cert) = credentials(partner.entity_id);
            documents.insert(format!("{}/metadata", partner.entity_id), partner.metadata(&cert));
            let signer = SignatureEngine::new(key, None, empty_metadata()).unwrap();
            signers.insert(partner.entity_id.to_string(), Arc::new(signer));
        }

        let metadata = Arc::new(MetadataCache::new(
            partners.iter().map(Partner::config),
            Arc::new(TrustStore::new(None, None)),
            TrustPolicy::permissive(),
            Arc::new(StaticFetcher { documents }),
        ));
        let (server_key, _) = credentials("idp.example.com");
        let signer = Arc::new(SignatureEngine::new(server_key, None, metadata).unwrap());

        let cache = Arc::new(InMemoryCache::new());
        let artifacts = ArtifactStore::new(cache.clone(), ARTIFACT_URL, Duration::from_secs(60));
        let peer = Arc::new(MockPeer {
            signers,
            down: Mutex::default(),
            calls: Mutex::default(),
            artifacts: Mutex::default(),
        });
        let sessions = Arc::new(InMemorySessionStore::new());

        let orchestrator = LogoutOrchestrator::new(
            LogoutSettings {
                entity_id: IDP.to_string(),
                redirect_timeout: REDIRECT_TIMEOUT,
            },
            sessions.clone(),
            Arc::clone(&signer),
            ArtifactStore::new(cache, ARTIFACT_URL, Duration::from_secs(60)),
            peer.clone(),
        );

        Self {
            orchestrator,
            sessions,
            peer,
            signer,
            artifacts,
        }
    }

    /// Stores a session for "alice" with the given participants.
    pub async fn session(&self, key: &str, participants: &[&str]) -> SessionKey {
        let mut session = FederationSession::new(key, "alice");
        for (i, sp) in participants.iter().enumerate() {
            session
                .add_participant(sp, Some(&format!("idx-{i}")))
                .unwrap();
        }
        self.sessions.create(session).await.unwrap();
        SessionKey::new(key)
    }

    /// Saga ID of a session that is logging out.
    pub async fn saga_id(&self, key: &SessionKey) -> String {
        self.sessions
            .get(key)
            .await
            .unwrap()
            .and_then(|s| s.saga_id)
            .unwrap()
    }
}
