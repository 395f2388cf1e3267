//! Common test utilities and fixtures.
//!
//! [`TestEnv`] starts the real server on an ephemeral port next to a mock
//! service provider. Keys, certificates, partner metadata, the trust store
//! and the federation file are generated into a temporary directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use fed_crypto::PrivateKey;
use fed_metadata::{Binding, HttpMetadataFetcher, MetadataCache};
use fed_protocol_saml::bindings::SoapBinding;
use fed_protocol_saml::{LogoutRequest, LogoutResponse, NameId, SignatureEngine};
use fed_server::{AppState, Server, ServerConfig};
use fed_session::{FederationSession, SessionKey, SessionStore};
use fed_trust::{encode_bundle, CertificateInfo, TrustPolicy, TrustStore};
use parking_lot::Mutex;
use rcgen::{date_time_ymd, CertificateParams, DistinguishedName, DnType, KeyPair};
use reqwest::Client;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Entity ID of the server under test.
pub const IDP: &str = "https://idp.test";

/// Service provider answering logout over SOAP.
pub const SOAP_SP: &str = "soap";
/// Service provider whose SOAP endpoint refuses connections.
pub const DOWN_SP: &str = "down";
/// Service provider with a Redirect endpoint and a SOAP fallback.
pub const BROWSER_SP: &str = "browser";
/// Service provider reached through the Artifact binding.
pub const ARTIFACT_SP: &str = "artifact";

/// A service provider known to the server.
pub struct Partner {
    /// Entity ID.
    pub entity_id: String,
    /// Signs what the partner sends.
    pub signer: Arc<SignatureEngine>,
    certificate: CertificateInfo,
    endpoints: Vec<(Binding, String)>,
}

impl Partner {
    fn metadata_xml(&self) -> String {
        let services: String = self
            .endpoints
            .iter()
            .map(|(binding, location)| {
                format!(
                    r#"<md:SingleLogoutService Binding="{}" Location="{location}"/>"#,
                    binding.uri()
                )
            })
            .collect();
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
            self.certificate.to_base64()
        )
    }
}

/// Plays the SOAP endpoints of every partner.
#[derive(Default)]
pub struct MockSp {
    partners: HashMap<String, (String, Arc<SignatureEngine>)>,
    calls: Mutex<Vec<String>>,
}

impl MockSp {
    /// Names of the partners called over SOAP, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

async fn mock_soap_logout(
    State(mock): State<Arc<MockSp>>,
    UrlPath(name): UrlPath<String>,
    body: String,
) -> (StatusCode, String) {
    mock.calls.lock().push(name.clone());
    let Some((entity_id, signer)) = mock.partners.get(&name) else {
        return (StatusCode::NOT_FOUND, String::new());
    };
    let request = match SoapBinding::unwrap(&body).and_then(|xml| LogoutRequest::from_xml(&xml)) {
        Ok(request) => request,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, SoapBinding::fault(false, &e.to_string())),
    };
    let mut response = LogoutResponse::success(entity_id.as_str()).in_response_to(request.id);
    if let Err(e) = signer.sign_message(&mut response, None) {
        return (StatusCode::INTERNAL_SERVER_ERROR, SoapBinding::fault(true, &e.to_string()));
    }
    (StatusCode::OK, SoapBinding::wrap(&response.to_xml()))
}

/// Test environment running the server and a mock service provider.
pub struct TestEnv {
    /// Base URL of the running server.
    pub base_url: String,
    /// HTTP client that does not follow redirects.
    pub client: Client,
    /// The server's shared state.
    pub state: AppState,
    /// Partners by short name.
    pub partners: HashMap<&'static str, Partner>,
    /// The mock service provider.
    pub mock: Arc<MockSp>,
    _dir: TempDir,
    _shutdown_tx: oneshot::Sender<()>,
}

impl TestEnv {
    /// Starts a server federated with every test partner.
    pub async fn new() -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("fed_server=debug,fed_logout=debug,audit=info")
            .try_init();

        let dir = tempfile::tempdir()?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let sp_listener = TcpListener::bind("127.0.0.1:0").await?;
        let sp_url = format!("http://{}", sp_listener.local_addr()?);
        let closed = std::net::TcpListener::bind("127.0.0.1:0")?;
        let down_url = format!("http://{}", closed.local_addr()?);
        drop(closed);

        let soap = |name: &str| (Binding::Soap, format!("{sp_url}/{name}/slo/soap"));
        let specs = [
            (SOAP_SP, vec![soap(SOAP_SP)]),
            (DOWN_SP, vec![(Binding::Soap, format!("{down_url}/slo/soap"))]),
            (
                BROWSER_SP,
                vec![
                    (Binding::HttpRedirect, format!("{sp_url}/{BROWSER_SP}/slo")),
                    soap(BROWSER_SP),
                ],
            ),
            (
                ARTIFACT_SP,
                vec![(Binding::HttpArtifact, format!("{sp_url}/{ARTIFACT_SP}/slo"))],
            ),
        ];

        let mut partners = HashMap::new();
        let mut mock = MockSp::default();
        for (name, endpoints) in specs {
            let partner = new_partner(name, endpoints)?;
            std::fs::write(dir.path().join(format!("{name}.xml")), partner.metadata_xml())?;
            mock.partners.insert(
                name.to_string(),
                (partner.entity_id.clone(), Arc::clone(&partner.signer)),
            );
            partners.insert(name, partner);
        }
        let mock = Arc::new(mock);

        let trust: Vec<(String, Vec<u8>)> = partners
            .iter()
            .flat_map(|(name, partner)| {
                let der = partner.certificate.der().to_vec();
                [(format!("signing_{name}"), der.clone()), (format!("ca_{name}"), der)]
            })
            .collect();
        let entries: Vec<(&str, &[u8])> = trust
            .iter()
            .map(|(alias, der)| (alias.as_str(), der.as_slice()))
            .collect();
        std::fs::write(dir.path().join("trust.pem"), encode_bundle(&entries, None))?;

        let (idp_key, idp_cert) = credentials("idp.test")?;
        std::fs::write(dir.path().join("idp-key.pem"), idp_key)?;
        std::fs::write(dir.path().join("idp-cert.pem"), idp_cert)?;

        let config_path = dir.path().join("federation.toml");
        std::fs::write(&config_path, federation_toml(dir.path(), &base_url, &partners))?;

        let server = Server::new(ServerConfig::for_testing(&config_path)).await?;
        let state = server.state().clone();

        let (_shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                result = server.run_on(listener) => {
                    if let Err(e) = result {
                        tracing::error!("Server error: {}", e);
                    }
                }
                _ = shutdown_rx => {
                    tracing::info!("Server shutdown requested");
                }
            }
        });

        let sp_app = Router::new()
            .route("/{name}/slo/soap", post(mock_soap_logout))
            .with_state(Arc::clone(&mock));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(sp_listener, sp_app).await {
                tracing::error!("Mock SP error: {}", e);
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            base_url,
            client,
            state,
            partners,
            mock,
            _dir: dir,
            _shutdown_tx,
        })
    }

    /// Absolute URL of `path` on the server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// The partner called `name`.
    pub fn partner(&self, name: &str) -> &Partner {
        &self.partners[name]
    }

    /// Stores a session for "alice" joined by the named partners, in order.
    pub async fn session(&self, key: &str, participants: &[&str]) -> anyhow::Result<SessionKey> {
        let mut session = FederationSession::new(key, "alice");
        for (i, name) in participants.iter().enumerate() {
            session.add_participant(&self.partner(name).entity_id, Some(&format!("idx-{i}")))?;
        }
        self.state.sessions.create(session).await?;
        Ok(SessionKey::new(key))
    }

    /// True while the session is still stored.
    pub async fn has_session(&self, key: &SessionKey) -> anyhow::Result<bool> {
        Ok(self.state.sessions.get(key).await?.is_some())
    }

    /// A logout request for "alice" issued by partner `name`.
    pub fn logout_request(&self, name: &str, destination: &str) -> LogoutRequest {
        LogoutRequest::new(&self.partner(name).entity_id, NameId::new("alice"))
            .with_destination(destination)
    }
}

fn new_partner(name: &str, endpoints: Vec<(Binding, String)>) -> anyhow::Result<Partner> {
    let pair = KeyPair::generate()?;
    let certificate = CertificateInfo::from_der(self_signed(&pair, name)?.der())?;
    let key = PrivateKey::from_der(&pair.serialize_der())?;

    let nothing_trusted = MetadataCache::new(
        Vec::new(),
        Arc::new(TrustStore::new(None, None)),
        TrustPolicy::permissive(),
        Arc::new(HttpMetadataFetcher::new(Duration::from_secs(5))?),
    );
    let signer = SignatureEngine::new(key, None, Arc::new(nothing_trusted))?;

    Ok(Partner {
        entity_id: format!("https://{name}.sp.test"),
        signer: Arc::new(signer),
        certificate,
        endpoints,
    })
}

fn self_signed(pair: &KeyPair, cn: &str) -> anyhow::Result<rcgen::Certificate> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = date_time_ymd(2090, 1, 1);
    Ok(params.self_signed(pair)?)
}

/// PEM key and certificate.
fn credentials(cn: &str) -> anyhow::Result<(String, String)> {
    let pair = KeyPair::generate()?;
    let cert = self_signed(&pair, cn)?;
    Ok((pair.serialize_pem(), cert.pem()))
}

fn federation_toml(dir: &Path, base_url: &str, partners: &HashMap<&'static str, Partner>) -> String {
    let path = |file: &str| dir.join(file).display().to_string();
    let mut toml = format!(
        r#"[server]
entity_id = "{IDP}"
base_url = "{base_url}"
signing_key = "{}"
signing_certificate = "{}"

[trust]
store = "{}"

[logout]
redirect_timeout_secs = 30
soap_timeout_secs = 5

[[assurance.levels]]
level = 10
uri = "urn:oasis:names:tc:SAML:2.0:ac:classes:Password"

[[assurance.levels]]
level = 20
uri = "urn:oasis:names:tc:SAML:2.0:ac:classes:X509"

[[adapters]]
name = "legacy-radius"
kind = "radius"
level = 10
"#,
        path("idp-key.pem"),
        path("idp-cert.pem"),
        path("trust.pem"),
    );
    for (name, partner) in partners {
        toml.push_str(&format!(
            r#"
[[partners]]
entity_id = "{}"
role = "sp"
metadata = "{}"
"#,
            partner.entity_id,
            path(&format!("{name}.xml"))
        ));
    }
    toml
}
