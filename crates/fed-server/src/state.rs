//! Application state management.
//!
//! Services are built once at startup, in dependency order, and shared by
//! every request handler.

use std::sync::Arc;
use std::time::Duration;

use fed_cache::InMemoryCache;
use fed_core::config::FederationConfig;
use fed_logout::{ArtifactResolver, HttpSoapTransport, LogoutOrchestrator, LogoutSettings, LogoutTransport};
use fed_metadata::MetadataCache;
use fed_protocol_saml::{ArtifactStore, IdpMetadata, ReplayGuard, SecurityLevelTable, SignatureEngine};
use fed_session::{InMemorySessionStore, SessionStore};
use fed_spi::AdapterRegistry;
use fed_trust::{CertificateInfo, TrustStore};

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Federation configuration.
    pub config: Arc<FederationConfig>,

    /// Federation sessions.
    pub sessions: Arc<dyn SessionStore>,

    /// Partner metadata.
    pub metadata: Arc<MetadataCache>,

    /// Signs outbound and verifies inbound messages.
    pub signer: Arc<SignatureEngine>,

    /// Validity window and replay checks for inbound messages.
    pub replay: ReplayGuard,

    /// Messages this server handed out by artifact.
    pub artifacts: ArtifactStore,

    /// Single logout sagas.
    pub orchestrator: Arc<LogoutOrchestrator>,

    /// Resolves artifacts issued by partners.
    pub resolver: Arc<ArtifactResolver>,

    /// Configured authentication adapters.
    pub adapters: Arc<AdapterRegistry>,

    /// Assurance level table.
    pub levels: Arc<SecurityLevelTable>,

    /// Published metadata document.
    pub idp_metadata: Arc<str>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("entity_id", &self.config.server.entity_id)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Builds every service from the federation configuration, with a new
    /// in-memory session store.
    ///
    /// # Errors
    ///
    /// Returns an error if the server's own key or certificate cannot be
    /// loaded, or the assurance table is invalid. Problems confined to one
    /// partner or adapter are logged and the rest keeps working.
    pub async fn build(config: FederationConfig) -> anyhow::Result<Self> {
        Self::with_sessions(config, Arc::new(InMemorySessionStore::new())).await
    }

    /// Like [`AppState::build`], backed by `sessions`.
    ///
    /// # Errors
    ///
    /// See [`AppState::build`].
    pub async fn with_sessions(
        config: FederationConfig,
        sessions: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let transport = HttpSoapTransport::new(config.logout.soap_timeout())?;
        Self::assemble(config, sessions, Arc::new(transport)).await
    }

    /// Builds the state with an explicit back-channel transport.
    ///
    /// # Errors
    ///
    /// See [`AppState::build`].
    pub async fn assemble(
        config: FederationConfig,
        sessions: Arc<dyn SessionStore>,
        transport: Arc<dyn LogoutTransport>,
    ) -> anyhow::Result<Self> {
        let trust = Arc::new(TrustStore::from_config(&config.trust));
        if trust.load().await.is_err() {
            tracing::warn!("Continuing without trust anchors; partners requiring an issuer are untrusted");
        }

        let metadata = Arc::new(MetadataCache::from_config(&config, trust)?);
        metadata.preload().await;

        let signer = Arc::new(SignatureEngine::from_config(&config, Arc::clone(&metadata))?);
        let certificate = read_certificate(&config)?;
        let idp_metadata = IdpMetadata::from_config(&config, certificate).to_xml();

        let cache = Arc::new(InMemoryCache::new());
        cache.spawn_sweeper(CACHE_SWEEP_INTERVAL);
        let replay = ReplayGuard::new(cache.clone(), config.clock_skew());
        let artifacts = ArtifactStore::new(cache, config.artifact_url(), config.artifact.ttl());

        let orchestrator = LogoutOrchestrator::new(
            LogoutSettings::from_config(&config),
            Arc::clone(&sessions),
            Arc::clone(&signer),
            artifacts.clone(),
            Arc::clone(&transport),
        );
        let resolver = ArtifactResolver::new(&config.server.entity_id, Arc::clone(&signer), transport);

        let levels = SecurityLevelTable::from_config(&config.assurance)?;
        let mut adapters = AdapterRegistry::new();
        let rejected = adapters.configure(&config.adapters).await;
        if !rejected.is_empty() {
            tracing::warn!(
                rejected = rejected.len(),
                configured = adapters.instances().len(),
                "Some adapters are unavailable"
            );
        }

        tracing::info!(
            entity_id = %config.server.entity_id,
            partners = config.partners.len(),
            levels = levels.entries().len(),
            "Federation services ready"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions,
            metadata,
            signer,
            replay,
            artifacts,
            orchestrator,
            resolver: Arc::new(resolver),
            adapters: Arc::new(adapters),
            levels: Arc::new(levels),
            idp_metadata: idp_metadata.into(),
        })
    }

    /// Returns the federation configuration.
    #[must_use]
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }
}

fn read_certificate(config: &FederationConfig) -> anyhow::Result<CertificateInfo> {
    let path = &config.server.signing_certificate;
    let pem = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read certificate {}: {e}", path.display()))?;
    Ok(CertificateInfo::from_pem(&pem)?)
}
