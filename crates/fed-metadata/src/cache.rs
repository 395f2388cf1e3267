//! Lazily populated, trust-checked partner metadata cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fed_core::config::{FederationConfig, PartnerConfig};
use fed_core::error::{Classify, ErrorKind};
use fed_core::event::{EventType, FederationEvent};
use fed_crypto::PublicKey;
use fed_trust::{TrustPolicy, TrustStore};
use tokio::time::Instant;

use crate::descriptor::{Binding, Endpoint, ServiceType};
use crate::entity::PartnerEntity;
use crate::error::{MetadataError, MetadataResult};
use crate::fetch::{HttpMetadataFetcher, MetadataFetcher};
use crate::parser::find_entity;

#[derive(Debug, Clone)]
struct CachedEntity {
    entity: Arc<PartnerEntity>,
    installed_at: Instant,
}

/// Per-partner metadata cache.
///
/// Entries are keyed by entity ID and installed on first use. Only partners
/// named in configuration are ever fetched. Concurrent misses for the same
/// partner may each fetch; the last install wins. No lock is held while a
/// fetch is in flight, so lookups of other partners never wait on it.
pub struct MetadataCache {
    partners: HashMap<String, PartnerConfig>,
    trust: Arc<TrustStore>,
    policy: TrustPolicy,
    fetcher: Arc<dyn MetadataFetcher>,
    refresh_interval: Option<Duration>,
    entries: DashMap<String, CachedEntity>,
    fetches: AtomicUsize,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("partners", &self.partners.len())
            .field("cached", &self.entries.len())
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

impl MetadataCache {
    /// Creates a cache for the given partners.
    pub fn new(
        partners: impl IntoIterator<Item = PartnerConfig>,
        trust: Arc<TrustStore>,
        policy: TrustPolicy,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> Self {
        Self {
            partners: partners
                .into_iter()
                .map(|p| (p.entity_id.clone(), p))
                .collect(),
            trust,
            policy,
            fetcher,
            refresh_interval: None,
            entries: DashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Builds the cache from validated configuration, fetching over HTTP or
    /// from files.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &FederationConfig, trust: Arc<TrustStore>) -> MetadataResult<Self> {
        let fetcher = HttpMetadataFetcher::new(config.metadata.fetch_timeout())?;
        Ok(Self::new(
            config.partners.iter().cloned(),
            trust,
            TrustPolicy::from_config(&config.trust),
            Arc::new(fetcher),
        )
        .with_refresh_interval(config.metadata.refresh_interval()))
    }

    /// Re-fetches entries older than `interval` on their next use.
    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Returns true if the partner is named in configuration.
    #[must_use]
    pub fn is_configured(&self, entity_id: &str) -> bool {
        self.partners.contains_key(entity_id)
    }

    /// Configuration of a partner.
    #[must_use]
    pub fn partner_config(&self, entity_id: &str) -> Option<&PartnerConfig> {
        self.partners.get(entity_id)
    }

    /// Entity IDs of all configured partners.
    pub fn configured_partners(&self) -> impl Iterator<Item = &str> {
        self.partners.keys().map(String::as_str)
    }

    /// Number of metadata fetches attempted so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Resolves a trusted partner, fetching its metadata on a miss.
    ///
    /// Returns `None` for unconfigured partners and for partners whose
    /// metadata cannot be fetched, parsed or trusted. When a refresh fails to
    /// fetch, the previous entry keeps serving; when it fails trust, the
    /// entry is dropped.
    pub async fn entity(&self, entity_id: &str) -> Option<Arc<PartnerEntity>> {
        let Some(config) = self.partners.get(entity_id) else {
            tracing::debug!(entity_id = %entity_id, "Unknown partner");
            return None;
        };

        let cached = self
            .entries
            .get(entity_id)
            .map(|entry| (Arc::clone(&entry.entity), entry.installed_at));
        if let Some((entity, installed_at)) = &cached {
            let fresh = self
                .refresh_interval
                .map_or(true, |interval| installed_at.elapsed() < interval);
            if fresh {
                return Some(Arc::clone(entity));
            }
            tracing::debug!(entity_id = %entity_id, "Refreshing partner metadata");
        }

        match self.load(config).await {
            Ok(entity) => {
                let entity = Arc::new(entity);
                self.entries.insert(
                    entity_id.to_string(),
                    CachedEntity {
                        entity: Arc::clone(&entity),
                        installed_at: Instant::now(),
                    },
                );
                tracing::info!(
                    entity_id = %entity_id,
                    signing_keys = entity.signing_certificates.len(),
                    endpoints = entity.endpoints.len(),
                    "Partner metadata installed"
                );
                Some(entity)
            }
            Err(error) => self.on_load_failure(entity_id, &error, cached.map(|(e, _)| e)),
        }
    }

    fn on_load_failure(
        &self,
        entity_id: &str,
        error: &MetadataError,
        stale: Option<Arc<PartnerEntity>>,
    ) -> Option<Arc<PartnerEntity>> {
        match error.kind() {
            ErrorKind::Transport if stale.is_some() => {
                tracing::warn!(
                    entity_id = %entity_id,
                    error = %error,
                    "Metadata refresh failed, keeping previous entry"
                );
                stale
            }
            ErrorKind::Trust => {
                tracing::warn!(entity_id = %entity_id, error = %error, "Partner metadata not trusted");
                FederationEvent::builder(EventType::TrustRejected)
                    .failure(error.to_string())
                    .partner(entity_id)
                    .emit();
                self.entries.remove(entity_id);
                None
            }
            _ => {
                tracing::warn!(entity_id = %entity_id, error = %error, "Partner metadata unavailable");
                self.entries.remove(entity_id);
                None
            }
        }
    }

    async fn load(&self, config: &PartnerConfig) -> MetadataResult<PartnerEntity> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let location = config.metadata_location();
        let xml = self.fetcher.fetch(&location).await?;
        let descriptor = find_entity(&xml, &config.entity_id)?;

        if let Some(role) = descriptor.role.filter(|role| *role != config.role) {
            tracing::warn!(
                entity_id = %config.entity_id,
                configured = ?config.role,
                published = ?role,
                "Metadata role differs from configuration"
            );
        }

        let policy = self.policy.with_override(config.trust.as_ref());
        let mut trusted = Vec::with_capacity(descriptor.signing_certificates.len());
        let mut last_error = None;
        for cert in &descriptor.signing_certificates {
            match self.trust.validate(cert, &policy).await {
                Ok(()) => trusted.push(cert.clone()),
                Err(error) => {
                    tracing::warn!(
                        entity_id = %config.entity_id,
                        subject = %cert.subject(),
                        error = %error,
                        "Signing certificate rejected"
                    );
                    last_error = Some(error);
                }
            }
        }
        if trusted.is_empty() {
            return Err(MetadataError::NoTrustedKey {
                entity_id: config.entity_id.clone(),
                source: last_error,
            });
        }

        Ok(PartnerEntity::new(
            descriptor,
            config.role,
            location,
            trusted,
            config.logout_supported,
        ))
    }

    /// Resolves the endpoint for a (service, binding) pair.
    pub async fn resolve_endpoint(
        &self,
        entity_id: &str,
        service: ServiceType,
        binding: Binding,
    ) -> Option<Endpoint> {
        self.entity(entity_id)
            .await?
            .endpoint(service, binding)
            .cloned()
    }

    /// Resolves the partner's currently trusted signing keys.
    pub async fn resolve_signing_keys(&self, entity_id: &str) -> Option<Vec<PublicKey>> {
        Some(self.entity(entity_id).await?.signing_keys())
    }

    /// Resolves the preferred logout endpoint (front channel first).
    pub async fn preferred_logout_endpoint(&self, entity_id: &str) -> Option<Endpoint> {
        self.entity(entity_id)
            .await?
            .preferred_logout_endpoint()
            .cloned()
    }

    /// Drops the cached entry so the next lookup fetches again.
    pub fn invalidate(&self, entity_id: &str) -> bool {
        let removed = self.entries.remove(entity_id).is_some();
        if removed {
            tracing::info!(entity_id = %entity_id, "Partner metadata invalidated");
        }
        removed
    }

    /// Loads every configured partner. Returns how many are usable.
    pub async fn preload(&self) -> usize {
        let mut usable = 0;
        for entity_id in self.partners.keys() {
            if self.entity(entity_id).await.is_some() {
                usable += 1;
            }
        }
        tracing::info!(
            configured = self.partners.len(),
            usable,
            "Partner metadata preloaded"
        );
        usable
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fed_core::config::{CheckFlags, MetadataLocation, PartnerRole};
    use fed_trust::{CertificateInfo, TrustAnchor, TrustAnchors};
    use rcgen::{date_time_ymd, CertificateParams, DistinguishedName, DnType, KeyPair};

    use super::*;

    const SP: &str = "https://sp.example.com";

    #[derive(Default)]
    struct StaticFetcher {
        documents: Mutex<HashMap<String, String>>,
    }

    impl StaticFetcher {
        fn put(&self, location: &str, xml: String) {
            self.documents
                .lock()
                .unwrap()
                .insert(location.to_string(), xml);
        }

        fn clear(&self) {
            self.documents.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl MetadataFetcher for StaticFetcher {
        async fn fetch(&self, location: &MetadataLocation) -> MetadataResult<String> {
            self.documents
                .lock()
                .unwrap()
                .get(&location.to_string())
                .cloned()
                .ok_or_else(|| MetadataError::Fetch {
                    location: location.to_string(),
                    message: "connection refused".to_string(),
                })
        }
    }

    fn certificate(expired: bool) -> CertificateInfo {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "sp.example.com");
        params.distinguished_name = dn;
        if expired {
            params.not_before = date_time_ymd(2001, 1, 1);
            params.not_after = date_time_ymd(2002, 1, 1);
        } else {
            params.not_before = date_time_ymd(2020, 1, 1);
            params.not_after = date_time_ymd(2090, 1, 1);
        }
        CertificateInfo::from_der(params.self_signed(&key).unwrap().der()).unwrap()
    }

    fn metadata(entity_id: &str, cert: &CertificateInfo) -> String {
        format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata"
    xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="{entity_id}">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data>
      <ds:X509Certificate>{}</ds:X509Certificate>
    </ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
        Location="{entity_id}/slo"/>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:SOAP"
        Location="{entity_id}/slo/soap"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
            cert.to_base64()
        )
    }

    fn partner(entity_id: &str) -> PartnerConfig {
        PartnerConfig {
            entity_id: entity_id.to_string(),
            role: PartnerRole::Sp,
            metadata: format!("{entity_id}/metadata"),
            logout_supported: true,
            signing_key: None,
            trust: None,
        }
    }

    fn strict() -> TrustPolicy {
        TrustPolicy {
            signing: CheckFlags::strict(),
            ca: CheckFlags::dates_only(),
        }
    }

    fn cache(cert: &CertificateInfo, fetcher: Arc<StaticFetcher>) -> MetadataCache {
        let anchors = TrustAnchors::new(vec![TrustAnchor::new("signing_sp", cert.clone()).unwrap()]);
        MetadataCache::new(
            vec![partner(SP)],
            Arc::new(TrustStore::from_anchors(anchors)),
            strict(),
            fetcher,
        )
    }

    #[tokio::test]
    async fn unconfigured_partner_is_never_fetched() {
        let cert = certificate(false);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put("https://rogue.example.com/metadata", metadata("https://rogue.example.com", &cert));
        let cache = cache(&cert, fetcher);

        assert!(cache.entity("https://rogue.example.com").await.is_none());
        assert!(cache.resolve_signing_keys("https://rogue.example.com").await.is_none());
        assert_eq!(cache.fetch_count(), 0);
    }

    #[tokio::test]
    async fn trusted_partner_is_fetched_once() {
        let cert = certificate(false);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put(&format!("{SP}/metadata"), metadata(SP, &cert));
        let cache = cache(&cert, fetcher);

        let endpoint = cache
            .resolve_endpoint(SP, ServiceType::SingleLogout, Binding::HttpRedirect)
            .await
            .unwrap();
        assert_eq!(endpoint.location, format!("{SP}/slo"));

        let keys = cache.resolve_signing_keys(SP).await.unwrap();
        assert_eq!(keys, vec![cert.public_key().clone()]);
        assert_eq!(
            cache.preferred_logout_endpoint(SP).await.unwrap().binding,
            Binding::HttpRedirect
        );
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn expired_certificate_is_never_cached() {
        let cert = certificate(true);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put(&format!("{SP}/metadata"), metadata(SP, &cert));
        let cache = cache(&cert, fetcher);

        assert!(cache.entity(SP).await.is_none());
        assert!(cache.resolve_signing_keys(SP).await.is_none());
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn partner_override_relaxes_date_check() {
        let cert = certificate(true);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put(&format!("{SP}/metadata"), metadata(SP, &cert));
        let anchors = TrustAnchors::new(vec![TrustAnchor::new("signing_sp", cert.clone()).unwrap()]);
        let mut config = partner(SP);
        config.trust = Some(fed_core::config::TrustOverride {
            signing: Some(CheckFlags {
                check_dates: false,
                check_issuer: true,
            }),
            ca: Some(CheckFlags::none()),
        });
        let cache = MetadataCache::new(
            vec![config],
            Arc::new(TrustStore::from_anchors(anchors)),
            strict(),
            fetcher,
        );

        assert!(cache.entity(SP).await.is_some());
    }

    #[tokio::test]
    async fn mismatched_entity_id_is_rejected() {
        let cert = certificate(false);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put(&format!("{SP}/metadata"), metadata("https://imposter.example.com", &cert));
        let cache = cache(&cert, fetcher);

        assert!(cache.entity(SP).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_stale_entry_when_fetch_fails() {
        let cert = certificate(false);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put(&format!("{SP}/metadata"), metadata(SP, &cert));
        let cache = cache(&cert, Arc::clone(&fetcher))
            .with_refresh_interval(Some(Duration::from_secs(60)));

        assert!(cache.entity(SP).await.is_some());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.entity(SP).await.is_some());
        assert_eq!(cache.fetch_count(), 1);

        fetcher.clear();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.entity(SP).await.is_some());
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cert = certificate(false);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put(&format!("{SP}/metadata"), metadata(SP, &cert));
        let cache = cache(&cert, fetcher);

        assert!(cache.entity(SP).await.is_some());
        assert!(cache.invalidate(SP));
        assert!(!cache.invalidate(SP));
        assert!(cache.entity(SP).await.is_some());
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_both_resolve() {
        let cert = certificate(false);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.put(&format!("{SP}/metadata"), metadata(SP, &cert));
        let cache = cache(&cert, fetcher);

        let (a, b) = tokio::join!(cache.entity(SP), cache.entity(SP));
        assert_eq!(a.unwrap().entity_id, SP);
        assert_eq!(b.unwrap().entity_id, SP);
        assert_eq!(cache.preload().await, 1);
    }
}
