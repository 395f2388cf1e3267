//! Storage of messages referenced by artifacts.

use std::sync::Arc;
use std::time::Duration;

use fed_cache::AtomicCacheProvider;

use crate::bindings::Artifact;
use crate::error::SamlResult;
use crate::types::ProtocolMessage;

const KEY_PREFIX: &str = "artifact:";

/// Messages stored in their XML form under their artifact, with a bounded
/// lifetime.
///
/// Reads do not consume the entry; a resolver that wants single use calls
/// [`ArtifactStore::take`].
#[derive(Clone)]
pub struct ArtifactStore {
    cache: Arc<dyn AtomicCacheProvider>,
    issuer_endpoint: String,
    ttl: Duration,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("issuer_endpoint", &self.issuer_endpoint)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore {
    /// Creates a store issuing artifacts for `issuer_endpoint`, this
    /// server's artifact resolution URL.
    pub fn new(
        cache: Arc<dyn AtomicCacheProvider>,
        issuer_endpoint: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            issuer_endpoint: issuer_endpoint.into(),
            ttl,
        }
    }

    fn key(artifact: &Artifact) -> String {
        format!("{KEY_PREFIX}{}", artifact.to_base64())
    }

    /// Stores `message` and returns its artifact.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Storage`] if the cache fails.
    pub async fn put(&self, message: &ProtocolMessage) -> SamlResult<Artifact> {
        let artifact = Artifact::new(&self.issuer_endpoint, message.id());
        self.cache
            .set(&Self::key(&artifact), message.to_xml(), Some(self.ttl))
            .await?;
        tracing::debug!(message_id = %message.id(), "Stored message for artifact");
        Ok(artifact)
    }

    /// Returns the message behind `artifact`, or `None` if unknown or
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Storage`] if the cache fails, or a parse error
    /// if the stored form is corrupt.
    pub async fn get(&self, artifact: &Artifact) -> SamlResult<Option<ProtocolMessage>> {
        self.cache
            .get(&Self::key(artifact))
            .await?
            .map(|xml| ProtocolMessage::from_xml(&xml))
            .transpose()
    }

    /// Like [`ArtifactStore::get`], but removes the entry.
    ///
    /// # Errors
    ///
    /// See [`ArtifactStore::get`].
    pub async fn take(&self, artifact: &Artifact) -> SamlResult<Option<ProtocolMessage>> {
        self.cache
            .get_del(&Self::key(artifact))
            .await?
            .map(|xml| ProtocolMessage::from_xml(&xml))
            .transpose()
    }

    /// Drops the entry. Returns whether one was live.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Storage`] if the cache fails.
    pub async fn remove(&self, artifact: &Artifact) -> SamlResult<bool> {
        Ok(self.cache.delete(&Self::key(artifact)).await?)
    }

    /// Returns true if `artifact` was issued by this store's endpoint.
    #[must_use]
    pub fn issued_here(&self, artifact: &Artifact) -> bool {
        artifact.is_from(&self.issuer_endpoint)
    }
}
