//! Metadata retrieval.

use std::time::Duration;

use async_trait::async_trait;
use fed_core::config::MetadataLocation;

use crate::error::{MetadataError, MetadataResult};
use crate::parser::MAX_METADATA_SIZE;

/// Source of raw metadata documents.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Retrieves the document at `location`.
    async fn fetch(&self, location: &MetadataLocation) -> MetadataResult<String>;
}

/// Fetches metadata over HTTP(S) or from the local filesystem.
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    /// Creates a fetcher whose HTTP requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Fetch`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> MetadataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataError::Fetch {
                location: "<client>".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_url(&self, url: &str) -> MetadataResult<String> {
        let fetch_error = |message: String| MetadataError::Fetch {
            location: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {status}")));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_METADATA_SIZE as u64)
        {
            return Err(fetch_error("document too large".to_string()));
        }
        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, location: &MetadataLocation) -> MetadataResult<String> {
        match location {
            MetadataLocation::Url(url) => self.fetch_url(url).await,
            MetadataLocation::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| MetadataError::Fetch {
                        location: path.display().to_string(),
                        message: e.to_string(),
                    })
            }
        }
    }
}
