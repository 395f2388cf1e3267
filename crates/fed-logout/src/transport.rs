//! Outbound SOAP calls.

use std::time::Duration;

use async_trait::async_trait;
use fed_protocol_saml::bindings::SOAP_CONTENT_TYPE;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::error::{LogoutError, LogoutResult};

const SOAP_ACTION: &str = "http://www.oasis-open.org/committees/security";

/// Carries SOAP envelopes to partners.
#[async_trait]
pub trait LogoutTransport: Send + Sync {
    /// Posts `envelope` to `endpoint` and returns the reply envelope.
    async fn call(&self, endpoint: &str, envelope: String) -> LogoutResult<String>;
}

/// SOAP over HTTP(S) with a per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpSoapTransport {
    client: reqwest::Client,
}

impl HttpSoapTransport {
    /// Creates a transport whose calls time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LogoutError::Transport`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> LogoutResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LogoutError::Transport {
                endpoint: "<client>".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogoutTransport for HttpSoapTransport {
    async fn call(&self, endpoint: &str, envelope: String) -> LogoutResult<String> {
        let transport_error = |message: String| LogoutError::Transport {
            endpoint: endpoint.to_string(),
            message,
        };

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope)
            .send()
            .await
            .map_err(|e| transport_error(e.to_string()))?;

        // SOAP faults travel with a 500.
        let status = response.status();
        if !status.is_success() && status != StatusCode::INTERNAL_SERVER_ERROR {
            return Err(transport_error(format!("HTTP {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| transport_error(e.to_string()))
    }
}
