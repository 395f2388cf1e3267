//! # fed-server
//!
//! Axum server for the federation logout core.
//!
//! This crate serves:
//! - Single logout endpoints for every front-channel binding and SOAP
//! - Artifact resolution for messages this server handed out by artifact
//! - The server's own SAML metadata
//! - Health checks
//!
//! ## Usage
//!
//! ```ignore
//! use fed_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod router;
pub mod saml;
pub mod state;

pub use config::ServerConfig;
pub use router::create_router;
pub use state::AppState;

use axum::Router;
use fed_core::config::FederationConfig;
use tokio::net::TcpListener;

/// The federation server.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Loads the federation configuration and builds every service.
    ///
    /// # Errors
    ///
    /// Returns an error if the federation file is unusable or the server's
    /// own key material cannot be loaded.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let federation = FederationConfig::load(&config.federation_config)?;
        tracing::info!(
            path = %config.federation_config.display(),
            entity_id = %federation.server.entity_id,
            "Federation configuration loaded"
        );
        let state = AppState::build(federation).await?;
        Ok(Self { config, state })
    }

    /// Runs the server until it receives a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        self.run_on(listener).await
    }

    /// Serves on an already bound listener until a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn run_on(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("Server listening on http://{}", listener.local_addr()?);

        let app = create_router(self.state.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.state.adapters.close();
        tracing::info!(
            unfinished_logouts = self.state.orchestrator.active_sagas(),
            "Server shutdown complete"
        );
        Ok(())
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the shared state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Creates a router without starting the server.
    pub fn test_router(&self) -> Router {
        create_router(self.state.clone())
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
