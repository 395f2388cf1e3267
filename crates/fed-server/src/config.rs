//! Process configuration.
//!
//! Only where to listen and where the federation file lives come from the
//! environment. Everything about partners, keys and timeouts is in the
//! federation file (see [`fed_core::config`]).

use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// Path to the federation TOML file.
    pub federation_config: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables, honouring a `.env`
    /// file in the working directory.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `FED_HOST` | `0.0.0.0` |
    /// | `FED_PORT` | `8080` |
    /// | `FED_CONFIG` | `federation.toml` |
    /// | `RUST_LOG` | `info` |
    ///
    /// # Errors
    ///
    /// Returns an error if `FED_PORT` is set but is not a port number.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let host = std::env::var("FED_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("FED_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("FED_PORT={raw} is not a port: {e}"))?,
            Err(_) => 8080,
        };
        let federation_config = std::env::var("FED_CONFIG")
            .map_or_else(|_| PathBuf::from("federation.toml"), PathBuf::from);
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            host,
            port,
            federation_config,
            log_level,
        })
    }

    /// Configuration for tests: loopback, ephemeral port.
    #[must_use]
    pub fn for_testing(federation_config: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            federation_config: federation_config.into(),
            log_level: "debug".to_string(),
        }
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            federation_config: PathBuf::from("federation.toml"),
            log_level: "info".to_string(),
        }
    }
}
