//! The adapter capability and the values it exchanges.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::{SpiError, SpiResult};

/// Outcome of an authentication attempt, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// The user authenticated.
    Success,
    /// Credentials were rejected.
    Failed,
    /// The user gave up or the challenge expired.
    Cancelled,
    /// The back end could not decide.
    Error,
}

impl ResultCode {
    /// Wire value.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Success => "0",
            Self::Failed => "1",
            Self::Cancelled => "2",
            Self::Error => "3",
        }
    }

    /// Parses a wire value.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(Self::Success),
            "1" => Some(Self::Failed),
            "2" => Some(Self::Cancelled),
            "3" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns true for [`ResultCode::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Implementation-specific settings for one adapter instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSettings {
    values: BTreeMap<String, String>,
}

impl AdapterSettings {
    /// Wraps configured settings.
    #[must_use]
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Gets a string value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Gets a string value that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`SpiError::Configuration`] if missing or blank.
    pub fn required(&self, key: &str) -> SpiResult<&str> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SpiError::Configuration(format!("setting {key} is required")))
    }

    /// Gets an integer value, or `default` when absent or unparseable.
    #[must_use]
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// Gets a boolean value, or `default` when absent or unparseable.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

impl From<BTreeMap<String, String>> for AdapterSettings {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self::new(values)
    }
}

/// One authentication exchange handed to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterRequest {
    /// Correlates the challenge with its response.
    pub request_id: String,
    /// Where the signed result is delivered.
    pub destination: String,
    /// Entity ID of this server.
    pub server_id: String,
    /// Level the adapter was chosen for.
    pub level: i32,
}

/// What the user agent must do to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterChallenge {
    /// Send the browser to an external page.
    Redirect(String),
    /// Ask the user for these named inputs.
    Prompt(Vec<String>),
    /// Nothing to ask; call `verify_response` straight away.
    None,
}

/// Result of verifying what the user supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOutcome {
    /// Result code.
    pub result_code: ResultCode,
    /// Authenticated user, set on success.
    pub uid: Option<String>,
    /// Attributes released by the back end.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl AdapterOutcome {
    /// Successful outcome for `uid`.
    #[must_use]
    pub fn success(uid: impl Into<String>) -> Self {
        Self {
            result_code: ResultCode::Success,
            uid: Some(uid.into()),
            attributes: BTreeMap::new(),
        }
    }

    /// Unsuccessful outcome.
    #[must_use]
    pub fn failure(result_code: ResultCode) -> Self {
        Self {
            result_code,
            uid: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.entry(name.into()).or_default().push(value.into());
        self
    }
}

/// A back-end authentication method.
///
/// ## Lifecycle
///
/// 1. `init()` - called once with the instance's settings
/// 2. `compute_request()` - called when a user needs this method
/// 3. `verify_response()` - called with what the user supplied
/// 4. `close()` - called at shutdown
#[async_trait]
pub trait AuthAdapter: Send + Sync + Debug {
    /// Prepares the adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if settings are invalid or the back end cannot be
    /// reached.
    async fn init(&mut self, settings: &AdapterSettings) -> SpiResult<()>;

    /// Starts an authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the back end fails.
    async fn compute_request(&self, request: &AdapterRequest) -> SpiResult<AdapterChallenge>;

    /// Checks the user's input.
    ///
    /// Rejected credentials are an [`AdapterOutcome`] with a failure code,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the back end fails.
    async fn verify_response(
        &self,
        request: &AdapterRequest,
        input: &BTreeMap<String, String>,
    ) -> SpiResult<AdapterOutcome>;

    /// Releases resources.
    fn close(&self) {}
}

/// Creates adapters of one kind.
pub trait AdapterFactory: Send + Sync + Debug {
    /// Kind named by `kind` in configuration.
    fn kind(&self) -> &'static str;

    /// Returns a fresh, uninitialized adapter.
    fn create(&self) -> Box<dyn AuthAdapter>;
}
