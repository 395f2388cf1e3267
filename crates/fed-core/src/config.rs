//! Federation configuration.
//!
//! The federation model lives in a TOML file: the server's own identity, the
//! trust store, timeouts, the assurance level table and the partner list.
//!
//! ```toml
//! [server]
//! entity_id = "https://idp.example.com"
//! base_url = "https://idp.example.com"
//! signing_key = "/etc/fed/idp-key.pem"
//! signing_certificate = "/etc/fed/idp-cert.pem"
//!
//! [trust]
//! store = "/etc/fed/truststore.pem"
//! signing = { check_dates = true, check_issuer = true }
//! ca = { check_dates = true, check_issuer = false }
//!
//! [[partners]]
//! entity_id = "https://sp.example.com"
//! role = "sp"
//! metadata = "https://sp.example.com/metadata"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Root of the federation configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// This server's identity.
    pub server: IdentityConfig,

    /// Trust store and certificate checks.
    #[serde(default)]
    pub trust: TrustConfig,

    /// Single logout timing.
    #[serde(default)]
    pub logout: LogoutConfig,

    /// Artifact binding storage.
    #[serde(default)]
    pub artifact: ArtifactConfig,

    /// Metadata fetching.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Assurance level table.
    #[serde(default)]
    pub assurance: AssuranceConfig,

    /// Federation partners.
    #[serde(default)]
    pub partners: Vec<PartnerConfig>,

    /// Back-end authentication adapters.
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
}

/// The server's own entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Entity identifier published in metadata and used as message issuer.
    pub entity_id: String,

    /// Public base URL; endpoint locations are derived from it.
    pub base_url: String,

    /// PEM file with the PKCS#8 signing key.
    pub signing_key: PathBuf,

    /// PEM file with the certificate matching `signing_key`.
    pub signing_certificate: PathBuf,

    /// Signature algorithm URI. Derived from the key type when absent.
    #[serde(default)]
    pub signature_algorithm: Option<String>,

    /// Tolerated clock skew for IssueInstant checks.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
}

/// Trust store location and per-scope checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Path to the trust store bundle. No store means issuer checks always fail.
    #[serde(default)]
    pub store: Option<PathBuf>,

    /// Store password. When set, the store's integrity line must match.
    #[serde(default)]
    pub password: Option<String>,

    /// Checks applied to a partner's signing certificate.
    #[serde(default)]
    pub signing: CheckFlags,

    /// Checks applied to the CA that issued the signing certificate.
    #[serde(default = "CheckFlags::dates_only")]
    pub ca: CheckFlags,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            store: None,
            password: None,
            signing: CheckFlags::default(),
            ca: CheckFlags::dates_only(),
        }
    }
}

/// Independent date and issuer checks for one trust scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFlags {
    /// Reject certificates outside their validity window.
    #[serde(default = "default_true")]
    pub check_dates: bool,

    /// Reject certificates not issued by a trust anchor.
    #[serde(default = "default_true")]
    pub check_issuer: bool,
}

impl CheckFlags {
    /// Both checks enabled.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            check_dates: true,
            check_issuer: true,
        }
    }

    /// Only the validity window is checked.
    #[must_use]
    pub const fn dates_only() -> Self {
        Self {
            check_dates: true,
            check_issuer: false,
        }
    }

    /// Nothing is checked.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            check_dates: false,
            check_issuer: false,
        }
    }
}

impl Default for CheckFlags {
    fn default() -> Self {
        Self::strict()
    }
}

/// Single logout timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutConfig {
    /// How long a browser round trip may take before the SOAP fallback fires.
    #[serde(default = "default_redirect_timeout")]
    pub redirect_timeout_secs: u64,

    /// Timeout for a back-channel SOAP call.
    #[serde(default = "default_soap_timeout")]
    pub soap_timeout_secs: u64,
}

impl LogoutConfig {
    /// Redirect timeout as a duration.
    #[must_use]
    pub const fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }

    /// SOAP timeout as a duration.
    #[must_use]
    pub const fn soap_timeout(&self) -> Duration {
        Duration::from_secs(self.soap_timeout_secs)
    }
}

impl Default for LogoutConfig {
    fn default() -> Self {
        Self {
            redirect_timeout_secs: default_redirect_timeout(),
            soap_timeout_secs: default_soap_timeout(),
        }
    }
}

/// Artifact binding storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Lifetime of a stored message.
    #[serde(default = "default_artifact_ttl")]
    pub ttl_secs: u64,
}

impl ArtifactConfig {
    /// Artifact lifetime as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_artifact_ttl(),
        }
    }
}

/// Metadata fetching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Re-fetch cached metadata older than this. Never when absent.
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,

    /// HTTP timeout for metadata downloads.
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
}

impl MetadataConfig {
    /// Refresh interval as a duration.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }

    /// Fetch timeout as a duration, 10 seconds by default.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(10))
    }
}

/// Assurance level table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssuranceConfig {
    /// Levels in any order; they are sorted when the table is built.
    #[serde(default)]
    pub levels: Vec<AssuranceLevelConfig>,

    /// Level reserved for reusing an existing session.
    #[serde(default)]
    pub previous_session_level: Option<i32>,
}

/// One row of the assurance level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssuranceLevelConfig {
    /// Numeric strength.
    pub level: i32,
    /// Context class URI.
    pub uri: String,
    /// Older URI accepted as an alias.
    #[serde(default)]
    pub legacy_uri: Option<String>,
}

/// Partner role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerRole {
    /// Service provider.
    Sp,
    /// Identity provider.
    Idp,
}

/// Where a partner's metadata document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataLocation {
    /// Fetched over HTTP(S).
    Url(String),
    /// Read from the local filesystem.
    File(PathBuf),
}

impl MetadataLocation {
    /// Classifies a configured location string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self::Url(value.to_string())
        } else {
            Self::File(PathBuf::from(value.strip_prefix("file://").unwrap_or(value)))
        }
    }
}

impl std::fmt::Display for MetadataLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Trust checks overriding the global ones for a single partner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustOverride {
    /// Signing certificate checks.
    #[serde(default)]
    pub signing: Option<CheckFlags>,
    /// Issuing CA checks.
    #[serde(default)]
    pub ca: Option<CheckFlags>,
}

/// A configured federation partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerConfig {
    /// Partner entity identifier.
    pub entity_id: String,

    /// IdP or SP.
    pub role: PartnerRole,

    /// URL or path of the partner's metadata.
    pub metadata: String,

    /// Set to false to never send logout messages to this partner.
    #[serde(default = "default_true")]
    pub logout_supported: bool,

    /// PEM file with a private key used only for messages to this partner.
    #[serde(default)]
    pub signing_key: Option<PathBuf>,

    /// Partner-specific trust checks.
    #[serde(default)]
    pub trust: Option<TrustOverride>,
}

impl PartnerConfig {
    /// Returns the parsed metadata location.
    #[must_use]
    pub fn metadata_location(&self) -> MetadataLocation {
        MetadataLocation::parse(&self.metadata)
    }
}

/// A back-end authentication adapter instance.
///
/// ```toml
/// [[adapters]]
/// name = "corporate-ldap"
/// kind = "ldap"
/// level = 10
/// settings = { url = "ldaps://ldap.example.com" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Instance name, unique across adapters.
    pub name: String,
    /// Registered implementation to instantiate.
    pub kind: String,
    /// Assurance level this adapter satisfies.
    pub level: i32,
    /// Implementation-specific settings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// A partner entry dropped during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPartner {
    /// Entity id as written in the file (may be empty).
    pub entity_id: String,
    /// Why it was dropped.
    pub reason: String,
}

impl FederationConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails process-level validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// Invalid partner entries are dropped with a warning; the rest of the
    /// configuration stays usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or the server-level
    /// settings are invalid.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        for rejected in config.validate()? {
            tracing::warn!(
                entity_id = %rejected.entity_id,
                reason = %rejected.reason,
                "Partner configuration rejected"
            );
        }
        Ok(config)
    }

    /// Validates the configuration in place.
    ///
    /// Server-level problems are errors. Partner-level problems remove the
    /// offending partner and are returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for problems that affect the whole process.
    pub fn validate(&mut self) -> Result<Vec<RejectedPartner>> {
        if self.server.entity_id.trim().is_empty() {
            return Err(Error::Config("server.entity_id must not be empty".to_string()));
        }
        if self.server.base_url.trim().is_empty() {
            return Err(Error::Config("server.base_url must not be empty".to_string()));
        }
        if self.logout.redirect_timeout_secs == 0 {
            return Err(Error::Config(
                "logout.redirect_timeout_secs must be positive".to_string(),
            ));
        }

        let mut levels = HashSet::new();
        for level in &self.assurance.levels {
            if !levels.insert(level.level) {
                return Err(Error::Config(format!(
                    "duplicate assurance level {}",
                    level.level
                )));
            }
        }

        let mut names = HashSet::new();
        for adapter in &self.adapters {
            if !names.insert(adapter.name.as_str()) {
                return Err(Error::Config(format!(
                    "adapter {} configured more than once",
                    adapter.name
                )));
            }
        }

        let mut rejected = Vec::new();
        let mut seen = HashSet::new();
        let mut duplicates = HashSet::new();
        for partner in &self.partners {
            if !seen.insert(partner.entity_id.clone()) {
                duplicates.insert(partner.entity_id.clone());
            }
        }

        self.partners.retain(|partner| {
            let reason = if partner.entity_id.trim().is_empty() {
                Some("entity_id must not be empty")
            } else if duplicates.contains(&partner.entity_id) {
                Some("entity_id configured more than once")
            } else if partner.metadata.trim().is_empty() {
                Some("metadata location must not be empty")
            } else if partner.entity_id == self.server.entity_id {
                Some("partner entity_id equals the server's own")
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    rejected.push(RejectedPartner {
                        entity_id: partner.entity_id.clone(),
                        reason: reason.to_string(),
                    });
                    false
                }
                None => true,
            }
        });

        Ok(rejected)
    }

    /// Looks up a partner by entity id.
    #[must_use]
    pub fn partner(&self, entity_id: &str) -> Option<&PartnerConfig> {
        self.partners.iter().find(|p| p.entity_id == entity_id)
    }

    /// Single logout endpoint published for this server.
    #[must_use]
    pub fn slo_url(&self) -> String {
        format!("{}/saml/slo", self.server.base_url.trim_end_matches('/'))
    }

    /// SOAP single logout endpoint published for this server.
    #[must_use]
    pub fn slo_soap_url(&self) -> String {
        format!("{}/saml/slo/soap", self.server.base_url.trim_end_matches('/'))
    }

    /// Artifact resolution endpoint published for this server.
    #[must_use]
    pub fn artifact_url(&self) -> String {
        format!("{}/saml/artifact", self.server.base_url.trim_end_matches('/'))
    }

    /// Clock skew tolerance.
    #[must_use]
    pub const fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.server.clock_skew_secs)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_clock_skew() -> u64 {
    180
}

const fn default_redirect_timeout() -> u64 {
    30
}

const fn default_soap_timeout() -> u64 {
    10
}

const fn default_artifact_ttl() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[server]
entity_id = "https://idp.example.com"
base_url = "https://idp.example.com/"
signing_key = "key.pem"
signing_certificate = "cert.pem"
"#;

    #[test]
    fn defaults_apply() {
        let config = FederationConfig::from_toml_str(BASE).unwrap();
        assert_eq!(config.logout.redirect_timeout_secs, 30);
        assert_eq!(config.artifact.ttl_secs, 60);
        assert_eq!(config.trust.signing, CheckFlags::strict());
        assert_eq!(config.trust.ca, CheckFlags::dates_only());
        assert!(config.partners.is_empty());
        assert_eq!(config.slo_url(), "https://idp.example.com/saml/slo");
    }

    #[test]
    fn metadata_location_classification() {
        assert_eq!(
            MetadataLocation::parse("https://sp.example.com/md"),
            MetadataLocation::Url("https://sp.example.com/md".to_string())
        );
        assert_eq!(
            MetadataLocation::parse("file:///etc/sp.xml"),
            MetadataLocation::File(PathBuf::from("/etc/sp.xml"))
        );
        assert_eq!(
            MetadataLocation::parse("sp.xml"),
            MetadataLocation::File(PathBuf::from("sp.xml"))
        );
    }

    #[test]
    fn invalid_partners_are_dropped_not_fatal() {
        let raw = format!(
            r#"{BASE}
[[partners]]
entity_id = "https://sp1.example.com"
role = "sp"
metadata = "sp1.xml"

[[partners]]
entity_id = ""
role = "sp"
metadata = "empty.xml"

[[partners]]
entity_id = "https://dup.example.com"
role = "sp"
metadata = "a.xml"

[[partners]]
entity_id = "https://dup.example.com"
role = "idp"
metadata = "b.xml"
"#
        );
        let mut config: FederationConfig = toml::from_str(&raw).unwrap();
        let rejected = config.validate().unwrap();

        assert_eq!(config.partners.len(), 1);
        assert_eq!(config.partners[0].entity_id, "https://sp1.example.com");
        assert!(config.partners[0].logout_supported);
        assert_eq!(rejected.len(), 3);
    }

    #[test]
    fn duplicate_levels_are_fatal() {
        let raw = format!(
            r#"{BASE}
[[assurance.levels]]
level = 10
uri = "a"

[[assurance.levels]]
level = 10
uri = "b"
"#
        );
        let err = FederationConfig::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("duplicate assurance level"));
    }

    #[test]
    fn zero_redirect_timeout_is_fatal() {
        let raw = format!("{BASE}\n[logout]\nredirect_timeout_secs = 0\n");
        assert!(FederationConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn adapters_parse_and_names_are_unique() {
        let raw = format!(
            r#"{BASE}
[[adapters]]
name = "ldap-main"
kind = "ldap"
level = 10
settings = {{ url = "ldaps://ldap" }}
"#
        );
        let config = FederationConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config.adapters.len(), 1);
        assert_eq!(config.adapters[0].settings["url"], "ldaps://ldap");

        let twice = format!(
            "{raw}\n[[adapters]]\nname = \"ldap-main\"\nkind = \"sms\"\nlevel = 20\n"
        );
        assert!(FederationConfig::from_toml_str(&twice).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("federation.toml");
        std::fs::write(&path, BASE).unwrap();

        let config = FederationConfig::load(&path).unwrap();
        assert_eq!(config.server.entity_id, "https://idp.example.com");

        let missing = FederationConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(Error::Io { .. })));
    }
}
