//! Trust store loading.
//!
//! The store is a PEM bundle. Each certificate is preceded by a
//! `friendlyName:` line carrying its alias; the alias prefix assigns the
//! anchor's scope. A password-protected store carries an
//! `# integrity:` line with an HMAC-SHA256 over every alias and DER, keyed
//! with the password:
//!
//! ```text
//! # integrity: 3q2+7w...
//! friendlyName: signing_partner-ca
//! -----BEGIN CERTIFICATE-----
//! MIIB...
//! -----END CERTIFICATE-----
//! friendlyName: ca_federation-root
//! -----BEGIN CERTIFICATE-----
//! MIIB...
//! -----END CERTIFICATE-----
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::Engine;
use fed_core::config::TrustConfig;
use tokio::sync::OnceCell;

use crate::certificate::CertificateInfo;
use crate::error::{TrustError, TrustResult};
use crate::policy::TrustPolicy;

const ALIAS_PREFIX: &str = "friendlyName:";
const INTEGRITY_PREFIX: &str = "# integrity:";
const BEGIN_CERT: &str = "-----BEGIN CERTIFICATE-----";
const END_CERT: &str = "-----END CERTIFICATE-----";

/// Which checks an anchor takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorScope {
    /// Issues partner signing certificates (`signing_` prefix).
    Signing,
    /// Root used to validate an issuing CA (`ca_` prefix).
    Ca,
}

impl AnchorScope {
    /// Derives the scope from an alias prefix.
    #[must_use]
    pub fn from_alias(alias: &str) -> Option<Self> {
        if alias.starts_with("signing_") {
            Some(Self::Signing)
        } else if alias.starts_with("ca_") {
            Some(Self::Ca)
        } else {
            None
        }
    }
}

/// A trusted CA certificate.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    /// Alias from the store.
    pub alias: String,
    /// Scope derived from the alias.
    pub scope: AnchorScope,
    /// The certificate.
    pub certificate: CertificateInfo,
}

impl TrustAnchor {
    /// Creates an anchor; `None` if the alias has no known prefix.
    #[must_use]
    pub fn new(alias: impl Into<String>, certificate: CertificateInfo) -> Option<Self> {
        let alias = alias.into();
        let scope = AnchorScope::from_alias(&alias)?;
        Some(Self {
            alias,
            scope,
            certificate,
        })
    }
}

/// The immutable set of anchors loaded from a store.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    anchors: Vec<TrustAnchor>,
}

impl TrustAnchors {
    /// Wraps a list of anchors.
    #[must_use]
    pub fn new(anchors: Vec<TrustAnchor>) -> Self {
        Self { anchors }
    }

    /// Anchors of one scope.
    pub fn in_scope(&self, scope: AnchorScope) -> impl Iterator<Item = &TrustAnchor> {
        self.anchors.iter().filter(move |a| a.scope == scope)
    }

    /// Looks up an anchor by alias.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&TrustAnchor> {
        self.anchors.iter().find(|a| a.alias == alias)
    }

    /// Number of anchors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Returns true if no anchor was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Parses a store bundle.
    ///
    /// Certificates whose alias has no known prefix are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::StoreUnavailable`] for structural problems and
    /// when a password is given but the integrity line is absent or wrong.
    pub fn parse_bundle(text: &str, password: Option<&str>) -> TrustResult<Self> {
        let mut integrity = None;
        let mut pending_alias: Option<String> = None;
        let mut block: Option<String> = None;
        let mut entries: Vec<(String, CertificateInfo)> = Vec::new();

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            let line_no = index + 1;

            if let Some(pem) = block.as_mut() {
                pem.push_str(line);
                pem.push('\n');
                if line == END_CERT {
                    let alias = pending_alias.take().ok_or_else(|| {
                        TrustError::StoreUnavailable(format!(
                            "certificate ending at line {line_no} has no alias"
                        ))
                    })?;
                    let cert = CertificateInfo::from_pem(pem).map_err(|e| {
                        TrustError::StoreUnavailable(format!("alias {alias}: {e}"))
                    })?;
                    entries.push((alias, cert));
                    block = None;
                }
                continue;
            }

            if line.is_empty() {
                continue;
            }
            if let Some(value) = line.strip_prefix(INTEGRITY_PREFIX) {
                integrity = Some(value.trim().to_string());
            } else if let Some(alias) = line.strip_prefix(ALIAS_PREFIX) {
                pending_alias = Some(alias.trim().to_string());
            } else if line == BEGIN_CERT {
                block = Some(format!("{line}\n"));
            } else if !line.starts_with('#') {
                return Err(TrustError::StoreUnavailable(format!(
                    "unexpected content at line {line_no}"
                )));
            }
        }

        if block.is_some() {
            return Err(TrustError::StoreUnavailable(
                "unterminated certificate block".to_string(),
            ));
        }

        if let Some(password) = password {
            let expected = integrity.ok_or_else(|| {
                TrustError::StoreUnavailable("store has no integrity line".to_string())
            })?;
            let tag = base64::engine::general_purpose::STANDARD
                .decode(expected)
                .map_err(|_| TrustError::StoreUnavailable("malformed integrity line".to_string()))?;
            let material = integrity_material(
                entries
                    .iter()
                    .map(|(alias, cert)| (alias.as_str(), cert.der())),
            );
            if !fed_crypto::hmac_sha256_verify(password.as_bytes(), &material, &tag) {
                return Err(TrustError::StoreUnavailable(
                    "integrity check failed".to_string(),
                ));
            }
        }

        let mut anchors = Vec::with_capacity(entries.len());
        for (alias, cert) in entries {
            match TrustAnchor::new(alias.clone(), cert) {
                Some(anchor) => anchors.push(anchor),
                None => tracing::warn!(alias = %alias, "Skipping trust anchor with unknown alias prefix"),
            }
        }

        Ok(Self { anchors })
    }
}

fn integrity_material<'a>(entries: impl Iterator<Item = (&'a str, &'a [u8])>) -> Vec<u8> {
    let mut material = Vec::new();
    for (alias, der) in entries {
        material.extend_from_slice(alias.as_bytes());
        material.push(b'\n');
        material.extend_from_slice(der);
    }
    material
}

/// Writes a store bundle for the given `(alias, DER)` pairs.
#[must_use]
pub fn encode_bundle(entries: &[(&str, &[u8])], password: Option<&str>) -> String {
    let pem_config = pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF);
    let mut out = String::new();
    if let Some(password) = password {
        let tag = fed_crypto::hmac_sha256(
            password.as_bytes(),
            &integrity_material(entries.iter().copied()),
        );
        out.push_str(INTEGRITY_PREFIX);
        out.push(' ');
        out.push_str(&base64::engine::general_purpose::STANDARD.encode(tag));
        out.push('\n');
    }

    for (alias, der) in entries {
        out.push_str(ALIAS_PREFIX);
        out.push(' ');
        out.push_str(alias);
        out.push('\n');
        out.push_str(&pem::encode_config(
            &pem::Pem::new("CERTIFICATE", der.to_vec()),
            pem_config,
        ));
    }
    out
}

/// Lazily loaded trust anchors.
///
/// The first caller loads the bundle; every later caller, including callers
/// racing with the first, observes the same result. A failed load is not
/// retried.
#[derive(Debug)]
pub struct TrustStore {
    source: Option<PathBuf>,
    password: Option<String>,
    anchors: OnceCell<Result<Arc<TrustAnchors>, TrustError>>,
    loads: AtomicUsize,
}

impl TrustStore {
    /// Creates a store reading `source` on first use. No source means no anchors.
    #[must_use]
    pub fn new(source: Option<PathBuf>, password: Option<String>) -> Self {
        Self {
            source,
            password,
            anchors: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Creates a store from the `[trust]` configuration section.
    #[must_use]
    pub fn from_config(config: &TrustConfig) -> Self {
        Self::new(config.store.clone(), config.password.clone())
    }

    /// Creates an already-loaded store.
    #[must_use]
    pub fn from_anchors(anchors: TrustAnchors) -> Self {
        Self {
            source: None,
            password: None,
            anchors: OnceCell::new_with(Some(Ok(Arc::new(anchors)))),
            loads: AtomicUsize::new(0),
        }
    }

    /// Returns the anchors, loading them on first call.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::StoreUnavailable`] if the bundle could not be
    /// read or parsed.
    pub async fn load(&self) -> TrustResult<Arc<TrustAnchors>> {
        self.anchors
            .get_or_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                let result = self.read().await.map(Arc::new);
                match &result {
                    Ok(anchors) => tracing::info!(
                        anchors = anchors.len(),
                        source = ?self.source,
                        "Trust store loaded"
                    ),
                    Err(e) => tracing::error!(error = %e, source = ?self.source, "Trust store failed to load"),
                }
                result
            })
            .await
            .clone()
    }

    async fn read(&self) -> TrustResult<TrustAnchors> {
        let Some(path) = &self.source else {
            return Ok(TrustAnchors::default());
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TrustError::StoreUnavailable(format!("{}: {e}", path.display())))?;
        TrustAnchors::parse_bundle(&text, self.password.as_deref())
    }

    /// Number of times the bundle was actually read.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Validates `cert` under `policy` at the current time.
    ///
    /// # Errors
    ///
    /// Returns the failed trust check, or [`TrustError::StoreUnavailable`].
    pub async fn validate(&self, cert: &CertificateInfo, policy: &TrustPolicy) -> TrustResult<()> {
        let anchors = self.load().await?;
        policy.evaluate(&anchors, cert, chrono::Utc::now().timestamp())
    }
}
