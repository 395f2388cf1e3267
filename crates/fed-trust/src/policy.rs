//! Trust policy evaluation.

use fed_core::config::{CheckFlags, TrustConfig, TrustOverride};

use crate::certificate::CertificateInfo;
use crate::error::{TrustError, TrustResult};
use crate::store::{AnchorScope, TrustAnchor, TrustAnchors};

/// Checks applied to a partner signing certificate and to its issuing CA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Checks on the partner's signing certificate.
    pub signing: CheckFlags,
    /// Checks on the CA that issued it.
    pub ca: CheckFlags,
}

impl TrustPolicy {
    /// Builds the global policy from configuration.
    #[must_use]
    pub const fn from_config(config: &TrustConfig) -> Self {
        Self {
            signing: config.signing,
            ca: config.ca,
        }
    }

    /// Applies a partner-specific override.
    #[must_use]
    pub fn with_override(self, overrides: Option<&TrustOverride>) -> Self {
        let Some(overrides) = overrides else {
            return self;
        };
        Self {
            signing: overrides.signing.unwrap_or(self.signing),
            ca: overrides.ca.unwrap_or(self.ca),
        }
    }

    /// A policy that accepts every certificate.
    #[must_use]
    pub const fn permissive() -> Self {
        Self {
            signing: CheckFlags::none(),
            ca: CheckFlags::none(),
        }
    }

    fn needs_issuer(&self) -> bool {
        self.signing.check_issuer || self.ca.check_dates || self.ca.check_issuer
    }

    /// Evaluates `cert` against `anchors` at time `now` (Unix seconds).
    ///
    /// CA checks only run when an issuing anchor was found; a missing issuer
    /// is an error only if the signing scope requires one.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn evaluate(
        &self,
        anchors: &TrustAnchors,
        cert: &CertificateInfo,
        now: i64,
    ) -> TrustResult<()> {
        if self.signing.check_dates {
            if now < cert.not_before() {
                return Err(TrustError::NotYetValid(cert.subject().to_string()));
            }
            if now > cert.not_after() {
                return Err(TrustError::Expired(cert.subject().to_string()));
            }
        }

        if !self.needs_issuer() {
            return Ok(());
        }

        let Some(issuer) = find_issuer(anchors, cert) else {
            if self.signing.check_issuer {
                return Err(TrustError::UntrustedIssuer(cert.subject().to_string()));
            }
            return Ok(());
        };

        if self.ca.check_dates && !issuer.certificate.is_valid_at(now) {
            return Err(TrustError::CaExpired(issuer.alias.clone()));
        }

        if self.ca.check_issuer && !chains_to_root(anchors, issuer) {
            return Err(TrustError::UntrustedCa(issuer.alias.clone()));
        }

        Ok(())
    }
}

/// A signing-scope anchor that issued `cert`, or that is `cert` itself.
fn find_issuer<'a>(anchors: &'a TrustAnchors, cert: &CertificateInfo) -> Option<&'a TrustAnchor> {
    anchors.in_scope(AnchorScope::Signing).find(|anchor| {
        anchor.certificate.der() == cert.der() || cert.is_issued_by(&anchor.certificate)
    })
}

fn chains_to_root(anchors: &TrustAnchors, issuer: &TrustAnchor) -> bool {
    anchors.in_scope(AnchorScope::Ca).any(|root| {
        root.certificate.der() == issuer.certificate.der()
            || issuer.certificate.is_issued_by(&root.certificate)
    })
}
