//! X.509 certificate parsing.

use base64::Engine;
use fed_crypto::PublicKey;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey as ParsedKey;

use crate::error::{TrustError, TrustResult};

/// Owned summary of an X.509 certificate.
///
/// The DER is kept so signatures between certificates can be re-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    der: Vec<u8>,
    subject: String,
    subject_raw: Vec<u8>,
    issuer: String,
    issuer_raw: Vec<u8>,
    not_before: i64,
    not_after: i64,
    public_key: PublicKey,
}

impl CertificateInfo {
    /// Parses a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidCertificate`] for malformed input or a key
    /// type other than RSA and EC.
    pub fn from_der(der: &[u8]) -> TrustResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;

        let spki = cert.public_key();
        let raw_key = spki.subject_public_key.data.to_vec();
        let public_key = match spki.parsed() {
            Ok(ParsedKey::RSA(_)) => PublicKey::rsa(raw_key),
            Ok(ParsedKey::EC(_)) => PublicKey::ec(raw_key)
                .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?,
            Ok(_) => {
                return Err(TrustError::InvalidCertificate(
                    "unsupported public key type".to_string(),
                ))
            }
            Err(e) => return Err(TrustError::InvalidCertificate(e.to_string())),
        };

        Ok(Self {
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer: cert.issuer().to_string(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            public_key,
        })
    }

    /// Parses the base64 body of a `<ds:X509Certificate>` element.
    ///
    /// Whitespace inside the text is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidCertificate`] if decoding or parsing fails.
    pub fn from_base64(text: &str) -> TrustResult<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| TrustError::InvalidCertificate(format!("base64: {e}")))?;
        Self::from_der(&der)
    }

    /// Parses the first certificate of a PEM document.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidCertificate`] if no certificate is found.
    pub fn from_pem(pem: &str) -> TrustResult<Self> {
        for block in x509_parser::pem::Pem::iter_from_buffer(pem.as_bytes()) {
            let block = block.map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;
            if block.label == "CERTIFICATE" {
                return Self::from_der(&block.contents);
            }
        }
        Err(TrustError::InvalidCertificate(
            "no certificate block in PEM document".to_string(),
        ))
    }

    /// DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER as standard base64, the form used inside metadata.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Start of validity (Unix seconds).
    #[must_use]
    pub const fn not_before(&self) -> i64 {
        self.not_before
    }

    /// End of validity (Unix seconds).
    #[must_use]
    pub const fn not_after(&self) -> i64 {
        self.not_after
    }

    /// Subject public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns true if `now` lies inside the validity window.
    #[must_use]
    pub const fn is_valid_at(&self, now: i64) -> bool {
        now >= self.not_before && now <= self.not_after
    }

    /// Returns true if subject and issuer names are equal.
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.subject_raw == self.issuer_raw
    }

    /// Returns true if `issuer`'s subject matches this issuer name and
    /// `issuer`'s key verifies this certificate's signature.
    #[must_use]
    pub fn is_issued_by(&self, issuer: &Self) -> bool {
        if self.issuer_raw != issuer.subject_raw {
            return false;
        }

        let Ok((_, cert)) = X509Certificate::from_der(&self.der) else {
            return false;
        };
        let Ok((_, issuer_cert)) = X509Certificate::from_der(&issuer.der) else {
            return false;
        };

        cert.verify_signature(Some(issuer_cert.public_key())).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn params(cn: &str) -> CertificateParams {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params
    }

    #[test]
    fn parses_self_signed() {
        let key = KeyPair::generate().unwrap();
        let cert = params("Root").self_signed(&key).unwrap();

        let info = CertificateInfo::from_der(cert.der()).unwrap();
        assert!(info.subject().contains("Root"));
        assert!(info.is_self_issued());
        assert!(info.is_issued_by(&info));
        assert_eq!(info.public_key().as_bytes(), key.public_key_raw());
    }

    #[test]
    fn base64_and_pem_forms() {
        let key = KeyPair::generate().unwrap();
        let cert = params("Partner").self_signed(&key).unwrap();
        let info = CertificateInfo::from_der(cert.der()).unwrap();

        let b64 = info.to_base64();
        let wrapped: String = b64
            .as_bytes()
            .chunks(64)
            .map(|c| format!("{}\n  ", String::from_utf8_lossy(c)))
            .collect();
        assert_eq!(CertificateInfo::from_base64(&wrapped).unwrap(), info);
        assert_eq!(CertificateInfo::from_pem(&cert.pem()).unwrap(), info);
    }

    #[test]
    fn issued_by_checks_signature_and_name() {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = params("Partner CA");
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = params("sp.example.com")
            .signed_by(&leaf_key, &ca, &ca_key)
            .unwrap();

        let other_key = KeyPair::generate().unwrap();
        let impostor = params("Partner CA").self_signed(&other_key).unwrap();

        let ca_info = CertificateInfo::from_der(ca.der()).unwrap();
        let leaf_info = CertificateInfo::from_der(leaf.der()).unwrap();
        let impostor_info = CertificateInfo::from_der(impostor.der()).unwrap();

        assert!(leaf_info.is_issued_by(&ca_info));
        assert!(!leaf_info.is_issued_by(&impostor_info));
        assert!(!leaf_info.is_self_issued());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            CertificateInfo::from_der(b"nope"),
            Err(TrustError::InvalidCertificate(_))
        ));
        assert!(CertificateInfo::from_base64("!!!").is_err());
    }
}
