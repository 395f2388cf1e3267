//! Key handling.
//!
//! Private keys are loaded from PKCS#8 (PEM or DER), with a fallback to
//! PKCS#1 for RSA. Public keys are kept in the raw form found in an X.509
//! `subjectPublicKey` bit string: the PKCS#1 `RSAPublicKey` for RSA and the
//! uncompressed point for EC.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{
        self, EcdsaKeyPair, KeyPair, RsaKeyPair, UnparsedPublicKey, VerificationAlgorithm,
        ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA256_ASN1_SIGNING, ECDSA_P384_SHA384_ASN1,
        ECDSA_P384_SHA384_ASN1_SIGNING, RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384,
        RSA_PKCS1_2048_8192_SHA512,
    },
};

use crate::algorithm::SignatureAlgorithm;
use crate::hash::{sha256, to_hex};
use crate::SignatureError;

/// Key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// RSA of any supported size.
    Rsa,
    /// ECDSA on NIST P-256.
    EcP256,
    /// ECDSA on NIST P-384.
    EcP384,
}

/// A public verification key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    kind: KeyKind,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Wraps a DER-encoded PKCS#1 `RSAPublicKey`.
    #[must_use]
    pub fn rsa(pkcs1_der: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: KeyKind::Rsa,
            bytes: pkcs1_der.into(),
        }
    }

    /// Wraps an uncompressed EC point; the curve follows from its length.
    ///
    /// # Errors
    ///
    /// Returns an error if the point is not an uncompressed P-256 or P-384 point.
    pub fn ec(point: impl Into<Vec<u8>>) -> Result<Self, SignatureError> {
        let bytes = point.into();
        let kind = match (bytes.first(), bytes.len()) {
            (Some(0x04), 65) => KeyKind::EcP256,
            (Some(0x04), 97) => KeyKind::EcP384,
            _ => {
                return Err(SignatureError::InvalidKey(format!(
                    "unsupported EC point of {} bytes",
                    bytes.len()
                )))
            }
        };
        Ok(Self { kind, bytes })
    }

    /// Returns the key family.
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 fingerprint of the raw key, hex encoded.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        to_hex(&sha256(&self.bytes))
    }

    /// Verifies `signature` over `data`.
    ///
    /// Returns false for malformed signatures and for algorithms the key
    /// cannot produce.
    #[must_use]
    pub fn verify(&self, algorithm: SignatureAlgorithm, data: &[u8], signature: &[u8]) -> bool {
        if !algorithm.matches_key(self.kind) {
            return false;
        }

        let verification_alg: &'static dyn VerificationAlgorithm = match algorithm {
            SignatureAlgorithm::RsaSha256 => &RSA_PKCS1_2048_8192_SHA256,
            SignatureAlgorithm::RsaSha384 => &RSA_PKCS1_2048_8192_SHA384,
            SignatureAlgorithm::RsaSha512 => &RSA_PKCS1_2048_8192_SHA512,
            SignatureAlgorithm::EcdsaSha256 => &ECDSA_P256_SHA256_ASN1,
            SignatureAlgorithm::EcdsaSha384 => &ECDSA_P384_SHA384_ASN1,
        };

        UnparsedPublicKey::new(verification_alg, &self.bytes)
            .verify(data, signature)
            .is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("kind", &self.kind)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

enum KeyMaterial {
    Rsa(RsaKeyPair),
    Ec(EcdsaKeyPair, KeyKind),
}

/// A private signing key.
pub struct PrivateKey {
    material: KeyMaterial,
}

impl PrivateKey {
    /// Parses a PKCS#8 DER private key. PKCS#1 RSA keys are accepted as well.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not P-256, P-384 or RSA.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, der) {
            return Ok(Self {
                material: KeyMaterial::Ec(pair, KeyKind::EcP256),
            });
        }
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, der) {
            return Ok(Self {
                material: KeyMaterial::Ec(pair, KeyKind::EcP384),
            });
        }

        let pair = RsaKeyPair::from_pkcs8(der)
            .or_else(|_| RsaKeyPair::from_der(der))
            .map_err(|e| SignatureError::InvalidKey(format!("unrecognised private key: {e}")))?;
        Ok(Self {
            material: KeyMaterial::Rsa(pair),
        })
    }

    /// Parses the first private key block of a PEM document.
    ///
    /// # Errors
    ///
    /// Returns an error if no `PRIVATE KEY` or `RSA PRIVATE KEY` block is found
    /// or the key cannot be parsed.
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        for block in x509_parser::pem::Pem::iter_from_buffer(pem.as_bytes()) {
            let block =
                block.map_err(|e| SignatureError::InvalidKey(format!("invalid PEM: {e}")))?;
            if block.label == "PRIVATE KEY" || block.label == "RSA PRIVATE KEY" {
                return Self::from_der(&block.contents);
            }
        }
        Err(SignatureError::InvalidKey(
            "no private key block in PEM document".to_string(),
        ))
    }

    /// Returns the key family.
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        match &self.material {
            KeyMaterial::Rsa(_) => KeyKind::Rsa,
            KeyMaterial::Ec(_, kind) => *kind,
        }
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        match &self.material {
            KeyMaterial::Rsa(pair) => PublicKey::rsa(pair.public_key().as_ref()),
            KeyMaterial::Ec(pair, kind) => PublicKey {
                kind: *kind,
                bytes: pair.public_key().as_ref().to_vec(),
            },
        }
    }

    /// Signs `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot produce `algorithm` or signing fails.
    pub fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        if !algorithm.matches_key(self.kind()) {
            return Err(SignatureError::UnsupportedAlgorithm(format!(
                "{algorithm} with a {:?} key",
                self.kind()
            )));
        }

        let rng = SystemRandom::new();
        match &self.material {
            KeyMaterial::Rsa(pair) => {
                let padding = match algorithm {
                    SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_SHA384,
                    SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_SHA512,
                    _ => &signature::RSA_PKCS1_SHA256,
                };
                let mut out = vec![0u8; pair.public_modulus_len()];
                pair.sign(padding, &rng, data, &mut out)
                    .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;
                Ok(out)
            }
            KeyMaterial::Ec(pair, _) => pair
                .sign(&rng, data)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|e| SignatureError::Signing(format!("ECDSA signing failed: {e}"))),
        }
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}
