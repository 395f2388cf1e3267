//! # fed-trust
//!
//! Trust anchors for federation partners.
//!
//! The [`TrustStore`] loads CA certificates from a PEM bundle once, on first
//! use, and answers two questions about a partner certificate: is it inside
//! its validity window, and was it issued by a trusted CA. Each anchor's
//! alias prefix decides which check it takes part in:
//!
//! - `signing_` anchors issue partner signing certificates
//! - `ca_` anchors are roots used to check the issuing CA itself
//!
//! Which checks run is decided per scope by a [`TrustPolicy`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod certificate;
pub mod error;
pub mod policy;
pub mod store;

pub use certificate::CertificateInfo;
pub use error::{TrustError, TrustResult};
pub use policy::TrustPolicy;
pub use store::{encode_bundle, AnchorScope, TrustAnchor, TrustAnchors, TrustStore};
