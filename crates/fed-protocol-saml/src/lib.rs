//! SAML 2.0 logout and artifact protocol for the federation server.
//!
//! This crate provides:
//!
//! - **Logout and artifact messages** - canonical XML form and parsing
//! - **Field signatures** - signing payloads with a fixed field order per
//!   message, verified against every key a partner currently publishes
//! - **Bindings** - Redirect, POST, POST-SimpleSign, Artifact and SOAP
//! - **Assurance levels** - negotiation of requested authentication contexts
//! - **Artifact storage** and **replay detection** on top of `fed-cache`
//!
//! # Architecture
//!
//! - [`types`] - Protocol messages and status codes
//! - [`signature`] - [`SignatureEngine`] and signing payloads
//! - [`bindings`] - Binding encoders and decoders
//! - [`level`] - [`SecurityLevelTable`]
//! - [`artifact_store`] - [`ArtifactStore`]
//! - [`replay`] - [`ReplayGuard`]
//! - [`metadata`] - Metadata published for this server
//! - [`error`] - Error types and their SAML status mapping
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifact_store;
pub mod bindings;
pub mod error;
pub mod level;
pub mod metadata;
pub mod replay;
pub mod signature;
pub mod types;
pub mod xml;

pub use artifact_store::ArtifactStore;
pub use error::{SamlError, SamlResult};
pub use level::{AssuranceLevelEntry, NegotiatedLevel, SecurityLevelTable};
pub use metadata::IdpMetadata;
pub use replay::ReplayGuard;
pub use signature::{Signable, SignatureEngine, SignatureValue};
pub use types::*;
