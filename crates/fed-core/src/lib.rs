//! # fed-core
//!
//! Shared foundation for the federation server.
//!
//! ## Modules
//!
//! - [`config`] - Federation configuration (server identity, trust, partners, levels)
//! - [`error`] - The error taxonomy every crate classifies into
//! - [`event`] - Structured audit events for logout and trust decisions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::{FederationConfig, MetadataLocation, PartnerConfig, PartnerRole};
pub use error::{Classify, Error, ErrorKind, Result};
pub use event::{EventOutcome, EventType, FederationEvent};
