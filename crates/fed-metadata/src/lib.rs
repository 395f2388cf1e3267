//! # fed-metadata
//!
//! Partner metadata for the federation.
//!
//! - [`parser`] reads `EntityDescriptor` documents into [`EntityDescriptor`]
//! - [`fetch`] obtains documents from a URL or a local file
//! - [`MetadataCache`] resolves a configured partner's endpoints and signing
//!   keys, fetching and trust-checking its metadata on first use
//!
//! A partner whose metadata cannot be fetched, parsed or trusted is treated
//! as unknown; lookups answer `None` and never fail.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cache;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod parser;

pub use cache::MetadataCache;
pub use descriptor::{Binding, EntityDescriptor, Endpoint, ServiceType};
pub use entity::PartnerEntity;
pub use error::{MetadataError, MetadataResult};
pub use fetch::{HttpMetadataFetcher, MetadataFetcher};
pub use parser::{find_entity, parse_metadata};
