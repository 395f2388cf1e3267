//! # fed-spi
//!
//! Back-end authentication adapters (PKI, LDAP, RADIUS, SMS and the like)
//! plug into the federation server through this crate.
//!
//! ## Design
//!
//! - [`AuthAdapter`] - capability implemented by every adapter
//! - [`AdapterFactory`] - creates adapters of one kind
//! - [`AdapterRegistry`] - kinds registered in code, instances named in
//!   configuration, selected by assurance level
//! - [`AdapterResponse`] - signed result handed back to the protocol layer

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod adapter;
pub mod error;
pub mod registry;
pub mod response;

pub use adapter::{
    AdapterChallenge, AdapterFactory, AdapterOutcome, AdapterRequest, AdapterSettings,
    AuthAdapter, ResultCode,
};
pub use error::{SpiError, SpiResult};
pub use registry::{AdapterRegistry, ConfiguredAdapter, RejectedAdapter};
pub use response::AdapterResponse;
