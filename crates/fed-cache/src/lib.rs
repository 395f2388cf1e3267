//! # fed-cache
//!
//! Storage manager for short-lived federation state: artifact messages and
//! seen request IDs. Entries carry a TTL and disappear on their own.
//!
//! ## Cache Providers
//!
//! - [`CacheProvider`] - Basic key-value operations with TTL
//! - [`AtomicCacheProvider`] - Set-if-absent and get-and-delete
//!
//! ## Implementations
//!
//! - [`InMemoryCache`] - Process-local cache with a background sweeper

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod provider;

pub use error::{CacheError, CacheResult};
pub use memory::InMemoryCache;
pub use provider::{AtomicCacheProvider, CacheProvider};
