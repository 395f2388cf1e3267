//! Cache provider traits.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Cache provider trait for key-value caching.
///
/// Values are strings; callers store serialized forms so the cache has no
/// dependency on their object model. Implementations must be safe to share
/// between request handlers and background tasks.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Gets a value from the cache.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Sets a value in the cache with optional TTL.
    ///
    /// If `ttl` is `None`, the value will not expire automatically.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Deletes a value from the cache.
    ///
    /// Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Checks if a key exists in the cache.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Gets the remaining TTL for a key.
    ///
    /// Returns `None` if the key doesn't exist or has no TTL.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;
}

/// Extended cache operations for atomic updates.
#[async_trait]
pub trait AtomicCacheProvider: CacheProvider {
    /// Sets a value only if the key doesn't exist.
    ///
    /// Returns `true` if the value was set, `false` if the key already existed.
    async fn set_nx(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Gets and deletes a value atomically.
    async fn get_del(&self, key: &str) -> CacheResult<Option<String>>;
}
