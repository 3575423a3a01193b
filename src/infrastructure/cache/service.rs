//! Cache backend trait and error types.

use async_trait::async_trait;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    #[error("Cache operation error: {0}")]
    OperationError(String),

    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// The backend cannot perform the operation at all (caching disabled).
    #[error("Cache disabled")]
    Disabled,
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value store with TTLs, atomic counters and sets.
///
/// Backends report failures honestly; the fail-open policy lives in
/// [`crate::infrastructure::cache::CacheLayer`], which is the only consumer.
/// TTLs are in seconds.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisCache`] - Redis-backed, shared across instances
/// - [`crate::infrastructure::cache::MemoryCache`] - In-process, single instance
/// - [`crate::infrastructure::cache::NullCache`] - No-op implementation for disabled caching
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores a value. `None` TTL stores without expiry.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()>;

    /// Stores a value only if the key is absent. Returns whether it was stored.
    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<bool>;

    /// Removes keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Atomically adds `delta` (may be negative) and returns the new value.
    ///
    /// Missing keys start at zero. Must be a single primitive of the store,
    /// never a read followed by a write.
    async fn increment_by(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Sets a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<bool>;

    /// Adds members to a set, returning how many were new.
    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64>;

    /// Atomically removes and returns one arbitrary member.
    async fn set_pop(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64>;

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    async fn set_len(&self, key: &str) -> CacheResult<u64>;

    /// Checks if the cache backend is reachable.
    async fn health_check(&self) -> bool;

    /// Backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}
