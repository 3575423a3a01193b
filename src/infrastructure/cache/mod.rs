//! Caching layer.
//!
//! Provides a [`CacheService`] backend trait with three implementations and
//! the fail-open [`CacheLayer`] that services use:
//! - [`RedisCache`] - Production Redis-backed cache
//! - [`MemoryCache`] - In-process `moka` cache for single-instance deployments
//! - [`NullCache`] - No-op implementation when Redis is unreachable

pub mod keys;
mod layer;
mod memory_cache;
mod null_cache;
mod redis_cache;
mod service;

pub use layer::CacheLayer;
pub use memory_cache::{DEFAULT_MAX_CAPACITY as DEFAULT_MEMORY_CACHE_CAPACITY, MemoryCache};
pub use null_cache::NullCache;
pub use redis_cache::RedisCache;
pub use service::{CacheError, CacheResult, CacheService};
