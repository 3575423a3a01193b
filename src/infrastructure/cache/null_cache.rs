//! No-op cache implementation for disabled caching.

use super::service::{CacheError, CacheResult, CacheService};
use async_trait::async_trait;
use tracing::debug;

/// A cache implementation that stores nothing.
///
/// Used when Redis is configured but unreachable at startup. Reads miss and
/// writes are dropped. Counter increments report [`CacheError::Disabled`] so
/// click accounting takes its synchronous path instead of counting into the
/// void.
pub struct NullCache;

impl NullCache {
    /// Creates a new NullCache instance.
    pub fn new() -> Self {
        debug!("Using NullCache (caching disabled)");
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheService for NullCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: Option<u64>) -> CacheResult<()> {
        Ok(())
    }

    async fn set_nx(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> CacheResult<bool> {
        Err(CacheError::Disabled)
    }

    async fn delete(&self, _keys: &[String]) -> CacheResult<u64> {
        Ok(0)
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    async fn increment_by(&self, _key: &str, _delta: i64) -> CacheResult<i64> {
        Err(CacheError::Disabled)
    }

    async fn expire(&self, _key: &str, _ttl_seconds: u64) -> CacheResult<bool> {
        Ok(false)
    }

    async fn set_add(&self, _key: &str, _members: &[String]) -> CacheResult<u64> {
        Err(CacheError::Disabled)
    }

    async fn set_pop(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set_remove(&self, _key: &str, _members: &[String]) -> CacheResult<u64> {
        Ok(0)
    }

    async fn set_members(&self, _key: &str) -> CacheResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn set_len(&self, _key: &str) -> CacheResult<u64> {
        Err(CacheError::Disabled)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "null"
    }
}
