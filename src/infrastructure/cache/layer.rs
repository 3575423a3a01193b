//! Fail-open cache layer used by every service.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::service::{CacheError, CacheService};

/// Typed, fail-open access to a [`CacheService`] backend.
///
/// No method returns an error. Failures are logged and reported as a miss
/// (`None`) or a no-op (`false`), so a cache outage costs latency but never
/// correctness: callers always have the durable store to fall back on.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn CacheService>,
}

fn log_fault(op: &str, key: &str, e: &CacheError) {
    match e {
        CacheError::Disabled => debug!("Cache {} skipped for {}: cache disabled", op, key),
        _ => warn!("Cache {} failed for {}: {}", op, key, e),
    }
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheService>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(Some(value)) => {
                debug!("Cache HIT: {}", key);
                Some(value)
            }
            Ok(None) => {
                debug!("Cache MISS: {}", key);
                None
            }
            Err(e) => {
                log_fault("GET", key, &e);
                None
            }
        }
    }

    /// Reads an integer value. Unparseable values count as a miss.
    pub async fn get_i64(&self, key: &str) -> Option<i64> {
        let raw = self.get(key).await?;
        match raw.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!("Cache value at {} is not an integer: {:?}", key, raw);
                None
            }
        }
    }

    pub async fn get_object<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to deserialize cached value at {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> bool {
        match self.backend.set(key, value, ttl_seconds).await {
            Ok(()) => {
                debug!("Cache SET: {} (TTL: {:?}s)", key, ttl_seconds);
                true
            }
            Err(e) => {
                log_fault("SET", key, &e);
                false
            }
        }
    }

    pub async fn set_object<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                log_fault(
                    "SET",
                    key,
                    &CacheError::SerializationError(e.to_string()),
                );
                return false;
            }
        };
        self.set(key, &raw, ttl_seconds).await
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.delete_many(&[key.to_string()]).await > 0
    }

    /// Removes keys, returning how many existed (0 on failure).
    pub async fn delete_many(&self, keys: &[String]) -> u64 {
        match self.backend.delete(keys).await {
            Ok(deleted) => {
                if deleted > 0 {
                    debug!("Cache INVALIDATE: {} key(s)", deleted);
                }
                deleted
            }
            Err(e) => {
                log_fault("DEL", &keys.join(","), &e);
                0
            }
        }
    }

    pub async fn exists(&self, key: &str) -> Option<bool> {
        self.backend
            .exists(key)
            .await
            .map_err(|e| log_fault("EXISTS", key, &e))
            .ok()
    }

    /// Atomically adds one. `None` means the counter is unavailable.
    pub async fn increment(&self, key: &str) -> Option<i64> {
        self.increment_by(key, 1).await
    }

    pub async fn increment_by(&self, key: &str, delta: i64) -> Option<i64> {
        self.backend
            .increment_by(key, delta)
            .await
            .map_err(|e| log_fault("INCRBY", key, &e))
            .ok()
    }

    /// Atomically subtracts `amount` and returns the residual.
    pub async fn subtract(&self, key: &str, amount: i64) -> Option<i64> {
        self.increment_by(key, -amount).await
    }

    pub async fn expire(&self, key: &str, ttl_seconds: u64) -> bool {
        self.backend
            .expire(key, ttl_seconds)
            .await
            .unwrap_or_else(|e| {
                log_fault("EXPIRE", key, &e);
                false
            })
    }

    /// Acquires a short-lived lock. `None` means the cache could not decide.
    pub async fn try_lock(&self, key: &str, ttl_seconds: u64) -> Option<bool> {
        self.backend
            .set_nx(key, "1", ttl_seconds)
            .await
            .map_err(|e| log_fault("SET NX", key, &e))
            .ok()
    }

    pub async fn add_members(&self, key: &str, members: &[String]) -> Option<u64> {
        self.backend
            .set_add(key, members)
            .await
            .map_err(|e| log_fault("SADD", key, &e))
            .ok()
    }

    pub async fn pop_member(&self, key: &str) -> Option<String> {
        self.backend
            .set_pop(key)
            .await
            .unwrap_or_else(|e| {
                log_fault("SPOP", key, &e);
                None
            })
    }

    pub async fn remove_members(&self, key: &str, members: &[String]) -> u64 {
        self.backend
            .set_remove(key, members)
            .await
            .unwrap_or_else(|e| {
                log_fault("SREM", key, &e);
                0
            })
    }

    pub async fn members(&self, key: &str) -> Vec<String> {
        self.backend.set_members(key).await.unwrap_or_else(|e| {
            log_fault("SMEMBERS", key, &e);
            Vec::new()
        })
    }

    /// Set cardinality. `None` means the size is unknown.
    pub async fn member_count(&self, key: &str) -> Option<u64> {
        self.backend
            .set_len(key)
            .await
            .map_err(|e| log_fault("SCARD", key, &e))
            .ok()
    }

    pub async fn is_healthy(&self) -> bool {
        self.backend.health_check().await
    }
}
