//! Redis-backed cache implementation.

use super::service::{CacheError, CacheResult, CacheService};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::info;

/// Redis cache shared by every service instance.
///
/// Uses `ConnectionManager` for connection reuse and automatic reconnects.
/// Counters use `INCRBY` and the pool uses `SPOP`, so concurrent workers on
/// different hosts never race on read-modify-write.
pub struct RedisCache {
    client: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connects to Redis and validates the connection with a PING.
    ///
    /// # Arguments
    ///
    /// - `redis_url` - Redis connection string (e.g., `"redis://localhost:6379"`)
    /// - `key_prefix` - Namespace prepended to every key
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionError`] if the URL is invalid, the connection cannot
    /// be established, or the PING health check fails.
    pub async fn connect(redis_url: &str, key_prefix: &str) -> CacheResult<Self> {
        info!("Connecting to Redis");

        let client = Client::open(redis_url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        let mut test_conn = manager.clone();
        test_conn
            .ping::<()>()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis PING failed: {}", e)))?;

        info!("✓ Connected to Redis");

        Ok(Self {
            client: manager,
            key_prefix: key_prefix.to_string(),
        })
    }

    /// Constructs the full Redis key with namespace prefix.
    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

fn op_error(command: &str, e: redis::RedisError) -> CacheError {
    if e.is_io_error() {
        CacheError::ConnectionError(format!("{} failed: {}", command, e))
    } else {
        CacheError::OperationError(format!("{} failed: {}", command, e))
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.client.clone();
        conn.get::<_, Option<String>>(self.build_key(key))
            .await
            .map_err(|e| op_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.client.clone();

        match ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(&key, value, ttl).await,
            None => conn.set::<_, _, ()>(&key, value).await,
        }
        .map_err(|e| op_error("SET", e))
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<bool> {
        let mut conn = self.client.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| op_error("SET NX", e))?;

        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
        let mut conn = self.client.clone();
        conn.del::<_, u64>(keys).await.map_err(|e| op_error("DEL", e))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.client.clone();
        conn.exists::<_, bool>(self.build_key(key))
            .await
            .map_err(|e| op_error("EXISTS", e))
    }

    async fn increment_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.client.clone();
        conn.incr::<_, _, i64>(self.build_key(key), delta)
            .await
            .map_err(|e| op_error("INCRBY", e))
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<bool> {
        let mut conn = self.client.clone();
        conn.expire::<_, bool>(self.build_key(key), ttl_seconds as i64)
            .await
            .map_err(|e| op_error("EXPIRE", e))
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.client.clone();
        conn.sadd::<_, _, u64>(self.build_key(key), members)
            .await
            .map_err(|e| op_error("SADD", e))
    }

    async fn set_pop(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.client.clone();
        conn.spop::<_, Option<String>>(self.build_key(key))
            .await
            .map_err(|e| op_error("SPOP", e))
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.client.clone();
        conn.srem::<_, _, u64>(self.build_key(key), members)
            .await
            .map_err(|e| op_error("SREM", e))
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.client.clone();
        conn.smembers::<_, Vec<String>>(self.build_key(key))
            .await
            .map_err(|e| op_error("SMEMBERS", e))
    }

    async fn set_len(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.client.clone();
        conn.scard::<_, u64>(self.build_key(key))
            .await
            .map_err(|e| op_error("SCARD", e))
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.client.clone();
        conn.ping::<()>().await.is_ok()
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
