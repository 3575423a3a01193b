#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use shortlink_engine::config::{
    CacheTtls, ClickSettings, Config, ExpirySettings, QueueSettings, SlugSettings,
};
use shortlink_engine::domain::entities::{NewShortLink, ShortLink, SystemStats};
use shortlink_engine::domain::repositories::LinkRepository;
use shortlink_engine::error::AppError;
use shortlink_engine::infrastructure::cache::{
    CacheError, CacheLayer, CacheResult, CacheService, MemoryCache, NullCache,
};
use shortlink_engine::state::AppState;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-process stand-in for the PostgreSQL repository.
///
/// Mirrors the SQL semantics closely enough for service and handler tests:
/// codes are unique across all rows, aggregates only see live links, and
/// `remove_expired` re-checks expiry.
#[derive(Default)]
pub struct MemoryLinkRepository {
    links: Mutex<Vec<ShortLink>>,
    failing: AtomicBool,
    find_calls: AtomicUsize,
    next_id: AtomicI64,
}

impl MemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with an internal error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `find_by_code` calls that reached the store.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn insert(
        &self,
        code: &str,
        destination: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> ShortLink {
        let mut links = self.links.lock().unwrap();
        let now = Utc::now();
        let link = ShortLink {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            destination: destination.to_string(),
            code: code.to_string(),
            click_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
            expires_at,
            owner_id: None,
        };
        links.push(link.clone());
        link
    }

    pub fn insert_expired(&self, code: &str, destination: &str) -> ShortLink {
        self.insert(code, destination, Some(Utc::now() - Duration::hours(1)))
    }

    pub fn get(&self, code: &str) -> Option<ShortLink> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.code == code)
            .cloned()
    }

    pub fn set_clicks(&self, code: &str, clicks: i64) {
        let mut links = self.links.lock().unwrap();
        if let Some(link) = links.iter_mut().find(|l| l.code == code) {
            link.click_count = clicks;
        }
    }

    pub fn click_count(&self, code: &str) -> i64 {
        self.get(code).map_or(0, |l| l.click_count)
    }

    pub fn len(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::internal("store unavailable", json!({})));
        }
        Ok(())
    }

    fn live(&self) -> Vec<ShortLink> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.is_live())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LinkRepository for MemoryLinkRepository {
    async fn create(&self, new_link: NewShortLink) -> Result<ShortLink, AppError> {
        self.check()?;
        if self.get(&new_link.code).is_some() {
            return Err(AppError::conflict(
                "Code already in use",
                json!({ "code": new_link.code }),
            ));
        }
        let mut link = self.insert(&new_link.code, &new_link.destination, new_link.expires_at);
        if new_link.owner_id.is_some() {
            let mut links = self.links.lock().unwrap();
            if let Some(stored) = links.iter_mut().find(|l| l.code == link.code) {
                stored.owner_id = new_link.owner_id.clone();
            }
            link.owner_id = new_link.owner_id;
        }
        Ok(link)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        self.check()?;
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(code))
    }

    async fn find_by_destination(
        &self,
        destination: &str,
    ) -> Result<Option<ShortLink>, AppError> {
        self.check()?;
        Ok(self
            .live()
            .into_iter()
            .filter(|l| l.destination == destination)
            .max_by_key(|l| l.created_at))
    }

    async fn existing_codes(&self, codes: &[String]) -> Result<Vec<String>, AppError> {
        self.check()?;
        let links = self.links.lock().unwrap();
        Ok(codes
            .iter()
            .filter(|c| links.iter().any(|l| &l.code == *c))
            .cloned()
            .collect())
    }

    async fn increment_click_count(&self, code: &str) -> Result<bool, AppError> {
        self.bulk_increment_click_count(code, 1).await
    }

    async fn bulk_increment_click_count(
        &self,
        code: &str,
        amount: i64,
    ) -> Result<bool, AppError> {
        self.check()?;
        let mut links = self.links.lock().unwrap();
        match links.iter_mut().find(|l| l.code == code) {
            Some(link) => {
                link.click_count += amount;
                link.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_popular(&self, limit: i64) -> Result<Vec<ShortLink>, AppError> {
        self.check()?;
        let mut links = self.live();
        links.sort_by(|a, b| b.click_count.cmp(&a.click_count).then(a.id.cmp(&b.id)));
        links.truncate(limit.max(0) as usize);
        Ok(links)
    }

    async fn get_recent(&self, limit: i64) -> Result<Vec<ShortLink>, AppError> {
        self.check()?;
        let mut links = self.live();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        links.truncate(limit.max(0) as usize);
        Ok(links)
    }

    async fn get_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ShortLink>, AppError> {
        self.check()?;
        let mut expired: Vec<ShortLink> = self
            .links
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.is_active && l.expires_at.is_some_and(|e| e < now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }

    async fn remove_expired(&self, ids: &[i64], hard_delete: bool) -> Result<u64, AppError> {
        self.check()?;
        let now = Utc::now();
        let mut links = self.links.lock().unwrap();
        let targeted = |l: &ShortLink| ids.contains(&l.id) && l.is_expired_at(now);

        if hard_delete {
            let before = links.len();
            links.retain(|l| !targeted(l));
            return Ok((before - links.len()) as u64);
        }

        let mut affected = 0;
        for link in links.iter_mut().filter(|l| l.is_active && targeted(l)) {
            link.is_active = false;
            affected += 1;
        }
        Ok(affected)
    }

    async fn system_stats(&self) -> Result<SystemStats, AppError> {
        self.check()?;
        let links = self.links.lock().unwrap();
        let active = links.iter().filter(|l| l.is_live()).count() as i64;
        Ok(SystemStats {
            total_links: links.len() as i64,
            active_links: active,
            expired_links: links.len() as i64 - active,
            total_clicks: links.iter().map(|l| l.click_count).sum(),
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check()
    }
}

/// Cache backend whose every operation fails, as a dead Redis would.
pub struct FailingCache;

#[async_trait]
impl CacheService for FailingCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(down())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<u64>) -> CacheResult<()> {
        Err(down())
    }

    async fn set_nx(&self, _key: &str, _value: &str, _ttl: u64) -> CacheResult<bool> {
        Err(down())
    }

    async fn delete(&self, _keys: &[String]) -> CacheResult<u64> {
        Err(down())
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Err(down())
    }

    async fn increment_by(&self, _key: &str, _delta: i64) -> CacheResult<i64> {
        Err(down())
    }

    async fn expire(&self, _key: &str, _ttl: u64) -> CacheResult<bool> {
        Err(down())
    }

    async fn set_add(&self, _key: &str, _members: &[String]) -> CacheResult<u64> {
        Err(down())
    }

    async fn set_pop(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(down())
    }

    async fn set_remove(&self, _key: &str, _members: &[String]) -> CacheResult<u64> {
        Err(down())
    }

    async fn set_members(&self, _key: &str) -> CacheResult<Vec<String>> {
        Err(down())
    }

    async fn set_len(&self, _key: &str) -> CacheResult<u64> {
        Err(down())
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

fn down() -> CacheError {
    CacheError::ConnectionError("connection refused".to_string())
}

/// In-memory cache that refuses to decrement, as a Redis that drops the
/// connection between a flush's read and its claim would.
#[derive(Default)]
pub struct RefusingSubtractCache {
    inner: MemoryCache,
}

#[async_trait]
impl CacheService for RefusingSubtractCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> CacheResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: u64) -> CacheResult<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.inner.exists(key).await
    }

    async fn increment_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        if delta < 0 {
            return Err(down());
        }
        self.inner.increment_by(key, delta).await
    }

    async fn expire(&self, key: &str, ttl: u64) -> CacheResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        self.inner.set_add(key, members).await
    }

    async fn set_pop(&self, key: &str) -> CacheResult<Option<String>> {
        self.inner.set_pop(key).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        self.inner.set_remove(key, members).await
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.inner.set_members(key).await
    }

    async fn set_len(&self, key: &str) -> CacheResult<u64> {
        self.inner.set_len(key).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "refusing-subtract"
    }
}

pub fn refusing_subtract_cache() -> CacheLayer {
    CacheLayer::new(Arc::new(RefusingSubtractCache::default()))
}

pub fn memory_cache() -> CacheLayer {
    CacheLayer::new(Arc::new(MemoryCache::new()))
}

pub fn null_cache() -> CacheLayer {
    CacheLayer::new(Arc::new(NullCache::new()))
}

pub fn failing_cache() -> CacheLayer {
    CacheLayer::new(Arc::new(FailingCache))
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        redis_url: None,
        listen_addr: "127.0.0.1:0".to_string(),
        log_level: "info".to_string(),
        log_format: "text".to_string(),
        behind_proxy: false,
        db_max_connections: 5,
        db_connect_timeout: 5,
        db_idle_timeout: 600,
        db_max_lifetime: 1800,
        memory_cache_capacity: 1000,
        cache_ttls: CacheTtls::default(),
        clicks: ClickSettings::default(),
        slugs: SlugSettings::default(),
        expiry: ExpirySettings::default(),
        queue: QueueSettings::default(),
    }
}

/// State over an in-memory repository. Queue workers are not started.
pub fn create_test_state(repo: Arc<MemoryLinkRepository>, cache: CacheLayer) -> AppState {
    create_test_state_with(repo, cache, &test_config())
}

pub fn create_test_state_with(
    repo: Arc<MemoryLinkRepository>,
    cache: CacheLayer,
    config: &Config,
) -> AppState {
    AppState::new(repo, cache, config).unwrap()
}

/// State with queue workers running, for end-to-end accounting tests.
pub async fn create_running_state(repo: Arc<MemoryLinkRepository>, cache: CacheLayer) -> AppState {
    let state = create_test_state(repo, cache);
    state.queue.start_workers(state.job_handler()).await;
    state
}

pub async fn create_test_link(pool: &PgPool, code: &str, destination: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO short_links (code, destination) VALUES ($1, $2) RETURNING id")
        .bind(code)
        .bind(destination)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_expired_link(pool: &PgPool, code: &str, destination: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO short_links (code, destination, expires_at)
         VALUES ($1, $2, NOW() - INTERVAL '1 hour') RETURNING id",
    )
    .bind(code)
    .bind(destination)
    .fetch_one(pool)
    .await
    .unwrap()
}
