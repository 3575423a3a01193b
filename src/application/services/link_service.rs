//! Link creation, cache-aside lookups and cached aggregates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, error, warn};

use super::click_service::{ClickService, VisitRecording};
use super::slug_pool::SlugPool;
use crate::config::CacheTtls;
use crate::domain::click_event::ClientMeta;
use crate::domain::entities::{LinkView, LookupOutcome, NewShortLink, ShortLink, SystemStats};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheLayer;
use crate::infrastructure::cache::keys::{
    POPULAR_KEY, RECENT_KEY, SYSTEM_STATS_KEY, destination_key, link_key,
};
use crate::utils::url_normalizer::normalize_url;

/// Codes allocated per creation before a run of durable conflicts is an error.
const CREATE_ATTEMPTS: usize = 3;

/// Aggregate lists are cached at this size and truncated per request.
pub const AGGREGATE_FETCH_LIMIT: i64 = 50;

/// Entry point for the request-handling layer.
///
/// Reads go cache first, then the durable store, and repopulate the cache.
/// Visits are handed to the [`ClickService`]; codes come from the
/// [`SlugPool`].
pub struct LinkService<R: LinkRepository + ?Sized> {
    repository: Arc<R>,
    cache: CacheLayer,
    clicks: Arc<ClickService<R>>,
    slugs: Arc<SlugPool<R>>,
    ttls: CacheTtls,
}

impl<R: LinkRepository + ?Sized> LinkService<R> {
    pub fn new(
        repository: Arc<R>,
        cache: CacheLayer,
        clicks: Arc<ClickService<R>>,
        slugs: Arc<SlugPool<R>>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            repository,
            cache,
            clicks,
            slugs,
            ttls,
        }
    }

    /// Creates a short link, or returns the live one already pointing at the
    /// same destination.
    ///
    /// Reuse only applies to requests without an expiry or owner, so a caller
    /// asking for a temporary or owned link always gets a fresh one.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] for unsupported destinations or an expiry in the past
    /// - [`AppError::SlugExhausted`] when no code can be generated
    /// - [`AppError::Conflict`] when every allocated code was taken concurrently
    pub async fn create_short_link(
        &self,
        destination: &str,
        expires_at: Option<DateTime<Utc>>,
        owner_id: Option<String>,
    ) -> Result<ShortLink, AppError> {
        let destination = normalize_url(destination)?;

        if let Some(at) = expires_at
            && at <= Utc::now()
        {
            return Err(AppError::bad_request(
                "Expiry must be in the future",
                json!({ "field": "expires_at" }),
            ));
        }

        if expires_at.is_none()
            && owner_id.is_none()
            && let Some(existing) = self.find_live_by_destination(&destination).await?
        {
            debug!("Reusing {} for {}", existing.code, destination);
            return Ok(existing);
        }

        let mut last_conflict = None;
        for attempt in 1..=CREATE_ATTEMPTS {
            let code = self.slugs.allocate().await?;
            let new_link = NewShortLink {
                code,
                destination: destination.clone(),
                expires_at,
                owner_id: owner_id.clone(),
            };

            match self.repository.create(new_link).await {
                Ok(link) => {
                    self.cache_record(&link).await;
                    self.cache
                        .delete_many(&[RECENT_KEY.to_string(), SYSTEM_STATS_KEY.to_string()])
                        .await;
                    return Ok(link);
                }
                Err(e @ AppError::Conflict { .. }) => {
                    warn!(attempt, "code collision on insert, retrying");
                    last_conflict = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_conflict.unwrap_or_else(|| {
            AppError::conflict("Could not store a unique short code", json!({}))
        }))
    }

    /// Takes a fresh code from the slug pool.
    pub async fn allocate_code(&self) -> Result<String, AppError> {
        self.slugs.allocate().await
    }

    /// Resolves a code.
    ///
    /// A deactivated or expired record answers [`LookupOutcome::Expired`] and
    /// its cache entries are dropped. The returned view includes pending
    /// clicks; with the cache down that is the durable count alone.
    ///
    /// # Errors
    ///
    /// Returns durable store errors when the cache misses and the store fails.
    pub async fn lookup(&self, code: &str) -> Result<LookupOutcome, AppError> {
        let Some(link) = self.fetch_record(code).await? else {
            return Ok(LookupOutcome::NotFound);
        };

        if !link.is_live() {
            debug!("Lookup for {} hit an expired link", code);
            self.drop_record(&link).await;
            return Ok(LookupOutcome::Expired);
        }

        let pending = self.clicks.pending_for(code).await;
        Ok(LookupOutcome::Found(LinkView::new(link, pending)))
    }

    /// Accounts a visit to a code that resolved as live. Failures are logged;
    /// a visit never fails the request that caused it.
    pub async fn record_visit(&self, code: &str, client_meta: Option<ClientMeta>) {
        match self.clicks.record_visit(code, client_meta).await {
            Ok(VisitRecording::Queued(id)) => debug!("Click for {} queued as job {}", code, id),
            Ok(VisitRecording::WrittenThrough) => {
                debug!("Click for {} written through", code)
            }
            Err(e) => error!("Click for {} lost: {}", code, e),
        }
    }

    /// Resolves a code and, if live, records the visit.
    pub async fn visit(
        &self,
        code: &str,
        client_meta: Option<ClientMeta>,
    ) -> Result<LookupOutcome, AppError> {
        let outcome = self.lookup(code).await?;
        if outcome.is_found() {
            self.record_visit(code, client_meta).await;
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for unknown and expired codes alike.
    pub async fn get_link(&self, code: &str) -> Result<LinkView, AppError> {
        match self.lookup(code).await? {
            LookupOutcome::Found(view) => Ok(view),
            LookupOutcome::NotFound => Err(AppError::not_found(
                "Short link not found",
                json!({ "code": code }),
            )),
            LookupOutcome::Expired => Err(AppError::not_found(
                "Short link expired",
                json!({ "code": code, "expired": true }),
            )),
        }
    }

    /// Most clicked live links. `limit` is clamped to the cached list size.
    pub async fn popular(&self, limit: i64) -> Result<Vec<LinkView>, AppError> {
        let links = self
            .cached_aggregate(POPULAR_KEY, self.ttls.popular, || {
                self.repository.get_popular(AGGREGATE_FETCH_LIMIT)
            })
            .await?;
        self.with_pending(links, limit).await
    }

    /// Newest live links. `limit` is clamped to the cached list size.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LinkView>, AppError> {
        let links = self
            .cached_aggregate(RECENT_KEY, self.ttls.recent, || {
                self.repository.get_recent(AGGREGATE_FETCH_LIMIT)
            })
            .await?;
        self.with_pending(links, limit).await
    }

    pub async fn stats(&self) -> Result<SystemStats, AppError> {
        self.cached_aggregate(SYSTEM_STATS_KEY, self.ttls.stats, || {
            self.repository.system_stats()
        })
        .await
    }

    /// Caches the records of the `batch_size` most popular links.
    pub async fn warm_cache(&self, batch_size: i64) -> Result<usize, AppError> {
        let links = self.repository.get_popular(batch_size).await?;
        for link in &links {
            self.cache_record(link).await;
        }
        debug!("Warmed cache with {} records", links.len());
        Ok(links.len())
    }

    /// Replaces the cached record for `code` with the durable one.
    pub async fn refresh(&self, code: &str) -> Result<(), AppError> {
        match self.repository.find_by_code(code).await? {
            Some(link) if link.is_live() => self.cache_record(&link).await,
            Some(link) => self.drop_record(&link).await,
            None => {
                self.cache.delete(&link_key(code)).await;
            }
        }
        Ok(())
    }

    /// Drops the cached record for `code` and its reverse lookup.
    pub async fn invalidate(&self, code: &str) {
        match self.cache.get_object::<ShortLink>(&link_key(code)).await {
            Some(link) => self.drop_record(&link).await,
            None => {
                self.cache.delete(&link_key(code)).await;
            }
        }
    }

    async fn fetch_record(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        if let Some(link) = self.cache.get_object::<ShortLink>(&link_key(code)).await {
            return Ok(Some(link));
        }

        let link = self.repository.find_by_code(code).await?;
        if let Some(ref link) = link
            && link.is_live()
        {
            self.cache_record(link).await;
        }
        Ok(link)
    }

    async fn find_live_by_destination(
        &self,
        destination: &str,
    ) -> Result<Option<ShortLink>, AppError> {
        if let Some(code) = self.cache.get(&destination_key(destination)).await
            && let Some(link) = self.fetch_record(&code).await?
            && link.is_live()
            && link.destination == destination
        {
            return Ok(Some(link));
        }

        let link = self
            .repository
            .find_by_destination(destination)
            .await?
            .filter(ShortLink::is_live);
        if let Some(ref link) = link {
            self.cache_record(link).await;
        }
        Ok(link)
    }

    /// Record TTL, capped so a cached record never outlives its expiry.
    async fn cache_record(&self, link: &ShortLink) {
        let mut ttl = self.ttls.link;
        if let Some(at) = link.expires_at {
            let remaining = (at - Utc::now()).num_seconds();
            if remaining <= 0 {
                return;
            }
            ttl = ttl.min(remaining as u64);
        }

        self.cache
            .set_object(&link_key(&link.code), link, Some(ttl))
            .await;
        self.cache
            .set(&destination_key(&link.destination), &link.code, Some(ttl))
            .await;
    }

    async fn drop_record(&self, link: &ShortLink) {
        self.cache
            .delete_many(&[link_key(&link.code), destination_key(&link.destination)])
            .await;
    }

    async fn cached_aggregate<T, F, Fut>(
        &self,
        key: &str,
        ttl: u64,
        load: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(cached) = self.cache.get_object::<T>(key).await {
            return Ok(cached);
        }
        let value = load().await?;
        self.cache.set_object(key, &value, Some(ttl)).await;
        Ok(value)
    }

    async fn with_pending(
        &self,
        links: Vec<ShortLink>,
        limit: i64,
    ) -> Result<Vec<LinkView>, AppError> {
        let limit = limit.clamp(1, AGGREGATE_FETCH_LIMIT) as usize;
        let mut views = Vec::with_capacity(limit.min(links.len()));
        for link in links.into_iter().take(limit) {
            let pending = self.clicks.pending_for(&link.code).await;
            views.push(LinkView::new(link, pending));
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClickSettings, SlugSettings};
    use crate::domain::repositories::MockLinkRepository;
    use crate::infrastructure::cache::keys::{SLUG_POOL_KEY, counter_key};
    use crate::infrastructure::cache::{MemoryCache, NullCache};
    use crate::infrastructure::queue::{QueueCoordinator, QueueOptions};
    use chrono::Duration;

    fn link(code: &str, destination: &str) -> ShortLink {
        let now = Utc::now();
        ShortLink {
            id: 1,
            destination: destination.to_string(),
            code: code.to_string(),
            click_count: 40,
            is_active: true,
            created_at: now,
            updated_at: now,
            expires_at: None,
            owner_id: None,
        }
    }

    fn service(repo: MockLinkRepository, cache: CacheLayer) -> LinkService<MockLinkRepository> {
        let repo = Arc::new(repo);
        let queue = Arc::new(QueueCoordinator::new(QueueOptions::default()));
        let slug_settings = SlugSettings::default();
        let generator = slug_settings.code_generator().unwrap();
        let clicks = Arc::new(ClickService::new(
            repo.clone(),
            cache.clone(),
            queue.clone(),
            ClickSettings::default(),
        ));
        let slugs = Arc::new(SlugPool::new(
            repo.clone(),
            cache.clone(),
            queue,
            generator,
            slug_settings,
        ));
        LinkService::new(repo, cache, clicks, slugs, CacheTtls::default())
    }

    fn memory_cache() -> CacheLayer {
        CacheLayer::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_store_and_caches() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .withf(|code| code == "abc123")
            .times(1)
            .returning(|code| Ok(Some(link(code, "https://example.com/"))));

        let cache = memory_cache();
        cache.increment_by(&counter_key("abc123"), 3).await;
        let service = service(repo, cache);

        for _ in 0..2 {
            let LookupOutcome::Found(view) = service.lookup("abc123").await.unwrap() else {
                panic!("expected a live link");
            };
            assert_eq!(view.link.destination, "https://example.com/");
            assert_eq!(view.displayed_clicks(), 43);
        }
    }

    #[tokio::test]
    async fn test_lookup_with_cache_down_uses_durable_count() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .times(1)
            .returning(|code| Ok(Some(link(code, "https://example.com/"))));

        let service = service(repo, CacheLayer::new(Arc::new(NullCache::new())));
        let LookupOutcome::Found(view) = service.lookup("abc123").await.unwrap() else {
            panic!("expected a live link");
        };

        assert_eq!(view.pending_clicks, 0);
        assert_eq!(view.displayed_clicks(), 40);
    }

    #[tokio::test]
    async fn test_expired_link_is_never_found_or_counted() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().returning(|code| {
            let mut expired = link(code, "https://example.com/");
            expired.expires_at = Some(Utc::now() - Duration::minutes(1));
            Ok(Some(expired))
        });
        repo.expect_increment_click_count().times(0);
        repo.expect_bulk_increment_click_count().times(0);

        let cache = memory_cache();
        let service = service(repo, cache.clone());

        let outcome = service.visit("old123", None).await.unwrap();
        assert!(matches!(outcome, LookupOutcome::Expired));
        assert_eq!(cache.get(&link_key("old123")).await, None);

        let err = service.get_link("old123").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().returning(|_| Ok(None));

        let service = service(repo, memory_cache());
        assert!(matches!(
            service.lookup("nope").await.unwrap(),
            LookupOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn test_create_uses_pool_code_and_caches_record() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_destination()
            .withf(|destination| destination == "https://example.com/path")
            .times(1)
            .returning(|_| Ok(None));
        repo.expect_create()
            .withf(|new_link| new_link.code == "pooled1")
            .times(1)
            .returning(|new_link| Ok(link(&new_link.code, &new_link.destination)));

        let cache = memory_cache();
        cache
            .add_members(SLUG_POOL_KEY, &["pooled1".to_string()])
            .await;
        cache.set(RECENT_KEY, "[]", Some(30)).await;

        let service = service(repo, cache.clone());
        let created = service
            .create_short_link("HTTPS://Example.COM:443/path#frag", None, None)
            .await
            .unwrap();

        assert_eq!(created.code, "pooled1");
        assert!(cache.get(&link_key("pooled1")).await.is_some());
        assert_eq!(
            cache
                .get(&destination_key("https://example.com/path"))
                .await
                .as_deref(),
            Some("pooled1")
        );
        assert_eq!(cache.get(RECENT_KEY).await, None);
    }

    #[tokio::test]
    async fn test_create_reuses_live_link_for_destination() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_destination()
            .times(1)
            .returning(|destination| Ok(Some(link("exist12", destination))));
        repo.expect_create().times(0);

        let service = service(repo, memory_cache());
        let reused = service
            .create_short_link("https://example.com/", None, None)
            .await
            .unwrap();

        assert_eq!(reused.code, "exist12");
    }

    #[tokio::test]
    async fn test_create_retries_on_conflict() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_destination().returning(|_| Ok(None));
        repo.expect_find_by_code().returning(|_| Ok(None));

        let mut calls = 0;
        repo.expect_create().times(2).returning(move |new_link| {
            calls += 1;
            if calls == 1 {
                Err(AppError::conflict("taken", json!({})))
            } else {
                Ok(link(&new_link.code, &new_link.destination))
            }
        });

        let service = service(repo, memory_cache());
        assert!(
            service
                .create_short_link("https://example.com/", None, None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let repo = MockLinkRepository::new();
        let service = service(repo, memory_cache());

        let err = service
            .create_short_link("ftp://example.com/file", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = service
            .create_short_link(
                "https://example.com/",
                Some(Utc::now() - Duration::seconds(5)),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_popular_is_cached_and_clamped() {
        let mut repo = MockLinkRepository::new();
        repo.expect_get_popular()
            .withf(|limit| *limit == AGGREGATE_FETCH_LIMIT)
            .times(1)
            .returning(|_| {
                Ok((0..5)
                    .map(|i| link(&format!("pop{}", i), "https://example.com/"))
                    .collect())
            });

        let service = service(repo, memory_cache());
        assert_eq!(service.popular(3).await.unwrap().len(), 3);
        assert_eq!(service.popular(500).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_stats_propagate_store_errors_on_miss() {
        let mut repo = MockLinkRepository::new();
        repo.expect_system_stats()
            .returning(|| Err(AppError::internal("db down", json!({}))));

        let service = service(repo, memory_cache());
        assert!(service.stats().await.is_err());
    }
}
