//! Pre-generated pool of short codes.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::SlugSettings;
use crate::domain::jobs::{EnqueueOptions, JobId, JobPayload};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheLayer;
use crate::infrastructure::cache::keys::{POOL_REFILL_LOCK_KEY, SLUG_POOL_KEY, link_key};
use crate::infrastructure::queue::QueueCoordinator;
use crate::utils::code_generator::CodeGenerator;

/// Holds the refill lock long enough for the refill job to run.
const REFILL_LOCK_TTL_SECONDS: u64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefillSummary {
    pub requested: usize,
    pub generated: usize,
    pub added: u64,
}

/// Allocates short codes, from the pool when possible.
///
/// Pool entries were checked against the durable store when they were added.
/// A code claimed by another writer since then is still rejected by the
/// store's unique index, which surfaces as a retryable conflict.
pub struct SlugPool<R: LinkRepository + ?Sized> {
    repository: Arc<R>,
    cache: CacheLayer,
    queue: Arc<QueueCoordinator>,
    generator: CodeGenerator,
    settings: SlugSettings,
}

impl<R: LinkRepository + ?Sized> SlugPool<R> {
    pub fn new(
        repository: Arc<R>,
        cache: CacheLayer,
        queue: Arc<QueueCoordinator>,
        generator: CodeGenerator,
        settings: SlugSettings,
    ) -> Self {
        Self {
            repository,
            cache,
            queue,
            generator,
            settings,
        }
    }

    /// Takes a code from the pool, or generates one if the pool is empty.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SlugExhausted`] if every generation attempt
    /// collided, and durable store errors from the uniqueness probe.
    pub async fn allocate(&self) -> Result<String, AppError> {
        let code = match self.cache.pop_member(SLUG_POOL_KEY).await {
            Some(code) => {
                debug!("Allocated {} from pool", code);
                code
            }
            None => {
                debug!("Slug pool empty, generating on demand");
                self.generate_unique().await?
            }
        };

        self.check_low_water().await;
        Ok(code)
    }

    /// Draws random codes until one is acceptable and unused.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SlugExhausted`] after `max_attempts` collisions.
    pub async fn generate_unique(&self) -> Result<String, AppError> {
        for attempt in 1..=self.settings.max_attempts {
            let code = self.generator.generate();

            if self.generator.is_reserved(&code) {
                debug!("Generated code {} hits a reserved prefix", code);
                continue;
            }
            if self.cache.exists(&link_key(&code)).await == Some(true) {
                debug!("Generated code {} is cached (attempt {})", code, attempt);
                continue;
            }
            if self.repository.find_by_code(&code).await?.is_some() {
                debug!("Generated code {} exists (attempt {})", code, attempt);
                continue;
            }
            return Ok(code);
        }

        error!(
            "Slug generation exhausted after {} attempts; alphabet of {} characters with lengths {}..={} is too small",
            self.settings.max_attempts,
            self.settings.alphabet.chars().count(),
            self.settings.min_length,
            self.settings.max_length
        );
        Err(AppError::slug_exhausted(
            "Could not generate a unique short code",
            json!({ "attempts": self.settings.max_attempts }),
        ))
    }

    /// Current pool size. `None` when the cache cannot tell.
    pub async fn size(&self) -> Option<u64> {
        self.cache.member_count(SLUG_POOL_KEY).await
    }

    /// Enqueues a refill when the pool is below the low-water mark.
    ///
    /// At most one refill is enqueued per lock window. Returns the job id when
    /// one was enqueued.
    pub async fn check_low_water(&self) -> Option<JobId> {
        let size = self.size().await?;
        if size >= self.settings.pool_low_water {
            return None;
        }
        if self
            .cache
            .try_lock(POOL_REFILL_LOCK_KEY, REFILL_LOCK_TTL_SECONDS)
            .await
            != Some(true)
        {
            return None;
        }

        let count = self.settings.pool_target.saturating_sub(size) as usize;
        match self
            .queue
            .enqueue(JobPayload::PoolRefill { count }, EnqueueOptions::default())
            .await
        {
            Ok(id) => {
                info!(
                    "Slug pool at {} (low water {}), refill of {} queued",
                    size, self.settings.pool_low_water, count
                );
                Some(id)
            }
            Err(e) => {
                warn!("Could not queue slug pool refill: {}", e);
                self.cache.delete(POOL_REFILL_LOCK_KEY).await;
                None
            }
        }
    }

    /// Generates `count` candidates and adds the valid, unused ones to the pool.
    ///
    /// # Errors
    ///
    /// Propagates durable store errors from the existence check.
    pub async fn refill(&self, count: usize) -> Result<RefillSummary, AppError> {
        let candidates: Vec<String> = self
            .generator
            .generate_batch(count)
            .into_iter()
            .filter(|code| self.generator.is_acceptable(code))
            .collect();

        let taken: HashSet<String> = match self.repository.existing_codes(&candidates).await {
            Ok(existing) => existing.into_iter().collect(),
            Err(e) => {
                // Let the next low-water check queue a fresh refill.
                self.cache.delete(POOL_REFILL_LOCK_KEY).await;
                return Err(e);
            }
        };

        let fresh: Vec<String> = candidates
            .iter()
            .filter(|code| !taken.contains(*code))
            .cloned()
            .collect();

        let added = if fresh.is_empty() {
            0
        } else {
            self.cache
                .add_members(SLUG_POOL_KEY, &fresh)
                .await
                .unwrap_or(0)
        };
        self.cache.delete(POOL_REFILL_LOCK_KEY).await;

        metrics::counter!("slug_pool_refilled_total").increment(added);
        info!(
            "Slug pool refill: {} requested, {} valid candidates, {} added",
            count,
            fresh.len(),
            added
        );

        Ok(RefillSummary {
            requested: count,
            generated: candidates.len(),
            added,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::QueueName;
    use crate::domain::repositories::MockLinkRepository;
    use crate::infrastructure::cache::{MemoryCache, NullCache};
    use crate::infrastructure::queue::QueueOptions;
    use crate::utils::code_generator::BASE62_ALPHABET;

    fn settings() -> SlugSettings {
        SlugSettings {
            pool_low_water: 5,
            pool_target: 20,
            ..SlugSettings::default()
        }
    }

    fn pool_with(
        repo: MockLinkRepository,
        cache: CacheLayer,
        generator: CodeGenerator,
    ) -> SlugPool<MockLinkRepository> {
        SlugPool::new(
            Arc::new(repo),
            cache,
            Arc::new(QueueCoordinator::new(QueueOptions::default())),
            generator,
            settings(),
        )
    }

    fn base62() -> CodeGenerator {
        CodeGenerator::new(BASE62_ALPHABET, 6, 8, &settings().reserved_prefixes).unwrap()
    }

    fn memory_cache() -> CacheLayer {
        CacheLayer::new(Arc::new(MemoryCache::new()))
    }

    async fn refill_jobs(pool: &SlugPool<MockLinkRepository>) -> usize {
        pool.queue
            .queue(QueueName::SlugPool)
            .unwrap()
            .counts()
            .await
            .unwrap()
            .waiting
    }

    #[tokio::test]
    async fn test_empty_pool_generates_and_schedules_refill() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().times(1).returning(|_| Ok(None));

        let pool = pool_with(repo, memory_cache(), base62());
        let code = pool.allocate().await.unwrap();

        assert!((6..=8).contains(&code.len()));
        assert_eq!(refill_jobs(&pool).await, 1);

        // The refill lock suppresses a second enqueue for the same dip.
        assert_eq!(pool.check_low_water().await, None);
        assert_eq!(refill_jobs(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_allocate_prefers_pool() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().times(0);

        let cache = memory_cache();
        let members: Vec<String> = (0..10).map(|i| format!("pool{:03}", i)).collect();
        cache.add_members(SLUG_POOL_KEY, &members).await;

        let pool = pool_with(repo, cache, base62());
        let code = pool.allocate().await.unwrap();

        assert!(members.contains(&code));
        assert_eq!(pool.size().await, Some(9));
        assert_eq!(refill_jobs(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_collisions_exhaust_attempts() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().times(5).returning(|code| {
            Ok(Some(crate::domain::entities::ShortLink {
                id: 1,
                destination: "https://example.com/".to_string(),
                code: code.to_string(),
                click_count: 0,
                is_active: true,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
                expires_at: None,
                owner_id: None,
            }))
        });

        let pool = pool_with(repo, memory_cache(), base62());
        let err = pool.generate_unique().await.unwrap_err();

        assert!(matches!(err, AppError::SlugExhausted { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_reserved_draws_count_as_attempts() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().times(0);

        // Every code over a one-letter alphabet starts with the reserved prefix.
        let generator = CodeGenerator::new("a", 3, 3, &["a".to_string()]).unwrap();
        let pool = pool_with(repo, memory_cache(), generator);

        let err = pool.generate_unique().await.unwrap_err();
        assert!(matches!(err, AppError::SlugExhausted { .. }));
    }

    #[tokio::test]
    async fn test_refill_skips_existing_codes() {
        let mut repo = MockLinkRepository::new();
        repo.expect_existing_codes()
            .times(1)
            .returning(|codes| Ok(codes.iter().take(3).cloned().collect()));

        let cache = memory_cache();
        let pool = pool_with(repo, cache, base62());
        let summary = pool.refill(20).await.unwrap();

        assert_eq!(summary.requested, 20);
        assert_eq!(summary.added as usize, summary.generated - 3);
        assert_eq!(pool.size().await, Some(summary.added));
    }

    #[tokio::test]
    async fn test_refill_propagates_store_errors() {
        let mut repo = MockLinkRepository::new();
        repo.expect_existing_codes()
            .returning(|_| Err(AppError::internal("db down", json!({}))));

        let pool = pool_with(repo, memory_cache(), base62());
        assert!(pool.check_low_water().await.is_some());
        assert!(pool.refill(10).await.is_err());
        assert_eq!(pool.size().await, Some(0));

        // The refill lock was released, so the next dip queues a new refill.
        assert!(pool.check_low_water().await.is_some());
        assert_eq!(refill_jobs(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_unknown_pool_size_never_schedules_refill() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().returning(|_| Ok(None));

        let pool = pool_with(
            repo,
            CacheLayer::new(Arc::new(NullCache::new())),
            base62(),
        );
        assert!(pool.allocate().await.is_ok());
        assert_eq!(refill_jobs(&pool).await, 0);
    }
}
