//! Removal of expired links and the cache entries that reference them.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheLayer;
use crate::infrastructure::cache::keys::{DIRTY_COUNTERS_KEY, aggregate_keys, code_keys};

/// Result of one reaper batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapSummary {
    /// Expired links returned by the scan.
    pub scanned: usize,
    /// Links deleted or deactivated.
    pub removed: u64,
    /// The batch was full, so more expired links may be waiting.
    pub has_more: bool,
}

pub struct ExpiryReaper<R: LinkRepository + ?Sized> {
    repository: Arc<R>,
    cache: CacheLayer,
    hard_delete: bool,
}

impl<R: LinkRepository + ?Sized> ExpiryReaper<R> {
    pub fn new(repository: Arc<R>, cache: CacheLayer, hard_delete: bool) -> Self {
        Self {
            repository,
            cache,
            hard_delete,
        }
    }

    /// Processes one batch of at most `batch_size` expired links, oldest
    /// expiry first. Whatever is left is picked up by the next run.
    ///
    /// # Errors
    ///
    /// Durable store failures abort the batch before any cache entry is
    /// touched, so a retried job sees the same links again. Cache failures
    /// are logged and ignored.
    pub async fn sweep(&self, batch_size: i64) -> Result<ReapSummary, AppError> {
        let expired = self
            .repository
            .get_expired(Utc::now(), batch_size)
            .await?;

        if expired.is_empty() {
            debug!("Expiry sweep: nothing expired");
            return Ok(ReapSummary::default());
        }

        let ids: Vec<i64> = expired.iter().map(|link| link.id).collect();
        let removed = self
            .repository
            .remove_expired(&ids, self.hard_delete)
            .await?;

        let codes: Vec<String> = expired.iter().map(|link| link.code.clone()).collect();
        for link in &expired {
            self.cache
                .delete_many(&code_keys(&link.code, &link.destination))
                .await;
        }
        self.cache.remove_members(DIRTY_COUNTERS_KEY, &codes).await;
        self.cache.delete_many(&aggregate_keys()).await;

        metrics::counter!("links_reaped_total").increment(removed);
        info!(
            "Expiry sweep: {} expired, {} {}",
            expired.len(),
            removed,
            if self.hard_delete {
                "deleted"
            } else {
                "deactivated"
            }
        );

        Ok(ReapSummary {
            scanned: expired.len(),
            removed,
            has_more: expired.len() as i64 >= batch_size,
        })
    }
}
