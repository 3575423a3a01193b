//! Click accounting: pending counters and their reconciliation.
//!
//! A visit becomes a `click-event` job. The worker adds one to the code's
//! pending counter in the cache and, when a flush is due, moves the pending
//! amount into the durable click count. The displayed count is always the
//! durable count plus whatever is still pending.
//!
//! A flush first claims the amount it is about to persist by subtracting it
//! from the counter, so clicks that land meanwhile stay pending and a cache
//! fault can never persist the same clicks twice. A failed durable write puts
//! the claim back.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::analytics;
use crate::config::ClickSettings;
use crate::domain::click_event::{ClickEvent, ClientMeta};
use crate::domain::jobs::{EnqueueOptions, JobId, JobPayload, ResyncOp};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheLayer;
use crate::infrastructure::cache::keys::{
    DIRTY_COUNTERS_KEY, counter_key, flush_lock_key, last_flush_key, link_key,
};
use crate::infrastructure::queue::QueueCoordinator;

/// TTL of the per-code flush lock. Bounds how long a crashed flush blocks others.
const FLUSH_LOCK_TTL_SECONDS: u64 = 30;

/// Delay before a `cache-resync` job retries a flush that failed inline.
const RESYNC_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// How a visit was accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitRecording {
    /// A click-event job was enqueued.
    Queued(JobId),
    /// The queue refused the job; the durable count was incremented directly.
    WrittenThrough,
}

/// Result of processing one click event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The pending counter was incremented to `pending`.
    Counted {
        pending: i64,
        flush: Option<FlushResult>,
    },
    /// No counter available; the click went straight to the durable store.
    WrittenThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FlushResult {
    /// `delta` clicks persisted; `residual` arrived meanwhile and stay pending.
    Flushed { delta: i64, residual: i64 },
    /// The link no longer exists; `delta` pending clicks were dropped.
    Orphaned { delta: i64 },
    /// Another flush holds the lock, or the cache cannot provide the lock or
    /// take the claim.
    Skipped,
    /// Nothing pending.
    Empty,
}

/// A code and the amount of pending clicks to persist for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingClicks {
    pub code: String,
    pub amount: i64,
}

/// Outcome of a batch sync. Failures are per code.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchSyncSummary {
    pub flushed: usize,
    pub clicks_persisted: i64,
    pub skipped: usize,
    pub failed: Vec<String>,
}

impl BatchSyncSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The click accounting pipeline.
pub struct ClickService<R: LinkRepository + ?Sized> {
    repository: Arc<R>,
    cache: CacheLayer,
    queue: Arc<QueueCoordinator>,
    settings: ClickSettings,
}

impl<R: LinkRepository + ?Sized> ClickService<R> {
    pub fn new(
        repository: Arc<R>,
        cache: CacheLayer,
        queue: Arc<QueueCoordinator>,
        settings: ClickSettings,
    ) -> Self {
        Self {
            repository,
            cache,
            queue,
            settings,
        }
    }

    /// Enqueues a click event for a live link.
    ///
    /// When the queue refuses the job the durable count is incremented
    /// synchronously instead, so the visit is never dropped. The pending
    /// counter is left alone on that path: the click is already durable.
    ///
    /// # Errors
    ///
    /// Returns an error only if both the queue and the durable store fail.
    pub async fn record_visit(
        &self,
        code: &str,
        client_meta: Option<ClientMeta>,
    ) -> Result<VisitRecording, AppError> {
        let event = ClickEvent::new(code, client_meta);
        match self
            .queue
            .enqueue(JobPayload::ClickEvent(event), EnqueueOptions::high())
            .await
        {
            Ok(id) => Ok(VisitRecording::Queued(id)),
            Err(e) => {
                warn!("Click queue unavailable for {}: {}. Writing through", code, e);
                self.write_through(code).await?;
                Ok(VisitRecording::WrittenThrough)
            }
        }
    }

    /// Worker entry point for a `click-event` job.
    ///
    /// Once the counter is incremented this never fails: a flush that fails
    /// is handed to a `cache-resync` job, since retrying the click event
    /// itself would count it twice.
    pub async fn process_click(&self, event: &ClickEvent) -> Result<ClickOutcome, AppError> {
        let code = event.code.as_str();
        let counter = counter_key(code);

        let Some(pending) = self.cache.increment(&counter).await else {
            self.write_through(code).await?;
            return Ok(ClickOutcome::WrittenThrough);
        };
        metrics::counter!("clicks_recorded_total").increment(1);

        self.cache
            .expire(&counter, self.settings.counter_ttl_seconds)
            .await;
        self.cache
            .add_members(DIRTY_COUNTERS_KEY, &[code.to_string()])
            .await;

        analytics::observe(event);

        if !self.flush_due(code, pending).await {
            debug!("Click counted for {} (pending {})", code, pending);
            return Ok(ClickOutcome::Counted {
                pending,
                flush: None,
            });
        }

        match self.flush_code(code).await {
            Ok(result) => Ok(ClickOutcome::Counted {
                pending,
                flush: Some(result),
            }),
            Err(e) => {
                warn!("Inline flush failed for {}: {}. Scheduling resync", code, e);
                self.schedule_resync(code).await;
                Ok(ClickOutcome::Counted {
                    pending,
                    flush: None,
                })
            }
        }
    }

    /// Pending clicks for a code. An unavailable cache reads as zero.
    pub async fn pending_for(&self, code: &str) -> i64 {
        self.cache
            .get_i64(&counter_key(code))
            .await
            .unwrap_or(0)
            .max(0)
    }

    /// Flushes everything currently pending for `code`.
    ///
    /// # Errors
    ///
    /// Propagates durable store failures; the claimed clicks are returned to
    /// the counter.
    pub async fn flush_code(&self, code: &str) -> Result<FlushResult, AppError> {
        self.flush(code, None).await
    }

    /// Flushes at most `amount` clicks for `code`.
    ///
    /// The amount is capped by what is pending once the flush lock is held,
    /// so a stale amount never persists clicks twice.
    pub async fn flush_amount(&self, code: &str, amount: i64) -> Result<FlushResult, AppError> {
        self.flush(code, Some(amount)).await
    }

    /// Flushes many codes, isolating failures per code.
    pub async fn batch_sync(&self, entries: &[PendingClicks]) -> BatchSyncSummary {
        let mut summary = BatchSyncSummary::default();

        for entry in entries {
            match self.flush_amount(&entry.code, entry.amount).await {
                Ok(FlushResult::Flushed { delta, .. }) => {
                    summary.flushed += 1;
                    summary.clicks_persisted += delta;
                }
                Ok(FlushResult::Orphaned { .. }) | Ok(FlushResult::Empty) => {}
                Ok(FlushResult::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!("Batch sync failed for {}: {}", entry.code, e);
                    summary.failed.push(entry.code.clone());
                }
            }
        }

        info!(
            "Batch sync: {} flushed ({} clicks), {} skipped, {} failed",
            summary.flushed,
            summary.clicks_persisted,
            summary.skipped,
            summary.failed.len()
        );
        summary
    }

    /// Codes with pending clicks, read from the dirty set. Codes whose counter
    /// is gone or zero are dropped from the set.
    pub async fn pending_counts(&self, limit: usize) -> Vec<PendingClicks> {
        let mut pending = Vec::new();
        let mut stale = Vec::new();

        for code in self.cache.members(DIRTY_COUNTERS_KEY).await {
            if pending.len() >= limit {
                break;
            }
            match self.cache.get_i64(&counter_key(&code)).await {
                Some(amount) if amount > 0 => pending.push(PendingClicks { code, amount }),
                _ => stale.push(code),
            }
        }

        if !stale.is_empty() {
            self.cache.remove_members(DIRTY_COUNTERS_KEY, &stale).await;
        }
        pending
    }

    /// Flushes up to `batch_size` codes with pending clicks, whether or not
    /// they received a click recently.
    pub async fn sweep_counters(&self, batch_size: usize) -> BatchSyncSummary {
        let pending = self.pending_counts(batch_size).await;
        if pending.is_empty() {
            debug!("Counter sweep: nothing pending");
            return BatchSyncSummary::default();
        }
        self.batch_sync(&pending).await
    }

    /// A flush is due at the threshold, or when the last flush is older than
    /// the flush interval. The first click after a quiet period starts the
    /// interval instead of flushing.
    async fn flush_due(&self, code: &str, pending: i64) -> bool {
        if pending >= self.settings.flush_threshold {
            return true;
        }

        let now = Utc::now().timestamp();
        match self.cache.get_i64(&last_flush_key(code)).await {
            Some(last) => now - last >= self.settings.flush_interval.as_secs() as i64,
            None if pending <= 1 => {
                self.mark_flushed(code, now).await;
                false
            }
            // Counter outlived the marker: clicks have waited at least one window.
            None => true,
        }
    }

    async fn mark_flushed(&self, code: &str, now: i64) {
        let ttl = self.settings.flush_interval.as_secs().saturating_mul(2).max(1);
        self.cache
            .set(&last_flush_key(code), &now.to_string(), Some(ttl))
            .await;
    }

    async fn flush(&self, code: &str, cap: Option<i64>) -> Result<FlushResult, AppError> {
        let lock = flush_lock_key(code);
        if self.cache.try_lock(&lock, FLUSH_LOCK_TTL_SECONDS).await != Some(true) {
            debug!("Flush for {} skipped: lock not acquired", code);
            return Ok(FlushResult::Skipped);
        }

        let result = self.flush_locked(code, cap).await;
        self.cache.delete(&lock).await;
        result
    }

    async fn flush_locked(&self, code: &str, cap: Option<i64>) -> Result<FlushResult, AppError> {
        let counter = counter_key(code);
        let current = self.cache.get_i64(&counter).await.unwrap_or(0);
        let delta = cap.map_or(current, |c| c.min(current));

        if delta <= 0 {
            if current <= 0 {
                self.clear_dirty(code).await;
            }
            return Ok(FlushResult::Empty);
        }

        // Claim before persisting: clicks only reach the durable store once
        // they have left the counter.
        let Some(after_claim) = self.cache.subtract(&counter, delta).await else {
            warn!("Could not claim {} pending clicks for {}; leaving them pending", delta, code);
            return Ok(FlushResult::Skipped);
        };
        let claimed = if after_claim < 0 {
            // The counter vanished after the read; only what was there at the
            // claim is ours. Lift the deficit so concurrent clicks survive.
            self.cache.increment_by(&counter, -after_claim).await;
            delta + after_claim
        } else {
            delta
        };
        if claimed <= 0 {
            self.clear_dirty(code).await;
            return Ok(FlushResult::Empty);
        }

        let matched = match self
            .repository
            .bulk_increment_click_count(code, claimed)
            .await
        {
            Ok(matched) => matched,
            Err(e) => {
                self.restore_claim(code, claimed).await;
                return Err(e);
            }
        };

        let residual = self.cache.get_i64(&counter).await.unwrap_or(0).max(0);
        if residual == 0 {
            self.clear_dirty(code).await;
        }

        if !matched {
            warn!("Dropped {} pending clicks for missing link {}", claimed, code);
            return Ok(FlushResult::Orphaned { delta: claimed });
        }

        self.mark_flushed(code, Utc::now().timestamp()).await;
        self.cache.delete(&link_key(code)).await;
        metrics::counter!("clicks_flushed_total").increment(claimed as u64);
        info!(
            "Flushed {} clicks for {} ({} still pending)",
            claimed, code, residual
        );

        Ok(FlushResult::Flushed {
            delta: claimed,
            residual,
        })
    }

    /// Returns claimed clicks to the counter after a failed durable write.
    async fn restore_claim(&self, code: &str, claimed: i64) {
        let counter = counter_key(code);
        if self.cache.increment_by(&counter, claimed).await.is_none() {
            error!(
                "Lost {} claimed clicks for {}: durable write and counter restore both failed",
                claimed, code
            );
            return;
        }
        self.cache
            .expire(&counter, self.settings.counter_ttl_seconds)
            .await;
        self.cache
            .add_members(DIRTY_COUNTERS_KEY, &[code.to_string()])
            .await;
    }

    /// Removes `code` from the dirty set, re-adding it if a click raced in.
    async fn clear_dirty(&self, code: &str) {
        let member = [code.to_string()];
        self.cache.remove_members(DIRTY_COUNTERS_KEY, &member).await;
        if self.cache.get_i64(&counter_key(code)).await.unwrap_or(0) > 0 {
            self.cache.add_members(DIRTY_COUNTERS_KEY, &member).await;
        }
    }

    async fn write_through(&self, code: &str) -> Result<(), AppError> {
        metrics::counter!("click_fallback_total").increment(1);
        if !self.repository.increment_click_count(code).await? {
            return Err(AppError::not_found(
                "Short link not found",
                json!({ "code": code }),
            ));
        }
        self.cache.delete(&link_key(code)).await;
        Ok(())
    }

    async fn schedule_resync(&self, code: &str) {
        let payload = JobPayload::CacheResync {
            code: code.to_string(),
            op: ResyncOp::Sync,
        };
        if let Err(e) = self
            .queue
            .enqueue(payload, EnqueueOptions::delayed(RESYNC_DELAY))
            .await
        {
            warn!(
                "Could not schedule resync for {}: {}. The counter sweep will retry",
                code, e
            );
        }
    }
}
