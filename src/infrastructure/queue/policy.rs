//! Queue options and retry policy.

use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

/// Options shared by the named queues.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Workers per queue.
    pub concurrency: usize,
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    /// Waiting plus delayed jobs beyond which enqueue is refused.
    pub capacity: usize,
    /// Completed job records kept for inspection.
    pub keep_completed: usize,
    /// Failed job records kept for inspection.
    pub keep_failed: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            capacity: 10_000,
            keep_completed: 100,
            keep_failed: 500,
        }
    }
}

impl QueueOptions {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`,
    /// capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = (self.backoff_base.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_backoff)
            .nth(retry.saturating_sub(1) as usize)
            .unwrap_or(self.max_backoff)
    }
}
