//! Background job model.
//!
//! Every job carries a [`JobPayload`], a tagged union with one variant per job
//! kind. Dispatch matches on it exhaustively, so adding a kind forces every
//! consumer to handle it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::click_event::ClickEvent;

/// Named queues, each served by its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    Clicks,
    SlugPool,
    CacheSync,
    Maintenance,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::Clicks,
        QueueName::SlugPool,
        QueueName::CacheSync,
        QueueName::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clicks => "clicks",
            Self::SlugPool => "slug-pool",
            Self::CacheSync => "cache-sync",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job priority. Higher priority jobs are taken first among ready jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    High,
    Normal,
    Low,
}

impl JobPriority {
    /// Lower rank runs first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 1,
            Self::Normal => 5,
            Self::Low => 10,
        }
    }
}

/// What a `cache-resync` job does for its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResyncOp {
    /// Flush the pending counter and refresh the cached record.
    Sync,
    /// Drop every cache entry for the code.
    Invalidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum JobPayload {
    ClickEvent(ClickEvent),
    PoolRefill { count: usize },
    CacheResync { code: String, op: ResyncOp },
    ExpirySweep { batch_size: i64 },
    CacheWarm { batch_size: i64 },
    CounterSweep { batch_size: usize },
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClickEvent(_) => "click-event",
            Self::PoolRefill { .. } => "pool-refill",
            Self::CacheResync { .. } => "cache-resync",
            Self::ExpirySweep { .. } => "expiry-sweep",
            Self::CacheWarm { .. } => "cache-warm",
            Self::CounterSweep { .. } => "counter-sweep",
        }
    }

    /// The queue this payload is routed to.
    pub fn queue(&self) -> QueueName {
        match self {
            Self::ClickEvent(_) => QueueName::Clicks,
            Self::PoolRefill { .. } => QueueName::SlugPool,
            Self::CacheResync { .. } | Self::CacheWarm { .. } => QueueName::CacheSync,
            Self::ExpirySweep { .. } | Self::CounterSweep { .. } => QueueName::Maintenance,
        }
    }

    pub fn default_priority(&self) -> JobPriority {
        match self {
            Self::ClickEvent(_) => JobPriority::High,
            Self::CacheWarm { .. } => JobPriority::Low,
            _ => JobPriority::Normal,
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Queued,
    Delayed,
    Active,
    Completed,
    /// Failed, requeued after backoff.
    FailedRetryable,
    /// Failed with no attempts left, or with a non-retryable error.
    FailedExhausted,
}

pub type JobId = u64;

/// A job as held by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub attempts: u32,
    pub priority: JobPriority,
    pub next_run_at: DateTime<Utc>,
}

/// Per-enqueue options. Defaults to the payload's priority and no delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    pub priority: Option<JobPriority>,
    pub delay: Duration,
}

impl EnqueueOptions {
    pub fn high() -> Self {
        Self {
            priority: Some(JobPriority::High),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            priority: None,
            delay,
        }
    }
}
