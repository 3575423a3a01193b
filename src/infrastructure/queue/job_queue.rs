//! A single named queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::policy::QueueOptions;
use crate::domain::jobs::{EnqueueOptions, Job, JobId, JobPayload, JobState, QueueName};
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue {0} is closed")]
    Closed(QueueName),

    #[error("queue {0} is full ({1} jobs pending)")]
    Full(QueueName, usize),
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        let queue = match &e {
            QueueError::Closed(q) | QueueError::Full(q, _) => q.as_str(),
        };
        AppError::queue_unavailable(e.to_string(), json!({ "queue": queue }))
    }
}

/// Snapshot of a queue's job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// A finished job kept for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job: Job,
    pub state: JobState,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

struct ReadyEntry {
    rank: u8,
    seq: u64,
    job: Job,
}

// BinaryHeap is a max-heap; invert so the lowest (rank, seq) pops first.
impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.seq == other.seq
    }
}

impl Eq for ReadyEntry {}

struct DelayedEntry {
    ready_at: Instant,
    seq: u64,
    job: Job,
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for DelayedEntry {}

#[derive(Default)]
struct QueueState {
    ready: BinaryHeap<ReadyEntry>,
    delayed: BinaryHeap<DelayedEntry>,
    active: usize,
    completed: VecDeque<JobRecord>,
    failed: VecDeque<JobRecord>,
    next_seq: u64,
    disposed: bool,
}

impl QueueState {
    fn push(&mut self, job: Job, delay: std::time::Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if delay.is_zero() {
            self.ready.push(ReadyEntry {
                rank: job.priority.rank(),
                seq,
                job,
            });
        } else {
            self.delayed.push(DelayedEntry {
                ready_at: Instant::now() + delay,
                seq,
                job,
            });
        }
    }

    /// Moves delayed jobs whose time has come to the ready heap.
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|d| d.ready_at <= now) {
            if let Some(entry) = self.delayed.pop() {
                self.ready.push(ReadyEntry {
                    rank: entry.job.priority.rank(),
                    seq: entry.seq,
                    job: entry.job,
                });
            }
        }
    }

    fn pending(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    fn is_idle(&self) -> bool {
        self.active == 0 && self.ready.is_empty()
    }
}

fn push_bounded(history: &mut VecDeque<JobRecord>, record: JobRecord, keep: usize) {
    history.push_back(record);
    while history.len() > keep {
        history.pop_front();
    }
}

fn run_at(delay: std::time::Duration) -> DateTime<Utc> {
    Utc::now() + TimeDelta::from_std(delay).unwrap_or_default()
}

/// In-process job queue with priorities, delays and bounded retries.
///
/// Ready jobs are taken by priority rank, then in enqueue order. Delayed jobs
/// (explicit delay or retry backoff) become ready once their time passes.
/// After [`NamedQueue::close`] new jobs are refused and workers drain only the
/// jobs that are already ready.
pub struct NamedQueue {
    name: QueueName,
    options: QueueOptions,
    state: Mutex<QueueState>,
    accepting: AtomicBool,
    next_id: AtomicU64,
    job_ready: Notify,
    idle: Notify,
}

impl NamedQueue {
    pub fn new(name: QueueName, options: QueueOptions) -> Self {
        Self {
            name,
            options,
            state: Mutex::new(QueueState::default()),
            accepting: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            job_ready: Notify::new(),
            idle: Notify::new(),
        }
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(AtomicOrdering::Acquire)
    }

    pub async fn enqueue(
        &self,
        payload: JobPayload,
        opts: EnqueueOptions,
    ) -> Result<JobId, QueueError> {
        if !self.is_accepting() {
            return Err(QueueError::Closed(self.name));
        }

        let mut state = self.state.lock().await;
        let pending = state.pending();
        if pending >= self.options.capacity {
            return Err(QueueError::Full(self.name, pending));
        }

        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let priority = opts.priority.unwrap_or_else(|| payload.default_priority());
        debug!(
            "Enqueued {} job {} on {} (priority {:?}, delay {:?})",
            payload.kind(),
            id,
            self.name,
            priority,
            opts.delay
        );

        let job = Job {
            id,
            payload,
            attempts: 0,
            priority,
            next_run_at: run_at(opts.delay),
        };
        state.push(job, opts.delay);
        drop(state);

        self.job_ready.notify_one();
        Ok(id)
    }

    /// Waits for the next runnable job and marks it active.
    ///
    /// Returns `None` once the queue is closed and no ready job is left.
    pub async fn next_job(&self) -> Option<Job> {
        loop {
            let notified = self.job_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut state = self.state.lock().await;
                if state.disposed {
                    return None;
                }

                state.promote_due(Instant::now());
                if let Some(entry) = state.ready.pop() {
                    state.active += 1;
                    return Some(entry.job);
                }

                if !self.is_accepting() {
                    return None;
                }
                state.delayed.peek().map(|d| d.ready_at)
            };

            match next_due {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    pub async fn complete(&self, job: Job) {
        let mut state = self.state.lock().await;
        state.active = state.active.saturating_sub(1);
        metrics::counter!("jobs_completed_total", "queue" => self.name.as_str()).increment(1);

        let record = JobRecord {
            job,
            state: JobState::Completed,
            finished_at: Utc::now(),
            error: None,
        };
        push_bounded(&mut state.completed, record, self.options.keep_completed);

        if state.is_idle() {
            self.idle.notify_waiters();
        }
    }

    /// Records a failed attempt. Retryable errors with attempts left are
    /// requeued after backoff; anything else is recorded as exhausted.
    pub async fn fail(&self, mut job: Job, err: &AppError) -> JobState {
        job.attempts += 1;
        let mut state = self.state.lock().await;
        state.active = state.active.saturating_sub(1);

        let outcome = if err.is_retryable() && job.attempts < self.options.max_attempts {
            let delay = self.options.backoff_for(job.attempts);
            warn!(
                "{} job {} on {} failed (attempt {}/{}), retrying in {:?}: {}",
                job.payload.kind(),
                job.id,
                self.name,
                job.attempts,
                self.options.max_attempts,
                delay,
                err
            );
            job.next_run_at = run_at(delay);
            state.push(job, delay);
            JobState::FailedRetryable
        } else {
            error!(
                "{} job {} on {} failed permanently after {} attempt(s): {}",
                job.payload.kind(),
                job.id,
                self.name,
                job.attempts,
                err
            );
            metrics::counter!("jobs_failed_total", "queue" => self.name.as_str()).increment(1);
            let record = JobRecord {
                job,
                state: JobState::FailedExhausted,
                finished_at: Utc::now(),
                error: Some(err.to_string()),
            };
            push_bounded(&mut state.failed, record, self.options.keep_failed);
            JobState::FailedExhausted
        };

        if state.is_idle() {
            self.idle.notify_waiters();
        }
        drop(state);

        // A new delayed entry may be due earlier than what sleeping workers wait for.
        self.job_ready.notify_one();
        outcome
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        if state.disposed {
            return Err(QueueError::Closed(self.name));
        }

        Ok(QueueCounts {
            waiting: state.ready.len(),
            delayed: state.delayed.len(),
            active: state.active,
            completed: state.completed.len(),
            failed: state.failed.len(),
        })
    }

    /// Most recent permanently failed jobs, newest last.
    pub async fn failed_jobs(&self) -> Vec<JobRecord> {
        self.state.lock().await.failed.iter().cloned().collect()
    }

    /// Stops accepting jobs and wakes idle workers so they can exit.
    pub fn close(&self) {
        self.accepting.store(false, AtomicOrdering::Release);
        self.job_ready.notify_waiters();
    }

    /// Resolves once no job is ready or active. Delayed jobs are not waited for.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.lock().await.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Closes the queue and discards every job still waiting. Returns the
    /// number of jobs discarded.
    pub async fn dispose(&self) -> usize {
        self.close();
        let mut state = self.state.lock().await;
        let discarded = state.pending();
        state.ready.clear();
        state.delayed.clear();
        state.disposed = true;
        drop(state);

        self.job_ready.notify_waiters();
        self.idle.notify_waiters();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::click_event::ClickEvent;
    use crate::domain::jobs::JobPriority;
    use std::time::Duration;

    fn options() -> QueueOptions {
        QueueOptions {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            capacity: 10,
            keep_completed: 2,
            keep_failed: 2,
            ..QueueOptions::default()
        }
    }

    fn refill(count: usize) -> JobPayload {
        JobPayload::PoolRefill { count }
    }

    #[tokio::test]
    async fn test_priority_then_fifo_order() {
        let queue = NamedQueue::new(QueueName::SlugPool, options());
        queue
            .enqueue(refill(1), EnqueueOptions::default())
            .await
            .unwrap();
        queue
            .enqueue(
                refill(2),
                EnqueueOptions {
                    priority: Some(JobPriority::Low),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        queue
            .enqueue(refill(3), EnqueueOptions::high())
            .await
            .unwrap();
        queue
            .enqueue(refill(4), EnqueueOptions::default())
            .await
            .unwrap();

        let mut order = Vec::new();
        for _ in 0..4 {
            let job = queue.next_job().await.unwrap();
            if let JobPayload::PoolRefill { count } = job.payload {
                order.push(count);
            }
        }
        assert_eq!(order, vec![3, 1, 4, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_waits_for_its_time() {
        let queue = NamedQueue::new(QueueName::CacheSync, options());
        queue
            .enqueue(refill(1), EnqueueOptions::delayed(Duration::from_secs(5)))
            .await
            .unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.delayed, 1);
        assert_eq!(counts.waiting, 0);

        let started = Instant::now();
        let job = queue.next_job().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_is_retried_until_exhausted() {
        let queue = NamedQueue::new(QueueName::Clicks, options());
        let payload = JobPayload::ClickEvent(ClickEvent::new("abc", None));
        queue
            .enqueue(payload, EnqueueOptions::default())
            .await
            .unwrap();

        let err = AppError::internal("db down", json!({}));

        let job = queue.next_job().await.unwrap();
        assert_eq!(queue.fail(job, &err).await, JobState::FailedRetryable);
        assert_eq!(queue.counts().await.unwrap().delayed, 1);

        let job = queue.next_job().await.unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(queue.fail(job, &err).await, JobState::FailedRetryable);

        let job = queue.next_job().await.unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(queue.fail(job, &err).await, JobState::FailedExhausted);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.delayed + counts.waiting + counts.active, 0);

        let failed = queue.failed_jobs().await;
        assert_eq!(failed[0].job.attempts, 3);
        assert_eq!(failed[0].error.as_deref(), Some("db down"));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_not_retried() {
        let queue = NamedQueue::new(QueueName::Clicks, options());
        queue
            .enqueue(refill(1), EnqueueOptions::default())
            .await
            .unwrap();

        let job = queue.next_job().await.unwrap();
        let state = queue
            .fail(job, &AppError::bad_request("bad payload", json!({})))
            .await;

        assert_eq!(state, JobState::FailedExhausted);
        assert_eq!(queue.counts().await.unwrap().delayed, 0);
    }

    #[tokio::test]
    async fn test_history_is_trimmed() {
        let queue = NamedQueue::new(QueueName::SlugPool, options());
        for i in 0..5 {
            queue
                .enqueue(refill(i), EnqueueOptions::default())
                .await
                .unwrap();
            let job = queue.next_job().await.unwrap();
            queue.complete(job).await;
        }
        assert_eq!(queue.counts().await.unwrap().completed, 2);
    }

    #[tokio::test]
    async fn test_capacity_and_close() {
        let queue = NamedQueue::new(
            QueueName::SlugPool,
            QueueOptions {
                capacity: 1,
                ..options()
            },
        );
        queue
            .enqueue(refill(1), EnqueueOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            queue.enqueue(refill(2), EnqueueOptions::default()).await,
            Err(QueueError::Full(QueueName::SlugPool, 1))
        ));

        queue.close();
        assert!(matches!(
            queue.enqueue(refill(3), EnqueueOptions::default()).await,
            Err(QueueError::Closed(_))
        ));

        // Ready jobs still drain after close, then workers are released.
        assert!(queue.next_job().await.is_some());
        assert!(queue.next_job().await.is_none());
    }

    #[tokio::test]
    async fn test_dispose_discards_pending_jobs() {
        let queue = NamedQueue::new(QueueName::Maintenance, options());
        queue
            .enqueue(refill(1), EnqueueOptions::default())
            .await
            .unwrap();
        queue
            .enqueue(refill(2), EnqueueOptions::delayed(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(queue.dispose().await, 2);
        assert!(queue.counts().await.is_err());
        assert!(queue.next_job().await.is_none());
    }

    #[tokio::test]
    async fn test_queue_error_maps_to_retryable_app_error() {
        let err: AppError = QueueError::Closed(QueueName::Clicks).into();
        assert!(matches!(err, AppError::QueueUnavailable { .. }));
        assert!(err.is_retryable());
    }
}
