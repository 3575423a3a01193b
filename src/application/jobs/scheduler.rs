//! Periodic job producers.
//!
//! Each schedule is a tokio task that enqueues a job on its interval. The
//! work itself runs on the queue workers, so retries and backoff apply.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::application::services::SlugPool;
use crate::config::{ClickSettings, ExpirySettings};
use crate::domain::jobs::{EnqueueOptions, JobPayload};
use crate::domain::repositories::LinkRepository;
use crate::infrastructure::queue::QueueCoordinator;

/// Links cached by the start-up warm job.
pub const CACHE_WARM_BATCH: i64 = 100;
/// Codes flushed per counter sweep.
pub const COUNTER_SWEEP_BATCH: usize = 500;
/// How often the slug pool size is checked against its low-water mark.
pub const POOL_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to the running schedules. Dropping it leaves them running.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start<R>(
        queue: Arc<QueueCoordinator>,
        slugs: Arc<SlugPool<R>>,
        expiry: &ExpirySettings,
        clicks: &ClickSettings,
    ) -> Self
    where
        R: LinkRepository + ?Sized + 'static,
    {
        let mut handles = Vec::new();

        handles.push(spawn_periodic(
            queue.clone(),
            expiry.startup_delay,
            expiry.interval,
            JobPayload::ExpirySweep {
                batch_size: expiry.batch_size,
            },
        ));
        handles.push(spawn_periodic(
            queue.clone(),
            clicks.sweep_interval,
            clicks.sweep_interval,
            JobPayload::CounterSweep {
                batch_size: COUNTER_SWEEP_BATCH,
            },
        ));

        handles.push(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now(), POOL_CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Some(id) = slugs.check_low_water().await {
                    debug!("Pool refill job {} scheduled", id);
                }
            }
        }));

        let warm_queue = queue;
        handles.push(tokio::spawn(async move {
            enqueue_logged(
                &warm_queue,
                JobPayload::CacheWarm {
                    batch_size: CACHE_WARM_BATCH,
                },
            )
            .await;
        }));

        info!(
            "Scheduler started: expiry every {:?} (first after {:?}), counter sweep every {:?}",
            expiry.interval, expiry.startup_delay, clicks.sweep_interval
        );
        Self { handles }
    }

    pub fn stop(self) {
        for handle in self.handles {
            handle.abort();
        }
        debug!("Scheduler stopped");
    }
}

fn spawn_periodic(
    queue: Arc<QueueCoordinator>,
    first_delay: Duration,
    period: Duration,
    payload: JobPayload,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + first_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            enqueue_logged(&queue, payload.clone()).await;
        }
    })
}

async fn enqueue_logged(queue: &QueueCoordinator, payload: JobPayload) {
    let kind = payload.kind();
    match queue.enqueue(payload, EnqueueOptions::default()).await {
        Ok(id) => debug!("Scheduled {} job {}", kind, id),
        Err(e) => warn!("Could not schedule {} job: {}", kind, e),
    }
}
