use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use super::job_queue::NamedQueue;
use crate::domain::jobs::{Job, QueueName};
use crate::error::AppError;

/// Executes jobs taken from a queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), AppError>;
}

/// Workers serving one queue.
pub struct WorkerPool {
    queue: QueueName,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `concurrency` workers (from the queue options) on the runtime.
    pub fn spawn(queue: Arc<NamedQueue>, handler: Arc<dyn JobHandler>) -> Self {
        let concurrency = queue.options().concurrency.max(1);
        let handles = (0..concurrency)
            .map(|worker_id| {
                let queue = queue.clone();
                let handler = handler.clone();
                tokio::spawn(run_worker(worker_id, queue, handler))
            })
            .collect();

        info!("Started {} worker(s) for queue {}", concurrency, queue.name());
        Self {
            queue: queue.name(),
            handles,
        }
    }

    /// Waits for every worker to exit. Workers still running after `timeout`
    /// are aborted and `false` is returned.
    pub async fn join(self, timeout: Duration) -> bool {
        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();
        let handles = self.handles;

        let joined = tokio::time::timeout(timeout, async move {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                "Workers for queue {} did not stop within {:?}, aborting",
                self.queue, timeout
            );
            for abort in aborts {
                abort.abort();
            }
            return false;
        }
        true
    }
}

async fn run_worker(worker_id: usize, queue: Arc<NamedQueue>, handler: Arc<dyn JobHandler>) {
    while let Some(job) = queue.next_job().await {
        let span = info_span!(
            "job",
            queue = %queue.name(),
            worker = worker_id,
            id = job.id,
            kind = job.payload.kind(),
            attempt = job.attempts + 1,
        );

        let result = handler.handle(&job).instrument(span).await;
        match result {
            Ok(()) => queue.complete(job).await,
            Err(e) => {
                queue.fail(job, &e).await;
            }
        }
    }
    debug!("Worker {} for queue {} stopped", worker_id, queue.name());
}
