use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::job_queue::{NamedQueue, QueueCounts, QueueError};
use super::policy::QueueOptions;
use super::worker::{JobHandler, WorkerPool};
use crate::domain::jobs::{EnqueueOptions, JobId, JobPayload, QueueName};

/// Health of one queue as reported by [`QueueCoordinator::health_check`].
#[derive(Debug)]
pub struct QueueHealth {
    pub queue: QueueName,
    pub counts: Result<QueueCounts, QueueError>,
}

impl QueueHealth {
    pub fn is_healthy(&self) -> bool {
        self.counts.is_ok()
    }
}

/// Owns the named queues and their worker pools.
///
/// Payloads are routed by [`JobPayload::queue`], so callers never pick a
/// queue by hand.
pub struct QueueCoordinator {
    queues: BTreeMap<QueueName, Arc<NamedQueue>>,
    workers: Mutex<Vec<WorkerPool>>,
}

impl QueueCoordinator {
    /// Creates every queue in [`QueueName::ALL`] with the same options.
    pub fn new(options: QueueOptions) -> Self {
        let queues = QueueName::ALL
            .into_iter()
            .map(|name| (name, Arc::new(NamedQueue::new(name, options.clone()))))
            .collect();

        Self {
            queues,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, name: QueueName) -> Option<&Arc<NamedQueue>> {
        self.queues.get(&name)
    }

    pub async fn enqueue(
        &self,
        payload: JobPayload,
        opts: EnqueueOptions,
    ) -> Result<JobId, QueueError> {
        let name = payload.queue();
        let queue = self.queues.get(&name).ok_or(QueueError::Closed(name))?;
        queue.enqueue(payload, opts).await
    }

    /// Starts a worker pool on every queue, all sharing one handler.
    pub async fn start_workers(&self, handler: Arc<dyn JobHandler>) {
        let mut workers = self.workers.lock().await;
        for queue in self.queues.values() {
            workers.push(WorkerPool::spawn(queue.clone(), handler.clone()));
        }
    }

    pub async fn health_check(&self) -> Vec<QueueHealth> {
        let mut report = Vec::with_capacity(self.queues.len());
        for (name, queue) in &self.queues {
            report.push(QueueHealth {
                queue: *name,
                counts: queue.counts().await,
            });
        }
        report
    }

    pub async fn is_healthy(&self) -> bool {
        self.health_check().await.iter().all(QueueHealth::is_healthy)
    }

    /// Waits until no queue has a ready or active job. Returns `false` on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let all_idle = async {
            for queue in self.queues.values() {
                queue.wait_idle().await;
            }
        };
        tokio::time::timeout(timeout, all_idle).await.is_ok()
    }

    /// Stops the queues in order: refuse new jobs, let workers finish what is
    /// ready (bounded by `timeout`), then discard whatever is left.
    pub async fn shutdown(&self, timeout: Duration) {
        info!("Shutting down job queues");
        for queue in self.queues.values() {
            queue.close();
        }

        let pools: Vec<WorkerPool> = self.workers.lock().await.drain(..).collect();
        let mut clean = true;
        for pool in pools {
            clean &= pool.join(timeout).await;
        }
        if !clean {
            error!("Some job workers were aborted during shutdown");
        }

        for queue in self.queues.values() {
            let discarded = queue.dispose().await;
            if discarded > 0 {
                warn!(
                    "Discarded {} pending job(s) on queue {}",
                    discarded,
                    queue.name()
                );
            }
        }
        info!("Job queues stopped");
    }
}
