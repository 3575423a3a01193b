//! In-process job queues.
//!
//! Four named queues (see [`crate::domain::jobs::QueueName`]) each get their
//! own worker pool. Jobs are retried with exponential backoff when the
//! handler's error is retryable, up to a bounded number of attempts.

mod coordinator;
mod job_queue;
mod policy;
mod worker;

pub use coordinator::{QueueCoordinator, QueueHealth};
pub use job_queue::{JobRecord, NamedQueue, QueueCounts, QueueError};
pub use policy::QueueOptions;
pub use worker::{JobHandler, WorkerPool};

#[cfg(test)]
pub use worker::MockJobHandler;
