//! Background job execution and scheduling.

mod dispatcher;
mod scheduler;

pub use dispatcher::JobDispatcher;
pub use scheduler::{CACHE_WARM_BATCH, COUNTER_SWEEP_BATCH, POOL_CHECK_INTERVAL, Scheduler};
