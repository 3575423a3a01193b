//! Routes queued jobs to the services that execute them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::application::services::{ClickService, ExpiryReaper, LinkService, SlugPool};
use crate::domain::jobs::{Job, JobPayload, ResyncOp};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::queue::JobHandler;

/// [`JobHandler`] for every queue.
pub struct JobDispatcher<R: LinkRepository + ?Sized> {
    links: Arc<LinkService<R>>,
    clicks: Arc<ClickService<R>>,
    slugs: Arc<SlugPool<R>>,
    reaper: Arc<ExpiryReaper<R>>,
}

impl<R: LinkRepository + ?Sized> JobDispatcher<R> {
    pub fn new(
        links: Arc<LinkService<R>>,
        clicks: Arc<ClickService<R>>,
        slugs: Arc<SlugPool<R>>,
        reaper: Arc<ExpiryReaper<R>>,
    ) -> Self {
        Self {
            links,
            clicks,
            slugs,
            reaper,
        }
    }
}

#[async_trait]
impl<R: LinkRepository + ?Sized + 'static> JobHandler for JobDispatcher<R> {
    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        match &job.payload {
            JobPayload::ClickEvent(event) => {
                let outcome = self.clicks.process_click(event).await?;
                debug!(?outcome, "click processed");
            }
            JobPayload::PoolRefill { count } => {
                self.slugs.refill(*count).await?;
            }
            JobPayload::CacheResync {
                code,
                op: ResyncOp::Sync,
            } => {
                self.clicks.flush_code(code).await?;
                self.links.refresh(code).await?;
            }
            JobPayload::CacheResync {
                code,
                op: ResyncOp::Invalidate,
            } => {
                self.links.invalidate(code).await;
            }
            JobPayload::ExpirySweep { batch_size } => {
                let summary = self.reaper.sweep(*batch_size).await?;
                if summary.has_more {
                    debug!(
                        "Expiry backlog remains after {} links; next run continues",
                        summary.scanned
                    );
                }
            }
            JobPayload::CacheWarm { batch_size } => {
                self.links.warm_cache(*batch_size).await?;
            }
            JobPayload::CounterSweep { batch_size } => {
                let summary = self.clicks.sweep_counters(*batch_size).await;
                if !summary.is_clean() {
                    return Err(AppError::internal(
                        "Counter sweep left codes unflushed",
                        json!({ "failed": summary.failed }),
                    ));
                }
            }
        }
        Ok(())
    }
}
