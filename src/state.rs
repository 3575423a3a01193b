//! Shared application state.
//!
//! Every component is constructed once here and handed out as an explicit
//! dependency. Services are built over `dyn LinkRepository`, so the same
//! wiring serves PostgreSQL in production and in-memory fakes in tests.

use std::sync::Arc;

use anyhow::Result;

use crate::application::jobs::JobDispatcher;
use crate::application::services::{ClickService, ExpiryReaper, LinkService, SlugPool};
use crate::config::Config;
use crate::domain::repositories::LinkRepository;
use crate::infrastructure::cache::CacheLayer;
use crate::infrastructure::queue::{JobHandler, QueueCoordinator};

pub type DynLinkService = LinkService<dyn LinkRepository>;
pub type DynClickService = ClickService<dyn LinkRepository>;
pub type DynSlugPool = SlugPool<dyn LinkRepository>;
pub type DynExpiryReaper = ExpiryReaper<dyn LinkRepository>;

#[derive(Clone)]
pub struct AppState {
    pub links: Arc<DynLinkService>,
    pub clicks: Arc<DynClickService>,
    pub slugs: Arc<DynSlugPool>,
    pub reaper: Arc<DynExpiryReaper>,
    pub queue: Arc<QueueCoordinator>,
    pub cache: CacheLayer,
    pub repository: Arc<dyn LinkRepository>,
    pub behind_proxy: bool,
}

impl AppState {
    /// Wires every service from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the slug settings do not describe a usable code
    /// generator.
    pub fn new(
        repository: Arc<dyn LinkRepository>,
        cache: CacheLayer,
        config: &Config,
    ) -> Result<Self> {
        let queue = Arc::new(QueueCoordinator::new(config.queue.options.clone()));
        let generator = config.slugs.code_generator()?;

        let clicks = Arc::new(ClickService::new(
            repository.clone(),
            cache.clone(),
            queue.clone(),
            config.clicks.clone(),
        ));
        let slugs = Arc::new(SlugPool::new(
            repository.clone(),
            cache.clone(),
            queue.clone(),
            generator,
            config.slugs.clone(),
        ));
        let links = Arc::new(LinkService::new(
            repository.clone(),
            cache.clone(),
            clicks.clone(),
            slugs.clone(),
            config.cache_ttls.clone(),
        ));
        let reaper = Arc::new(ExpiryReaper::new(
            repository.clone(),
            cache.clone(),
            config.expiry.hard_delete,
        ));

        Ok(Self {
            links,
            clicks,
            slugs,
            reaper,
            queue,
            cache,
            repository,
            behind_proxy: config.behind_proxy,
        })
    }

    /// Handler that executes jobs from every queue.
    pub fn job_handler(&self) -> Arc<dyn JobHandler> {
        Arc::new(JobDispatcher::new(
            self.links.clone(),
            self.clicks.clone(),
            self.slugs.clone(),
            self.reaper.clone(),
        ))
    }
}
