//! HTTP server initialization and runtime setup.
//!
//! Handles database connections, cache setup, worker and scheduler start-up,
//! the Axum server lifecycle and the ordered shutdown that follows it.

use crate::application::jobs::Scheduler;
use crate::config::Config;
use crate::infrastructure::cache::{CacheLayer, CacheService, MemoryCache, NullCache, RedisCache};
use crate::infrastructure::persistence::PgLinkRepository;
use crate::routes::app_router;
use crate::state::AppState;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Prefix for every cache key this service writes.
pub const CACHE_KEY_PREFIX: &str = "shortlink:";

/// Runs the HTTP server with the given configuration.
///
/// Initializes:
/// - PostgreSQL connection pool
/// - Apply migrations
/// - Cache backend (Redis, in-memory, or NullCache fallback)
/// - Queue workers and periodic schedules
/// - Axum HTTP server
///
/// On ctrl-c the server stops accepting requests, then the schedules stop,
/// then the queues shut down (stop accepting, drain workers, dispose).
///
/// # Errors
///
/// Returns an error if:
/// - Database connection or migration fails
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config) -> Result<()> {
    let pool = connect_database(&config).await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let cache = CacheLayer::new(connect_cache(&config).await);

    let repository = Arc::new(PgLinkRepository::new(Arc::new(pool)));
    let state = AppState::new(repository, cache, &config)?;

    state.queue.start_workers(state.job_handler()).await;
    tracing::info!("Queue workers started");

    let scheduler = Scheduler::start(
        state.queue.clone(),
        state.slugs.clone(),
        &config.expiry,
        &config.clicks,
    );

    let queue = state.queue.clone();
    let app = app_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("HTTP server stopped, shutting down background work");
    scheduler.stop();
    queue.shutdown(config.queue.shutdown_timeout).await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Builds the connection pool from the pool settings.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

/// Picks the cache backend.
///
/// Redis when configured and reachable; the null cache when configured but
/// unreachable (every read misses, the durable store answers); the in-memory
/// cache when Redis is not configured at all.
pub async fn connect_cache(config: &Config) -> Arc<dyn CacheService> {
    match &config.redis_url {
        Some(redis_url) => match RedisCache::connect(redis_url, CACHE_KEY_PREFIX).await {
            Ok(redis) => {
                tracing::info!("Cache enabled (Redis)");
                Arc::new(redis)
            }
            Err(e) => {
                tracing::warn!("Failed to connect to Redis: {}. Using NullCache.", e);
                Arc::new(NullCache::new())
            }
        },
        None => {
            tracing::info!("Redis not configured, using in-memory cache");
            Arc::new(MemoryCache::with_capacity(config.memory_cache_capacity))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
