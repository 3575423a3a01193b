//! CLI administration tool for shortlink-engine.
//!
//! Runs maintenance work on demand, against the same database and cache the
//! service uses, without going through the HTTP API or the queues.
//!
//! # Usage
//!
//! ```bash
//! # Run one expiry batch
//! cargo run --bin admin -- sweep
//!
//! # Fill the slug pool
//! cargo run --bin admin -- pool refill 500
//! cargo run --bin admin -- pool status
//!
//! # Flush every pending click counter into the database
//! cargo run --bin admin -- clicks sync
//!
//! # View statistics
//! cargo run --bin admin -- stats
//!
//! # Check database connection
//! cargo run --bin admin -- db check
//! ```
//!
//! # Environment Variables
//!
//! Same as the service: `DATABASE_URL` is required, `REDIS_URL` is
//! optional. Without Redis the pool and pending counters live in this
//! process only, so `pool` and `clicks` commands have nothing to act on.

use shortlink_engine::config::{self, Config};
use shortlink_engine::domain::repositories::LinkRepository;
use shortlink_engine::infrastructure::cache::CacheLayer;
use shortlink_engine::infrastructure::persistence::PgLinkRepository;
use shortlink_engine::server::{connect_cache, connect_database};
use shortlink_engine::state::AppState;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use sqlx::PgPool;
use std::sync::Arc;

/// Pending counters flushed per `clicks sync` round.
const SYNC_BATCH: usize = 500;

/// CLI tool for managing shortlink-engine.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Deactivate (or delete) one batch of expired links
    Sweep {
        /// Links to process, defaults to EXPIRY_BATCH_SIZE
        #[arg(short, long)]
        batch: Option<i64>,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Manage the pre-generated slug pool
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },

    /// Pending click counters
    Clicks {
        #[command(subcommand)]
        action: ClicksAction,
    },

    /// Show link and click totals
    Stats,

    /// Database utilities
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum PoolAction {
    /// Generate codes and add them to the pool
    Refill {
        /// Number of codes to generate
        count: usize,
    },
    /// Show pool size against its thresholds
    Status,
}

#[derive(Subcommand)]
enum ClicksAction {
    /// Flush every pending counter into the database
    Sync,
}

#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = config::load_from_env().context("Invalid configuration")?;

    let pool = connect_database(&config).await?;

    if let Commands::Db { action } = cli.command {
        return handle_db_action(action, &pool).await;
    }

    let state = build_state(&pool, &config).await?;
    match cli.command {
        Commands::Sweep { batch, yes } => {
            handle_sweep(&state, batch.unwrap_or(config.expiry.batch_size), yes).await
        }
        Commands::Pool { action } => handle_pool_action(action, &state, &config).await,
        Commands::Clicks { action } => handle_clicks_action(action, &state).await,
        Commands::Stats => handle_stats(&state).await,
        Commands::Db { action } => handle_db_action(action, &pool).await,
    }
}

async fn build_state(pool: &PgPool, config: &Config) -> Result<AppState> {
    let cache = CacheLayer::new(connect_cache(config).await);
    let repository = Arc::new(PgLinkRepository::new(Arc::new(pool.clone())));
    AppState::new(repository, cache, config)
}

/// Runs one expiry batch after confirmation (default: No).
async fn handle_sweep(state: &AppState, batch: i64, skip_confirm: bool) -> Result<()> {
    println!("{}", "🧹 Expiry Sweep".bright_blue().bold());
    println!();
    println!("  Batch size: {}", batch.to_string().cyan());
    println!();

    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt("Remove up to this many expired links?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "❌ Cancelled".red());
            return Ok(());
        }
    }

    let summary = state
        .reaper
        .sweep(batch)
        .await
        .map_err(|e| anyhow::anyhow!("Sweep failed: {}", e))?;

    println!();
    println!(
        "  Scanned: {}",
        summary.scanned.to_string().bright_white().bold()
    );
    println!(
        "  Removed: {}",
        summary.removed.to_string().bright_green().bold()
    );
    if summary.has_more {
        println!(
            "{}",
            "  More expired links remain; run the command again.".yellow()
        );
    }
    println!();

    Ok(())
}

async fn handle_pool_action(action: PoolAction, state: &AppState, config: &Config) -> Result<()> {
    match action {
        PoolAction::Refill { count } => {
            println!("{}", "🔑 Refilling slug pool...".bright_blue());

            let summary = state
                .slugs
                .refill(count)
                .await
                .map_err(|e| anyhow::anyhow!("Refill failed: {}", e))?;

            println!(
                "  Generated: {}  Added: {}",
                summary.generated.to_string().bright_white(),
                summary.added.to_string().bright_green().bold()
            );
        }
        PoolAction::Status => {
            println!("{}", "🔑 Slug Pool".bright_blue().bold());
            println!();

            match state.slugs.size().await {
                Some(size) => {
                    let size_str = if size < config.slugs.pool_low_water {
                        size.to_string().red().bold()
                    } else {
                        size.to_string().bright_green().bold()
                    };
                    println!("  Size:      {}", size_str);
                }
                None => println!("  Size:      {}", "unknown (cache unavailable)".yellow()),
            }
            println!(
                "  Low water: {}",
                config.slugs.pool_low_water.to_string().bright_black()
            );
            println!(
                "  Target:    {}",
                config.slugs.pool_target.to_string().bright_black()
            );
            println!("  Backend:   {}", state.cache.backend_name().cyan());
            println!();
        }
    }

    Ok(())
}

async fn handle_clicks_action(action: ClicksAction, state: &AppState) -> Result<()> {
    match action {
        ClicksAction::Sync => {
            println!("{}", "🔄 Flushing pending clicks...".bright_blue());

            let mut flushed = 0;
            let mut persisted = 0;
            loop {
                let summary = state.clicks.sweep_counters(SYNC_BATCH).await;
                flushed += summary.flushed;
                persisted += summary.clicks_persisted;

                if !summary.failed.is_empty() {
                    println!(
                        "{} {}",
                        "⚠️  Failed to flush:".yellow(),
                        summary.failed.join(", ")
                    );
                    break;
                }
                if summary.flushed == 0 {
                    break;
                }
            }

            println!(
                "  Codes flushed:    {}",
                flushed.to_string().bright_white().bold()
            );
            println!(
                "  Clicks persisted: {}",
                persisted.to_string().bright_green().bold()
            );
            println!();
        }
    }

    Ok(())
}

/// Displays system statistics.
async fn handle_stats(state: &AppState) -> Result<()> {
    println!("{}", "📊 Statistics".bright_blue().bold());
    println!();

    let stats = state
        .repository
        .system_stats()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load stats: {}", e))?;

    println!(
        "  Links:         {}",
        stats.total_links.to_string().bright_green().bold()
    );
    println!(
        "  Active:        {}",
        stats.active_links.to_string().bright_green()
    );
    println!(
        "  Expired:       {}",
        stats.expired_links.to_string().bright_black()
    );
    println!(
        "  Clicks:        {}",
        stats.total_clicks.to_string().bright_green().bold()
    );

    let pending: i64 = state
        .clicks
        .pending_counts(SYNC_BATCH)
        .await
        .iter()
        .map(|p| p.amount)
        .sum();
    println!("  Pending:       {}", pending.to_string().yellow());
    println!();

    Ok(())
}

/// Handles database diagnostic commands.
async fn handle_db_action(action: DbAction, pool: &PgPool) -> Result<()> {
    match action {
        DbAction::Check => {
            println!("{}", "🔍 Checking database connection...".bright_blue());

            sqlx::query("SELECT 1").fetch_one(pool).await?;

            println!("{}", "✅ Database connection OK".green().bold());
        }
    }

    Ok(())
}
