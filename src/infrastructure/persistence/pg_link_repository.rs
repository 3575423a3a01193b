//! PostgreSQL implementation of link repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{NewShortLink, ShortLink, SystemStats};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;

const LINK_COLUMNS: &str =
    "id, destination, code, click_count, is_active, created_at, updated_at, expires_at, owner_id";

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: i64,
    destination: String,
    code: String,
    click_count: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    owner_id: Option<String>,
}

impl From<LinkRow> for ShortLink {
    fn from(r: LinkRow) -> Self {
        ShortLink {
            id: r.id,
            destination: r.destination,
            code: r.code,
            click_count: r.click_count,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
            expires_at: r.expires_at,
            owner_id: r.owner_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_links: i64,
    active_links: i64,
    expired_links: i64,
    total_clicks: i64,
}

/// PostgreSQL repository for short links.
///
/// Queries are built at runtime with bound parameters, so the crate compiles
/// without a reachable database.
pub struct PgLinkRepository {
    pool: Arc<PgPool>,
}

impl PgLinkRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn fetch_links(&self, sql: &str, limit: i64) -> Result<Vec<ShortLink>, AppError> {
        let rows = sqlx::query_as::<_, LinkRow>(sql)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.into_iter().map(ShortLink::from).collect())
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn create(&self, new_link: NewShortLink) -> Result<ShortLink, AppError> {
        let sql = format!(
            "INSERT INTO short_links (code, destination, expires_at, owner_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {LINK_COLUMNS}"
        );

        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(&new_link.code)
            .bind(&new_link.destination)
            .bind(new_link.expires_at)
            .bind(&new_link.owner_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(row.into())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM short_links WHERE code = $1");

        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(code)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(ShortLink::from))
    }

    async fn find_by_destination(
        &self,
        destination: &str,
    ) -> Result<Option<ShortLink>, AppError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM short_links
             WHERE destination = $1
               AND is_active
               AND (expires_at IS NULL OR expires_at > NOW())
             ORDER BY created_at DESC
             LIMIT 1"
        );

        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(destination)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(ShortLink::from))
    }

    async fn existing_codes(&self, codes: &[String]) -> Result<Vec<String>, AppError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let existing = sqlx::query_scalar::<_, String>(
            "SELECT code FROM short_links WHERE code = ANY($1)",
        )
        .bind(codes)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(existing)
    }

    async fn increment_click_count(&self, code: &str) -> Result<bool, AppError> {
        self.bulk_increment_click_count(code, 1).await
    }

    async fn bulk_increment_click_count(
        &self,
        code: &str,
        amount: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE short_links
             SET click_count = click_count + $2, updated_at = NOW()
             WHERE code = $1",
        )
        .bind(code)
        .bind(amount)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_popular(&self, limit: i64) -> Result<Vec<ShortLink>, AppError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM short_links
             WHERE is_active AND (expires_at IS NULL OR expires_at > NOW())
             ORDER BY click_count DESC, id ASC
             LIMIT $1"
        );
        self.fetch_links(&sql, limit).await
    }

    async fn get_recent(&self, limit: i64) -> Result<Vec<ShortLink>, AppError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM short_links
             WHERE is_active AND (expires_at IS NULL OR expires_at > NOW())
             ORDER BY created_at DESC, id DESC
             LIMIT $1"
        );
        self.fetch_links(&sql, limit).await
    }

    async fn get_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ShortLink>, AppError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM short_links
             WHERE is_active AND expires_at IS NOT NULL AND expires_at < $1
             ORDER BY expires_at ASC, id ASC
             LIMIT $2"
        );

        let rows = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.into_iter().map(ShortLink::from).collect())
    }

    async fn remove_expired(&self, ids: &[i64], hard_delete: bool) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = if hard_delete {
            "DELETE FROM short_links
             WHERE id = ANY($1) AND expires_at < NOW()"
        } else {
            "UPDATE short_links
             SET is_active = FALSE, updated_at = NOW()
             WHERE id = ANY($1) AND is_active AND expires_at < NOW()"
        };

        let result = sqlx::query(sql)
            .bind(ids)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    async fn system_stats(&self) -> Result<SystemStats, AppError> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT
                 COUNT(*) AS total_links,
                 COUNT(*) FILTER (
                     WHERE is_active AND (expires_at IS NULL OR expires_at > NOW())
                 ) AS active_links,
                 COUNT(*) FILTER (
                     WHERE NOT is_active OR expires_at <= NOW()
                 ) AS expired_links,
                 COALESCE(SUM(click_count), 0)::BIGINT AS total_clicks
             FROM short_links",
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(SystemStats {
            total_links: row.total_links,
            active_links: row.active_links,
            expired_links: row.expired_links,
            total_clicks: row.total_clicks,
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
