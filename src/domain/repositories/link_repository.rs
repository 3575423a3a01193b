//! Durable store contract for short links.

use crate::domain::entities::{NewShortLink, ShortLink, SystemStats};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository interface for the durable link store.
///
/// The store is authoritative for click counts and for code uniqueness: a
/// code that passed every cache and pool check can still be rejected here.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgLinkRepository`] - PostgreSQL implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Creates a new short link.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if a live link already uses the code.
    /// Returns [`AppError::Internal`] on database errors.
    async fn create(&self, new_link: NewShortLink) -> Result<ShortLink, AppError>;

    /// Finds a link by its code, whether live, expired or deactivated.
    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError>;

    /// Finds the newest live link pointing at `destination`.
    async fn find_by_destination(&self, destination: &str)
    -> Result<Option<ShortLink>, AppError>;

    /// Returns the subset of `codes` already used by live links.
    async fn existing_codes(&self, codes: &[String]) -> Result<Vec<String>, AppError>;

    /// Adds one click. Returns `false` if no link matched.
    async fn increment_click_count(&self, code: &str) -> Result<bool, AppError>;

    /// Adds `amount` clicks in a single statement. Returns `false` if no
    /// link matched.
    async fn bulk_increment_click_count(&self, code: &str, amount: i64)
    -> Result<bool, AppError>;

    /// Live, unexpired links ordered by click count, highest first.
    async fn get_popular(&self, limit: i64) -> Result<Vec<ShortLink>, AppError>;

    /// Live, unexpired links ordered by creation time, newest first.
    async fn get_recent(&self, limit: i64) -> Result<Vec<ShortLink>, AppError>;

    /// Active links with `expires_at < now`, oldest expiry first.
    async fn get_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ShortLink>, AppError>;

    /// Deletes (`hard_delete`) or deactivates the given links, skipping any
    /// whose expiry was extended in the meantime. Returns the affected count.
    async fn remove_expired(&self, ids: &[i64], hard_delete: bool) -> Result<u64, AppError>;

    /// Totals for the system stats aggregate.
    async fn system_stats(&self) -> Result<SystemStats, AppError>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), AppError>;
}
