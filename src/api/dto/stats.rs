//! DTOs for aggregate statistics endpoints.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::domain::entities::SystemStats;

/// Default number of links returned by list endpoints.
pub const DEFAULT_LIST_LIMIT: i64 = 10;

/// `?limit=` query parameter for list endpoints.
///
/// Uses `serde_with` to parse the limit from the query string as an integer.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

/// System totals plus the current slug pool size.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub totals: SystemStats,
    /// `None` when the cache cannot report it.
    pub slug_pool_size: Option<u64>,
}
