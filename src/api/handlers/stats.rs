//! Handler for system statistics.

use axum::{Json, extract::State};

use crate::api::dto::stats::StatsResponse;
use crate::error::AppError;
use crate::state::AppState;

/// `GET /api/stats`
///
/// Totals are cached for the stats TTL, so they trail recent changes.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let totals = state.links.stats().await?;
    let slug_pool_size = state.slugs.size().await;
    Ok(Json(StatsResponse {
        totals,
        slug_pool_size,
    }))
}
