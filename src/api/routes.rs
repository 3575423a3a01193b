//! API route configuration.

use crate::api::handlers::{
    link_handler, popular_handler, recent_handler, shorten_handler, stats_handler,
};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// API routes, nested under `/api`.
///
/// # Endpoints
///
/// - `POST /shorten`        - Create short links (batch-capable)
/// - `GET  /links/{code}`   - Link record with displayed click count
/// - `GET  /popular`        - Most clicked live links (cached)
/// - `GET  /recent`         - Newest live links (cached)
/// - `GET  /stats`          - System totals (cached)
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/shorten", post(shorten_handler))
        .route("/links/{code}", get(link_handler))
        .route("/popular", get(popular_handler))
        .route("/recent", get(recent_handler))
        .route("/stats", get(stats_handler))
}
