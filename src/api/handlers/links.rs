//! Handlers for link read endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::api::dto::links::{LinkListResponse, LinkResponse};
use crate::api::dto::stats::ListQuery;
use crate::error::AppError;
use crate::state::AppState;

/// `GET /api/links/{code}`
///
/// Unknown and expired codes both answer 404 here; only the redirect
/// endpoint distinguishes them.
pub async fn link_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LinkResponse>, AppError> {
    let view = state.links.get_link(&code).await?;
    Ok(Json(view.into()))
}

/// `GET /api/popular?limit=N`
pub async fn popular_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<LinkListResponse>, AppError> {
    let views = state.links.popular(query.limit()).await?;
    Ok(Json(views.into()))
}

/// `GET /api/recent?limit=N`
pub async fn recent_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<LinkListResponse>, AppError> {
    let views = state.links.recent(query.limit()).await?;
    Ok(Json(views.into()))
}
