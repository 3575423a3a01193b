//! Handler for short URL redirect.

use axum::{
    Extension,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use std::net::SocketAddr;

use crate::domain::entities::LookupOutcome;
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::client_meta::client_meta_from_headers;

/// Redirects a short code to its destination.
///
/// # Endpoint
///
/// `GET /{code}`
///
/// # Request Flow
///
/// 1. Resolve the code through the cache-aside lookup
/// 2. Spawn visit accounting off the response path
/// 3. Return 307 Temporary Redirect
///
/// Accounting never delays or fails the redirect: the visit is enqueued as
/// a click job, or written through when the queue is unavailable.
///
/// # Errors
///
/// Returns 404 Not Found for unknown codes and 410 Gone for expired ones.
pub async fn redirect_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
) -> Result<Response, AppError> {
    match state.links.lookup(&code).await? {
        LookupOutcome::Found(view) => {
            let meta = client_meta_from_headers(
                &headers,
                peer.map(|Extension(ConnectInfo(addr))| addr),
                state.behind_proxy,
            );
            let links = state.links.clone();
            let visited = code.clone();
            tokio::spawn(async move {
                links.record_visit(&visited, Some(meta)).await;
            });

            Ok(Redirect::temporary(&view.link.destination).into_response())
        }
        LookupOutcome::Expired => Ok((
            StatusCode::GONE,
            axum::Json(json!({
                "error": {
                    "code": "expired",
                    "message": "Short link expired",
                    "details": { "code": code }
                }
            })),
        )
            .into_response()),
        LookupOutcome::NotFound => Err(AppError::not_found(
            "Short link not found",
            json!({ "code": code }),
        )),
    }
}
