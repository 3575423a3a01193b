//! Handler for health check endpoint.

use axum::{Json, extract::State, http::StatusCode};

use crate::api::dto::health::{CheckStatus, HealthChecks, HealthResponse, QueueCheck};
use crate::state::AppState;

/// Returns service health status with component checks.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response Codes
///
/// - **200 OK**: All components healthy
/// - **503 Service Unavailable**: One or more components degraded
///
/// # Components Checked
///
/// 1. **Database**: `SELECT 1` through the repository
/// 2. **Cache**: backend PING (the null cache always reports healthy)
/// 3. **Queues**: every named queue answers a counts query
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "checks": {
///     "database": { "status": "ok", "message": "Connected" },
///     "cache": { "status": "ok", "message": "redis" },
///     "queues": [
///       { "queue": "clicks", "status": "ok",
///         "counts": { "waiting": 0, "delayed": 0, "active": 1, "completed": 40, "failed": 0 } }
///     ]
///   }
/// }
/// ```
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let db_check = check_database(&state).await;

    let cache_check = check_cache(&state).await;

    let queue_checks = check_queues(&state).await;

    let all_healthy = db_check.is_ok()
        && cache_check.is_ok()
        && queue_checks.iter().all(|q| q.status == "ok");

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            cache: cache_check,
            queues: queue_checks,
        },
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_database(state: &AppState) -> CheckStatus {
    match state.repository.ping().await {
        Ok(()) => CheckStatus::ok("Connected"),
        Err(e) => CheckStatus::error(format!("Database error: {}", e)),
    }
}

async fn check_cache(state: &AppState) -> CheckStatus {
    let backend = state.cache.backend_name();
    if state.cache.is_healthy().await {
        CheckStatus::ok(backend)
    } else {
        CheckStatus::error(format!("{} unreachable", backend))
    }
}

async fn check_queues(state: &AppState) -> Vec<QueueCheck> {
    state
        .queue
        .health_check()
        .await
        .into_iter()
        .map(|health| QueueCheck {
            queue: health.queue.to_string(),
            status: if health.is_healthy() { "ok" } else { "error" }.to_string(),
            counts: health.counts.ok(),
        })
        .collect()
}
