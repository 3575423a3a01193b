//! Handler for link shortening endpoint.

use axum::{Json, extract::State};
use validator::Validate;

use crate::api::dto::shorten::{BatchSummary, ShortenRequest, ShortenResponse, ShortenResultItem};
use crate::error::AppError;
use crate::state::AppState;

/// Creates short links for one or more destinations.
///
/// # Endpoint
///
/// `POST /api/shorten`
///
/// # Batch Processing
///
/// Processes destinations independently. If one fails, others continue
/// processing. Each result includes either success data or error
/// information. A destination that already has a live link without expiry
/// or owner gets that link back.
///
/// # Request Body
///
/// ```json
/// {
///   "urls": [
///     { "url": "https://example.com/a" },
///     { "url": "https://example.com/b", "expires_at": "2030-01-01T00:00:00Z" }
///   ]
/// }
/// ```
///
/// # Errors
///
/// Returns 400 Bad Request if validation fails.
/// Individual errors are returned in the response items array.
pub async fn shorten_handler(
    State(state): State<AppState>,
    Json(payload): Json<ShortenRequest>,
) -> Result<Json<ShortenResponse>, AppError> {
    payload.validate()?;

    let total = payload.urls.len();
    let mut items = Vec::with_capacity(total);
    let mut successful = 0;

    for item in payload.urls {
        match state
            .links
            .create_short_link(&item.url, item.expires_at, item.owner_id)
            .await
        {
            Ok(link) => {
                successful += 1;
                items.push(ShortenResultItem::Success {
                    path: format!("/{}", link.code),
                    destination: link.destination,
                    code: link.code,
                    expires_at: link.expires_at,
                });
            }
            Err(e) => {
                tracing::warn!("Failed to shorten {}: {}", item.url, e);
                items.push(ShortenResultItem::Error {
                    destination: item.url,
                    error: e.info(),
                });
            }
        }
    }

    Ok(Json(ShortenResponse {
        summary: BatchSummary {
            total,
            successful,
            failed: total - successful,
        },
        items,
    }))
}
