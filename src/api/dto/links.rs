//! DTOs for link read endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::LinkView;

/// A link with its displayed click count.
///
/// `clicks` is the durable count plus clicks not yet flushed.
#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub code: String,
    pub destination: String,
    pub clicks: i64,
    pub pending_clicks: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<LinkView> for LinkResponse {
    fn from(view: LinkView) -> Self {
        let clicks = view.displayed_clicks();
        Self {
            code: view.link.code,
            destination: view.link.destination,
            clicks,
            pending_clicks: view.pending_clicks,
            created_at: view.link.created_at,
            expires_at: view.link.expires_at,
        }
    }
}

/// A list of links.
#[derive(Debug, Serialize)]
pub struct LinkListResponse {
    pub items: Vec<LinkResponse>,
}

impl From<Vec<LinkView>> for LinkListResponse {
    fn from(views: Vec<LinkView>) -> Self {
        Self {
            items: views.into_iter().map(LinkResponse::from).collect(),
        }
    }
}
