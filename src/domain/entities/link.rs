//! Short link entity and its read-side projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short link as stored in the durable store.
///
/// The durable store is the source of truth. `click_count` only contains
/// clicks that have been flushed; clicks still sitting in the pending counter
/// are added on top of it when the link is displayed (see [`LinkView`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortLink {
    pub id: i64,
    pub destination: String,
    pub code: String,
    pub click_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
}

impl ShortLink {
    /// Returns true if the link has an expiry time that is not in the future.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| now >= e)
    }

    /// Returns true if the link has passed its expiry time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A link is live when it is active and not expired.
    pub fn is_live(&self) -> bool {
        self.is_active && !self.is_expired()
    }
}

/// Input data for creating a new short link.
#[derive(Debug, Clone)]
pub struct NewShortLink {
    pub code: String,
    pub destination: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
}

/// A short link together with the clicks not yet persisted.
#[derive(Debug, Clone, Serialize)]
pub struct LinkView {
    #[serde(flatten)]
    pub link: ShortLink,
    pub pending_clicks: i64,
}

impl LinkView {
    pub fn new(link: ShortLink, pending_clicks: i64) -> Self {
        Self {
            link,
            pending_clicks: pending_clicks.max(0),
        }
    }

    /// Durable count plus pending count.
    pub fn displayed_clicks(&self) -> i64 {
        self.link.click_count + self.pending_clicks
    }
}

/// Result of resolving a short code.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Found(LinkView),
    NotFound,
    Expired,
}

impl LookupOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Totals reported by the system stats aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_links: i64,
    pub active_links: i64,
    pub expired_links: i64,
    pub total_clicks: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(expires_at: Option<DateTime<Utc>>) -> ShortLink {
        let now = Utc::now();
        ShortLink {
            id: 1,
            destination: "https://example.com/".to_string(),
            code: "abc123".to_string(),
            click_count: 40,
            is_active: true,
            created_at: now,
            updated_at: now,
            expires_at,
            owner_id: None,
        }
    }

    #[test]
    fn test_link_without_expiry_is_live() {
        let link = link(None);
        assert!(!link.is_expired());
        assert!(link.is_live());
    }

    #[test]
    fn test_link_with_past_expiry_is_expired() {
        let link = link(Some(Utc::now() - Duration::seconds(1)));
        assert!(link.is_expired());
        assert!(!link.is_live());
    }

    #[test]
    fn test_expiry_boundary_counts_as_expired() {
        let at = Utc::now();
        let link = link(Some(at));
        assert!(link.is_expired_at(at));
        assert!(!link.is_expired_at(at - Duration::milliseconds(1)));
    }

    #[test]
    fn test_inactive_link_is_not_live() {
        let mut link = link(None);
        link.is_active = false;
        assert!(!link.is_live());
    }

    #[test]
    fn test_view_adds_pending_clicks() {
        let view = LinkView::new(link(None), 3);
        assert_eq!(view.displayed_clicks(), 43);
    }

    #[test]
    fn test_view_ignores_negative_pending() {
        let view = LinkView::new(link(None), -2);
        assert_eq!(view.pending_clicks, 0);
        assert_eq!(view.displayed_clicks(), 40);
    }
}
