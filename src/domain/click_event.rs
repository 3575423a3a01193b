//! Click event model for asynchronous click accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client metadata captured from a visit.
///
/// All fields are optional to handle missing headers gracefully. Raw values
/// never leave the click pipeline; only anonymized projections are logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl ClientMeta {
    pub fn new(ip: Option<String>, user_agent: Option<&str>, referer: Option<&str>) -> Self {
        Self {
            ip,
            user_agent: user_agent.map(|s| s.to_string()),
            referer: referer.map(|s| s.to_string()),
        }
    }
}

/// A single visit to a live short link.
///
/// Created by the request path and carried as a `click-event` job to the
/// click workers, which turn it into a pending counter increment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub code: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_meta: Option<ClientMeta>,
}

impl ClickEvent {
    pub fn new(code: impl Into<String>, client_meta: Option<ClientMeta>) -> Self {
        Self {
            code: code.into(),
            timestamp: Utc::now(),
            client_meta,
        }
    }
}
