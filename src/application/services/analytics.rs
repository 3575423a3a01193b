//! Privacy-preserving click analytics.
//!
//! Each processed click is reduced to coarse attributes and logged on the
//! `analytics` tracing target. Nothing here can fail the count path.

use serde::Serialize;
use std::net::IpAddr;
use url::Url;

use crate::domain::click_event::ClickEvent;

/// Browser family derived from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Opera,
    Bot,
    Other,
}

impl BrowserFamily {
    /// Buckets a user agent. Order matters: Edge and Opera also claim Chrome,
    /// and Chrome also claims Safari.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ["bot", "crawler", "spider", "curl", "wget"]
            .iter()
            .any(|marker| ua.contains(marker))
        {
            Self::Bot
        } else if ua.contains("edg/") || ua.contains("edge/") {
            Self::Edge
        } else if ua.contains("opr/") || ua.contains("opera") {
            Self::Opera
        } else if ua.contains("firefox/") || ua.contains("fxios/") {
            Self::Firefox
        } else if ua.contains("chrome/") || ua.contains("crios/") || ua.contains("chromium/") {
            Self::Chrome
        } else if ua.contains("safari/") {
            Self::Safari
        } else {
            Self::Other
        }
    }
}

/// Coarse view of a click.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickInsight {
    pub code: String,
    pub network: Option<String>,
    pub browser: BrowserFamily,
    pub referer_host: Option<String>,
}

/// Zeroes the last IPv4 octet or the last IPv6 segment.
/// Returns `None` for anything that is not an IP address.
pub fn anonymize_ip(raw: &str) -> Option<String> {
    match raw.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            Some(format!("{}.{}.{}.0", a, b, c))
        }
        IpAddr::V6(v6) => {
            let mut segments = v6.segments();
            segments[7] = 0;
            Some(std::net::Ipv6Addr::from(segments).to_string())
        }
    }
}

impl ClickInsight {
    pub fn from_event(event: &ClickEvent) -> Self {
        let meta = event.client_meta.as_ref();
        Self {
            code: event.code.clone(),
            network: meta.and_then(|m| m.ip.as_deref()).and_then(anonymize_ip),
            browser: meta
                .and_then(|m| m.user_agent.as_deref())
                .map(BrowserFamily::from_user_agent)
                .unwrap_or(BrowserFamily::Other),
            referer_host: meta
                .and_then(|m| m.referer.as_deref())
                .and_then(|r| Url::parse(r).ok())
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase)),
        }
    }
}

/// Derives and logs analytics for a click.
pub fn observe(event: &ClickEvent) {
    let insight = ClickInsight::from_event(event);
    tracing::info!(
        target: "analytics",
        code = %insight.code,
        network = insight.network.as_deref().unwrap_or("-"),
        browser = ?insight.browser,
        referer = insight.referer_host.as_deref().unwrap_or("-"),
        at = %event.timestamp,
        "click"
    );
}
