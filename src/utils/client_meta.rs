//! Client metadata extraction from HTTP request headers.

use axum::http::{HeaderMap, header};
use std::net::{IpAddr, SocketAddr};

use crate::domain::click_event::ClientMeta;

/// Builds [`ClientMeta`] for a visit.
///
/// With `behind_proxy` the client address is taken from the first
/// `X-Forwarded-For` entry, then `X-Real-IP`, and only then from the peer
/// socket. Without it the forwarding headers are ignored, since any client
/// can set them.
///
/// # Examples
///
/// ```ignore
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
///
/// let meta = client_meta_from_headers(&headers, None, true);
/// assert_eq!(meta.ip.as_deref(), Some("203.0.113.7"));
/// ```
pub fn client_meta_from_headers(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    behind_proxy: bool,
) -> ClientMeta {
    let forwarded = behind_proxy
        .then(|| forwarded_ip(headers))
        .flatten();
    let ip = forwarded.or_else(|| peer.map(|addr| addr.ip()));

    ClientMeta::new(
        ip.map(|ip| ip.to_string()),
        header_str(headers, header::USER_AGENT.as_str()),
        header_str(headers, header::REFERER.as_str()),
    )
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    header_str(headers, "x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header_str(headers, "x-real-ip").and_then(|v| v.trim().parse().ok()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
