//! Destination URL normalization.
//!
//! Shortening deduplicates by destination, so two spellings of the same
//! address must normalize to the same string.

use serde_json::json;
use url::Url;

use crate::error::AppError;

/// Errors that can occur during URL normalization.
#[derive(Debug, thiserror::Error)]
pub enum UrlNormalizationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Only HTTP and HTTPS protocols are allowed")]
    UnsupportedProtocol,

    #[error("Destination URL must have a host")]
    MissingHost,

    #[error("Failed to normalize URL: {0}")]
    NormalizationFailed(String),
}

/// Normalizes a destination URL to a canonical form.
///
/// Only `http` and `https` are accepted. The host is lowercased, default
/// ports and fragments are dropped; path and query are kept verbatim.
///
/// # Errors
///
/// Returns [`UrlNormalizationError::InvalidFormat`] for malformed URLs,
/// [`UrlNormalizationError::UnsupportedProtocol`] for other schemes and
/// [`UrlNormalizationError::MissingHost`] when no host is present.
pub fn normalize_url(input: &str) -> Result<String, UrlNormalizationError> {
    let mut url =
        Url::parse(input).map_err(|e| UrlNormalizationError::InvalidFormat(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlNormalizationError::UnsupportedProtocol),
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlNormalizationError::MissingHost)?
        .to_ascii_lowercase();
    url.set_host(Some(&host)).map_err(|_| {
        UrlNormalizationError::NormalizationFailed("Failed to set normalized host".to_string())
    })?;

    url.set_fragment(None);

    let is_default_port = matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        url.set_port(None).map_err(|_| {
            UrlNormalizationError::NormalizationFailed("Failed to remove default port".to_string())
        })?;
    }

    Ok(url.to_string())
}

impl From<UrlNormalizationError> for AppError {
    fn from(e: UrlNormalizationError) -> Self {
        AppError::bad_request(e.to_string(), json!({ "field": "destination" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_spellings_normalize_identically() {
        let variants = [
            "https://EXAMPLE.com/Path?q=1",
            "https://example.COM:443/Path?q=1",
            "https://example.com/Path?q=1#top",
        ];
        for v in variants {
            assert_eq!(normalize_url(v).unwrap(), "https://example.com/Path?q=1");
        }
    }

    #[test]
    fn test_bare_host_gets_root_path() {
        assert_eq!(normalize_url("http://example.com").unwrap(), "http://example.com/");
    }

    #[test]
    fn test_custom_port_is_kept() {
        assert_eq!(
            normalize_url("http://example.com:8080/api").unwrap(),
            "http://example.com:8080/api"
        );
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        for input in [
            "ftp://example.com/file.txt",
            "javascript:alert('xss')",
            "data:text/plain,Hello",
            "mailto:test@example.com",
        ] {
            assert!(matches!(
                normalize_url(input),
                Err(UrlNormalizationError::UnsupportedProtocol)
            ));
        }
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(
            normalize_url("example.com"),
            Err(UrlNormalizationError::InvalidFormat(_))
        ));
        assert!(matches!(
            normalize_url(""),
            Err(UrlNormalizationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_error_maps_to_validation() {
        let err: AppError = UrlNormalizationError::UnsupportedProtocol.into();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
