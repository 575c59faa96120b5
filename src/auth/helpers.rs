//! Pure helper functions for authentication
//!
//! This module contains stateless helpers for redirects, destination
//! checks and the provider HTTP client.

use axum::http::{
    header::{CACHE_CONTROL, LOCATION},
    HeaderValue, StatusCode,
};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use url::{Position, Url};

/// Cache directive for every auth response: per-session, never shared
pub const PRIVATE_NO_CACHE: &str = "max-age=0, private";

/// Site root, the fallback for every redirect
pub const SITE_ROOT: &str = "/";

// =============================================================================
// Redirects
// =============================================================================

/// Build a 302 redirect marked non-cacheable and private.
///
/// Non-ASCII characters are percent-encoded. A target holding control
/// characters, or one that still cannot be carried in a `Location` header,
/// falls back to the site root.
pub fn found_redirect(target: &str) -> Response {
    let location = match location_value(target) {
        Some(value) => value,
        None => {
            tracing::warn!(
                target_len = target.len(),
                "Redirect target is not a valid header value, falling back to site root"
            );
            HeaderValue::from_static(SITE_ROOT)
        }
    };

    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(LOCATION, location);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(PRIVATE_NO_CACHE));
    response
}

fn location_value(target: &str) -> Option<HeaderValue> {
    if target.chars().any(char::is_control) {
        return None;
    }
    if let Ok(value) = HeaderValue::from_str(target) {
        return Some(value);
    }

    // Let the URL parser percent-encode path, query and fragment
    let encoded = match Url::parse(target) {
        Ok(url) => url.to_string(),
        Err(_) => {
            let base = Url::parse("http://localhost/").ok()?;
            base.join(target).ok()?[Position::BeforePath..].to_string()
        }
    };
    HeaderValue::from_str(&encoded).ok()
}

/// Check whether a destination points off-site.
///
/// Absolute URLs, protocol-relative paths (`//host`), backslash variants
/// browsers normalize to `//`, and scheme prefixes such as `javascript:` all
/// count as external.
pub fn is_external(destination: &str) -> bool {
    let cleaned: String = destination
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .collect();

    if cleaned.starts_with("//")
        || cleaned.starts_with("/\\")
        || cleaned.starts_with("\\\\")
        || cleaned.starts_with("\\/")
    {
        return true;
    }

    if url::Url::parse(&cleaned).is_ok() {
        return true;
    }

    // A colon before the first path/query/fragment delimiter reads as a scheme
    match cleaned.find(':') {
        Some(colon) => !cleaned[..colon].contains(['/', '?', '#']),
        None => false,
    }
}

// =============================================================================
// HTTP Client Builders
// =============================================================================

/// Create a reqwest client for OAuth2 HTTP requests using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_redirect_headers() {
        let response = found_redirect("/events/12");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/events/12");
        assert_eq!(
            response.headers().get(CACHE_CONTROL).unwrap(),
            PRIVATE_NO_CACHE
        );
    }

    #[test]
    fn test_found_redirect_invalid_target_falls_back_to_root() {
        let response = found_redirect("/bad\nheader");
        assert_eq!(response.headers().get(LOCATION).unwrap(), SITE_ROOT);
    }

    #[test]
    fn test_found_redirect_percent_encodes_non_ascii() {
        let cases = [
            ("/café", "/caf%C3%A9"),
            ("/search?q=crème&page=2", "/search?q=cr%C3%A8me&page=2"),
            ("/events/🎉#lineup", "/events/%F0%9F%8E%89#lineup"),
        ];
        for (target, expected) in cases {
            let response = found_redirect(target);
            assert_eq!(response.headers().get(LOCATION).unwrap(), expected);
        }
    }

    #[test]
    fn test_is_external_relative_paths() {
        assert!(!is_external("/"));
        assert!(!is_external("/events/12"));
        assert!(!is_external("/search?q=a:b"));
        assert!(!is_external("node/5"));
        assert!(!is_external("/path#frag:x"));
    }

    #[test]
    fn test_is_external_absolute_urls() {
        assert!(is_external("https://evil.example.com/"));
        assert!(is_external("http://evil.example.com"));
        assert!(is_external(" HTTPS://evil.example.com"));
        assert!(is_external("javascript:alert(1)"));
        assert!(is_external("mailto:someone@example.com"));
    }

    #[test]
    fn test_is_external_protocol_relative_tricks() {
        assert!(is_external("//evil.example.com"));
        assert!(is_external("/\\evil.example.com"));
        assert!(is_external("\\\\evil.example.com"));
        assert!(is_external("\\/evil.example.com"));
        assert!(is_external("/\t/evil.example.com"));
    }
}
