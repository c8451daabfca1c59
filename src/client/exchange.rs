//! Pieces of a single exchange shared by the blocking and async clients.

use crate::error::Result;
use crate::protocol::{
    BodyDecoder, Headers, Limits, ResponseHead, Target, build_request, build_request_headers,
    requests_close,
};
use crate::transport::Timeout;

use super::builder::ClientConfig;
use super::request::Request;

// ============================================================================
// Settings
// ============================================================================

/// Client configuration with the request overrides applied.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub timeout: Timeout,
    pub limits: Limits,
    pub allow_redirects: bool,
    pub max_redirects: usize,
}

impl Settings {
    pub(crate) fn resolve<B>(config: &ClientConfig, request: &Request<B>) -> Self {
        Self {
            timeout: request.timeout.unwrap_or(config.timeout),
            limits: request.limits.unwrap_or(config.limits),
            allow_redirects: request.allow_redirects.unwrap_or(config.allow_redirects),
            max_redirects: request.max_redirects.unwrap_or(config.max_redirects),
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Serializes the request. `None` means a streaming body follows with
/// chunked transfer encoding.
pub(crate) fn encode_request(
    method: &str,
    target: &Target,
    headers: &Headers,
    body: Option<&[u8]>,
) -> Result<Vec<u8>> {
    match body {
        Some(body) => build_request(method, &target.path, &target.host_header, headers, body),
        None => build_request_headers(method, &target.path, &target.host_header, headers, true),
    }
}

// ============================================================================
// Reuse
// ============================================================================

/// Decides whether the connection may go back to the pool after a
/// complete exchange.
///
/// Both sides must keep the connection alive and the body must have had a
/// known end. HTTP/1.0 responses need an explicit `keep-alive`.
pub(crate) fn connection_reusable(
    request_headers: &Headers,
    head: &ResponseHead,
    decoder: &BodyDecoder,
) -> bool {
    if !decoder.allows_reuse() || requests_close(request_headers) {
        return false;
    }

    if head.headers.has_token("Connection", "close") {
        return false;
    }

    !head.status_line.starts_with("HTTP/1.0") || head.headers.has_token("Connection", "keep-alive")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::protocol::BodyKind;

    fn head(status_line: &str, headers: &[(&str, &str)]) -> ResponseHead {
        ResponseHead {
            status_code: 200,
            status_line: status_line.to_string(),
            headers: Headers::from_pairs(headers.iter().copied()),
        }
    }

    fn keep_alive() -> Headers {
        Headers::from_pairs([("Connection", "keep-alive")])
    }

    #[test]
    fn test_settings_prefer_request_overrides() {
        let config = ClientConfig::default();
        let request = Request::<crate::protocol::Body>::get("http://example.com/")
            .unwrap()
            .timeout(Duration::from_secs(1))
            .max_redirects(1);

        let settings = Settings::resolve(&config, &request);
        assert_eq!(settings.timeout.read, Some(Duration::from_secs(1)));
        assert_eq!(settings.max_redirects, 1);
        assert!(settings.allow_redirects);
    }

    #[test]
    fn test_reuse_requires_keep_alive_request() {
        let decoder = BodyDecoder::new(BodyKind::Length(0), &Limits::default());
        let ok = head("HTTP/1.1 200 OK", &[]);

        assert!(connection_reusable(&keep_alive(), &ok, &decoder));
        assert!(!connection_reusable(&Headers::new(), &ok, &decoder));
    }

    #[test]
    fn test_reuse_rejected_by_response() {
        let decoder = BodyDecoder::new(BodyKind::Length(0), &Limits::default());

        let close = head("HTTP/1.1 200 OK", &[("Connection", "close")]);
        assert!(!connection_reusable(&keep_alive(), &close, &decoder));

        let old = head("HTTP/1.0 200 OK", &[]);
        assert!(!connection_reusable(&keep_alive(), &old, &decoder));

        let old_keep = head("HTTP/1.0 200 OK", &[("Connection", "keep-alive")]);
        assert!(connection_reusable(&keep_alive(), &old_keep, &decoder));
    }

    #[test]
    fn test_read_to_close_body_not_reusable() {
        let decoder = BodyDecoder::new(BodyKind::Close, &Limits::default());
        let ok = head("HTTP/1.1 200 OK", &[]);
        assert!(!connection_reusable(&keep_alive(), &ok, &decoder));
    }
}
