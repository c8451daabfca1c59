//! HTTP/1.1 request serialization.
//!
//! Builds the raw request bytes sent on the wire. Caller headers override
//! the defaults (`Host`, `Connection: close`, `User-Agent`) by
//! case-insensitive name.
//!
//! Header names and values containing CR, LF or NUL are rejected before any
//! bytes are produced, which closes the header-injection hole.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::headers::Headers;

// ============================================================================
// Constants
// ============================================================================

/// User-Agent sent unless the caller overrides it.
pub const USER_AGENT: &str = concat!("reqwire/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Builders
// ============================================================================

/// Serializes a complete request with an in-memory body.
///
/// `Content-Length` is set whenever `body` is non-empty.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if the method, path or any header
/// contains a forbidden character.
pub fn build_request(
    method: &str,
    path: &str,
    host: &str,
    headers: &Headers,
    body: &[u8],
) -> Result<Vec<u8>> {
    let mut merged = merge_defaults(host, headers);
    if !body.is_empty() {
        merged.insert("Content-Length", body.len().to_string());
    }

    let mut out = Vec::with_capacity(256 + body.len());
    write_preamble(&mut out, method, path, &merged)?;
    out.extend_from_slice(body);

    Ok(out)
}

/// Serializes the request line and headers only.
///
/// Used when the body is a streaming source written separately. With
/// `chunked` the preamble announces `Transfer-Encoding: chunked`.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if the method, path or any header
/// contains a forbidden character.
pub fn build_request_headers(
    method: &str,
    path: &str,
    host: &str,
    headers: &Headers,
    chunked: bool,
) -> Result<Vec<u8>> {
    let mut merged = merge_defaults(host, headers);
    if chunked {
        merged.remove("Content-Length");
        merged.insert("Transfer-Encoding", "chunked");
    }

    let mut out = Vec::with_capacity(256);
    write_preamble(&mut out, method, path, &merged)?;

    Ok(out)
}

/// Returns `true` if these request headers ask the server to close the
/// connection after responding (the default when no `Connection` header is
/// given).
#[must_use]
pub fn requests_close(headers: &Headers) -> bool {
    !headers.contains("Connection") || headers.has_token("Connection", "close")
}

// ============================================================================
// Internals
// ============================================================================

fn merge_defaults(host: &str, headers: &Headers) -> Headers {
    let mut merged = Headers::from_pairs([
        ("Host", host),
        ("Connection", "close"),
        ("User-Agent", USER_AGENT),
    ]);
    merged.extend_replace(headers);
    merged
}

fn write_preamble(out: &mut Vec<u8>, method: &str, path: &str, headers: &Headers) -> Result<()> {
    validate_request_line(method, path)?;

    out.extend_from_slice(method.as_bytes());
    out.push(b' ');
    out.extend_from_slice(path.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");

    for (name, value) in headers.iter() {
        validate_header(name, value)?;
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b"\r\n");
    Ok(())
}

fn validate_request_line(method: &str, path: &str) -> Result<()> {
    if method.is_empty() || !method.bytes().all(is_token_char) {
        return Err(Error::invalid_request(format!("Invalid method: {method:?}")));
    }

    if path.is_empty() || path.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0' | b' ')) {
        return Err(Error::invalid_request(format!("Invalid request path: {path:?}")));
    }

    Ok(())
}

/// Returns `true` for an RFC 9110 `tchar`.
fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Rejects header names or values that could inject extra lines.
pub(crate) fn validate_header(name: &str, value: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_request("Empty header name"));
    }

    let forbidden = |s: &str| s.bytes().any(|b| b == b'\r' || b == b'\n');
    if forbidden(name) || forbidden(value) {
        return Err(Error::invalid_request(format!(
            "Invalid character in header {name:?}: {value:?}"
        )));
    }

    if name.contains('\0') || value.contains('\0') {
        return Err(Error::invalid_request(format!(
            "Null byte in header {name:?}: {value:?}"
        )));
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::protocol::Limits;
    use crate::protocol::parse::parse_request;

    fn text(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).expect("ascii request")
    }

    #[test]
    fn test_build_request_defaults() {
        let raw = build_request("GET", "/", "example.com", &Headers::new(), b"").unwrap();
        let raw = text(&raw);

        assert!(raw.starts_with("GET / HTTP/1.1\r\n"));
        assert!(raw.contains("Host: example.com\r\n"));
        assert!(raw.contains("Connection: close\r\n"));
        assert!(raw.contains(&format!("User-Agent: {USER_AGENT}\r\n")));
        assert!(!raw.contains("Content-Length"));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_build_request_caller_overrides_defaults() {
        let headers = Headers::from_pairs([("connection", "keep-alive"), ("user-agent", "custom-agent")]);
        let raw = text(&build_request("GET", "/", "example.com", &headers, b"").unwrap());

        assert!(raw.contains("Connection: keep-alive\r\n"));
        assert!(raw.contains("User-Agent: custom-agent\r\n"));
        assert!(!raw.contains("close"));
        assert_eq!(raw.matches("User-Agent").count(), 1);
    }

    #[test]
    fn test_build_request_with_body() {
        let raw = build_request("POST", "/submit", "example.com", &Headers::new(), b"a=1").unwrap();
        let raw = text(&raw);

        assert!(raw.contains("Content-Length: 3\r\n"));
        assert!(raw.ends_with("\r\n\r\na=1"));
    }

    #[test]
    fn test_build_request_headers_chunked() {
        let headers = Headers::from_pairs([("Content-Type", "text/plain")]);
        let raw = text(&build_request_headers("PUT", "/data", "example.com", &headers, true).unwrap());

        assert!(raw.starts_with("PUT /data HTTP/1.1\r\n"));
        assert!(raw.contains("Content-Type: text/plain\r\n"));
        assert!(raw.contains("Transfer-Encoding: chunked\r\n"));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_build_request_headers_not_chunked() {
        let raw = build_request_headers("POST", "/upload", "example.com", &Headers::new(), false).unwrap();
        assert!(!text(&raw).contains("Transfer-Encoding"));
    }

    #[test]
    fn test_header_injection_rejected_in_name() {
        let headers = Headers::from_pairs([("Bad\r\nHeader", "value")]);
        let err = build_request_headers("POST", "/", "example.com", &headers, false).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
        assert!(err.to_string().contains("Invalid character"));
    }

    #[test]
    fn test_null_byte_rejected() {
        let headers = Headers::from_pairs([("X-Token", "abc\0def")]);
        let err = build_request("GET", "/", "example.com", &headers, b"").unwrap_err();
        assert!(err.to_string().contains("Null byte"));
    }

    #[test]
    fn test_request_line_injection_rejected() {
        let err = build_request("GET", "/ HTTP/1.1\r\nX: y", "h", &Headers::new(), b"").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[test]
    fn test_token_methods_accepted() {
        let raw = text(&build_request("M-SEARCH", "*", "239.255.255.250", &Headers::new(), b"").unwrap());
        assert!(raw.starts_with("M-SEARCH * HTTP/1.1\r\n"));

        for method in ["GET POST", "GE\tT", "GET(", ""] {
            let err = build_request(method, "/", "h", &Headers::new(), b"").unwrap_err();
            assert!(err.to_string().contains("Invalid method"), "{method:?}");
        }
    }

    #[test]
    fn test_requests_close() {
        assert!(requests_close(&Headers::new()));
        assert!(requests_close(&Headers::from_pairs([("Connection", "close")])));
        assert!(!requests_close(&Headers::from_pairs([("Connection", "keep-alive")])));
    }

    proptest! {
        #[test]
        fn prop_header_injection_always_rejected(
            prefix in "[a-zA-Z0-9 ]{0,10}",
            bad in prop::sample::select(vec!['\r', '\n', '\0']),
            suffix in "[a-zA-Z0-9 ]{0,10}",
        ) {
            let value = format!("{prefix}{bad}{suffix}");
            let headers = Headers::from_pairs([("X-Test", value.as_str())]);
            prop_assert!(build_request("GET", "/", "example.com", &headers, b"").is_err());
            prop_assert!(build_request_headers("GET", "/", "example.com", &headers, true).is_err());
        }

        #[test]
        fn prop_build_then_parse_round_trips(
            method in prop::sample::select(vec!["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD"]),
            path in "/[a-z0-9/._-]{0,24}",
            fields in prop::collection::btree_map("[a-z]{1,8}", "[!-~]([ -~]{0,16}[!-~])?", 0..8),
        ) {
            let headers: Headers = fields
                .iter()
                .map(|(name, value)| (format!("x-{name}"), value.clone()))
                .collect();

            let raw = build_request(method, &path, "example.com", &headers, b"").unwrap();
            let (head, rest) = parse_request(&raw, &Limits::default()).unwrap();

            prop_assert_eq!(head.method.as_str(), method);
            prop_assert_eq!(head.path.as_str(), path.as_str());
            prop_assert!(rest.is_empty());
            for (name, value) in headers.iter() {
                prop_assert_eq!(head.headers.first(name), Some(value));
            }
        }
    }
}
