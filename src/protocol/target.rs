//! Connection target derived from a URL.

// ============================================================================
// Imports
// ============================================================================

use url::{Host, Url};

use crate::error::{Error, Result};

// ============================================================================
// Target
// ============================================================================

/// Where a request goes and what goes on its request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host to connect to (IPv6 without brackets).
    pub host: String,

    /// Port to connect to.
    pub port: u16,

    /// Whether the connection is TLS.
    pub use_tls: bool,

    /// Path plus query, as sent on the request line.
    pub path: String,

    /// Value of the `Host` header; includes the port only when it is not
    /// the scheme default.
    pub host_header: String,
}

impl Target {
    /// Resolves an `http://` or `https://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for any other scheme or a URL
    /// without a host.
    pub fn http(url: &Url) -> Result<Self> {
        match url.scheme() {
            "http" => Self::resolve(url, false),
            "https" => Self::resolve(url, true),
            scheme => Err(Error::invalid_request(format!(
                "Unsupported URL scheme: {scheme}"
            ))),
        }
    }

    /// Resolves a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for any other scheme or a URL
    /// without a host.
    pub fn websocket(url: &Url) -> Result<Self> {
        match url.scheme() {
            "ws" => Self::resolve(url, false),
            "wss" => Self::resolve(url, true),
            scheme => Err(Error::invalid_request(format!(
                "WebSocket URL must use ws:// or wss://, got {scheme}://"
            ))),
        }
    }

    fn resolve(url: &Url, use_tls: bool) -> Result<Self> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::invalid_request(format!("URL has no host: {url}"))),
        };

        let default_port = if use_tls { 443 } else { 80 };
        let port = url.port().unwrap_or(default_port);

        // `host_str` keeps the brackets around IPv6 literals.
        let host_name = url.host_str().unwrap_or(&host);
        let host_header = if port == default_port {
            host_name.to_string()
        } else {
            format!("{host_name}:{port}")
        };

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            host,
            port,
            use_tls,
            path,
            host_header,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str) -> Target {
        Target::http(&Url::parse(url).unwrap()).unwrap()
    }

    #[test]
    fn test_http_defaults() {
        let t = target("http://example.com");
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, 80);
        assert!(!t.use_tls);
        assert_eq!(t.path, "/");
        assert_eq!(t.host_header, "example.com");
    }

    #[test]
    fn test_https_with_port_and_query() {
        let t = target("https://example.com:8443/a/b?x=1&y=2#frag");
        assert_eq!(t.port, 8443);
        assert!(t.use_tls);
        assert_eq!(t.path, "/a/b?x=1&y=2");
        assert_eq!(t.host_header, "example.com:8443");
    }

    #[test]
    fn test_ipv6_host() {
        let t = target("http://[::1]:8080/");
        assert_eq!(t.host, "::1");
        assert_eq!(t.host_header, "[::1]:8080");
    }

    #[test]
    fn test_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/").unwrap();
        assert!(matches!(Target::http(&url), Err(Error::InvalidRequest { .. })));
    }

    #[test]
    fn test_websocket_schemes() {
        let t = Target::websocket(&Url::parse("wss://echo.example.com/chat").unwrap()).unwrap();
        assert!(t.use_tls);
        assert_eq!(t.port, 443);
        assert_eq!(t.path, "/chat");

        let err = Target::websocket(&Url::parse("http://example.com/").unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }
}
