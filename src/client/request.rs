//! Request value passed into the client core.
//!
//! A [`Request`] carries everything one logical request needs: method, URL,
//! headers, body and per-request overrides of the client configuration. The
//! caller merges session-level headers (`Authorization`, `Cookie`) before
//! building it.
//!
//! # Example
//!
//! ```ignore
//! let request = Request::post("https://example.com/upload")?
//!     .header("Content-Type", "application/json")
//!     .body(r#"{"ok":true}"#)
//!     .timeout(Duration::from_secs(10))
//!     .observer(|resp| println!("{} {}", resp.status_code, resp.url));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{AsyncBody, Body, Headers, Limits, Response};
use crate::transport::Timeout;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked for every parsed response, redirects included.
///
/// Session layers use it to update cookie jars.
pub type ResponseObserver = Arc<dyn Fn(&Response) + Send + Sync>;

/// Request with an async body.
pub type AsyncRequest = Request<AsyncBody>;

// ============================================================================
// Request
// ============================================================================

/// One logical request, possibly spanning several redirects.
///
/// `None` overrides fall back to the client configuration.
pub struct Request<B = Body> {
    /// Upper-case request method.
    pub method: String,

    /// Absolute request URL.
    pub url: Url,

    /// Caller headers (override the defaults by name).
    pub headers: Headers,

    /// Request body.
    pub body: B,

    /// Timeout override.
    pub timeout: Option<Timeout>,

    /// Parser limits override.
    pub limits: Option<Limits>,

    /// Redirect following override.
    pub allow_redirects: Option<bool>,

    /// Redirect budget override.
    pub max_redirects: Option<usize>,

    /// Response observer.
    pub observer: Option<ResponseObserver>,
}

impl<B: fmt::Debug> fmt::Debug for Request<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("allow_redirects", &self.allow_redirects)
            .field("max_redirects", &self.max_redirects)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Request - Constructors
// ============================================================================

impl<B: Default> Request<B> {
    /// Creates a request from a method and URL string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn new(method: &str, url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::invalid_request(format!("Invalid URL {url:?}: {e}")))?;
        Ok(Self::from_url(method, parsed))
    }

    /// Creates a request from an already-parsed URL.
    #[must_use]
    pub fn from_url(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: Headers::new(),
            body: B::default(),
            timeout: None,
            limits: None,
            allow_redirects: None,
            max_redirects: None,
            observer: None,
        }
    }

    /// Creates a `GET` request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn get(url: &str) -> Result<Self> {
        Self::new("GET", url)
    }

    /// Creates a `POST` request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn post(url: &str) -> Result<Self> {
        Self::new("POST", url)
    }

    /// Creates a `PUT` request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn put(url: &str) -> Result<Self> {
        Self::new("PUT", url)
    }

    /// Creates a `PATCH` request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn patch(url: &str) -> Result<Self> {
        Self::new("PATCH", url)
    }

    /// Creates a `DELETE` request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn delete(url: &str) -> Result<Self> {
        Self::new("DELETE", url)
    }

    /// Creates a `HEAD` request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn head(url: &str) -> Result<Self> {
        Self::new("HEAD", url)
    }

    /// Creates an `OPTIONS` request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URL does not parse.
    pub fn options(url: &str) -> Result<Self> {
        Self::new("OPTIONS", url)
    }
}

// ============================================================================
// Request - Builder Methods
// ============================================================================

impl<B> Request<B> {
    /// Appends a header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces all headers.
    #[inline]
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[inline]
    #[must_use]
    pub fn body(mut self, body: impl Into<B>) -> Self {
        self.body = body.into();
        self
    }

    /// Overrides the client timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Overrides the client parser limits.
    #[inline]
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Enables or disables redirect following.
    #[inline]
    #[must_use]
    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = Some(allow);
        self
    }

    /// Sets the redirect budget.
    #[inline]
    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// Sets the response observer.
    #[inline]
    #[must_use]
    pub fn observer(mut self, observer: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_method_is_uppercased() {
        let request: Request = Request::new("post", "http://example.com/").unwrap();
        assert_eq!(request.method, "POST");
    }

    #[test]
    fn test_invalid_url() {
        let err = Request::<Body>::get("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[test]
    fn test_builder_methods() {
        let request = Request::<Body>::put("https://example.com/x")
            .unwrap()
            .header("X-A", "1")
            .body("payload")
            .timeout(Duration::from_secs(3))
            .allow_redirects(false)
            .max_redirects(2)
            .observer(|_| {});

        assert_eq!(request.headers.first("x-a"), Some("1"));
        assert!(!request.body.is_empty());
        assert_eq!(request.timeout, Some(Timeout::from(Duration::from_secs(3))));
        assert_eq!(request.allow_redirects, Some(false));
        assert_eq!(request.max_redirects, Some(2));
        assert!(request.observer.is_some());
    }

    #[test]
    fn test_async_request_body() {
        let request = AsyncRequest::post("http://example.com/").unwrap().body(vec![1u8, 2, 3]);
        assert!(matches!(request.body, AsyncBody::Fixed(ref b) if b.len() == 3));
    }
}
