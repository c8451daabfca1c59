//! Redirect state machine.
//!
//! Written once, sans-IO, and driven by both clients: the client runs one
//! exchange, reports the response, and either gets the final response back
//! or sends the rewritten request.
//!
//! # Rules
//!
//! | Status | Method | Body |
//! |--------|--------|------|
//! | 303 | `GET` | dropped, `Content-*` stripped |
//! | 301, 302 | `GET` unless `HEAD` | dropped unless `HEAD` |
//! | 307, 308 | kept | replayed; a consumed stream is an error |
//!
//! `Authorization` is stripped when the host changes. Visiting a URL twice
//! (fragment ignored) fails with [`Error::RedirectLoop`]; exceeding the
//! budget fails with [`Error::TooManyRedirects`].

// ============================================================================
// Imports
// ============================================================================

use std::mem;

use rustc_hash::FxHashSet;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{AsyncBody, Body, Headers, Response};

// ============================================================================
// Constants
// ============================================================================

/// Default redirect budget.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Status codes that trigger a redirect.
pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

// ============================================================================
// RequestBody
// ============================================================================

/// Body operations the redirect machine needs.
pub trait RequestBody: Sized {
    /// An empty body.
    fn empty() -> Self;

    /// A copy for sending, or `None` if the body can only be sent once.
    fn try_clone(&self) -> Option<Self>;
}

impl RequestBody for Body {
    fn empty() -> Self {
        Self::Empty
    }

    fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Fixed(bytes) => Some(Self::Fixed(bytes.clone())),
            Self::Stream(_) => None,
        }
    }
}

impl RequestBody for AsyncBody {
    fn empty() -> Self {
        Self::Empty
    }

    fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Fixed(bytes) => Some(Self::Fixed(bytes.clone())),
            Self::Stream(_) => None,
        }
    }
}

// ============================================================================
// RedirectState
// ============================================================================

/// Current request plus the redirect bookkeeping.
#[derive(Debug)]
pub struct RedirectState<B> {
    method: String,
    url: Url,
    headers: Headers,
    body: Option<B>,
    body_consumed: bool,
    visited: FxHashSet<String>,
    history: Vec<Response>,
    allow_redirects: bool,
    max_redirects: usize,
}

impl<B: RequestBody> RedirectState<B> {
    /// Starts a redirect chain at `url`.
    #[must_use]
    pub fn new(
        method: String,
        url: Url,
        headers: Headers,
        body: B,
        allow_redirects: bool,
        max_redirects: usize,
    ) -> Self {
        let mut visited = FxHashSet::default();
        visited.insert(visit_key(&url));

        Self {
            method,
            url,
            headers,
            body: Some(body),
            body_consumed: false,
            visited,
            history: Vec::new(),
            allow_redirects,
            max_redirects,
        }
    }

    /// Current method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Current URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current headers.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Redirect responses seen so far, oldest first.
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    /// Returns the body for the next exchange.
    ///
    /// Replayable bodies are copied; a streaming body is handed out once
    /// and marked consumed.
    pub fn take_body(&mut self) -> B {
        if let Some(copy) = self.body.as_ref().and_then(B::try_clone) {
            return copy;
        }

        match self.body.take() {
            Some(body) => {
                self.body_consumed = true;
                body
            }
            None => B::empty(),
        }
    }

    /// Reports the response of the last exchange.
    ///
    /// Returns `Some(final_response)` (with history attached) when the
    /// chain ends, or `None` when the state now holds the next request.
    ///
    /// # Errors
    ///
    /// - [`Error::RedirectLoop`] if `Location` was already visited
    /// - [`Error::TooManyRedirects`] if the budget is exhausted
    /// - [`Error::InvalidRequest`] if a 307/308 would replay a consumed stream
    /// - [`Error::Url`] if `Location` cannot be resolved
    pub fn on_response(&mut self, mut response: Response) -> Result<Option<Response>> {
        let status = response.status_code;

        let location = match response.headers.first("Location") {
            Some(location) if self.allow_redirects && REDIRECT_STATUSES.contains(&status) => {
                location.trim().to_string()
            }
            _ => {
                response.history = mem::take(&mut self.history);
                return Ok(Some(response));
            }
        };

        let next = self.url.join(&location)?;
        if !self.visited.insert(visit_key(&next)) {
            return Err(Error::redirect_loop(next.as_str()));
        }

        if self.history.len() >= self.max_redirects {
            return Err(Error::too_many_redirects(self.max_redirects));
        }

        self.rewrite(status)?;

        if next.host_str() != self.url.host_str() {
            self.headers.remove("Authorization");
        }

        debug!(status, from = %self.url, to = %next, "Following redirect");

        self.history.push(response);
        self.url = next;
        Ok(None)
    }

    fn rewrite(&mut self, status: u16) -> Result<()> {
        let to_get = match status {
            303 => true,
            301 | 302 => !self.method.eq_ignore_ascii_case("HEAD"),
            _ => false,
        };

        if to_get {
            self.method = "GET".to_string();
            self.body = Some(B::empty());
            self.body_consumed = false;
            self.headers
                .retain(|name| !name.to_ascii_lowercase().starts_with("content-"));
            return Ok(());
        }

        if self.body_consumed {
            return Err(Error::invalid_request(format!(
                "Cannot replay a streaming body for a {status} redirect"
            )));
        }

        Ok(())
    }
}

/// URL identity for loop detection (fragment ignored).
fn visit_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    use crate::protocol::ResponseHead;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn redirect(status: u16, location: &str, from: &str) -> Response {
        let head = ResponseHead {
            status_code: status,
            status_line: format!("HTTP/1.1 {status} Redirect"),
            headers: Headers::from_pairs([("Location", location)]),
        };
        Response::from_head(head, Bytes::new(), url(from))
    }

    fn ok(from: &str) -> Response {
        let head = ResponseHead {
            status_code: 200,
            status_line: "HTTP/1.1 200 OK".to_string(),
            headers: Headers::new(),
        };
        Response::from_head(head, Bytes::from_static(b"done"), url(from))
    }

    fn state(method: &str, start: &str, body: Body) -> RedirectState<Body> {
        let headers = Headers::from_pairs([
            ("Content-Type", "text/plain"),
            ("Authorization", "Bearer secret"),
        ]);
        RedirectState::new(method.to_string(), url(start), headers, body, true, DEFAULT_MAX_REDIRECTS)
    }

    #[test]
    fn test_non_redirect_returns_final() {
        let mut state = state("GET", "http://a.test/", Body::Empty);
        let response = state.on_response(ok("http://a.test/")).unwrap().unwrap();
        assert!(response.history.is_empty());
    }

    #[test]
    fn test_redirect_without_location_is_final() {
        let mut state = state("GET", "http://a.test/", Body::Empty);
        let mut response = ok("http://a.test/");
        response.status_code = 302;
        assert!(state.on_response(response).unwrap().is_some());
    }

    #[test]
    fn test_disabled_redirects_return_redirect_response() {
        let mut state: RedirectState<Body> = RedirectState::new(
            "GET".into(),
            url("http://a.test/"),
            Headers::new(),
            Body::Empty,
            false,
            DEFAULT_MAX_REDIRECTS,
        );
        let response = state.on_response(redirect(302, "/b", "http://a.test/")).unwrap().unwrap();
        assert_eq!(response.status_code, 302);
    }

    #[test]
    fn test_history_accumulates_oldest_first() {
        let mut state = state("GET", "http://a.test/1", Body::Empty);
        assert!(state.on_response(redirect(301, "/2", "http://a.test/1")).unwrap().is_none());
        assert!(state.on_response(redirect(302, "/3", "http://a.test/2")).unwrap().is_none());
        assert_eq!(state.url().as_str(), "http://a.test/3");

        let response = state.on_response(ok("http://a.test/3")).unwrap().unwrap();
        let urls: Vec<_> = response.history.iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(urls, ["/1", "/2"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut state = state("GET", "http://a.test/a", Body::Empty);
        assert!(state.on_response(redirect(302, "/b", "http://a.test/a")).unwrap().is_none());

        let err = state.on_response(redirect(302, "/a", "http://a.test/b")).unwrap_err();
        assert!(matches!(err, Error::RedirectLoop { ref url } if url == "http://a.test/a"));
    }

    #[test]
    fn test_fragment_ignored_for_cycle() {
        let mut state = state("GET", "http://a.test/a", Body::Empty);
        let err = state.on_response(redirect(302, "/a#top", "http://a.test/a")).unwrap_err();
        assert!(matches!(err, Error::RedirectLoop { .. }));
    }

    #[test]
    fn test_too_many_redirects() {
        let mut state: RedirectState<Body> = RedirectState::new(
            "GET".into(),
            url("http://a.test/0"),
            Headers::new(),
            Body::Empty,
            true,
            2,
        );

        assert!(state.on_response(redirect(302, "/1", "http://a.test/0")).unwrap().is_none());
        assert!(state.on_response(redirect(302, "/2", "http://a.test/1")).unwrap().is_none());
        let err = state.on_response(redirect(302, "/3", "http://a.test/2")).unwrap_err();
        assert!(matches!(err, Error::TooManyRedirects { max_redirects: 2 }));
    }

    #[test]
    fn test_303_post_becomes_get() {
        let mut state = state("POST", "http://a.test/form", Body::from("a=1"));
        state.on_response(redirect(303, "/done", "http://a.test/form")).unwrap();

        assert_eq!(state.method(), "GET");
        assert!(state.take_body().is_empty());
        assert!(!state.headers().contains("Content-Type"));
        assert!(state.headers().contains("Authorization"));
    }

    #[test]
    fn test_302_keeps_head() {
        let mut state = state("HEAD", "http://a.test/x", Body::Empty);
        state.on_response(redirect(302, "/y", "http://a.test/x")).unwrap();
        assert_eq!(state.method(), "HEAD");
    }

    #[test]
    fn test_307_preserves_method_and_body() {
        let mut state = state("POST", "http://a.test/x", Body::from("payload"));
        let _ = state.take_body();
        state.on_response(redirect(307, "/y", "http://a.test/x")).unwrap();

        assert_eq!(state.method(), "POST");
        assert!(matches!(state.take_body(), Body::Fixed(ref b) if &b[..] == b"payload"));
        assert!(state.headers().contains("Content-Type"));
    }

    #[test]
    fn test_308_with_consumed_stream_fails() {
        let body = Body::stream(vec![Ok(Bytes::from_static(b"chunk"))]);
        let mut state = state("PUT", "http://a.test/x", body);
        assert!(state.take_body().is_stream());

        let err = state.on_response(redirect(308, "/y", "http://a.test/x")).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[test]
    fn test_cross_host_strips_authorization() {
        let mut state = state("GET", "http://a.test/x", Body::Empty);
        state.on_response(redirect(302, "http://b.test/y", "http://a.test/x")).unwrap();

        assert_eq!(state.url().host_str(), Some("b.test"));
        assert!(!state.headers().contains("Authorization"));
    }
}
