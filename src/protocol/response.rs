//! Fully-read HTTP response.

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};

use super::headers::Headers;
use super::parse::ResponseHead;

// ============================================================================
// Response
// ============================================================================

/// A response whose body has been read completely.
///
/// `history` holds the intermediate redirect responses, oldest first.
#[derive(Debug, Clone)]
pub struct Response {
    /// Numeric status code.
    pub status_code: u16,

    /// Full status line, e.g. `HTTP/1.1 404 Not Found`.
    pub status_line: String,

    /// Response headers.
    pub headers: Headers,

    /// Decoded body (chunked framing removed).
    pub body: Bytes,

    /// URL this response was fetched from.
    pub url: Url,

    /// Redirect responses that led here, oldest first.
    pub history: Vec<Response>,
}

// ============================================================================
// Response - Constructors
// ============================================================================

impl Response {
    /// Assembles a response from a parsed head and its body.
    #[must_use]
    pub fn from_head(head: ResponseHead, body: Bytes, url: Url) -> Self {
        Self {
            status_code: head.status_code,
            status_line: head.status_line,
            headers: head.headers,
            body,
            url,
            history: Vec::new(),
        }
    }
}

// ============================================================================
// Response - Accessors
// ============================================================================

impl Response {
    /// Returns `true` for 2xx status codes.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Returns `true` for redirect status codes that carry a `Location`.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status_code, 301 | 302 | 303 | 307 | 308) && self.headers.contains("Location")
    }

    /// Returns the reason phrase of the status line.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.status_line.splitn(3, ' ').nth(2).unwrap_or_default()
    }

    /// Returns the charset declared in `Content-Type`, if any.
    #[must_use]
    pub fn charset(&self) -> Option<String> {
        let content_type = self.headers.first("Content-Type")?;

        content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
        })
    }

    /// Decodes the body as text.
    ///
    /// ISO-8859-1 is decoded byte-per-char; every other charset is treated
    /// as UTF-8 with invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> String {
        match self.charset().as_deref() {
            Some("iso-8859-1" | "latin1" | "latin-1") => {
                self.body.iter().map(|&b| char::from(b)).collect()
            }
            _ => String::from_utf8_lossy(&self.body).into_owned(),
        }
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if the body is not valid JSON for
    /// `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::invalid_response(format!("Invalid JSON body: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde::Deserialize;

    fn response(content_type: &str, body: &'static [u8]) -> Response {
        let head = ResponseHead {
            status_code: 200,
            status_line: "HTTP/1.1 200 OK".to_string(),
            headers: Headers::from_pairs([("Content-Type", content_type)]),
        };
        let url = Url::parse("http://example.com/").unwrap();
        Response::from_head(head, Bytes::from_static(body), url)
    }

    #[test]
    fn test_text_utf8() {
        let resp = response("text/plain; charset=utf-8", "héllo".as_bytes());
        assert_eq!(resp.text(), "héllo");
    }

    #[test]
    fn test_text_latin1() {
        let resp = response("text/plain; charset=\"ISO-8859-1\"", b"caf\xe9");
        assert_eq!(resp.charset().as_deref(), Some("iso-8859-1"));
        assert_eq!(resp.text(), "café");
    }

    #[test]
    fn test_json() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            ok: bool,
        }

        let resp = response("application/json", br#"{"ok":true}"#);
        assert!(resp.json::<Payload>().unwrap().ok);

        let resp = response("application/json", b"not json");
        assert!(matches!(
            resp.json::<Payload>().unwrap_err(),
            Error::InvalidResponse { .. }
        ));
    }

    #[test]
    fn test_status_helpers() {
        let mut resp = response("text/plain", b"");
        assert!(resp.is_success());
        assert_eq!(resp.reason(), "OK");

        resp.status_code = 302;
        assert!(!resp.is_redirect());
        resp.headers.insert("Location", "/next");
        assert!(resp.is_redirect());
    }
}
