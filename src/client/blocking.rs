//! Blocking HTTP client.
//!
//! [`Client`] drives one logical request at a time per call: it checks out a
//! pooled connection, writes the request, reads the response and follows
//! redirects. Clones share the same pool.
//!
//! # Example
//!
//! ```no_run
//! use reqwire::{Client, Request};
//!
//! # fn example() -> reqwire::Result<()> {
//! let client = Client::new();
//!
//! let response = client.get("http://example.com/")?;
//! println!("{} {}", response.status_code, response.text());
//!
//! let request = Request::post("http://example.com/items")?
//!     .header("Content-Type", "application/json")
//!     .body(r#"{"name":"widget"}"#);
//! let created = client.send(request)?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};
use url::Url;

use crate::error::Result;
use crate::protocol::{
    Body, BodyDecoder, BodyKind, ChunkIter, Headers, Limits, Response, ResponseHead, Target,
    write_chunked,
};
use crate::transport::{Connection, ConnectionPool};

use super::builder::{ClientBuilder, ClientConfig};
use super::exchange::{Settings, connection_reusable, encode_request};
use super::redirect::RedirectState;
use super::request::Request;

// ============================================================================
// Client
// ============================================================================

/// Blocking HTTP/1.1 client backed by a [`ConnectionPool`].
#[derive(Clone)]
pub struct Client {
    pool: Arc<ConnectionPool>,
    config: ClientConfig,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Client - Constructors
// ============================================================================

impl Client {
    /// Creates a client with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Returns a builder for a configured client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client with its own pool.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let pool = Arc::new(ConnectionPool::new(config.pool));
        Self { pool, config }
    }

    /// Creates a client on an existing pool.
    #[must_use]
    pub fn with_pool(pool: Arc<ConnectionPool>, config: ClientConfig) -> Self {
        Self { pool, config }
    }

    /// Returns the client configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the connection pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Closes every idle connection.
    pub fn close(&self) {
        self.pool.close_all();
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Sends a `GET` request.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn get(&self, url: &str) -> Result<Response> {
        self.send(Request::get(url)?)
    }

    /// Sends a request and follows redirects.
    ///
    /// The returned response carries the redirect responses in `history`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`](crate::Error::InvalidRequest) for a bad
    ///   URL, method or header
    /// - network, TLS and timeout errors from the transport
    /// - [`Error::Protocol`](crate::Error::Protocol) and
    ///   [`Error::InvalidResponse`](crate::Error::InvalidResponse) for
    ///   malformed responses
    /// - redirect errors from the redirect engine
    pub fn send(&self, request: Request) -> Result<Response> {
        let settings = Settings::resolve(&self.config, &request);
        let Request {
            method,
            url,
            headers,
            body,
            observer,
            ..
        } = request;

        let mut state = RedirectState::new(
            method,
            url,
            headers,
            body,
            settings.allow_redirects,
            settings.max_redirects,
        );

        loop {
            let body = state.take_body();
            let response =
                self.exchange(state.method(), state.url(), state.headers(), body, &settings)?;

            if let Some(observer) = &observer {
                observer(&response);
            }

            if let Some(response) = state.on_response(response)? {
                return Ok(response);
            }
        }
    }

    /// Performs one request/response exchange on a pooled connection.
    fn exchange(
        &self,
        method: &str,
        url: &Url,
        headers: &Headers,
        body: Body,
        settings: &Settings,
    ) -> Result<Response> {
        let target = Target::http(url)?;

        let (preamble, chunks) = match body {
            Body::Empty => (encode_request(method, &target, headers, Some(b"".as_slice()))?, None),
            Body::Fixed(bytes) => (encode_request(method, &target, headers, Some(&bytes[..]))?, None),
            Body::Stream(chunks) => (encode_request(method, &target, headers, None)?, Some(chunks)),
        };

        trace!(method, url = %url, "Sending request");

        let mut conn =
            self.pool
                .get(&target.host, target.port, target.use_tls, settings.timeout)?;

        match round_trip(&mut conn, method, &preamble, chunks, headers, &settings.limits) {
            Ok((head, body, reusable)) => {
                debug!(method, url = %url, status = head.status_code, reusable, "Response received");
                if reusable {
                    conn.put();
                } else {
                    conn.discard();
                }
                Ok(Response::from_head(head, body, url.clone()))
            }
            Err(e) => {
                debug!(method, url = %url, error = %e, "Exchange failed");
                conn.discard();
                Err(e)
            }
        }
    }
}

/// Writes the request and reads the final response on `conn`.
fn round_trip(
    conn: &mut Connection,
    method: &str,
    preamble: &[u8],
    chunks: Option<ChunkIter>,
    request_headers: &Headers,
    limits: &Limits,
) -> Result<(ResponseHead, Bytes, bool)> {
    conn.send_all(preamble)?;
    if let Some(chunks) = chunks {
        write_chunked(conn, chunks)?;
    }

    let head = loop {
        let head = conn.read_response_head(limits)?;
        if !head.is_interim() {
            break head;
        }
        trace!(status = head.status_code, "Skipping interim response");
    };

    let mut decoder = BodyDecoder::new(BodyKind::for_response(method, &head)?, limits);
    conn.read_body(&mut decoder)?;

    let reusable = connection_reusable(request_headers, &head, &decoder);
    Ok((head, decoder.into_body(), reusable))
}

// ============================================================================
// Tests
// ============================================================================
