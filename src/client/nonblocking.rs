//! Async HTTP client.
//!
//! Same pipeline as the blocking [`Client`](super::Client), driven by tokio.
//! Dropping a request future at any await point discards its connection
//! and frees the pool permit.
//!
//! # Example
//!
//! ```no_run
//! use reqwire::{AsyncClient, AsyncRequest};
//!
//! # async fn example() -> reqwire::Result<()> {
//! let client = AsyncClient::new();
//! let response = client.get("http://example.com/").await?;
//!
//! let request = AsyncRequest::delete("http://example.com/items/7")?;
//! client.send(request).await?;
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
    AsyncBody, BodyDecoder, BodyKind, ChunkStream, Headers, Limits, Response, ResponseHead,
    Target, write_chunked_async,
};
use crate::transport::{AsyncConnection, AsyncConnectionPool};

use super::builder::{ClientBuilder, ClientConfig};
use super::exchange::{Settings, connection_reusable, encode_request};
use super::redirect::RedirectState;
use super::request::AsyncRequest;

// ============================================================================
// AsyncClient
// ============================================================================

/// Async HTTP/1.1 client backed by an [`AsyncConnectionPool`].
#[derive(Clone)]
pub struct AsyncClient {
    pool: Arc<AsyncConnectionPool>,
    config: ClientConfig,
}

impl fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for AsyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncClient {
    /// Creates a client with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Returns a builder; finish with [`ClientBuilder::build_async`].
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client with its own pool.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let pool = Arc::new(AsyncConnectionPool::new(config.pool));
        Self { pool, config }
    }

    /// Creates a client on an existing pool.
    #[must_use]
    pub fn with_pool(pool: Arc<AsyncConnectionPool>, config: ClientConfig) -> Self {
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
    pub fn pool(&self) -> &Arc<AsyncConnectionPool> {
        &self.pool
    }

    /// Closes every idle connection.
    pub fn close(&self) {
        self.pool.close_all();
    }

    /// Sends a `GET` request.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(AsyncRequest::get(url)?).await
    }

    /// Sends a request and follows redirects.
    ///
    /// # Errors
    ///
    /// Same as the blocking [`Client::send`](super::Client::send).
    pub async fn send(&self, request: AsyncRequest) -> Result<Response> {
        let settings = Settings::resolve(&self.config, &request);
        let AsyncRequest {
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
            let response = self
                .exchange(state.method(), state.url(), state.headers(), body, &settings)
                .await?;

            if let Some(observer) = &observer {
                observer(&response);
            }

            if let Some(response) = state.on_response(response)? {
                return Ok(response);
            }
        }
    }

    async fn exchange(
        &self,
        method: &str,
        url: &Url,
        headers: &Headers,
        body: AsyncBody,
        settings: &Settings,
    ) -> Result<Response> {
        let target = Target::http(url)?;

        let (preamble, chunks) = match body {
            AsyncBody::Empty => (encode_request(method, &target, headers, Some(b"".as_slice()))?, None),
            AsyncBody::Fixed(bytes) => {
                (encode_request(method, &target, headers, Some(&bytes[..]))?, None)
            }
            AsyncBody::Stream(chunks) => {
                (encode_request(method, &target, headers, None)?, Some(chunks))
            }
        };

        trace!(method, url = %url, "Sending request");

        let mut conn = self
            .pool
            .get(&target.host, target.port, target.use_tls, settings.timeout)
            .await?;

        match round_trip(&mut conn, method, &preamble, chunks, headers, &settings.limits).await {
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

async fn round_trip(
    conn: &mut AsyncConnection,
    method: &str,
    preamble: &[u8],
    chunks: Option<ChunkStream>,
    request_headers: &Headers,
    limits: &Limits,
) -> Result<(ResponseHead, Bytes, bool)> {
    conn.send_all(preamble).await?;
    if let Some(chunks) = chunks {
        write_chunked_async(conn, chunks).await?;
    }

    let head = loop {
        let head = conn.read_response_head(limits).await?;
        if !head.is_interim() {
            break head;
        }
        trace!(status = head.status_code, "Skipping interim response");
    };

    let mut decoder = BodyDecoder::new(BodyKind::for_response(method, &head)?, limits);
    conn.read_body(&mut decoder).await?;

    let reusable = connection_reusable(request_headers, &head, &decoder);
    Ok((head, decoder.into_body(), reusable))
}

// ============================================================================
// Tests
// ============================================================================
