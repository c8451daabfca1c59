//! Async WebSocket session.
//!
//! Mirrors the blocking [`WebSocket`](super::WebSocket) on tokio. Backoff
//! sleeps use `tokio::time::sleep`, so a reconnecting send never blocks the
//! runtime.

// ============================================================================
// Imports
// ============================================================================

use tokio::time;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Target;
use crate::transport::AsyncConnection;

use super::SessionState;
use super::config::WebSocketConfig;
use super::frame::{Frame, MAX_CONTROL_PAYLOAD, decode_frame, encode_client_frame};
use super::handshake::{build_handshake_request, generate_key, validate_handshake_response};
use super::message::{Incoming, Message, MessageAssembler};

// ============================================================================
// AsyncWebSocket
// ============================================================================

/// Async WebSocket client session.
#[derive(Debug)]
pub struct AsyncWebSocket {
    url: Url,
    target: Target,
    config: WebSocketConfig,
    conn: Option<AsyncConnection>,
    assembler: MessageAssembler,
    protocol: Option<String>,
    state: SessionState,
}

impl AsyncWebSocket {
    /// Creates an unconnected session.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocket::new`](super::WebSocket::new).
    pub fn new(url: &str, config: WebSocketConfig) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::invalid_request(format!("Invalid URL {url:?}: {e}")))?;
        let target = Target::websocket(&url)?;
        config.validate()?;

        Ok(Self {
            url,
            target,
            config,
            conn: None,
            assembler: MessageAssembler::new(),
            protocol: None,
            state: SessionState::Idle,
        })
    }

    /// Returns the session URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the session configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Returns the subprotocol selected by the server.
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Returns `true` while the session has a live connection.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Open && self.conn.is_some()
    }
}

// ============================================================================
// AsyncWebSocket - Lifecycle
// ============================================================================

impl AsyncWebSocket {
    /// Connects and performs the opening handshake.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocket::connect`](super::WebSocket::connect).
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.open_session().await
    }

    /// Sends a close frame and shuts the connection down.
    ///
    /// Failures while sending the close frame are logged and ignored.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let frame = encode_client_frame(&Frame::close(Some(1000), ""));
            if let Err(e) = conn.send_all(&frame).await {
                warn!(url = %self.url, error = %e, "Failed to send close frame");
            }
            conn.shutdown().await;
            debug!(url = %self.url, "WebSocket closed");
        }

        self.assembler.reset();
        self.state = SessionState::Closed;
    }

    async fn open_session(&mut self) -> Result<()> {
        let mut conn = AsyncConnection::new(
            self.target.host.clone(),
            self.target.port,
            self.target.use_tls,
            self.config.timeout,
        );
        conn.open().await?;

        let key = generate_key();
        let request = build_handshake_request(
            &self.target,
            &key,
            &self.config.headers,
            &self.config.subprotocols,
        )?;
        conn.send_all(&request).await?;

        let head = conn.read_response_head(&self.config.limits).await?;
        let protocol = validate_handshake_response(&head, &key)?;

        debug!(url = %self.url, protocol = ?protocol, "WebSocket connected");

        self.conn = Some(conn);
        self.protocol = protocol;
        self.assembler.reset();
        self.state = SessionState::Open;
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.drop_connection();
        self.open_session().await
    }

    fn drop_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        self.assembler.reset();
        if self.state == SessionState::Open {
            self.state = SessionState::Dropped;
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            SessionState::Idle => Err(Error::websocket("WebSocket is not connected")),
            SessionState::Closed => Err(Error::ConnectionClosed),
            SessionState::Open | SessionState::Dropped => Ok(()),
        }
    }
}

// ============================================================================
// AsyncWebSocket - Messaging
// ============================================================================

impl AsyncWebSocket {
    /// Sends a text or binary message, reconnecting on connection errors
    /// when `auto_reconnect` is set.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocket::send`](super::WebSocket::send).
    pub async fn send(&mut self, message: impl Into<Message>) -> Result<()> {
        self.ensure_usable()?;
        let frame = encode_client_frame(&message.into().into_frame());

        let mut attempt = 0;
        let mut result = self.write(&frame).await;

        loop {
            let err = match result {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !self.config.should_retry(&err, attempt) {
                return Err(err);
            }

            let delay = self.config.backoff(attempt);
            warn!(
                url = %self.url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Send failed, reconnecting"
            );
            time::sleep(delay).await;
            attempt += 1;

            result = match self.reconnect().await {
                Ok(()) => self.write(&frame).await,
                Err(e) => Err(e),
            };
        }
    }

    /// Receives the next complete message.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocket::receive`](super::WebSocket::receive).
    pub async fn receive(&mut self) -> Result<Message> {
        self.ensure_usable()?;

        loop {
            let frame = self.read_frame().await?;
            let incoming = match self.assembler.push(frame) {
                Ok(incoming) => incoming,
                Err(e) => {
                    self.drop_connection();
                    return Err(e);
                }
            };

            match incoming {
                None => {}
                Some(Incoming::Message(message)) => return Ok(message),
                Some(Incoming::Ping(payload)) => {
                    trace!(url = %self.url, size = payload.len(), "Ping received");
                    self.write(&encode_client_frame(&Frame::pong(payload))).await?;
                }
                Some(Incoming::Pong(_)) => trace!(url = %self.url, "Pong received"),
                Some(Incoming::Close(reason)) => {
                    debug!(url = %self.url, reason = ?reason, "Close frame received");
                    let code = reason.map(|(code, _)| code);
                    let _ = self.write(&encode_client_frame(&Frame::close(code, ""))).await;
                    self.drop_connection();
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }

    /// Sends a ping.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocket::ping`](super::WebSocket::ping).
    pub async fn ping(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(Frame::ping(payload.to_vec())).await
    }

    /// Sends an unsolicited pong.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocket::ping`](super::WebSocket::ping).
    pub async fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(Frame::pong(payload.to_vec())).await
    }

    async fn send_control(&mut self, frame: Frame) -> Result<()> {
        self.ensure_usable()?;
        if frame.payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::websocket(format!(
                "Control frame payload exceeds {MAX_CONTROL_PAYLOAD} bytes"
            )));
        }
        self.write(&encode_client_frame(&frame)).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::ConnectionClosed);
        };

        if let Err(e) = conn.send_all(data).await {
            self.drop_connection();
            return Err(e);
        }
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        let max_frame_size = self.config.max_frame_size;

        loop {
            let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
            let read = match decode_frame(conn.buffer_mut(), max_frame_size) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => conn.read_more().await,
                Err(e) => Err(e),
            };

            match read {
                Ok(0) => {
                    debug!(url = %self.url, "Connection closed by peer");
                    self.drop_connection();
                    return Err(Error::ConnectionClosed);
                }
                Ok(_) => {}
                Err(e @ Error::ReadTimeout { .. }) => return Err(e),
                Err(e) => {
                    self.drop_connection();
                    return Err(e);
                }
            }
        }
    }
}

impl Drop for AsyncWebSocket {
    fn drop(&mut self) {
        self.drop_connection();
    }
}

// ============================================================================
// Tests
// ============================================================================
