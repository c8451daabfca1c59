//! Blocking WebSocket session.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use reqwire::{Message, WebSocket, WebSocketConfig};
//!
//! # fn example() -> reqwire::Result<()> {
//! let config = WebSocketConfig::new()
//!     .timeout(Duration::from_secs(10))
//!     .auto_reconnect(true);
//!
//! let mut ws = WebSocket::new("ws://example.com/feed", config)?;
//! ws.connect()?;
//! ws.send("subscribe")?;
//!
//! if let Message::Text(text) = ws.receive()? {
//!     println!("{text}");
//! }
//! ws.close();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::thread;

use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Target;
use crate::transport::Connection;

use super::config::WebSocketConfig;
use super::frame::{Frame, MAX_CONTROL_PAYLOAD, decode_frame, encode_client_frame};
use super::handshake::{build_handshake_request, generate_key, validate_handshake_response};
use super::message::{Incoming, Message, MessageAssembler};
use super::SessionState;

// ============================================================================
// WebSocket
// ============================================================================

/// Blocking WebSocket client session.
///
/// Not thread-safe; use one session per thread or wrap it in a mutex.
#[derive(Debug)]
pub struct WebSocket {
    url: Url,
    target: Target,
    config: WebSocketConfig,
    conn: Option<Connection>,
    assembler: MessageAssembler,
    protocol: Option<String>,
    state: SessionState,
}

// ============================================================================
// WebSocket - Constructor
// ============================================================================

impl WebSocket {
    /// Creates an unconnected session.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the URL does not parse or is not
    ///   `ws://`/`wss://`
    /// - [`Error::Config`] if the configuration is invalid
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
}

// ============================================================================
// WebSocket - Accessors
// ============================================================================

impl WebSocket {
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
// WebSocket - Lifecycle
// ============================================================================

impl WebSocket {
    /// Connects and performs the opening handshake.
    ///
    /// Connecting an open session is a no-op. A closed session may be
    /// connected again.
    ///
    /// # Errors
    ///
    /// - transport errors while connecting
    /// - [`Error::WebSocket`] if the server refuses the upgrade
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.open_session()
    }

    /// Sends a close frame and closes the connection.
    ///
    /// Failures while sending the close frame are logged and ignored.
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let frame = encode_client_frame(&Frame::close(Some(1000), ""));
            if let Err(e) = conn.send_all(&frame) {
                warn!(url = %self.url, error = %e, "Failed to send close frame");
            }
            conn.close();
            debug!(url = %self.url, "WebSocket closed");
        }

        self.assembler.reset();
        self.state = SessionState::Closed;
    }

    fn open_session(&mut self) -> Result<()> {
        let mut conn = Connection::new(
            self.target.host.clone(),
            self.target.port,
            self.target.use_tls,
            self.config.timeout,
        );
        conn.open()?;

        let key = generate_key();
        let request = build_handshake_request(
            &self.target,
            &key,
            &self.config.headers,
            &self.config.subprotocols,
        )?;
        conn.send_all(&request)?;

        let head = conn.read_response_head(&self.config.limits)?;
        let protocol = validate_handshake_response(&head, &key)?;

        debug!(url = %self.url, protocol = ?protocol, "WebSocket connected");

        // Bytes after the 101 head already belong to the frame stream.
        self.conn = Some(conn);
        self.protocol = protocol;
        self.assembler.reset();
        self.state = SessionState::Open;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        self.drop_connection();
        self.open_session()
    }

    /// Abandons the connection without a close handshake.
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
// WebSocket - Messaging
// ============================================================================

impl WebSocket {
    /// Sends a text or binary message as a single frame.
    ///
    /// With `auto_reconnect`, a connection error triggers a reconnect and a
    /// retry, sleeping `reconnect_delay * 2^attempt` before each attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::WebSocket`] if the session was never connected
    /// - [`Error::ConnectionClosed`] after [`close`](Self::close)
    /// - the last connection error once retries are exhausted
    pub fn send(&mut self, message: impl Into<Message>) -> Result<()> {
        self.ensure_usable()?;
        let frame = encode_client_frame(&message.into().into_frame());

        let mut attempt = 0;
        let mut result = self.write(&frame);

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
            thread::sleep(delay);
            attempt += 1;

            result = self.reconnect().and_then(|()| self.write(&frame));
        }
    }

    /// Receives the next complete message.
    ///
    /// Pings are answered automatically and pongs are skipped. Blocks up to
    /// the configured read timeout for each socket read.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the server sent a close frame or
    ///   the connection ended
    /// - [`Error::WebSocket`] for a protocol violation or oversized frame
    /// - [`Error::ReadTimeout`] if no data arrives in time
    pub fn receive(&mut self) -> Result<Message> {
        self.ensure_usable()?;

        loop {
            let frame = self.read_frame()?;
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
                    self.write(&encode_client_frame(&Frame::pong(payload)))?;
                }
                Some(Incoming::Pong(_)) => trace!(url = %self.url, "Pong received"),
                Some(Incoming::Close(reason)) => {
                    debug!(url = %self.url, reason = ?reason, "Close frame received");
                    let code = reason.map(|(code, _)| code);
                    let _ = self.write(&encode_client_frame(&Frame::close(code, "")));
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
    /// [`Error::WebSocket`] if the payload exceeds 125 bytes, plus the
    /// errors of [`send`](Self::send) without retries.
    pub fn ping(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(Frame::ping(payload.to_vec()))
    }

    /// Sends an unsolicited pong.
    ///
    /// # Errors
    ///
    /// Same as [`ping`](Self::ping).
    pub fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(Frame::pong(payload.to_vec()))
    }

    fn send_control(&mut self, frame: Frame) -> Result<()> {
        self.ensure_usable()?;
        if frame.payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::websocket(format!(
                "Control frame payload exceeds {MAX_CONTROL_PAYLOAD} bytes"
            )));
        }
        self.write(&encode_client_frame(&frame))
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::ConnectionClosed);
        };

        if let Err(e) = conn.send_all(data) {
            self.drop_connection();
            return Err(e);
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let max_frame_size = self.config.max_frame_size;

        loop {
            let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
            let read = match decode_frame(conn.buffer_mut(), max_frame_size) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => conn.read_more(),
                Err(e) => Err(e),
            };

            match read {
                Ok(0) => {
                    debug!(url = %self.url, "Connection closed by peer");
                    self.drop_connection();
                    return Err(Error::ConnectionClosed);
                }
                Ok(_) => {}
                // A partial frame stays buffered for the next call.
                Err(e @ Error::ReadTimeout { .. }) => return Err(e),
                Err(e) => {
                    self.drop_connection();
                    return Err(e);
                }
            }
        }
    }
}

impl Drop for WebSocket {
    fn drop(&mut self) {
        if self.conn.is_some() {
            self.close();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
