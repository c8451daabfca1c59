//! Blocking TCP/TLS connection.
//!
//! A [`Connection`] owns one socket (plain or rustls) plus a read buffer.
//! Response parsing happens on that buffer through the sans-IO codec, so
//! bytes read past the end of one message are never lost.
//!
//! # Lifecycle
//!
//! 1. [`Connection::new`] - unopened
//! 2. [`Connection::open`] - TCP connect, TLS handshake, read deadline set
//! 3. [`send_all`](Connection::send_all) / [`read_more`](Connection::read_more)
//! 4. [`Connection::close`] - idempotent
//!
//! # Timeouts
//!
//! | Phase | Deadline | Error |
//! |-------|----------|-------|
//! | TCP connect + TLS handshake | `connect ?? total` | `ConnectTimeout` |
//! | each read | `read ?? total` | `ReadTimeout` |

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use rustls::{ClientConnection, StreamOwned};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{BodyDecoder, Limits, ResponseHead, take_response_head};
use crate::transport::pool::{PoolKey, Poolable};
use crate::transport::timeout::Timeout;
use crate::transport::tls;

// ============================================================================
// Constants
// ============================================================================

/// Bytes requested from the socket per read.
pub(crate) const READ_CHUNK_SIZE: usize = 8192;

// ============================================================================
// Stream
// ============================================================================

/// Plain or TLS socket.
enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(tls) => &tls.sock,
        }
    }

    /// False while rustls holds plaintext or a `close_notify` not yet read.
    fn session_idle(&self) -> bool {
        match self {
            Self::Plain(_) => true,
            Self::Tls(stream) => tls::session_idle(&stream.conn),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(tcp) => tcp.read(buf),
            Self::Tls(tls) => tls.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(tcp) => tcp.write(buf),
            Self::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(tcp) => tcp.flush(),
            Self::Tls(tls) => tls.flush(),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Blocking connection to one `(host, port, use_tls)` endpoint.
///
/// Exclusively owned by a pool or by one in-flight request.
pub struct Connection {
    host: String,
    port: u16,
    use_tls: bool,
    timeout: Timeout,
    stream: Option<Stream>,
    buffer: BytesMut,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("open", &self.stream.is_some())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Creates an unopened connection.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool, timeout: Timeout) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
            timeout,
            stream: None,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the remote host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the remote port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` for a TLS connection.
    #[inline]
    #[must_use]
    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Returns the current timeout configuration.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Returns `true` once opened and until closed.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns the local socket address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the connection is not open.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let stream = self.stream.as_ref().ok_or_else(not_open)?;
        Ok(stream.tcp().local_addr()?)
    }

    /// Returns bytes read but not yet consumed.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Opens the socket and, for TLS, completes the handshake.
    ///
    /// Opening an already open connection is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectTimeout`] if connect or handshake exceed the deadline
    /// - [`Error::Tls`] on certificate or handshake failure
    /// - [`Error::Network`] on any other socket failure
    pub fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let started = Instant::now();
        let deadline = self.timeout.connect_deadline().map(|d| started + d);

        let tcp = self.connect_tcp(deadline)?;
        tcp.set_nodelay(true)
            .map_err(|e| Error::network(format!("Failed to configure socket: {e}")))?;

        let stream = if self.use_tls {
            self.handshake(tcp, deadline)?
        } else {
            Stream::Plain(tcp)
        };

        apply_deadline(stream.tcp(), self.timeout.read_deadline())?;

        debug!(
            host = %self.host,
            port = self.port,
            tls = self.use_tls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Connection opened"
        );

        self.stream = Some(stream);
        self.buffer.clear();
        Ok(())
    }

    /// Closes the connection. Safe to call repeatedly or before `open`.
    pub fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        match stream {
            Stream::Plain(tcp) => {
                let _ = tcp.shutdown(Shutdown::Both);
            }
            Stream::Tls(mut tls) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.write_tls(&mut tls.sock);
                let _ = tls.sock.shutdown(Shutdown::Both);
            }
        }

        self.buffer.clear();
        trace!(host = %self.host, port = self.port, "Connection closed");
    }

    /// Returns `true` if the connection can carry another request.
    ///
    /// False when unopened, when the peer has closed, or when any unread
    /// byte is buffered locally, inside the TLS session or in the kernel.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };

        if !self.buffer.is_empty() || !stream.session_idle() {
            return false;
        }

        let tcp = stream.tcp();
        if tcp.set_nonblocking(true).is_err() {
            return false;
        }

        let mut peek_buf = [0u8; 1];
        let idle = matches!(tcp.peek(&mut peek_buf), Err(e) if e.kind() == ErrorKind::WouldBlock);

        tcp.set_nonblocking(false).is_ok() && idle
    }

    /// Replaces the timeout and applies the read deadline to the socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the socket rejects the deadline.
    pub fn set_timeout(&mut self, timeout: Timeout) -> Result<()> {
        self.timeout = timeout;
        if let Some(stream) = &self.stream {
            apply_deadline(stream.tcp(), timeout.read_deadline())?;
        }
        Ok(())
    }

    fn connect_tcp(&self, deadline: Option<Instant>) -> Result<TcpStream> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::network(format!("Failed to resolve {}: {e}", self.host)))?;

        let mut last_error = None;
        for addr in addrs {
            let attempt = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(self.connect_timed_out());
                    }
                    TcpStream::connect_timeout(&addr, remaining)
                }
                None => TcpStream::connect(addr),
            };

            match attempt {
                Ok(tcp) => return Ok(tcp),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    last_error = Some(self.connect_timed_out());
                }
                Err(e) => {
                    trace!(%addr, error = %e, "Connect attempt failed");
                    last_error = Some(Error::network(format!(
                        "Failed to connect to {}:{}: {e}",
                        self.host, self.port
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::network(format!("No addresses found for {}", self.host))
        }))
    }

    fn handshake(&self, mut tcp: TcpStream, deadline: Option<Instant>) -> Result<Stream> {
        let config = tls::client_config()?;
        let name = tls::server_name(&self.host)?;
        let mut conn = ClientConnection::new(config, name)
            .map_err(|e| Error::tls(format!("Failed to start TLS session: {e}")))?;

        while conn.is_handshaking() {
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(self.connect_timed_out());
                }
                tcp.set_read_timeout(Some(remaining))
                    .and_then(|()| tcp.set_write_timeout(Some(remaining)))
                    .map_err(|e| Error::network(format!("Failed to configure socket: {e}")))?;
            }

            conn.complete_io(&mut tcp)
                .map_err(|e| tls::handshake_error(e, &self.host))?;
        }

        Ok(Stream::Tls(Box::new(StreamOwned::new(conn, tcp))))
    }

    fn connect_timed_out(&self) -> Error {
        Error::connect_timeout(format!("Connecting to {}:{} timed out", self.host, self.port))
    }
}

// ============================================================================
// Connection - I/O
// ============================================================================

impl Connection {
    /// Writes all of `data` and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the connection is not open or the
    /// write fails.
    pub fn send_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        stream
            .write_all(data)
            .and_then(|()| stream.flush())
            .map_err(|e| Error::network(format!("Failed to send request: {e}")))
    }

    /// Reads once from the socket into the buffer.
    ///
    /// Returns the number of bytes read; `0` means the peer closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadTimeout`] if the read deadline expires and
    /// [`Error::Network`] on any other failure.
    pub fn read_more(&mut self) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match stream.read(&mut chunk) {
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // TLS peers frequently close without close_notify.
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(Error::from_read_io(e, "Failed to read from socket")),
            }
        }
    }

    /// Reads until a complete response head is buffered and parses it.
    ///
    /// Bytes after the head stay in the buffer.
    ///
    /// # Errors
    ///
    /// Parser errors, read errors, [`Error::Network`] if the peer closes
    /// before sending anything and [`Error::InvalidResponse`] if it closes
    /// mid-head.
    pub fn read_response_head(&mut self, limits: &Limits) -> Result<ResponseHead> {
        loop {
            if let Some(head) = take_response_head(&mut self.buffer, limits)? {
                return Ok(head);
            }

            if self.read_more()? == 0 {
                return Err(eof_before_head(&self.buffer));
            }
        }
    }

    /// Reads until `decoder` reports a complete body.
    ///
    /// # Errors
    ///
    /// Decoder errors and read errors.
    pub fn read_body(&mut self, decoder: &mut BodyDecoder) -> Result<()> {
        loop {
            if decoder.feed(&mut self.buffer)? {
                return Ok(());
            }

            if self.read_more()? == 0 {
                return decoder.finish_eof();
            }
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.write(buf),
            None => Err(ErrorKind::NotConnected.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush(),
            None => Err(ErrorKind::NotConnected.into()),
        }
    }
}

impl Poolable for Connection {
    fn pool_key(&self) -> PoolKey {
        PoolKey::new(self.host.clone(), self.port, self.use_tls)
    }

    fn is_usable(&self) -> bool {
        Connection::is_usable(self)
    }

    fn close(&mut self) {
        Connection::close(self);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn not_open() -> Error {
    Error::network("Connection is not open")
}

fn apply_deadline(tcp: &TcpStream, deadline: Option<Duration>) -> Result<()> {
    // A zero duration would be rejected by the socket; treat it as 1ms.
    let deadline = deadline.map(|d| d.max(Duration::from_millis(1)));
    tcp.set_read_timeout(deadline)
        .and_then(|()| tcp.set_write_timeout(deadline))
        .map_err(|e| Error::network(format!("Failed to set socket timeout: {e}")))
}

pub(crate) fn eof_before_head(buffer: &[u8]) -> Error {
    if buffer.is_empty() {
        Error::network("Connection closed by peer before response")
    } else {
        Error::invalid_response("Incomplete response: headers delimiter not found")
    }
}

// ============================================================================
// Tests
// ============================================================================
