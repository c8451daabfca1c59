//! Non-blocking TCP/TLS connection on tokio.
//!
//! Same contract as the blocking [`Connection`](super::Connection): one
//! socket plus a read buffer driven through the sans-IO codec. Connect and
//! handshake run under one `tokio::time::timeout`; each read runs under the
//! read deadline.

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{BodyDecoder, Limits, ResponseHead, take_response_head};
use crate::transport::connection::{READ_CHUNK_SIZE, eof_before_head};
use crate::transport::pool::{PoolKey, Poolable};
use crate::transport::timeout::Timeout;
use crate::transport::tls;

// ============================================================================
// AsyncStream
// ============================================================================

/// Plain or TLS tokio socket.
enum AsyncStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(tls) => tls.get_ref().0,
        }
    }

    fn session_idle(&self) -> bool {
        match self {
            Self::Plain(_) => true,
            Self::Tls(stream) => tls::session_idle(stream.get_ref().1),
        }
    }
}

impl AsyncRead for AsyncStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(tcp) => Pin::new(tcp).poll_read(cx, buf),
            Self::Tls(tls) => Pin::new(tls.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AsyncStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(tcp) => Pin::new(tcp).poll_write(cx, buf),
            Self::Tls(tls) => Pin::new(tls.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(tcp) => Pin::new(tcp).poll_flush(cx),
            Self::Tls(tls) => Pin::new(tls.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(tcp) => Pin::new(tcp).poll_shutdown(cx),
            Self::Tls(tls) => Pin::new(tls.as_mut()).poll_shutdown(cx),
        }
    }
}

// ============================================================================
// AsyncConnection
// ============================================================================

/// Non-blocking connection to one `(host, port, use_tls)` endpoint.
pub struct AsyncConnection {
    host: String,
    port: u16,
    use_tls: bool,
    timeout: Timeout,
    stream: Option<AsyncStream>,
    buffer: BytesMut,
    closing: bool,
}

impl std::fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("open", &self.stream.is_some())
            .field("closing", &self.closing)
            .finish()
    }
}

// ============================================================================
// AsyncConnection - Constructor & Accessors
// ============================================================================

impl AsyncConnection {
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
            closing: false,
        }
    }

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
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        let stream = self.stream.as_ref().ok_or_else(not_open)?;
        Ok(stream.tcp().local_addr()?)
    }

    /// Returns bytes read but not yet consumed.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Replaces the timeout used by later reads.
    #[inline]
    pub fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout;
    }
}

// ============================================================================
// AsyncConnection - Lifecycle
// ============================================================================

impl AsyncConnection {
    /// Opens the socket and, for TLS, completes the handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectTimeout`] if connect plus handshake exceed the deadline
    /// - [`Error::Tls`] on certificate or handshake failure
    /// - [`Error::Network`] on any other socket failure
    pub async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let started = Instant::now();
        let establish = establish(&self.host, self.port, self.use_tls);

        let stream = match self.timeout.connect_deadline() {
            Some(deadline) => time::timeout(deadline, establish).await.map_err(|_| {
                Error::connect_timeout(format!(
                    "Connecting to {}:{} timed out",
                    self.host, self.port
                ))
            })??,
            None => establish.await?,
        };

        debug!(
            host = %self.host,
            port = self.port,
            tls = self.use_tls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Connection opened"
        );

        self.stream = Some(stream);
        self.closing = false;
        self.buffer.clear();
        Ok(())
    }

    /// Drops the socket. Safe to call repeatedly or before `open`.
    pub fn close(&mut self) {
        self.closing = true;
        if self.stream.take().is_some() {
            trace!(host = %self.host, port = self.port, "Connection closed");
        }
        self.buffer.clear();
    }

    /// Shuts down the write side (TLS `close_notify` included), then closes.
    pub async fn shutdown(&mut self) {
        self.closing = true;
        if let Some(stream) = self.stream.as_mut() {
            let _ = stream.shutdown().await;
        }
        self.close();
    }

    /// Returns `true` if the connection can carry another request.
    ///
    /// False when unopened, closing, when the peer has closed, or when any
    /// unread byte is buffered locally, inside the TLS session or in the
    /// kernel.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };

        if self.closing || !self.buffer.is_empty() || !stream.session_idle() {
            return false;
        }

        // Pending means nothing to read and the peer is still there.
        let mut cx = Context::from_waker(Waker::noop());
        let mut peek_buf = [0u8; 1];
        let mut peek_buf = ReadBuf::new(&mut peek_buf);
        matches!(stream.tcp().poll_peek(&mut cx, &mut peek_buf), Poll::Pending)
    }
}

async fn establish(host: &str, port: u16, use_tls: bool) -> Result<AsyncStream> {
    let tcp = TcpStream::connect((host, port)).await.map_err(|e| match e.kind() {
        ErrorKind::TimedOut => Error::connect_timeout(format!("Connecting to {host}:{port} timed out")),
        _ => Error::network(format!("Failed to connect to {host}:{port}: {e}")),
    })?;

    tcp.set_nodelay(true)
        .map_err(|e| Error::network(format!("Failed to configure socket: {e}")))?;

    if !use_tls {
        return Ok(AsyncStream::Plain(tcp));
    }

    let connector = TlsConnector::from(tls::client_config()?);
    let name = tls::server_name(host)?;
    let stream = connector
        .connect(name, tcp)
        .await
        .map_err(|e| tls::handshake_error(e, host))?;

    Ok(AsyncStream::Tls(Box::new(stream)))
}

// ============================================================================
// AsyncConnection - I/O
// ============================================================================

impl AsyncConnection {
    /// Writes all of `data` and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the connection is not open or the
    /// write fails.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        stream
            .write_all(data)
            .await
            .map_err(|e| Error::network(format!("Failed to send request: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::network(format!("Failed to send request: {e}")))
    }

    /// Reads once from the socket into the buffer under the read deadline.
    ///
    /// Returns the number of bytes read; `0` means the peer closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadTimeout`] if the read deadline expires and
    /// [`Error::Network`] on any other failure.
    pub async fn read_more(&mut self) -> Result<usize> {
        let deadline = self.timeout.read_deadline();
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        self.buffer.reserve(READ_CHUNK_SIZE);

        let read = stream.read_buf(&mut self.buffer);
        let result = match deadline {
            Some(deadline) => time::timeout(deadline, read)
                .await
                .map_err(|_| Error::read_timeout(format!("No data received within {deadline:?}")))?,
            None => read.await,
        };

        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(Error::from_read_io(e, "Failed to read from socket")),
        }
    }

    /// Reads until a complete response head is buffered and parses it.
    ///
    /// # Errors
    ///
    /// Same as the blocking `read_response_head`.
    pub async fn read_response_head(&mut self, limits: &Limits) -> Result<ResponseHead> {
        loop {
            if let Some(head) = take_response_head(&mut self.buffer, limits)? {
                return Ok(head);
            }

            if self.read_more().await? == 0 {
                return Err(eof_before_head(&self.buffer));
            }
        }
    }

    /// Reads until `decoder` reports a complete body.
    ///
    /// # Errors
    ///
    /// Decoder errors and read errors.
    pub async fn read_body(&mut self, decoder: &mut BodyDecoder) -> Result<()> {
        loop {
            if decoder.feed(&mut self.buffer)? {
                return Ok(());
            }

            if self.read_more().await? == 0 {
                return decoder.finish_eof();
            }
        }
    }
}

impl AsyncWrite for AsyncConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(ErrorKind::NotConnected.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(ErrorKind::NotConnected.into())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.closing = true;
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl Poolable for AsyncConnection {
    fn pool_key(&self) -> PoolKey {
        PoolKey::new(self.host.clone(), self.port, self.use_tls)
    }

    fn is_usable(&self) -> bool {
        AsyncConnection::is_usable(self)
    }

    fn close(&mut self) {
        AsyncConnection::close(self);
    }
}

fn not_open() -> Error {
    Error::network("Connection is not open")
}

// ============================================================================
// Tests
// ============================================================================
