//! Loopback HTTP and WebSocket servers for tests.
//!
//! Each server binds `127.0.0.1:0`, accepts on a background thread and
//! serves every connection on its own thread. They live for the rest of
//! the test process.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;

use crate::protocol::{ChunkedDecoder, Limits, RequestHead, find_header_end, parse_request, parse_response};
use crate::websocket::frame::{Frame, OpCode, decode_frame, encode_frame};
use crate::websocket::handshake::compute_accept_key;

// ============================================================================
// Helpers
// ============================================================================

/// Serializes a raw HTTP/1.1 response.
pub(crate) fn http_response(status: u16, reason: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-length")) {
        out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

fn read_more(sock: &mut TcpStream, buf: &mut BytesMut) -> bool {
    let mut chunk = [0u8; 8192];
    match sock.read(&mut chunk) {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

fn read_request(sock: &mut TcpStream, buf: &mut BytesMut) -> Option<(RequestHead, Vec<u8>)> {
    let limits = Limits::default();

    let end = loop {
        if let Some(end) = find_header_end(buf) {
            break end;
        }
        if !read_more(sock, buf) {
            return None;
        }
    };

    let (head, _) = parse_request(&buf[..end + 4], &limits).ok()?;
    buf.advance(end + 4);

    let body = if head.headers.has_token("transfer-encoding", "chunked") {
        let mut decoder = ChunkedDecoder::default();
        let mut out = BytesMut::new();
        loop {
            if decoder.decode(buf, &mut out).ok()? {
                break;
            }
            if !read_more(sock, buf) {
                return None;
            }
        }
        out.to_vec()
    } else {
        let length: usize = head
            .headers
            .first("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < length {
            if !read_more(sock, buf) {
                return None;
            }
        }
        buf.split_to(length).to_vec()
    };

    Some((head, body))
}

fn announces_close(raw: &[u8]) -> bool {
    parse_response(raw, &Limits::default())
        .map(|(head, _)| head.headers.has_token("connection", "close"))
        .unwrap_or(true)
}

// ============================================================================
// TestServer
// ============================================================================

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub head: RequestHead,
    pub body: Vec<u8>,
}

type Handler = dyn Fn(&RequestHead, &[u8]) -> Vec<u8> + Send + Sync;

/// Keep-alive HTTP/1.1 server driven by a handler closure.
///
/// An empty handler result closes the connection without answering.
pub(crate) struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    connections: Arc<AtomicUsize>,
}

impl TestServer {
    pub(crate) fn start<F>(handler: F) -> Self
    where
        F: Fn(&RequestHead, &[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let (req, conns) = (Arc::clone(&requests), Arc::clone(&connections));
        thread::spawn(move || {
            for sock in listener.incoming() {
                let Ok(sock) = sock else { break };
                conns.fetch_add(1, Ordering::SeqCst);
                let (handler, requests) = (Arc::clone(&handler), Arc::clone(&req));
                thread::spawn(move || serve(sock, &*handler, &requests));
            }
        });

        Self {
            addr,
            requests,
            connections,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(mut sock: TcpStream, handler: &Handler, requests: &Mutex<Vec<RecordedRequest>>) {
    let mut buf = BytesMut::new();

    while let Some((head, body)) = read_request(&mut sock, &mut buf) {
        let response = handler(&head, &body);
        let client_close = head.headers.has_token("connection", "close");
        requests.lock().push(RecordedRequest { head, body });

        if response.is_empty() || sock.write_all(&response).is_err() {
            return;
        }
        if client_close || announces_close(&response) {
            return;
        }
    }
}

// ============================================================================
// WebSocket Test Server
// ============================================================================

/// Server side of one upgraded connection.
pub(crate) struct WsPeer {
    sock: TcpStream,
    buf: BytesMut,
    pub head: RequestHead,
}

impl WsPeer {
    /// Reads one frame; `None` once the client has gone.
    pub(crate) fn read_frame(&mut self) -> Option<Frame> {
        loop {
            match decode_frame(&mut self.buf, usize::MAX) {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {}
                Err(_) => return None,
            }
            if !read_more(&mut self.sock, &mut self.buf) {
                return None;
            }
        }
    }

    /// Sends an unmasked frame.
    pub(crate) fn send_frame(&mut self, frame: &Frame) {
        let mut out = BytesMut::new();
        encode_frame(frame, None, &mut out);
        let _ = self.sock.write_all(&out);
    }

    /// Sends raw bytes.
    pub(crate) fn send_raw(&mut self, data: &[u8]) {
        let _ = self.sock.write_all(data);
    }
}

type WsHandler = dyn Fn(usize, WsPeer) + Send + Sync;

/// WebSocket server that completes the handshake and hands each
/// connection, with its zero-based index, to a handler.
///
/// `reject` decides per connection index whether to answer the handshake
/// with a plain `HTTP 403` instead.
pub(crate) struct WsTestServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl WsTestServer {
    pub(crate) fn start<F>(handler: F) -> Self
    where
        F: Fn(usize, WsPeer) + Send + Sync + 'static,
    {
        Self::start_with(|_| false, handler)
    }

    pub(crate) fn start_with<R, F>(reject: R, handler: F) -> Self
    where
        R: Fn(usize) -> bool + Send + Sync + 'static,
        F: Fn(usize, WsPeer) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<WsHandler> = Arc::new(handler);
        let reject = Arc::new(reject);
        let connections = Arc::new(AtomicUsize::new(0));

        let conns = Arc::clone(&connections);
        thread::spawn(move || {
            for sock in listener.incoming() {
                let Ok(mut sock) = sock else { break };
                let index = conns.fetch_add(1, Ordering::SeqCst);
                let (handler, reject) = (Arc::clone(&handler), Arc::clone(&reject));

                thread::spawn(move || {
                    let mut buf = BytesMut::new();
                    let Some((head, _)) = read_request(&mut sock, &mut buf) else {
                        return;
                    };

                    if reject(index) {
                        let _ = sock.write_all(&http_response(403, "Forbidden", &[], b""));
                        return;
                    }

                    let key = head.headers.first("sec-websocket-key").unwrap_or_default();
                    let mut upgrade = format!(
                        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
                         Connection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
                        compute_accept_key(key)
                    );
                    if let Some(protocols) = head.headers.first("sec-websocket-protocol") {
                        let first = protocols.split(',').next().unwrap_or_default().trim();
                        upgrade.push_str(&format!("Sec-WebSocket-Protocol: {first}\r\n"));
                    }
                    upgrade.push_str("\r\n");
                    if sock.write_all(upgrade.as_bytes()).is_err() {
                        return;
                    }

                    handler(index, WsPeer { sock, buf, head });
                });
            }
        });

        Self { addr, connections }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Echoes every data frame back until the client closes.
pub(crate) fn echo(_: usize, mut peer: WsPeer) {
    while let Some(frame) = peer.read_frame() {
        match frame.opcode {
            OpCode::Close => {
                peer.send_frame(&Frame::close(Some(1000), ""));
                return;
            }
            OpCode::Ping | OpCode::Pong => {}
            _ => peer.send_frame(&Frame::new(frame.fin, frame.opcode, frame.payload)),
        }
    }
}

/// Returns a closed port on the loopback interface.
pub(crate) fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Polls `condition` until it holds or two seconds pass.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(std::time::Duration::from_millis(10));
    }
    condition()
}
