//! Request bodies, chunked transfer coding and response body framing.
//!
//! Request side:
//!
//! | Type | Variants |
//! |------|----------|
//! | [`Body`] | `Empty`, `Fixed(Bytes)`, `Stream(iterator)` |
//! | [`AsyncBody`] | `Empty`, `Fixed(Bytes)`, `Stream(futures stream)` |
//!
//! Streaming bodies are sent with `Transfer-Encoding: chunked` through
//! [`write_chunked`] / [`write_chunked_async`].
//!
//! Response side is sans-IO: [`BodyKind`] decides the framing from the
//! response head and [`BodyDecoder`] consumes bytes from the connection
//! buffer until the body is complete.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{self, Read, Write};
use std::pin::Pin;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};

use super::limits::{DEFAULT_MAX_LINE_SIZE, Limits};
use super::parse::ResponseHead;

// ============================================================================
// Constants
// ============================================================================

/// Block size used when turning a reader into a chunk stream.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Terminating zero-size chunk.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

// ============================================================================
// Type Aliases
// ============================================================================

/// Blocking chunk source.
pub type ChunkIter = Box<dyn Iterator<Item = io::Result<Bytes>> + Send>;

/// Async chunk source.
pub type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

// ============================================================================
// Body
// ============================================================================

/// Request body for the blocking client.
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,

    /// In-memory body sent with `Content-Length`.
    Fixed(Bytes),

    /// Streaming body sent chunked. Can only be sent once.
    Stream(ChunkIter),
}

impl Body {
    /// Wraps an iterator of chunks.
    pub fn stream<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = io::Result<Bytes>>,
        I::IntoIter: Send + 'static,
    {
        Self::Stream(Box::new(chunks.into_iter()))
    }

    /// Streams a reader in blocks of [`DEFAULT_BLOCK_SIZE`] bytes.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::from_reader_with_block_size(reader, DEFAULT_BLOCK_SIZE)
    }

    /// Streams a reader in blocks of `block_size` bytes.
    pub fn from_reader_with_block_size<R: Read + Send + 'static>(
        mut reader: R,
        block_size: usize,
    ) -> Self {
        let block_size = block_size.max(1);
        let mut finished = false;

        Self::Stream(Box::new(std::iter::from_fn(move || {
            if finished {
                return None;
            }

            let mut block = vec![0u8; block_size];
            loop {
                match reader.read(&mut block) {
                    Ok(0) => {
                        finished = true;
                        return None;
                    }
                    Ok(n) => {
                        block.truncate(n);
                        return Some(Ok(Bytes::from(block)));
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        finished = true;
                        return Some(Err(e));
                    }
                }
            }
        })))
    }

    /// Returns `true` for an empty or zero-length fixed body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Fixed(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// Returns `true` for a streaming body.
    #[inline]
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Fixed(bytes) => write!(f, "Body::Fixed({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

// ============================================================================
// AsyncBody
// ============================================================================

/// Request body for the async client.
#[derive(Default)]
pub enum AsyncBody {
    /// No body.
    #[default]
    Empty,

    /// In-memory body sent with `Content-Length`.
    Fixed(Bytes),

    /// Streaming body sent chunked. Can only be sent once.
    Stream(ChunkStream),
}

impl AsyncBody {
    /// Wraps a stream of chunks.
    pub fn stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self::Stream(Box::pin(chunks))
    }

    /// Streams an async reader in blocks of [`DEFAULT_BLOCK_SIZE`] bytes.
    pub fn from_reader<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self::from_reader_with_block_size(reader, DEFAULT_BLOCK_SIZE)
    }

    /// Streams an async reader in blocks of `block_size` bytes.
    pub fn from_reader_with_block_size<R: AsyncRead + Send + Unpin + 'static>(
        reader: R,
        block_size: usize,
    ) -> Self {
        let block_size = block_size.max(1);

        let chunks = stream::try_unfold(reader, move |mut reader| async move {
            let mut block = BytesMut::with_capacity(block_size);
            let n = reader.read_buf(&mut block).await?;
            if n == 0 {
                Ok::<_, io::Error>(None)
            } else {
                Ok(Some((block.freeze(), reader)))
            }
        });

        Self::Stream(Box::pin(chunks))
    }

    /// Returns `true` for an empty or zero-length fixed body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Fixed(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// Returns `true` for a streaming body.
    #[inline]
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl fmt::Debug for AsyncBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("AsyncBody::Empty"),
            Self::Fixed(bytes) => write!(f, "AsyncBody::Fixed({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("AsyncBody::Stream(..)"),
        }
    }
}

// ============================================================================
// From Implementations
// ============================================================================

macro_rules! impl_body_from {
    ($body:ident) => {
        impl From<Bytes> for $body {
            fn from(bytes: Bytes) -> Self {
                Self::Fixed(bytes)
            }
        }

        impl From<Vec<u8>> for $body {
            fn from(bytes: Vec<u8>) -> Self {
                Self::Fixed(Bytes::from(bytes))
            }
        }

        impl From<&'static [u8]> for $body {
            fn from(bytes: &'static [u8]) -> Self {
                Self::Fixed(Bytes::from_static(bytes))
            }
        }

        impl From<String> for $body {
            fn from(text: String) -> Self {
                Self::Fixed(Bytes::from(text))
            }
        }

        impl From<&'static str> for $body {
            fn from(text: &'static str) -> Self {
                Self::Fixed(Bytes::from_static(text.as_bytes()))
            }
        }
    };
}

impl_body_from!(Body);
impl_body_from!(AsyncBody);

// ============================================================================
// Chunked Encoding
// ============================================================================

/// Appends `data` as one chunk (`{hex len}\r\n{data}\r\n`) to `out`.
///
/// Empty input writes nothing, since a zero-size chunk ends the body.
pub fn encode_chunk(data: &[u8], out: &mut Vec<u8>) {
    if data.is_empty() {
        return;
    }

    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Writes every chunk from `chunks` followed by the terminating chunk.
///
/// # Errors
///
/// Returns [`Error::Io`] if the chunk source fails and [`Error::Network`]
/// if writing fails. Either way the connection is left mid-body.
pub fn write_chunked<W, I>(writer: &mut W, chunks: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = io::Result<Bytes>>,
{
    let mut frame = Vec::new();

    for chunk in chunks {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }

        frame.clear();
        encode_chunk(&chunk, &mut frame);
        writer.write_all(&frame).map_err(write_error)?;
        trace!(size = chunk.len(), "Chunk written");
    }

    writer.write_all(LAST_CHUNK).map_err(write_error)?;
    writer.flush().map_err(write_error)
}

/// Async counterpart of [`write_chunked`].
///
/// # Errors
///
/// Same as [`write_chunked`].
pub async fn write_chunked_async<W, S>(writer: &mut W, mut chunks: S) -> Result<()>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut frame = Vec::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }

        frame.clear();
        encode_chunk(&chunk, &mut frame);
        writer.write_all(&frame).await.map_err(write_error)?;
        trace!(size = chunk.len(), "Chunk written");
    }

    writer.write_all(LAST_CHUNK).await.map_err(write_error)?;
    writer.flush().await.map_err(write_error)
}

fn write_error(err: io::Error) -> Error {
    Error::network(format!("Failed to send request body: {err}"))
}

// ============================================================================
// Chunked Decoding
// ============================================================================

/// Position inside a chunked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Expecting a hex size line.
    Size,
    /// Inside chunk data, with this many bytes left.
    Data(usize),
    /// Expecting the CRLF after chunk data.
    DataCrlf,
    /// After the zero-size chunk, skipping trailer lines.
    Trailer,
    /// Final CRLF consumed.
    Done,
}

/// Incremental decoder for `Transfer-Encoding: chunked`.
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    state: ChunkState,
    max_line_size: usize,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_SIZE)
    }
}

impl ChunkedDecoder {
    /// Creates a decoder that rejects size or trailer lines longer than
    /// `max_line_size`.
    #[inline]
    #[must_use]
    pub const fn new(max_line_size: usize) -> Self {
        Self {
            state: ChunkState::Size,
            max_line_size,
        }
    }

    /// Returns `true` once the terminating chunk has been consumed.
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Consumes as much of `buf` as possible, appending chunk data to `out`.
    ///
    /// Returns `true` when the body is complete. Bytes after the final CRLF
    /// are left in `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an invalid size line or a missing
    /// CRLF after chunk data.
    pub fn decode(&mut self, buf: &mut BytesMut, out: &mut BytesMut) -> Result<bool> {
        loop {
            match self.state {
                ChunkState::Size => {
                    let Some(line) = self.take_line(buf, "Chunk size line too long")? else {
                        return Ok(false);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "Chunk header decoded");

                    self.state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(false);
                    }

                    let take = remaining.min(buf.len());
                    out.extend_from_slice(&buf[..take]);
                    buf.advance(take);

                    self.state = if take == remaining {
                        ChunkState::DataCrlf
                    } else {
                        ChunkState::Data(remaining - take)
                    };
                }
                ChunkState::DataCrlf => {
                    if buf.len() < 2 {
                        return Ok(false);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(Error::protocol("Missing CRLF after chunk data"));
                    }
                    buf.advance(2);
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(line) = self.take_line(buf, "Chunk trailer line too long")? else {
                        return Ok(false);
                    };
                    if line.is_empty() {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => return Ok(true),
            }
        }
    }

    /// Removes one CRLF-terminated line from `buf`, without the CRLF.
    fn take_line(&self, buf: &mut BytesMut, too_long: &'static str) -> Result<Option<Bytes>> {
        let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") else {
            if buf.len() > self.max_line_size {
                return Err(Error::protocol(too_long));
            }
            return Ok(None);
        };

        if pos > self.max_line_size {
            return Err(Error::protocol(too_long));
        }

        let line = buf.split_to(pos).freeze();
        buf.advance(2);
        Ok(Some(line))
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let invalid = || {
        Error::protocol(format!(
            "Invalid chunk size: {:?}",
            String::from_utf8_lossy(line)
        ))
    };

    // Chunk extensions after ';' are ignored.
    let size = line.split(|&b| b == b';').next().unwrap_or_default();
    let size = std::str::from_utf8(size).map_err(|_| invalid())?.trim();

    usize::from_str_radix(size, 16).map_err(|_| invalid())
}

// ============================================================================
// Body Framing
// ============================================================================

/// How the length of a response body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// No body (HEAD, 1xx, 204, 304).
    None,
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Exactly this many bytes (`Content-Length`).
    Length(usize),
    /// Everything until the peer closes; the connection is not reusable.
    Close,
}

impl BodyKind {
    /// Determines the framing of a response to a request with `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] for an unparsable
    /// `Content-Length`.
    pub fn for_response(method: &str, head: &ResponseHead) -> Result<Self> {
        let status = head.status_code;

        if method.eq_ignore_ascii_case("HEAD")
            || (100..200).contains(&status)
            || status == 204
            || status == 304
        {
            return Ok(Self::None);
        }

        if head.headers.has_token("Transfer-Encoding", "chunked") {
            return Ok(Self::Chunked);
        }

        if let Some(length) = head.headers.first("Content-Length") {
            let length = length.trim().parse::<usize>().map_err(|_| {
                Error::invalid_response(format!("Invalid Content-Length: {length:?}"))
            })?;
            return Ok(Self::Length(length));
        }

        Ok(Self::Close)
    }
}

/// Sans-IO response body reader.
#[derive(Debug)]
pub struct BodyDecoder {
    kind: BodyKind,
    remaining: usize,
    chunked: ChunkedDecoder,
    body: BytesMut,
    max_body_size: Option<usize>,
    done: bool,
}

impl BodyDecoder {
    /// Creates a decoder for the given framing.
    #[must_use]
    pub fn new(kind: BodyKind, limits: &Limits) -> Self {
        let (remaining, done) = match kind {
            BodyKind::None => (0, true),
            BodyKind::Length(n) => (n, n == 0),
            BodyKind::Chunked | BodyKind::Close => (0, false),
        };

        Self {
            kind,
            remaining,
            chunked: ChunkedDecoder::new(limits.max_line_size),
            body: BytesMut::new(),
            max_body_size: limits.max_body_size,
            done,
        }
    }

    /// Returns the framing being decoded.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Returns `true` once the body is complete.
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Returns `true` if the connection may carry another exchange once the
    /// body is complete.
    #[inline]
    #[must_use]
    pub fn allows_reuse(&self) -> bool {
        self.kind != BodyKind::Close
    }

    /// Consumes body bytes from `buf`.
    ///
    /// Returns `true` once the body is complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on malformed chunked framing or when the
    /// body exceeds `max_body_size`.
    pub fn feed(&mut self, buf: &mut BytesMut) -> Result<bool> {
        if self.done {
            return Ok(true);
        }

        match self.kind {
            BodyKind::None => self.done = true,
            BodyKind::Length(_) => {
                let take = self.remaining.min(buf.len());
                self.body.extend_from_slice(&buf[..take]);
                buf.advance(take);
                self.remaining -= take;
                self.done = self.remaining == 0;
            }
            BodyKind::Chunked => {
                self.done = self.chunked.decode(buf, &mut self.body)?;
            }
            BodyKind::Close => {
                self.body.extend_from_slice(buf);
                buf.clear();
            }
        }

        self.check_size()?;
        Ok(self.done)
    }

    /// Signals that the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the body was still incomplete.
    pub fn finish_eof(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }

        match self.kind {
            BodyKind::Close | BodyKind::None => {
                self.done = true;
                Ok(())
            }
            BodyKind::Chunked => Err(Error::network("connection closed during chunked body")),
            BodyKind::Length(_) => Err(Error::network(format!(
                "connection closed with {} body bytes outstanding",
                self.remaining
            ))),
        }
    }

    /// Returns the decoded body.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body.freeze()
    }

    fn check_size(&self) -> Result<()> {
        match self.max_body_size {
            Some(max) if self.body.len() > max => Err(Error::protocol(format!(
                "Body exceeds maximum size of {max} bytes"
            ))),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::protocol::Headers;

    fn head(status: u16, headers: &[(&str, &str)]) -> ResponseHead {
        ResponseHead {
            status_code: status,
            status_line: format!("HTTP/1.1 {status} X"),
            headers: Headers::from_pairs(headers.iter().copied()),
        }
    }

    fn decode_all(data: &[u8]) -> Result<(Bytes, BytesMut)> {
        let mut decoder = ChunkedDecoder::default();
        let mut buf = BytesMut::from(data);
        let mut out = BytesMut::new();
        assert!(decoder.decode(&mut buf, &mut out)?, "incomplete body");
        Ok((out.freeze(), buf))
    }

    #[test]
    fn test_encode_chunk() {
        let mut out = Vec::new();
        encode_chunk(b"hello world, chunk!", &mut out);
        assert_eq!(out, b"13\r\nhello world, chunk!\r\n");

        out.clear();
        encode_chunk(b"", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_chunked_skips_empty_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::new()), Ok(Bytes::from_static(b"c"))];
        let mut out = Vec::new();
        write_chunked(&mut out, chunks).unwrap();
        assert_eq!(out, b"2\r\nab\r\n1\r\nc\r\n0\r\n\r\n");
    }

    #[test]
    fn test_write_chunked_source_error() {
        let chunks = vec![Err(io::Error::other("disk gone"))];
        let err = write_chunked(&mut Vec::new(), chunks).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_write_chunked_async() {
        let body = AsyncBody::from_reader_with_block_size(&b"abcdef"[..], 4);
        let AsyncBody::Stream(chunks) = body else {
            panic!("expected stream body");
        };

        let mut out = Vec::new();
        write_chunked_async(&mut out, chunks).await.unwrap();
        assert_eq!(out, b"4\r\nabcd\r\n2\r\nef\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn test_write_chunked_async_write_failure() {
        let mut writer = tokio_test::io::Builder::new()
            .write(b"3\r\nabc\r\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();

        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"de")),
        ]);
        let err = write_chunked_async(&mut writer, chunks).await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }

    #[test]
    fn test_body_from_reader_blocks() {
        let Body::Stream(chunks) = Body::from_reader_with_block_size(io::Cursor::new(vec![7u8; 10]), 4)
        else {
            panic!("expected stream body");
        };

        let sizes: Vec<_> = chunks.map(|c| c.unwrap().len()).collect();
        assert_eq!(sizes, [4, 4, 2]);
    }

    #[test]
    fn test_decode_with_extensions_and_trailers() {
        let (body, rest) = decode_all(b"5;name=val\r\nhello\r\n0\r\nX-Trailer: 1\r\n\r\nNEXT").unwrap();
        assert_eq!(&body[..], b"hello");
        assert_eq!(&rest[..], b"NEXT");
    }

    #[test]
    fn test_decode_invalid_size() {
        let err = decode_all(b"zz\r\nhello\r\n0\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("Invalid chunk size"));
    }

    #[test]
    fn test_decode_missing_crlf() {
        let err = decode_all(b"2\r\nabXX0\r\n\r\n").unwrap_err();
        assert!(err.to_string().contains("Missing CRLF"));
    }

    #[test]
    fn test_decode_size_line_too_long() {
        let mut decoder = ChunkedDecoder::new(4);
        let mut buf = BytesMut::from(&b"0000000000"[..]);
        let err = decoder.decode(&mut buf, &mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_body_kind_selection() {
        assert_eq!(BodyKind::for_response("HEAD", &head(200, &[("Content-Length", "5")])).unwrap(), BodyKind::None);
        assert_eq!(BodyKind::for_response("GET", &head(204, &[])).unwrap(), BodyKind::None);
        assert_eq!(BodyKind::for_response("GET", &head(304, &[])).unwrap(), BodyKind::None);
        assert_eq!(
            BodyKind::for_response("GET", &head(200, &[("Transfer-Encoding", "chunked"), ("Content-Length", "3")]))
                .unwrap(),
            BodyKind::Chunked
        );
        assert_eq!(
            BodyKind::for_response("GET", &head(200, &[("Content-Length", "3")])).unwrap(),
            BodyKind::Length(3)
        );
        assert_eq!(BodyKind::for_response("GET", &head(200, &[])).unwrap(), BodyKind::Close);
        assert!(BodyKind::for_response("GET", &head(200, &[("Content-Length", "x")])).is_err());
    }

    #[test]
    fn test_length_decoder_incremental() {
        let mut decoder = BodyDecoder::new(BodyKind::Length(5), &Limits::default());

        let mut buf = BytesMut::from(&b"hel"[..]);
        assert!(!decoder.feed(&mut buf).unwrap());
        let mut buf = BytesMut::from(&b"loEXTRA"[..]);
        assert!(decoder.feed(&mut buf).unwrap());

        assert_eq!(&buf[..], b"EXTRA");
        assert_eq!(&decoder.into_body()[..], b"hello");
    }

    #[test]
    fn test_eof_mid_chunk_is_network_error() {
        let mut decoder = BodyDecoder::new(BodyKind::Chunked, &Limits::default());
        let mut buf = BytesMut::from(&b"a\r\nhel"[..]);
        assert!(!decoder.feed(&mut buf).unwrap());

        let err = decoder.finish_eof().unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert!(err.to_string().contains("connection closed during chunked body"));
    }

    #[test]
    fn test_close_delimited_body() {
        let mut decoder = BodyDecoder::new(BodyKind::Close, &Limits::default());
        let mut buf = BytesMut::from(&b"all of it"[..]);
        assert!(!decoder.feed(&mut buf).unwrap());
        decoder.finish_eof().unwrap();

        assert!(decoder.is_done());
        assert!(!decoder.allows_reuse());
        assert_eq!(&decoder.into_body()[..], b"all of it");
    }

    #[test]
    fn test_max_body_size() {
        let limits = Limits::default().with_max_body_size(4);
        let mut decoder = BodyDecoder::new(BodyKind::Length(10), &limits);
        let mut buf = BytesMut::from(&b"0123456789"[..]);

        let err = decoder.feed(&mut buf).unwrap_err();
        assert!(err.to_string().contains("Body exceeds maximum size"));
    }

    proptest! {
        #[test]
        fn prop_chunked_round_trip(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 0..12)) {
            let mut wire = Vec::new();
            let source = chunks.iter().map(|c| Ok(Bytes::copy_from_slice(c)));
            write_chunked(&mut wire, source).unwrap();

            let expected: Vec<u8> = chunks.concat();

            let (body, rest) = decode_all(&wire).unwrap();
            prop_assert_eq!(&body[..], &expected[..]);
            prop_assert!(rest.is_empty());

            // Same result when bytes trickle in one at a time.
            let mut decoder = ChunkedDecoder::default();
            let mut out = BytesMut::new();
            let mut buf = BytesMut::new();
            let mut done = false;
            for byte in wire {
                buf.extend_from_slice(&[byte]);
                done = decoder.decode(&mut buf, &mut out).unwrap();
            }
            prop_assert!(done);
            prop_assert_eq!(&out[..], &expected[..]);
        }
    }
}
