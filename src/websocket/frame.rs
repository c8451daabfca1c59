//! WebSocket frame codec (RFC 6455 §5).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Client frames are always masked with a fresh random key. Incoming
//! frames are unmasked when the mask bit is set.

// ============================================================================
// Imports
// ============================================================================

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

// ============================================================================
// OpCode
// ============================================================================

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text data.
    Text,
    /// Binary data.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
}

impl OpCode {
    /// Parses the low nibble of the first header byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Returns `true` for close, ping and pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,

    /// Frame opcode.
    pub opcode: OpCode,

    /// Whether the frame was masked on the wire.
    pub masked: bool,

    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// Creates an unmasked frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }

    /// Creates a final text frame.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(true, OpCode::Text, Bytes::from(text.into()))
    }

    /// Creates a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Creates a ping frame.
    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    /// Creates a pong frame.
    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    /// Creates a close frame with an optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let mut payload = BytesMut::new();
        if let Some(code) = code {
            payload.put_u16(code);
            payload.extend_from_slice(reason.as_bytes());
        }
        Self::new(true, OpCode::Close, payload.freeze())
    }

    /// Parses the status code and reason of a close frame.
    #[must_use]
    pub fn close_reason(&self) -> Option<(u16, String)> {
        if self.opcode != OpCode::Close || self.payload.len() < 2 {
            return None;
        }

        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
        Some((code, reason))
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Applies (or removes) a masking key in place.
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Generates a fresh masking key.
#[must_use]
pub fn generate_mask() -> [u8; 4] {
    rand::random()
}

/// Encodes `frame` into `out`, masking the payload when `mask` is given.
pub fn encode_frame(frame: &Frame, mask: Option<[u8; 4]>, out: &mut BytesMut) {
    let len = frame.payload.len();
    out.reserve(14 + len);

    let fin = if frame.fin { 0x80 } else { 0 };
    out.put_u8(fin | frame.opcode.as_u8());

    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    if len < 126 {
        out.put_u8(mask_bit | len as u8);
    } else if let Ok(len) = u16::try_from(len) {
        out.put_u8(mask_bit | 126);
        out.put_u16(len);
    } else {
        out.put_u8(mask_bit | 127);
        out.put_u64(len as u64);
    }

    match mask {
        Some(mask) => {
            out.extend_from_slice(&mask);
            let start = out.len();
            out.extend_from_slice(&frame.payload);
            apply_mask(&mut out[start..], mask);
        }
        None => out.extend_from_slice(&frame.payload),
    }
}

/// Encodes a client frame with a fresh random mask.
#[must_use]
pub fn encode_client_frame(frame: &Frame) -> Bytes {
    let mut out = BytesMut::new();
    encode_frame(frame, Some(generate_mask()), &mut out);
    out.freeze()
}

// ============================================================================
// Decoding
// ============================================================================

/// Removes one complete frame from the front of `buf`.
///
/// Returns `Ok(None)` until the whole frame is buffered. The declared
/// length is checked against `max_frame_size` before any payload is
/// consumed.
///
/// # Errors
///
/// Returns [`Error::WebSocket`] for reserved bits, unknown opcodes, invalid
/// control frames or an oversized payload.
pub fn decode_frame(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let (b0, b1) = (buf[0], buf[1]);

    if b0 & 0x70 != 0 {
        return Err(Error::websocket("Reserved bits set without a negotiated extension"));
    }

    let opcode = OpCode::from_u8(b0 & 0x0F)
        .ok_or_else(|| Error::websocket(format!("Unknown opcode: {:#x}", b0 & 0x0F)))?;
    let fin = b0 & 0x80 != 0;
    let masked = b1 & 0x80 != 0;

    let (payload_len, mut offset) = match b1 & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(len), 10)
        }
        len => (u64::from(len), 2),
    };

    if payload_len > max_frame_size as u64 {
        return Err(Error::websocket(format!(
            "Frame payload too large: {payload_len} bytes (max: {max_frame_size})"
        )));
    }
    // Bounded by max_frame_size, which is a usize.
    let payload_len = payload_len as usize;

    if opcode.is_control() && (!fin || payload_len > MAX_CONTROL_PAYLOAD) {
        return Err(Error::websocket(format!(
            "Invalid control frame: fin={fin}, length={payload_len}"
        )));
    }

    let mask = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let mask = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += 4;
        Some(mask)
    } else {
        None
    };

    let total = offset + payload_len;
    if buf.len() < total {
        buf.reserve(total - buf.len());
        return Ok(None);
    }

    buf.advance(offset);
    let mut payload = buf.split_to(payload_len);
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Some(Frame {
        fin,
        opcode,
        masked,
        payload: payload.freeze(),
    }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 10 * 1024 * 1024;

    fn round_trip(frame: &Frame, mask: Option<[u8; 4]>) -> Frame {
        let mut buf = BytesMut::new();
        encode_frame(frame, mask, &mut buf);
        let decoded = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert!(buf.is_empty());
        decoded
    }

    #[test]
    fn test_small_unmasked_frame() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::text("Hello"), None, &mut buf);
        assert_eq!(&buf[..], b"\x81\x05Hello");
    }

    #[test]
    fn test_rfc_masked_example() {
        // RFC 6455 §5.7: masked "Hello".
        let mut buf = BytesMut::from(&b"\x81\x85\x37\xfa\x21\x3d\x7f\x9f\x4d\x51\x58"[..]);
        let frame = decode_frame(&mut buf, MAX).unwrap().unwrap();

        assert!(frame.fin && frame.masked);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(&frame.payload[..], b"Hello");
    }

    #[test]
    fn test_extended_lengths() {
        let medium = Frame::binary(vec![7u8; 300]);
        let decoded = round_trip(&medium, Some([1, 2, 3, 4]));
        assert_eq!(decoded.payload, medium.payload);
        assert!(decoded.masked);

        let large = Frame::binary(vec![9u8; 70_000]);
        assert_eq!(round_trip(&large, None).payload.len(), 70_000);
    }

    #[test]
    fn test_client_frames_are_masked() {
        let encoded = encode_client_frame(&Frame::text("abc"));
        assert_eq!(encoded[1] & 0x80, 0x80);
        assert_eq!(encoded.len(), 2 + 4 + 3);

        let mut buf = BytesMut::from(&encoded[..]);
        let frame = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"abc");
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut full = BytesMut::new();
        encode_frame(&Frame::text("partial"), None, &mut full);

        let mut buf = BytesMut::from(&full[..4]);
        assert!(decode_frame(&mut buf, MAX).unwrap().is_none());
        assert_eq!(buf.len(), 4);

        buf.extend_from_slice(&full[4..]);
        assert!(decode_frame(&mut buf, MAX).unwrap().is_some());
    }

    #[test]
    fn test_oversized_frame_rejected_before_payload() {
        // Header declares 2048 bytes; none of the payload has arrived.
        let mut buf = BytesMut::from(&[0x82, 126, 0x08, 0x00][..]);
        let err = decode_frame(&mut buf, 1024).unwrap_err();

        assert!(matches!(err, Error::WebSocket { .. }));
        assert!(err.to_string().contains("Frame payload too large: 2048 bytes (max: 1024)"));
    }

    #[test]
    fn test_unknown_opcode() {
        let mut buf = BytesMut::from(&[0x83, 0x00][..]);
        let err = decode_frame(&mut buf, MAX).unwrap_err();
        assert!(err.to_string().contains("Unknown opcode"));
    }

    #[test]
    fn test_fragmented_control_frame_rejected() {
        let mut buf = BytesMut::from(&[0x09, 0x00][..]);
        assert!(decode_frame(&mut buf, MAX).is_err());
    }

    #[test]
    fn test_close_frame_reason() {
        let frame = round_trip(&Frame::close(Some(1000), "bye"), Some(generate_mask()));
        assert_eq!(frame.close_reason(), Some((1000, "bye".to_string())));
        assert_eq!(Frame::close(None, "").close_reason(), None);
    }
}
