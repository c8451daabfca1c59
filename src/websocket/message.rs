//! Messages and fragment reassembly.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

use super::frame::{Frame, OpCode};

// ============================================================================
// Message
// ============================================================================

/// A complete application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
}

impl Message {
    /// Returns the text, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Returns `true` for a text message.
    #[inline]
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Converts into a single final frame.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::text(text),
            Self::Binary(data) => Frame::binary(data),
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(data))
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// What one decoded frame amounts to once fragments are accounted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete data message.
    Message(Message),
    /// A ping with its payload.
    Ping(Bytes),
    /// A pong with its payload.
    Pong(Bytes),
    /// A close frame with its optional code and reason.
    Close(Option<(u16, String)>),
}

// ============================================================================
// MessageAssembler
// ============================================================================

/// Joins fragmented data frames into messages.
///
/// Control frames may be interleaved with fragments and pass straight
/// through. A finished message is text when its payload is valid UTF-8 and
/// binary otherwise.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
    in_progress: bool,
}

impl MessageAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a fragmented message is incomplete.
    #[inline]
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Drops any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_progress = false;
    }

    /// Feeds one frame.
    ///
    /// Returns `Ok(None)` for a non-final data fragment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] for a continuation without a started
    /// message or a new data frame while one is in progress.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Incoming>> {
        match frame.opcode {
            OpCode::Ping => return Ok(Some(Incoming::Ping(frame.payload))),
            OpCode::Pong => return Ok(Some(Incoming::Pong(frame.payload))),
            OpCode::Close => return Ok(Some(Incoming::Close(frame.close_reason()))),
            OpCode::Continuation => {
                if !self.in_progress {
                    return Err(Error::websocket("Continuation frame without a started message"));
                }
            }
            OpCode::Text | OpCode::Binary => {
                if self.in_progress {
                    return Err(Error::websocket(
                        "New data frame received before the previous message finished",
                    ));
                }
                self.in_progress = true;
            }
        }

        self.buffer.extend_from_slice(&frame.payload);
        if !frame.fin {
            return Ok(None);
        }

        self.in_progress = false;
        let payload = self.buffer.split().freeze();
        let message = match String::from_utf8(payload.to_vec()) {
            Ok(text) => Message::Text(text),
            Err(_) => Message::Binary(payload),
        };

        Ok(Some(Incoming::Message(message)))
    }
}

// ============================================================================
// Tests
// ============================================================================
