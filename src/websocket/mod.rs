//! WebSocket client (RFC 6455).
//!
//! # Session States
//!
//! ```text
//!   new ──► Idle ──connect──► Open ──close──► Closed
//!                              │ ▲
//!          peer close / error  │ │ reconnect (send with auto_reconnect)
//!                              ▼ │
//!                            Dropped
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame codec and masking |
//! | `handshake` | Upgrade request and accept-key check |
//! | `message` | Messages and fragment reassembly |
//! | `config` | Session options and backoff |
//! | `blocking` | `WebSocket` |
//! | `nonblocking` | `AsyncWebSocket` |

// ============================================================================
// Submodules
// ============================================================================

/// Blocking session.
pub mod blocking;

/// Session configuration.
pub mod config;

/// Frame codec.
pub mod frame;

/// Opening handshake.
pub mod handshake;

/// Messages and reassembly.
pub mod message;

/// Async session.
pub mod nonblocking;

// ============================================================================
// Re-exports
// ============================================================================

pub use blocking::WebSocket;
pub use config::WebSocketConfig;
pub use frame::{Frame, OpCode};
pub use message::{Incoming, Message, MessageAssembler};
pub use nonblocking::AsyncWebSocket;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Never connected.
    Idle,
    /// Handshake complete.
    Open,
    /// Connection lost without a local close; a send may reconnect.
    Dropped,
    /// Closed locally.
    Closed,
}
