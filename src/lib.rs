//! reqwire - HTTP/1.1 and WebSocket client engine.
//!
//! This library implements the wire-level core of an HTTP client: pooled
//! TCP/TLS connections, request serialization, response parsing, chunked
//! transfer encoding, redirect following and a WebSocket client with
//! automatic reconnect. Every component has a blocking and a tokio flavour
//! sharing one sans-IO codec.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐   ┌─────────────────────────────┐
//! │ Client / AsyncClient    │   │ WebSocket / AsyncWebSocket  │
//! │ redirects, observer     │   │ frames, ping/pong, backoff  │
//! └────────────┬────────────┘   └──────────────┬──────────────┘
//!              │        protocol (sans-IO)     │
//!              ▼                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │ transport: Connection, AsyncConnection, pools, TLS, timeouts │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Key design principles:
//!
//! - Parsing never owns a socket; both backends feed the same buffers
//! - A connection is exclusively owned by the pool or by one request
//! - Per-endpoint permits bound concurrency; waiting never spins
//! - Only a fully consumed, keep-alive exchange returns to the pool
//!
//! # Quick Start
//!
//! ```no_run
//! use reqwire::{AsyncClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = AsyncClient::new();
//!
//!     let response = client.get("https://example.com/").await?;
//!     println!("{} ({} redirects)", response.status_code, response.history.len());
//!     println!("{}", response.text());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], [`AsyncClient`], [`Request`], redirects |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Headers, limits, codec, [`Response`] |
//! | [`transport`] | Connections, pools, TLS, [`Timeout`] |
//! | [`websocket`] | [`WebSocket`], [`AsyncWebSocket`], frame codec |

// ============================================================================
// Modules
// ============================================================================

/// HTTP client core.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// HTTP/1.1 wire codec.
///
/// Sans-IO building blocks shared by the blocking and async paths.
pub mod protocol;

/// Connection transport layer.
///
/// Sockets, TLS, deadlines and connection pools.
pub mod transport;

/// WebSocket client.
pub mod websocket;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    AsyncClient, AsyncRequest, Client, ClientBuilder, ClientConfig, Request, ResponseObserver,
};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{AsyncBody, Body, Headers, Limits, Response};

// Transport types
pub use transport::{AsyncConnectionPool, ConnectionPool, PoolConfig, Timeout};

// WebSocket types
pub use websocket::{AsyncWebSocket, Message, WebSocket, WebSocketConfig};
