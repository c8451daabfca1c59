//! Connection transport layer.
//!
//! Owns sockets: TCP connect, TLS handshake, read deadlines, and the
//! per-endpoint pool that reuses them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────────┐
//! │  ConnectionPool  │      │ AsyncConnectionPool  │
//! │  (BlockingGate)  │      │ (AsyncGate)          │
//! └────────┬─────────┘      └──────────┬───────────┘
//!          │       PoolCore (shared)   │
//!          ▼                           ▼
//! ┌──────────────────┐      ┌──────────────────────┐
//! │    Connection    │      │   AsyncConnection    │
//! │ std TCP + rustls │      │ tokio + tokio-rustls │
//! └──────────────────┘      └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `timeout` | Connect/read/total deadlines |
//! | `tls` | Shared rustls client configuration |
//! | `connection` | Blocking connection |
//! | `async_connection` | Tokio connection |
//! | `pool` | Pool keys, config, shared bookkeeping, blocking pool |
//! | `async_pool` | Tokio pool |

// ============================================================================
// Submodules
// ============================================================================

/// Tokio connection.
pub mod async_connection;

/// Tokio connection pool.
pub mod async_pool;

/// Blocking connection.
pub mod connection;

/// Pool bookkeeping and blocking pool.
pub mod pool;

/// Timeout configuration.
pub mod timeout;

/// TLS configuration.
pub mod tls;

// ============================================================================
// Re-exports
// ============================================================================

pub use async_connection::AsyncConnection;
pub use async_pool::{AsyncConnectionPool, AsyncGate, AsyncPooledConnection};
pub use connection::Connection;
pub use pool::{
    BlockingGate, ConnectionPool, PermitGate, PoolConfig, PoolKey, Poolable, PooledConnection,
};
pub use timeout::Timeout;
