//! HTTP client core.
//!
//! Turns a [`Request`] into a final [`Response`](crate::Response): pooled
//! connection checkout, request serialization, response parsing and the
//! redirect loop.
//!
//! # Flow
//!
//! ```text
//! Request ─► RedirectState ─► exchange ─► Response ─┬─► observer
//!                 ▲                                 │
//!                 └────────── redirect? ◄───────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | `ClientConfig` and `ClientBuilder` |
//! | `request` | Request value with per-request overrides |
//! | `redirect` | Redirect state machine |
//! | `blocking` | `Client` |
//! | `nonblocking` | `AsyncClient` |

// ============================================================================
// Submodules
// ============================================================================

/// Blocking client.
pub mod blocking;

/// Client configuration and builder.
pub mod builder;

/// Shared exchange helpers.
mod exchange;

/// Async client.
pub mod nonblocking;

/// Redirect engine.
pub mod redirect;

/// Request type.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use blocking::Client;
pub use builder::{ClientBuilder, ClientConfig, DEFAULT_TIMEOUT};
pub use nonblocking::AsyncClient;
pub use redirect::{DEFAULT_MAX_REDIRECTS, REDIRECT_STATUSES, RedirectState, RequestBody};
pub use request::{AsyncRequest, Request, ResponseObserver};
