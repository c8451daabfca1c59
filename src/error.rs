//! Error types for reqwire.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use reqwire::{Client, Request, Result};
//!
//! fn example(client: &Client) -> Result<()> {
//!     let response = client.send(Request::get("http://example.com/")?)?;
//!     println!("{}", response.status_code);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! The variants are flat, the taxonomy lives in the predicates:
//!
//! | Category | Variants | Predicate |
//! |----------|----------|-----------|
//! | Request | everything except WebSocket and configuration errors | [`Error::is_request_error`] |
//! | Network | [`Error::Network`], [`Error::Tls`], [`Error::Io`] | [`Error::is_network`] |
//! | Timeout | [`Error::ConnectTimeout`], [`Error::ReadTimeout`] | [`Error::is_timeout`] |
//! | Protocol | [`Error::Protocol`], [`Error::InvalidResponse`] | [`Error::is_protocol`] |
//! | Redirect | [`Error::RedirectLoop`], [`Error::TooManyRedirects`] | [`Error::is_redirect_error`] |
//! | WebSocket | [`Error::WebSocket`], [`Error::ConnectionClosed`] | [`Error::is_connection_error`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use url::ParseError as UrlError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant carries a human-readable message describing the failure.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid client, pool or WebSocket configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Malformed caller input.
    ///
    /// Returned for unparsable URLs, unsupported schemes, header injection
    /// attempts and bodies that cannot be replayed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the invalid input.
        message: String,
    },

    // ========================================================================
    // Network Errors
    // ========================================================================
    /// Socket-level I/O failure.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// TLS certificate verification or handshake failure.
    #[error("TLS error: {message}")]
    Tls {
        /// Description of the TLS failure.
        message: String,
    },

    // ========================================================================
    // Timeout Errors
    // ========================================================================
    /// Connect phase (TCP connect or TLS handshake) exceeded its deadline.
    #[error("Connect timeout: {message}")]
    ConnectTimeout {
        /// Description of the timed out operation.
        message: String,
    },

    /// A read exceeded the read deadline.
    ///
    /// The connection state is undefined afterwards and must be discarded.
    #[error("Read timeout: {message}")]
    ReadTimeout {
        /// Description of the timed out operation.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Wire-format violation or size limit breach.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The peer sent a response that could not be understood.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description of the malformed response.
        message: String,
    },

    // ========================================================================
    // Redirect Errors
    // ========================================================================
    /// A redirect chain revisited a URL.
    #[error("Redirect loop detected at {url}")]
    RedirectLoop {
        /// The URL that was visited twice.
        url: String,
    },

    /// The redirect chain exceeded the configured maximum.
    #[error("Exceeded {max_redirects} redirects")]
    TooManyRedirects {
        /// The configured maximum.
        max_redirects: usize,
    },

    // ========================================================================
    // WebSocket Errors
    // ========================================================================
    /// WebSocket handshake or framing violation.
    #[error("WebSocket error: {message}")]
    WebSocket {
        /// Description of the WebSocket failure.
        message: String,
    },

    /// The connection was closed (by the peer or locally).
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    #[inline]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a TLS error.
    #[inline]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(message: impl Into<String>) -> Self {
        Self::ConnectTimeout {
            message: message.into(),
        }
    }

    /// Creates a read timeout error.
    #[inline]
    pub fn read_timeout(message: impl Into<String>) -> Self {
        Self::ReadTimeout {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[inline]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Creates a redirect loop error.
    #[inline]
    pub fn redirect_loop(url: impl Into<String>) -> Self {
        Self::RedirectLoop { url: url.into() }
    }

    /// Creates a too many redirects error.
    #[inline]
    pub fn too_many_redirects(max_redirects: usize) -> Self {
        Self::TooManyRedirects { max_redirects }
    }

    /// Creates a WebSocket error.
    #[inline]
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Classifies an I/O error raised while reading a response.
    ///
    /// `WouldBlock`/`TimedOut` come from an expired socket read deadline.
    pub(crate) fn from_read_io(err: IoError, context: &str) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Self::read_timeout(format!("{context}: {err}"))
            }
            _ => Self::network(format!("{context}: {err}")),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` for every error raised by the HTTP request path.
    ///
    /// This is the root of the taxonomy; only WebSocket framing errors and
    /// configuration errors sit outside of it.
    #[inline]
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        !matches!(
            self,
            Self::WebSocket { .. } | Self::ConnectionClosed | Self::Config { .. }
        )
    }

    /// Returns `true` if this is a socket-level failure (including TLS).
    #[inline]
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Tls { .. } | Self::Io(_))
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectTimeout { .. } | Self::ReadTimeout { .. })
    }

    /// Returns `true` if this is a wire-format violation.
    #[inline]
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::InvalidResponse { .. })
    }

    /// Returns `true` if this error came from the redirect engine.
    #[inline]
    #[must_use]
    pub fn is_redirect_error(&self) -> bool {
        matches!(
            self,
            Self::RedirectLoop { .. } | Self::TooManyRedirects { .. }
        )
    }

    /// Returns `true` if the underlying connection failed.
    ///
    /// These are the failures the WebSocket reconnect loop retries.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        self.is_network()
            || self.is_timeout()
            || matches!(self, Self::WebSocket { .. } | Self::ConnectionClosed)
    }

    /// Returns `true` if the connection that produced this error must not
    /// be returned to a pool.
    #[inline]
    #[must_use]
    pub fn poisons_connection(&self) -> bool {
        self.is_network() || self.is_timeout() || self.is_protocol()
    }
}

// ============================================================================
// Tests
// ============================================================================
