//! WebSocket session configuration.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{Headers, Limits};
use crate::transport::Timeout;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum frame payload (10 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Default number of reconnect attempts per failed send.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Default base delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// WebSocketConfig
// ============================================================================

/// Session options.
///
/// | Option | Default |
/// |--------|---------|
/// | `timeout` | none |
/// | `max_frame_size` | 10 MiB |
/// | `auto_reconnect` | `false` |
/// | `max_reconnect_attempts` | 3 |
/// | `reconnect_delay` | 1 s, doubled per attempt |
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Connect and read deadlines.
    pub timeout: Timeout,

    /// Extra handshake headers; they replace handshake headers by name.
    pub headers: Headers,

    /// Offered subprotocols.
    pub subprotocols: Vec<String>,

    /// Largest accepted frame payload.
    pub max_frame_size: usize,

    /// Limits applied to the handshake response head.
    pub limits: Limits,

    /// Reconnect and retry when a send hits a connection error.
    pub auto_reconnect: bool,

    /// Retries per send before the error propagates.
    pub max_reconnect_attempts: u32,

    /// Base backoff delay.
    pub reconnect_delay: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            timeout: Timeout::NONE,
            headers: Headers::new(),
            subprotocols: Vec::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            limits: Limits::default(),
            auto_reconnect: false,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl WebSocketConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Adds a handshake header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Offers a subprotocol.
    #[inline]
    #[must_use]
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    /// Sets the maximum frame payload.
    #[inline]
    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Enables or disables reconnect on send failure.
    #[inline]
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the retry budget per send.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the base backoff delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Returns the sleep before retry number `attempt` (zero-based):
    /// `reconnect_delay * 2^attempt`, saturating.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reconnect_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Returns `true` if a send that failed with `error` on retry number
    /// `attempt` should reconnect and try again.
    #[must_use]
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        self.auto_reconnect && attempt < self.max_reconnect_attempts && error.is_connection_error()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 {
            return Err(Error::config("max_frame_size must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_frame_size, 10 * 1024 * 1024);
        assert!(!config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.timeout, Timeout::NONE);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = WebSocketConfig::new().reconnect_delay(Duration::from_millis(100));
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(200), Duration::MAX);
    }

    #[test]
    fn test_should_retry() {
        let config = WebSocketConfig::new().auto_reconnect(true).max_reconnect_attempts(2);
        let network = Error::network("reset");

        assert!(config.should_retry(&network, 0));
        assert!(config.should_retry(&network, 1));
        assert!(!config.should_retry(&network, 2));
        assert!(!config.should_retry(&Error::invalid_request("bad"), 0));
        assert!(!WebSocketConfig::new().should_retry(&network, 0));
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let err = WebSocketConfig::new().max_frame_size(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
