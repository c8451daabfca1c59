//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] and
//! [`AsyncClient`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use reqwire::Client;
//!
//! # fn example() -> reqwire::Result<()> {
//! let client = Client::builder()
//!     .timeout(Duration::from_secs(10))
//!     .max_redirects(5)
//!     .pool_max_size(4)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::Limits;
use crate::transport::{PoolConfig, Timeout};

use super::blocking::Client;
use super::nonblocking::AsyncClient;
use super::redirect::DEFAULT_MAX_REDIRECTS;

// ============================================================================
// Constants
// ============================================================================

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ClientConfig
// ============================================================================

/// Settings shared by every request of a client.
///
/// Per-request overrides on [`Request`](super::Request) take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connect and read deadlines.
    pub timeout: Timeout,

    /// Parser limits.
    pub limits: Limits,

    /// Follow redirects.
    pub allow_redirects: bool,

    /// Redirect budget.
    pub max_redirects: usize,

    /// Connection pool settings.
    pub pool: PoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Timeout::from_duration(DEFAULT_TIMEOUT),
            limits: Limits::default(),
            allow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            pool: PoolConfig::default(),
        }
    }
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] or [`AsyncClient`].
///
/// Use [`Client::builder()`] or [`AsyncClient::builder()`] to create one.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout. A bare [`Duration`] applies to every phase.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.config.timeout = timeout.into();
        self
    }

    /// Sets the parser limits.
    #[inline]
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Enables or disables redirect following.
    #[inline]
    #[must_use]
    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.config.allow_redirects = allow;
        self
    }

    /// Sets the redirect budget.
    #[inline]
    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Sets the maximum connections per endpoint.
    #[inline]
    #[must_use]
    pub fn pool_max_size(mut self, max_size: usize) -> Self {
        self.config.pool.max_size = max_size;
        self
    }

    /// Sets how long an idle connection may stay pooled.
    #[inline]
    #[must_use]
    pub fn pool_max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.config.pool.max_idle_time = max_idle_time;
        self
    }

    /// Builds a blocking client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a setting is out of range.
    pub fn build(self) -> Result<Client> {
        self.validate()?;
        Ok(Client::with_config(self.config))
    }

    /// Builds an async client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a setting is out of range.
    pub fn build_async(self) -> Result<AsyncClient> {
        self.validate()?;
        Ok(AsyncClient::with_config(self.config))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    fn validate(&self) -> Result<()> {
        self.validate_pool()?;
        self.validate_timeout()?;
        self.validate_limits()
    }

    fn validate_pool(&self) -> Result<()> {
        if self.config.pool.max_size == 0 {
            return Err(Error::config(
                "pool_max_size must be at least 1.\n\
                 Example: Client::builder().pool_max_size(10)",
            ));
        }
        Ok(())
    }

    fn validate_timeout(&self) -> Result<()> {
        let Timeout {
            connect,
            read,
            total,
        } = self.config.timeout;

        for (phase, value) in [("connect", connect), ("read", read), ("total", total)] {
            if value.is_some_and(|d| d.is_zero()) {
                return Err(Error::config(format!(
                    "{phase} timeout must be non-zero; use no timeout instead"
                )));
            }
        }
        Ok(())
    }

    fn validate_limits(&self) -> Result<()> {
        let limits = &self.config.limits;
        if limits.max_header_size == 0 || limits.max_line_size == 0 || limits.max_field_count == 0 {
            return Err(Error::config("parser limits must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
