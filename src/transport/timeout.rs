//! Connect/read/total timeouts.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Timeout
// ============================================================================

/// Timeout configuration for a connection.
///
/// `connect` bounds TCP connect plus TLS handshake, `read` bounds each
/// socket read. `total` is the fallback for whichever of the two is unset.
/// A value of `None` everywhere means no deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timeout {
    /// Connect deadline.
    pub connect: Option<Duration>,

    /// Per-read deadline.
    pub read: Option<Duration>,

    /// Fallback for unset phases.
    pub total: Option<Duration>,
}

impl Timeout {
    /// No deadlines at all.
    pub const NONE: Self = Self {
        connect: None,
        read: None,
        total: None,
    };

    /// Creates a timeout with the same duration for every phase.
    #[inline]
    #[must_use]
    pub const fn from_duration(duration: Duration) -> Self {
        Self {
            connect: Some(duration),
            read: Some(duration),
            total: Some(duration),
        }
    }

    /// Creates a timeout with separate phases.
    #[inline]
    #[must_use]
    pub const fn new(
        connect: Option<Duration>,
        read: Option<Duration>,
        total: Option<Duration>,
    ) -> Self {
        Self {
            connect,
            read,
            total,
        }
    }

    /// Returns the deadline for connecting (`connect`, else `total`).
    #[inline]
    #[must_use]
    pub const fn connect_deadline(&self) -> Option<Duration> {
        match self.connect {
            Some(d) => Some(d),
            None => self.total,
        }
    }

    /// Returns the deadline for each read (`read`, else `total`).
    #[inline]
    #[must_use]
    pub const fn read_deadline(&self) -> Option<Duration> {
        match self.read {
            Some(d) => Some(d),
            None => self.total,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_duration_sets_all() {
        let t = Timeout::from(Duration::from_secs(5));
        assert_eq!(t.connect, Some(Duration::from_secs(5)));
        assert_eq!(t.read, Some(Duration::from_secs(5)));
        assert_eq!(t.total, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_fallback_to_total() {
        let t = Timeout::new(None, Some(Duration::from_secs(2)), Some(Duration::from_secs(9)));
        assert_eq!(t.connect_deadline(), Some(Duration::from_secs(9)));
        assert_eq!(t.read_deadline(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_none() {
        assert_eq!(Timeout::NONE.connect_deadline(), None);
        assert_eq!(Timeout::default(), Timeout::NONE);
    }
}
