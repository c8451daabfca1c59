//! Size limits enforced by the response parser and body decoder.

// ============================================================================
// Constants
// ============================================================================

/// Default maximum size of the response head (status line + headers).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8192;

/// Default maximum size of a single status or header line.
pub const DEFAULT_MAX_LINE_SIZE: usize = 8192;

/// Default maximum number of header lines.
pub const DEFAULT_MAX_FIELD_COUNT: usize = 100;

// ============================================================================
// Limits
// ============================================================================

/// Caller-configurable size limits for parsing responses.
///
/// Exceeding any limit fails with [`Error::Protocol`](crate::Error::Protocol);
/// such failures are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum bytes before the `\r\n\r\n` head delimiter must appear.
    pub max_header_size: usize,

    /// Maximum length of any single head line.
    pub max_line_size: usize,

    /// Maximum number of header lines.
    pub max_field_count: usize,

    /// Maximum decoded body size, unlimited when `None`.
    pub max_body_size: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Limits {
    /// Creates limits with the default values.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            max_field_count: DEFAULT_MAX_FIELD_COUNT,
            max_body_size: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Limits {
    /// Sets the maximum response head size.
    #[inline]
    #[must_use]
    pub const fn with_max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    /// Sets the maximum line size.
    #[inline]
    #[must_use]
    pub const fn with_max_line_size(mut self, size: usize) -> Self {
        self.max_line_size = size;
        self
    }

    /// Sets the maximum number of header fields.
    #[inline]
    #[must_use]
    pub const fn with_max_field_count(mut self, count: usize) -> Self {
        self.max_field_count = count;
        self
    }

    /// Sets the maximum decoded body size.
    #[inline]
    #[must_use]
    pub const fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = Some(size);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
