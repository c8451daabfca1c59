//! Case-insensitive, multi-valued HTTP header map.
//!
//! Names keep their insertion order so requests serialize deterministically.
//! Every name maps to an ordered list of values; repeated headers are never
//! merged at insertion time.
//!
//! # Single-value reads
//!
//! [`Headers::get`] joins multiple values with `", "` as RFC 7230 allows,
//! except for `Set-Cookie` (RFC 6265) where only the first value is
//! returned. [`Headers::get_all`] always returns every value.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Header whose values must never be comma-joined.
const SET_COOKIE: &str = "set-cookie";

// ============================================================================
// Headers
// ============================================================================

/// Case-insensitive mapping from header name to an ordered list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    /// `(name, values)` pairs in first-insertion order.
    entries: Vec<(String, Vec<String>)>,
}

// ============================================================================
// Headers - Constructors
// ============================================================================

impl Headers {
    /// Creates an empty header map.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates a header map from `(name, value)` pairs, appending repeats.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        pairs.into_iter().collect()
    }
}

// ============================================================================
// Headers - Lookup
// ============================================================================

impl Headers {
    /// Returns the value of a header as a single string.
    ///
    /// Multiple values are joined with `", "`. For `Set-Cookie` only the
    /// first value is returned.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let values = self.values(name)?;

        if name.eq_ignore_ascii_case(SET_COOKIE) {
            return values.first().cloned();
        }

        Some(values.join(", "))
    }

    /// Returns the first value of a header without allocating.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name)?.first().map(String::as_str)
    }

    /// Returns every value of a header, or an empty slice.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.values(name).unwrap_or(&[])
    }

    /// Returns `true` if the header is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns `true` if any comma-separated token of the header equals
    /// `token` (ASCII case-insensitive).
    #[must_use]
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .iter()
            .flat_map(|value| value.split(','))
            .any(|part| part.trim().eq_ignore_ascii_case(token))
    }

    /// Returns the number of distinct header names.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over header names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates over every `(name, value)` pair, one item per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    fn values(&self, name: &str) -> Option<&[String]> {
        self.position(name)
            .map(|idx| self.entries[idx].1.as_slice())
            .filter(|values| !values.is_empty())
    }
}

// ============================================================================
// Headers - Mutation
// ============================================================================

impl Headers {
    /// Sets a header, replacing any existing values.
    ///
    /// An existing name keeps its position and its original spelling.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = vec![value],
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Appends a value to a header, keeping existing values.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Removes a header, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let idx = self.position(name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Keeps only the headers whose name satisfies the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(name, _)| keep(name));
    }

    /// Merges `other` into `self`, replacing headers with the same name.
    pub fn extend_replace(&mut self, other: &Headers) {
        for (name, values) in &other.entries {
            match self.position(name) {
                Some(idx) => self.entries[idx].1 = values.clone(),
                None => self.entries.push((name.clone(), values.clone())),
            }
        }
    }
}

// ============================================================================
// Name Normalization
// ============================================================================

/// Normalizes a header name to capitalized-hyphenated form.
///
/// `content-type` becomes `Content-Type`, `X-REQUEST-ID` becomes
/// `X-Request-Id`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());

    for (idx, part) in name.trim().split('-').enumerate() {
        if idx > 0 {
            normalized.push('-');
        }

        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            normalized.push(first.to_ascii_uppercase());
            normalized.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }

    normalized
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
