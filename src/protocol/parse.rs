//! HTTP/1.1 message head parsing.
//!
//! Parses the status line (or request line) and header block of a message
//! whose head is terminated by `\r\n\r\n`. Everything here is sans-IO: the
//! blocking and async connections both feed their read buffer through
//! [`take_response_head`] until a complete head is available.
//!
//! # Limits
//!
//! | Check | Error |
//! |-------|-------|
//! | head longer than `max_header_size` | `Protocol("Headers exceed maximum size of N bytes")` |
//! | status line longer than `max_line_size` | `Protocol("Status line too long")` |
//! | header line longer than `max_line_size` | `Protocol("Header line too long")` |
//! | more than `max_field_count` header lines | `Protocol("Too many header fields")` |
//! | delimiter missing | `InvalidResponse("Incomplete response: ...")` |
//! | malformed status line | `InvalidResponse("Invalid status line: ...")` |

// ============================================================================
// Imports
// ============================================================================

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};

use super::headers::{Headers, normalize_name};
use super::limits::Limits;

// ============================================================================
// Constants
// ============================================================================

/// Head/body delimiter.
const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";

// ============================================================================
// Parsed Heads
// ============================================================================

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Numeric status code.
    pub status_code: u16,

    /// Full status line, e.g. `HTTP/1.1 200 OK`.
    pub status_line: String,

    /// Parsed headers with normalized names.
    pub headers: Headers,
}

impl ResponseHead {
    /// Returns `true` for 1xx interim responses other than `101`.
    #[inline]
    #[must_use]
    pub fn is_interim(&self) -> bool {
        (100..200).contains(&self.status_code) && self.status_code != 101
    }
}

/// Request line and headers of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method.
    pub method: String,

    /// Request target as sent on the wire.
    pub path: String,

    /// Parsed headers with normalized names.
    pub headers: Headers,
}

// ============================================================================
// Public API
// ============================================================================

/// Returns the index of the `\r\n\r\n` delimiter, if present.
#[must_use]
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(HEAD_DELIMITER.len())
        .position(|window| window == HEAD_DELIMITER)
}

/// Parses a complete response head from `data`.
///
/// Returns the head and the bytes following the delimiter.
///
/// # Errors
///
/// See the module-level table.
pub fn parse_response<'a>(data: &'a [u8], limits: &Limits) -> Result<(ResponseHead, &'a [u8])> {
    let end = locate_head(data, limits)?;
    let head = parse_response_head(&data[..end], limits)?;
    Ok((head, &data[end + HEAD_DELIMITER.len()..]))
}

/// Parses a complete request head from `data`.
///
/// Returns the head and the bytes following the delimiter.
///
/// # Errors
///
/// Same limits as [`parse_response`]; a malformed request line is
/// [`Error::InvalidRequest`].
pub fn parse_request<'a>(data: &'a [u8], limits: &Limits) -> Result<(RequestHead, &'a [u8])> {
    let end = locate_head(data, limits)?;
    let text = String::from_utf8_lossy(&data[..end]);
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    check_line(request_line, limits, "Request line too long")?;

    let mut parts = request_line.split(' ');
    let (Some(method), Some(path), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::invalid_request(format!(
            "Invalid request line: {request_line}"
        )));
    };

    if method.is_empty() || path.is_empty() || !version.starts_with("HTTP/") {
        return Err(Error::invalid_request(format!(
            "Invalid request line: {request_line}"
        )));
    }

    let headers = parse_header_lines(lines, limits)?;

    Ok((
        RequestHead {
            method: method.to_string(),
            path: path.to_string(),
            headers,
        },
        &data[end + HEAD_DELIMITER.len()..],
    ))
}

/// Removes a complete response head from the front of `buf`.
///
/// Returns `Ok(None)` while the delimiter has not arrived yet; the bytes
/// after the delimiter stay in `buf`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] as soon as the buffered head exceeds
/// `max_header_size`, plus any error of [`parse_response`].
pub fn take_response_head(buf: &mut BytesMut, limits: &Limits) -> Result<Option<ResponseHead>> {
    let Some(end) = find_header_end(buf) else {
        if buf.len() > limits.max_header_size {
            return Err(header_size_error(limits));
        }
        return Ok(None);
    };

    if end > limits.max_header_size {
        return Err(header_size_error(limits));
    }

    let head = parse_response_head(&buf[..end], limits)?;
    buf.advance(end + HEAD_DELIMITER.len());

    Ok(Some(head))
}

// ============================================================================
// Internals
// ============================================================================

fn header_size_error(limits: &Limits) -> Error {
    Error::protocol(format!(
        "Headers exceed maximum size of {} bytes",
        limits.max_header_size
    ))
}

fn locate_head(data: &[u8], limits: &Limits) -> Result<usize> {
    match find_header_end(data) {
        Some(end) if end > limits.max_header_size => Err(header_size_error(limits)),
        Some(end) => Ok(end),
        None if data.len() > limits.max_header_size => Err(header_size_error(limits)),
        None => Err(Error::invalid_response(
            "Incomplete response: headers delimiter not found",
        )),
    }
}

/// Parses the head bytes (without the trailing delimiter).
fn parse_response_head(head: &[u8], limits: &Limits) -> Result<ResponseHead> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    check_line(status_line, limits, "Status line too long")?;
    let status_code = parse_status_line(status_line)?;

    let headers = parse_header_lines(lines, limits)?;

    Ok(ResponseHead {
        status_code,
        status_line: status_line.to_string(),
        headers,
    })
}

fn parse_status_line(line: &str) -> Result<u16> {
    let invalid = || Error::invalid_response(format!("Invalid status line: {line}"));

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().ok_or_else(invalid)?;
    let code = parts.next().ok_or_else(invalid)?;

    let digits = code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit());
    if !version.starts_with("HTTP/") || !digits {
        return Err(invalid());
    }

    code.parse::<u16>().map_err(|_| invalid())
}

fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>, limits: &Limits) -> Result<Headers> {
    let mut headers = Headers::new();

    for (count, line) in lines.enumerate() {
        if count >= limits.max_field_count {
            return Err(Error::protocol("Too many header fields"));
        }
        check_line(line, limits, "Header line too long")?;

        // Lines without a colon are ignored.
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };

        headers.append(normalize_name(name), value.trim());
    }

    Ok(headers)
}

#[inline]
fn check_line(line: &str, limits: &Limits, message: &'static str) -> Result<()> {
    if line.len() > limits.max_line_size {
        return Err(Error::protocol(message));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
