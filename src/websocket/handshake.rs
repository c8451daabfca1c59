//! Opening handshake (RFC 6455 §4).
//!
//! The client sends an HTTP/1.1 `GET` with `Upgrade: websocket` and a random
//! `Sec-WebSocket-Key`; the server must answer `101` with
//! `Sec-WebSocket-Accept = base64(sha1(key + GUID))`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::protocol::{Headers, ResponseHead, Target, build_request};

/// Fixed GUID appended to the key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol version sent in `Sec-WebSocket-Version`.
pub const WEBSOCKET_VERSION: &str = "13";

/// Generates a `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
#[must_use]
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    STANDARD.encode(nonce)
}

/// Computes the `Sec-WebSocket-Accept` value expected for `key`.
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Serializes the upgrade request.
///
/// Caller headers replace the handshake headers of the same name.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if a header contains CR, LF or NUL.
pub fn build_handshake_request(
    target: &Target,
    key: &str,
    headers: &Headers,
    subprotocols: &[String],
) -> Result<Vec<u8>> {
    let mut merged = Headers::new();
    merged.insert("Upgrade", "websocket");
    merged.insert("Connection", "Upgrade");
    merged.insert("Sec-WebSocket-Key", key);
    merged.insert("Sec-WebSocket-Version", WEBSOCKET_VERSION);
    if !subprotocols.is_empty() {
        merged.insert("Sec-WebSocket-Protocol", subprotocols.join(", "));
    }
    merged.extend_replace(headers);

    build_request("GET", &target.path, &target.host_header, &merged, b"")
}

/// Checks the server's answer to the upgrade request.
///
/// Returns the negotiated subprotocol, if any.
///
/// # Errors
///
/// Returns [`Error::WebSocket`] unless the status is `101` and the accept
/// value matches `key`.
pub fn validate_handshake_response(head: &ResponseHead, key: &str) -> Result<Option<String>> {
    if head.status_code != 101 {
        return Err(Error::websocket(format!(
            "WebSocket handshake failed with status {}",
            head.status_code
        )));
    }

    let expected = compute_accept_key(key);
    let actual = head.headers.first("sec-websocket-accept").unwrap_or_default();
    if actual != expected {
        return Err(Error::websocket(format!(
            "Invalid Sec-WebSocket-Accept header. Expected: {expected}, Got: {actual}"
        )));
    }

    Ok(head.headers.first("sec-websocket-protocol").map(str::to_owned))
}

// ============================================================================
// Tests
// ============================================================================
