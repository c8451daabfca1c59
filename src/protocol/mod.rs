//! HTTP/1.1 wire codec.
//!
//! Everything in this module is sans-IO: it turns values into bytes and
//! bytes into values, and is driven by both the blocking and the async
//! transports.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `headers` | Case-insensitive multi-value header map |
//! | `limits` | Parser size limits |
//! | `request` | Request serialization and header validation |
//! | `parse` | Status/request line and header block parsing |
//! | `response` | Fully-read [`Response`] |
//! | `body` | Request bodies, chunked coding, response body framing |
//! | `target` | URL to host/port/path resolution |

// ============================================================================
// Submodules
// ============================================================================

/// Request and response bodies.
pub mod body;

/// Header map.
pub mod headers;

/// Parser size limits.
pub mod limits;

/// Message head parsing.
pub mod parse;

/// Request serialization.
pub mod request;

/// Response type.
pub mod response;

/// URL resolution.
pub mod target;

// ============================================================================
// Re-exports
// ============================================================================

pub use body::{
    AsyncBody, Body, BodyDecoder, BodyKind, ChunkIter, ChunkStream, ChunkedDecoder, encode_chunk,
    write_chunked, write_chunked_async,
};
pub use headers::Headers;
pub use limits::Limits;
pub use parse::{
    RequestHead, ResponseHead, find_header_end, parse_request, parse_response, take_response_head,
};
pub use request::{USER_AGENT, build_request, build_request_headers, requests_close};
pub use response::Response;
pub use target::Target;
