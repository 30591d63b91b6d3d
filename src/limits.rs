//! Parser caps, socket timeouts, and buffer sizing.
//!
//! Defaults are intentionally conservative: every token class the parser
//! accumulates has an explicit ceiling, so a misbehaving peer can never
//! grow an unbounded allocation. Raise a cap only when a legitimate
//! workload trips it.

use std::time::Duration;

/// Ceilings applied by the incremental message parser.
///
/// Exceeding any of these fails the parse with `TooLarge` naming the
/// offending token; the server answers `400` and closes.
#[derive(Debug, Clone)]
pub struct ParserLimits {
    /// Maximum method length in bytes (default: `8`, fits `OPTIONS`).
    pub max_method: usize,

    /// Maximum URI-stem length in bytes (default: `1024`).
    pub max_uri: usize,

    /// Maximum query-string length in bytes (default: `1024`).
    pub max_query: usize,

    /// Maximum header name length in bytes (default: `1024`).
    pub max_header_name: usize,

    /// Maximum header value length in bytes (default: `8192`).
    pub max_header_value: usize,

    /// Maximum number of hex digits in a chunk-size line (default: `8`).
    pub max_chunk_digits: usize,

    /// Maximum accepted content length in bytes (default: `1 MiB`).
    ///
    /// Applies to `Content-Length` declarations before any body byte is
    /// read, and to the accumulated size of chunked and until-EOF bodies.
    pub max_content_length: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_method: 8,
            max_uri: 1024,
            max_query: 1024,
            max_header_name: 1024,
            max_header_value: 8192,
            max_chunk_digits: 8,
            max_content_length: 1024 * 1024,
        }
    }
}

/// Per-connection buffer size and socket timeouts.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Read buffer capacity in bytes (default: `8 KiB`).
    ///
    /// One `read_some` never pulls more than this off the socket; the
    /// parser consumes the buffer incrementally.
    pub read_buffer_size: usize,

    /// Maximum wait for a single socket read (default: `30 seconds`).
    ///
    /// Expiry closes the connection; this is the cleanup path for idle
    /// keep-alive peers and stalled uploads alike.
    pub socket_read_timeout: Duration,

    /// Maximum wait for a single socket write (default: `10 seconds`).
    pub socket_write_timeout: Duration,
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            read_buffer_size: 8 * 1024,
            socket_read_timeout: Duration::from_secs(30),
            socket_write_timeout: Duration::from_secs(10),
        }
    }
}

/// Server-level knobs.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum redirect rewrites applied to one request (default: `10`).
    ///
    /// Exceeding it answers `500` with a message naming the original
    /// resource.
    pub max_redirects: u32,

    /// Listen backlog passed to the acceptor socket (default: `1024`).
    pub listen_backlog: i32,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            listen_backlog: 1024,
        }
    }
}
