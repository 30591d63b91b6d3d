use std::{fmt, io};
use thiserror::Error;

/// Identifies which token exceeded its configured cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Method,
    Uri,
    Query,
    HeaderName,
    HeaderValue,
    ChunkSize,
    Body,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Method => "method",
            Field::Uri => "URI",
            Field::Query => "query string",
            Field::HeaderName => "header name",
            Field::HeaderValue => "header value",
            Field::ChunkSize => "chunk size",
            Field::Body => "message body",
        })
    }
}

/// Errors produced while decoding an HTTP message from the wire.
///
/// Parse errors never escape the server: an open socket gets a `400`
/// response and the connection is closed, a dead one is released.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed message")]
    Malformed,

    #[error("{0} exceeds the maximum allowed size")]
    TooLarge(Field),

    #[error("connection closed before the message was complete")]
    PrematureEof,

    #[error("unsupported transfer encoding")]
    UnsupportedTransferEncoding,
}

/// Crate-wide error type.
///
/// Transport variants carry the fate of a single connection and never
/// propagate across connections. `Handler` wraps whatever a request
/// handler reported; the dispatcher turns it into the 500 path.
#[derive(Debug, Error)]
pub enum Error {
    #[error("peer closed the connection")]
    Closed,

    #[error("connection reset by peer")]
    Reset,

    #[error("socket operation timed out")]
    Timeout,

    #[error("operation aborted")]
    Aborted,

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("maximum number of redirects ({0}) exceeded for requested resource")]
    MaxRedirects(u32),

    #[error("request handler failed: {0}")]
    Handler(String),

    #[error("unrecognized option: {0}")]
    BadOption(String),

    #[error("bad config directive on line {line}: {reason}")]
    BadConfig { line: usize, reason: String },

    #[error(transparent)]
    Io(io::Error),
}

impl Error {
    /// Classifies an I/O error into the transport taxonomy.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => Error::Closed,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Error::Reset,
            io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::Interrupted | io::ErrorKind::NotConnected => Error::Aborted,
            _ => Error::Io(err),
        }
    }

    /// True for errors that only ever mean "release this connection".
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Closed | Error::Reset | Error::Timeout | Error::Aborted | Error::Io(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::from_io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_classification() {
        #[rustfmt::skip]
        let cases = [
            (io::ErrorKind::UnexpectedEof,     "peer closed the connection"),
            (io::ErrorKind::BrokenPipe,        "peer closed the connection"),
            (io::ErrorKind::ConnectionReset,   "connection reset by peer"),
            (io::ErrorKind::ConnectionAborted, "connection reset by peer"),
            (io::ErrorKind::TimedOut,          "socket operation timed out"),
            (io::ErrorKind::Interrupted,       "operation aborted"),
        ];

        for (kind, display) in cases {
            let err = Error::from_io(io::Error::new(kind, "inner"));
            assert!(err.is_transport());
            assert_eq!(err.to_string(), display);
        }

        let other = Error::from_io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(other.is_transport());
        assert!(matches!(other, Error::Io(_)));
    }

    #[test]
    fn parse_errors_are_not_transport() {
        assert!(!Error::from(ParseError::Malformed).is_transport());
        assert!(!Error::MaxRedirects(10).is_transport());
        assert!(!Error::Handler("boom".into()).is_transport());
    }

    #[test]
    fn too_large_names_the_field() {
        let err = ParseError::TooLarge(Field::HeaderValue);
        assert_eq!(
            err.to_string(),
            "header value exceeds the maximum allowed size"
        );
    }
}
