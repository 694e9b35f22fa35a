//! Error and Result types surfaced to callers of [`crate::Connection`].

use std::fmt;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a caller of [`crate::Connection::post`] or
/// [`crate::Connection::create`] can observe.
///
/// A `post` never leaks a protocol-internal detail; it is always one of the
/// kinds below (spec.md §7).
#[derive(Debug)]
pub enum Error {
    /// The request's deadline passed before the stream ended.
    Timeout,
    /// The connection is in or entered a terminal state. Carries the
    /// human-readable outcome (spec.md §9 "Outcome string"): a peer-supplied
    /// reason, a peer error code, a local error string, or the literal
    /// `"Closed"` / `"Exhausted"`.
    Closed(String),
    /// Flow control or the concurrent-stream cap prevents sending right now;
    /// the caller should back off or pick another connection.
    Blocked,
    /// The server sent more than `MAX_RESPONSE_SIZE` bytes for one response.
    ResponseTooLarge,
    /// The response body was not valid JSON. Carries the first 20 bytes of
    /// the offending body, matching `aapns`'s `FormatError`.
    FormatError(Vec<u8>),
    /// An I/O or TLS failure, surfaced verbatim (construction-time or
    /// otherwise fatal to the socket).
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => write!(f, "request timed out"),
            Error::Closed(reason) => write!(f, "connection closed: {reason}"),
            Error::Blocked => write!(f, "connection is blocked (flow control or stream cap)"),
            Error::ResponseTooLarge => write!(f, "response exceeded the maximum response size"),
            Error::FormatError(prefix) => {
                write!(f, "response body was not JSON: {:?}", String::from_utf8_lossy(prefix))
            }
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl Error {
    pub(crate) fn closed(reason: impl Into<String>) -> Error {
        Error::Closed(reason.into())
    }

    pub(crate) fn format_error(body: &[u8]) -> Error {
        let n = body.len().min(20);
        Error::FormatError(body[..n].to_vec())
    }
}
