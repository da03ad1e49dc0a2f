//! Error model shared by every component of the driver.
//!
//! Grounded on `lunatic-redis::types::{ErrorKind, RedisError}`: the same
//! `kind()`/`code()`/`detail()` accessor surface, re-expressed with
//! `thiserror` instead of a hand-rolled `ErrorRepr`.

use std::fmt;

/// Coarse classification of a failure, matching spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The server returned a `-ERR ...` (or other) error frame.
    ErrorReply,
    /// Peek on a closed/exhausted stream.
    Eof,
    /// Protocol framing violation; fatal for the connection.
    InvalidState,
    /// Handshake or option validation failure. Never retried.
    ConnectError,
    /// Operation attempted after close, or retries exhausted.
    ConnectionClosed,
    /// Use of a resource (connection/pubsub) after it was closed.
    BadResource,
    /// A multi-key command's keys hash to different cluster slots.
    CrossSlot,
    /// Too many `-MOVED`/`-ASK` redirections for one command.
    TooManyRedirections,
    /// The server reports the cluster is down.
    ClusterDown,
    /// A reply did not decode into the requested Rust type.
    TypeError,
    /// Underlying I/O failure not otherwise classified above.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ErrorReply => "error reply",
            ErrorKind::Eof => "end of file",
            ErrorKind::InvalidState => "invalid protocol state",
            ErrorKind::ConnectError => "connect error",
            ErrorKind::ConnectionClosed => "connection closed",
            ErrorKind::BadResource => "bad resource",
            ErrorKind::CrossSlot => "cross-slot",
            ErrorKind::TooManyRedirections => "too many cluster redirections",
            ErrorKind::ClusterDown => "cluster down",
            ErrorKind::TypeError => "type error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(s)
    }
}

/// The driver's unified error type.
///
/// `detail` carries the raw line of a server error frame verbatim (needed
/// to recover the `-MOVED`/`-ASK` target and the `-CROSSSLOT` wording, per
/// spec.md §4.7 and §6).
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {}", detail.as_deref().unwrap_or(""))]
pub struct RedisError {
    kind: ErrorKind,
    detail: Option<String>,
}

pub type RedisResult<T> = Result<T, RedisError>;

impl RedisError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        RedisError {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        RedisError { kind, detail: None }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Parses a raw `-...` error line (without the leading `-`) into a
    /// `RedisError`, recognizing the well-known cluster codes of spec.md §6.
    pub fn from_error_line(line: &str) -> Self {
        let code = line.split_whitespace().next().unwrap_or("");
        let kind = match code {
            "MOVED" | "ASK" => ErrorKind::ErrorReply,
            "CROSSSLOT" => ErrorKind::CrossSlot,
            "CLUSTERDOWN" => ErrorKind::ClusterDown,
            _ => ErrorKind::ErrorReply,
        };
        RedisError::new(kind, line.to_string())
    }

    /// Returns `(slot, host:port)` if this is a `-MOVED`/`-ASK` error.
    pub fn redirect_node(&self) -> Option<(u16, &str)> {
        let detail = self.detail.as_deref()?;
        let mut parts = detail.split_whitespace();
        let code = parts.next()?;
        if code != "MOVED" && code != "ASK" {
            return None;
        }
        let slot: u16 = parts.next()?.parse().ok()?;
        let addr = parts.next()?;
        Some((slot, addr))
    }

    pub fn is_moved(&self) -> bool {
        self.detail
            .as_deref()
            .map(|d| d.starts_with("MOVED "))
            .unwrap_or(false)
    }

    pub fn is_ask(&self) -> bool {
        self.detail
            .as_deref()
            .map(|d| d.starts_with("ASK "))
            .unwrap_or(false)
    }

    pub fn is_cross_slot(&self) -> bool {
        matches!(self.kind, ErrorKind::CrossSlot)
    }

    pub fn is_connection_dropped(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ConnectionClosed | ErrorKind::Eof | ErrorKind::Io
        )
    }
}

impl From<std::io::Error> for RedisError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            RedisError::new(ErrorKind::Eof, err.to_string())
        } else {
            RedisError::new(ErrorKind::Io, err.to_string())
        }
    }
}

impl From<std::str::Utf8Error> for RedisError {
    fn from(err: std::str::Utf8Error) -> Self {
        RedisError::new(ErrorKind::TypeError, err.to_string())
    }
}

impl From<std::num::ParseIntError> for RedisError {
    fn from(err: std::num::ParseIntError) -> Self {
        RedisError::new(ErrorKind::InvalidState, err.to_string())
    }
}

#[cfg(feature = "tls")]
impl From<tokio_native_tls::native_tls::Error> for RedisError {
    fn from(err: tokio_native_tls::native_tls::Error) -> Self {
        RedisError::new(ErrorKind::ConnectError, err.to_string())
    }
}

impl From<url::ParseError> for RedisError {
    fn from(err: url::ParseError) -> Self {
        RedisError::new(ErrorKind::ConnectError, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moved_redirect() {
        let err = RedisError::from_error_line("MOVED 3999 127.0.0.1:7002");
        assert!(err.is_moved());
        assert_eq!(err.redirect_node(), Some((3999, "127.0.0.1:7002")));
    }

    #[test]
    fn parses_ask_redirect() {
        let err = RedisError::from_error_line("ASK 3999 127.0.0.1:7002");
        assert!(err.is_ask());
        assert_eq!(err.redirect_node(), Some((3999, "127.0.0.1:7002")));
    }

    #[test]
    fn cross_slot_is_classified() {
        let err = RedisError::from_error_line("CROSSSLOT Keys in request don't hash to the same slot");
        assert!(err.is_cross_slot());
    }
}
