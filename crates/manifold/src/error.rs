//! Error taxonomy for the decode core.
//!
//! Three families, kept apart so callers can react differently to each:
//! - [`SyntaxError`] — malformed input; always fatal to the current decode
//!   call.
//! - [`PoolError`] — a buffer ceiling or pool policy rejected a request;
//!   "untrusted input too large", not "input corrupt".
//! - [`SourceError`] — the byte source itself failed (premature end of
//!   input, or an I/O error from a reader-backed source).
//!
//! [`DecodeError`] wraps any of these with the position (byte offset and
//! line:column) the source had reached when the error was raised.

use thiserror::Error;

use crate::source::Position;

/// A fatal decode failure, with the position at which it was detected.
#[derive(Error, Debug)]
#[error("{source} at {at}")]
pub struct DecodeError {
    pub(crate) source: ErrorSource,
    pub(crate) at: Position,
}

impl DecodeError {
    pub(crate) fn new(source: impl Into<ErrorSource>, at: Position) -> Self {
        Self { source: source.into(), at }
    }

    /// The underlying cause.
    #[must_use]
    pub fn source(&self) -> &ErrorSource {
        &self.source
    }

    /// The position at which the error was detected.
    #[must_use]
    pub fn position(&self) -> Position {
        self.at
    }

    /// Byte offset (count of bytes consumed from the source) at which the
    /// error was detected.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.at.offset
    }

    /// Returns `true` if this error is a resource rejection rather than a
    /// malformed-input failure.
    #[must_use]
    pub fn is_resource(&self) -> bool {
        matches!(self.source, ErrorSource::Resource(_))
    }
}

/// What went wrong, without positional context.
#[derive(Error, Debug)]
pub enum ErrorSource {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("resource error: {0}")]
    Resource(#[from] PoolError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

/// Malformed input. Every variant is fatal to the decode call that raised
/// it; none are recovered internally.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unexpected byte 0x{0:02x}")]
    Unexpected(u8),
    #[error("invalid escape 0x{0:02x}")]
    InvalidEscape(u8),
    #[error("truncated unicode escape")]
    TruncatedEscape,
    #[error("invalid hex digit 0x{0:02x} in unicode escape")]
    InvalidHexDigit(u8),
    #[error("nesting deeper than {0} levels")]
    DepthExceeded(u32),
    #[error("closing a {found} where a {expected} is open")]
    MismatchedClose {
        expected: &'static str,
        found: &'static str,
    },
    #[error("mismatched closing tag")]
    MismatchedTag,
    #[error("invalid literal")]
    InvalidLiteral,
    #[error("unknown entity reference")]
    UnknownEntity,
    #[error("comment not allowed here")]
    MisplacedComment,
    #[error("unterminated string")]
    UnterminatedString,
}

/// The pool (or a per-buffer ceiling) refused a request. Distinct from
/// [`SyntaxError`] so callers can treat it as an input-size problem.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("requested {requested} bytes exceeds ceiling of {ceiling}")]
    CapacityExceeded { requested: usize, ceiling: usize },
}

/// The byte source could not produce a byte.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_position() {
        let at = Position { offset: 17, line: 2, column: 5 };
        let err = DecodeError::new(SyntaxError::Unexpected(b'!'), at);
        assert_eq!(err.to_string(), "syntax error: unexpected byte 0x21 at 2:5");
        assert_eq!(err.offset(), 17);
        assert_eq!(err.position(), at);
        assert!(!err.is_resource());
    }

    #[test]
    fn resource_errors_are_distinguishable() {
        let err = DecodeError::new(
            PoolError::CapacityExceeded { requested: 1 << 30, ceiling: 1 << 20 },
            Position::start(),
        );
        assert!(err.is_resource());
        assert!(matches!(
            err.source(),
            ErrorSource::Resource(PoolError::CapacityExceeded { .. })
        ));
    }
}
