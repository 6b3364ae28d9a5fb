//! Pull-based byte input.
//!
//! Decoders consume input one byte at a time through [`ByteSource`], so any
//! byte-sequential input — a memory buffer, a file, a socket — adapts with
//! a few lines. End of input surfaces as `has_more() == false`; an
//! unexpected end mid-token surfaces as an error from `next()`, never as
//! undefined behavior.

use std::{
    fmt,
    io::{self, Read},
};

use crate::error::SourceError;

/// Where a source currently stands: bytes consumed so far, plus the
/// 1-based line and column of the *next* byte. Lines advance on `\n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: u64,
    pub line: u32,
    pub column: u32,
}

impl Position {
    /// The start of any input.
    #[must_use]
    pub fn start() -> Self {
        Self { offset: 0, line: 1, column: 1 }
    }

    /// Advances past one byte.
    #[inline]
    pub fn step(&mut self, byte: u8) {
        self.offset += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A pull-based byte reader.
///
/// The split between [`read`](Self::read) and [`next`](Self::next) mirrors
/// the two situations a decoder grammar is in: `read` follows a successful
/// [`has_more`](Self::has_more) check, while `next` is used where the
/// grammar guarantees more input must exist, so running dry there is a
/// decode error rather than a clean end.
pub trait ByteSource {
    /// Whether at least one more byte can be produced.
    ///
    /// # Errors
    ///
    /// I/O failure from an underlying reader.
    fn has_more(&mut self) -> Result<bool, SourceError>;

    /// Produces the next byte.
    ///
    /// Callers must have seen `has_more()` return `true` since the last
    /// byte was consumed; implementations may panic otherwise.
    fn read(&mut self) -> u8;

    /// Produces the next byte, failing with
    /// [`SourceError::UnexpectedEnd`] if the input is exhausted.
    ///
    /// # Errors
    ///
    /// [`SourceError::UnexpectedEnd`] at end of input, or an I/O failure.
    fn next(&mut self) -> Result<u8, SourceError> {
        if self.has_more()? {
            Ok(self.read())
        } else {
            Err(SourceError::UnexpectedEnd)
        }
    }

    /// Where the source currently stands; used for error positions.
    fn position(&self) -> Position;
}

/// A source over an in-memory byte slice.
#[derive(Debug)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    at: usize,
    pos: Position,
}

impl<'a> SliceSource<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0, pos: Position::start() }
    }

    /// The unconsumed remainder.
    #[must_use]
    pub fn remainder(&self) -> &'a [u8] {
        &self.bytes[self.at..]
    }
}

impl<'a> From<&'a [u8]> for SliceSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<'a> From<&'a str> for SliceSource<'a> {
    fn from(s: &'a str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl ByteSource for SliceSource<'_> {
    fn has_more(&mut self) -> Result<bool, SourceError> {
        Ok(self.at < self.bytes.len())
    }

    fn read(&mut self) -> u8 {
        let b = self.bytes[self.at];
        self.at += 1;
        self.pos.step(b);
        b
    }

    fn position(&self) -> Position {
        self.pos
    }
}

/// A buffered source over any [`io::Read`].
///
/// Bytes are pulled from the reader a block at a time; `has_more` refills
/// the block when it runs dry, so I/O errors surface there (or from
/// `next`) instead of from `read`.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    block: Box<[u8]>,
    filled: usize,
    at: usize,
    pos: Position,
}

impl<R: Read> ReaderSource<R> {
    const BLOCK: usize = 8 * 1024;

    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_block_size(reader, Self::BLOCK)
    }

    #[must_use]
    pub fn with_block_size(reader: R, block: usize) -> Self {
        Self {
            reader,
            block: vec![0u8; block.max(1)].into_boxed_slice(),
            filled: 0,
            at: 0,
            pos: Position::start(),
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        self.at = 0;
        self.filled = 0;
        loop {
            match self.reader.read(&mut self.block) {
                Ok(n) => {
                    self.filled = n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn has_more(&mut self) -> Result<bool, SourceError> {
        if self.at < self.filled {
            return Ok(true);
        }
        self.refill()?;
        Ok(self.filled > 0)
    }

    fn read(&mut self) -> u8 {
        debug_assert!(self.at < self.filled, "read() without has_more()");
        let b = self.block[self.at];
        self.at += 1;
        self.pos.step(b);
        b
    }

    fn position(&self) -> Position {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_drains_in_order() {
        let mut src = SliceSource::from("abc");
        let mut out = Vec::new();
        while src.has_more().unwrap() {
            out.push(src.read());
        }
        assert_eq!(out, b"abc");
        assert_eq!(src.position().offset, 3);
        assert!(matches!(src.next(), Err(SourceError::UnexpectedEnd)));
    }

    #[test]
    fn next_reports_premature_end() {
        let mut src = SliceSource::from("x");
        assert_eq!(src.next().unwrap(), b'x');
        assert!(matches!(src.next(), Err(SourceError::UnexpectedEnd)));
    }

    #[test]
    fn reader_source_spans_block_boundaries() {
        let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        let mut src = ReaderSource::with_block_size(&data[..], 64);
        let mut out = Vec::new();
        while src.has_more().unwrap() {
            out.push(src.read());
        }
        assert_eq!(out, data);
        assert_eq!(src.position().offset, 10_000);
    }

    #[test]
    fn position_tracks_lines_and_columns() {
        let mut src = SliceSource::from("ab\ncd");
        assert_eq!(src.position(), Position { offset: 0, line: 1, column: 1 });
        src.read();
        src.read();
        assert_eq!(src.position(), Position { offset: 2, line: 1, column: 3 });
        src.read(); // the newline itself
        assert_eq!(src.position(), Position { offset: 3, line: 2, column: 1 });
        src.read();
        assert_eq!(src.position(), Position { offset: 4, line: 2, column: 2 });
        assert_eq!(src.position().to_string(), "2:2");
    }

    #[test]
    fn reader_source_surfaces_io_errors() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("boom"))
            }
        }
        let mut src = ReaderSource::new(Failing);
        assert!(matches!(src.has_more(), Err(SourceError::Io(_))));
    }
}
