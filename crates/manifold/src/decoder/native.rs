//! Decoder for the compact native notation.
//!
//! The grammar, byte-driven:
//!
//! ```text
//! entry := comment* tag? (':' key)? ( '{' entry* '}' | '(' value ')' | '=' scalar )
//! ```
//!
//! Text before `:`, `{`, `(`, or `=` is the type/space tag; text after `:`
//! is the key (alias). `{...}` opens a container whose kind comes from the
//! tag (`A`, `L`, `array`, `list`, `set` open list-kind, anything else
//! map-kind), `(...)` wraps a leaf value, and `key=value` is the untagged
//! scalar shorthand whose value runs to `,`, `}`, or whitespace.
//!
//! `^` escapes one byte everywhere text accumulates: `^s` space, `^r` CR,
//! `^n` LF, `^t` TAB, a structural self-escape (`^^ ^( ^) ^{ ^} ^: ^= ^,
//! ^#`), or `^uXXXX` with surrogate pairing across two escapes. `#...#`
//! and `#...\n` are comments, legal only where a tag is otherwise empty.

use std::sync::Arc;

use tracing::trace;

use super::{
    Bounded, DepthStack, Scratch, err, feed_unit, flush_pending, hex_quad, more, pull,
};
use crate::{
    buffer::BufferPool,
    error::{DecodeError, SourceError, SyntaxError},
    options::DecoderOptions,
    sink::{EventSink, Tag, TagKind},
    source::ByteSource,
};

const ESCAPE: u8 = b'^';

/// Tags that open a list-kind container.
fn list_kind(tag: &[u8]) -> bool {
    [&b"A"[..], b"L", b"array", b"list", b"set"]
        .iter()
        .any(|t| tag.eq_ignore_ascii_case(t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Ran,
    Halted,
}

/// Streaming decoder for the native notation.
///
/// One [`decode`](Self::decode) call processes one document to completion
/// or to its first fatal error. The decoder owns its scratch buffers and
/// may be reused across documents; dropping it returns the buffers'
/// backing arrays to the pool.
pub struct NativeDecoder {
    scratch: Scratch,
    depth: DepthStack,
}

impl NativeDecoder {
    /// A decoder over the process-wide default pool with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with(Arc::clone(BufferPool::global()), &DecoderOptions::default())
    }

    #[must_use]
    pub fn with(pool: Arc<BufferPool>, options: &DecoderOptions) -> Self {
        Self {
            scratch: Scratch::new(&pool, options),
            depth: DepthStack::new(),
        }
    }

    /// Decodes one document from `src`, driving `sink`.
    ///
    /// # Errors
    ///
    /// Any malformed input, source failure, or scratch-ceiling rejection;
    /// see [`DecodeError`].
    pub fn decode<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<(), DecodeError> {
        let outcome = self.run(src, sink);
        self.depth.reset();
        self.scratch.reset();
        outcome
    }

    fn run<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<(), DecodeError> {
        let Some(first) = self.skip_filler(src)? else {
            return Ok(()); // empty document
        };
        let (flow, carry) = self.entry(src, sink, first)?;
        if flow == Flow::Halted {
            let levels = self.depth.depth();
            trace!(levels, "sink halted, draining document");
            self.depth.reset();
            return skip_block(src, levels);
        }
        let trailing = match carry {
            Some(b) if is_space(b) => self.skip_filler(src)?,
            Some(b) => Some(b),
            None => self.skip_filler(src)?,
        };
        match trailing {
            None => Ok(()),
            Some(b) => Err(err(src, SyntaxError::Unexpected(b))),
        }
    }

    /// Parses one entry whose first byte is `first`. Returns the carry
    /// byte a shorthand scalar consumed past its value, if any.
    fn entry<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
        first: u8,
    ) -> Result<(Flow, Option<u8>), DecodeError> {
        let mut pending = None;
        let mut b = first;
        // TAG state: accumulate until a structural byte dispatches.
        loop {
            match b {
                b':' => break,
                b'{' => {
                    self.flush(src, &mut pending, |s| &mut s.tag)?;
                    return Ok((self.block(src, sink)?, None));
                }
                b'(' => {
                    self.flush(src, &mut pending, |s| &mut s.tag)?;
                    self.leaf(src, sink)?;
                    return Ok((Flow::Ran, None));
                }
                b'=' => {
                    // Shorthand: the accumulated text was the key all along.
                    self.flush(src, &mut pending, |s| &mut s.tag)?;
                    let (tag, key) = (&mut self.scratch.tag, &mut self.scratch.key);
                    tag.move_into(key).map_err(|e| err(src, e))?;
                    return self.shorthand(src, sink);
                }
                ESCAPE => self.unescape(src, &mut pending, |s| &mut s.tag)?,
                b'#' => return Err(err(src, SyntaxError::MisplacedComment)),
                b')' | b'}' | b',' => return Err(err(src, SyntaxError::Unexpected(b))),
                _ if is_space(b) => return Err(err(src, SyntaxError::Unexpected(b))),
                _ => self.put(src, &mut pending, b, |s| &mut s.tag)?,
            }
            b = pull(src)?;
        }
        self.flush(src, &mut pending, |s| &mut s.tag)?;
        // KEY state, after ':'.
        loop {
            b = pull(src)?;
            match b {
                b'{' => {
                    self.flush(src, &mut pending, |s| &mut s.key)?;
                    return Ok((self.block(src, sink)?, None));
                }
                b'(' => {
                    self.flush(src, &mut pending, |s| &mut s.key)?;
                    self.leaf(src, sink)?;
                    return Ok((Flow::Ran, None));
                }
                b'=' => {
                    self.flush(src, &mut pending, |s| &mut s.key)?;
                    return self.shorthand(src, sink);
                }
                ESCAPE => self.unescape(src, &mut pending, |s| &mut s.key)?,
                b'#' => return Err(err(src, SyntaxError::MisplacedComment)),
                b':' | b')' | b'}' | b',' => return Err(err(src, SyntaxError::Unexpected(b))),
                _ if is_space(b) => return Err(err(src, SyntaxError::Unexpected(b))),
                _ => self.put(src, &mut pending, b, |s| &mut s.key)?,
            }
        }
    }

    /// Parses a `{...}` container body; the `{` is already consumed and
    /// the tag/key buffers describe the container.
    fn block<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<Flow, DecodeError> {
        let list = list_kind(self.scratch.tag.as_bytes());
        let kind = if list { TagKind::List } else { TagKind::Map };
        let tag = Tag::new(kind, self.scratch.tag.as_bytes());
        // Reserve the depth level first so a full stack never leaves the
        // sink with a dangling open.
        self.depth.open(!list).map_err(|e| err(src, e))?;
        if !sink.open(tag, self.scratch.key.buf()) {
            trace!("container rejected, skipping subtree");
            self.depth.close();
            self.scratch.reset();
            return skip_block(src, 1).map(|()| Flow::Ran);
        }
        self.scratch.reset();

        let mut carry: Option<u8> = None;
        loop {
            let b = match carry.take() {
                Some(b) => Some(b),
                None => self.skip_filler(src)?,
            };
            let Some(b) = b else {
                return Err(err(src, SourceError::UnexpectedEnd));
            };
            match b {
                b'}' => {
                    self.depth.close();
                    return Ok(if sink.close() { Flow::Ran } else { Flow::Halted });
                }
                b',' => {}
                _ if is_space(b) => {}
                _ => {
                    let (flow, c) = self.entry(src, sink, b)?;
                    if flow == Flow::Halted {
                        return Ok(Flow::Halted);
                    }
                    carry = c;
                }
            }
        }
    }

    /// Parses a `(...)` leaf value; the `(` is already consumed.
    fn leaf<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<(), DecodeError> {
        let mut pending = None;
        loop {
            let b = pull(src)?;
            match b {
                b')' => break,
                ESCAPE => self.unescape(src, &mut pending, |s| &mut s.value)?,
                b'(' => return Err(err(src, SyntaxError::Unexpected(b))),
                _ => self.put(src, &mut pending, b, |s| &mut s.value)?,
            }
        }
        self.flush(src, &mut pending, |s| &mut s.value)?;
        self.submit(sink);
        Ok(())
    }

    /// Parses what follows `key=`: usually a bare scalar running to `,`,
    /// `}`, or whitespace, but a leading `{` or `(` nests a container or
    /// a delimited value under the key. The terminating byte a scalar
    /// consumed (if not end of input) is returned as carry.
    fn shorthand<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<(Flow, Option<u8>), DecodeError> {
        let mut pending = None;
        let mut leading = true;
        loop {
            if !more(src)? {
                self.flush(src, &mut pending, |s| &mut s.value)?;
                self.submit(sink);
                return Ok((Flow::Ran, None));
            }
            let b = src.read();
            if leading {
                leading = false;
                if b == b'{' {
                    return Ok((self.block(src, sink)?, None));
                }
                if b == b'(' {
                    self.leaf(src, sink)?;
                    return Ok((Flow::Ran, None));
                }
            }
            match b {
                b',' | b'}' => {
                    self.flush(src, &mut pending, |s| &mut s.value)?;
                    self.submit(sink);
                    return Ok((Flow::Ran, Some(b)));
                }
                _ if is_space(b) => {
                    self.flush(src, &mut pending, |s| &mut s.value)?;
                    self.submit(sink);
                    return Ok((Flow::Ran, Some(b)));
                }
                ESCAPE => self.unescape(src, &mut pending, |s| &mut s.value)?,
                b'(' | b')' | b'{' | b':' | b'=' | b'#' => {
                    return Err(err(src, SyntaxError::Unexpected(b)));
                }
                _ => self.put(src, &mut pending, b, |s| &mut s.value)?,
            }
        }
    }

    fn submit<K: EventSink>(&mut self, sink: &mut K) {
        let kind = if self.scratch.tag.is_empty() { TagKind::Token } else { TagKind::Scalar };
        let tag = Tag::new(kind, self.scratch.tag.as_bytes());
        sink.submit(tag, self.scratch.key.buf(), self.scratch.value.buf());
        self.scratch.reset();
    }

    /// Skips whitespace, separators between entries, and comments.
    /// Returns the first significant byte, or `None` at end of input.
    fn skip_filler<S: ByteSource>(&mut self, src: &mut S) -> Result<Option<u8>, DecodeError> {
        loop {
            if !more(src)? {
                return Ok(None);
            }
            let b = src.read();
            if is_space(b) {
                continue;
            }
            if b == b'#' {
                // Comment runs to the next '#', newline, or end of input.
                loop {
                    if !more(src)? {
                        return Ok(None);
                    }
                    let c = src.read();
                    if c == b'#' || c == b'\n' {
                        break;
                    }
                }
                continue;
            }
            return Ok(Some(b));
        }
    }

    /// Decodes one `^` escape (the `^` is already consumed) into the
    /// buffer selected by `which`.
    fn unescape<S: ByteSource>(
        &mut self,
        src: &mut S,
        pending: &mut Option<u32>,
        which: impl Fn(&mut Scratch) -> &mut Bounded,
    ) -> Result<(), DecodeError> {
        let b = pull(src)?;
        let literal = match b {
            b's' => b' ',
            b'r' => b'\r',
            b'n' => b'\n',
            b't' => b'\t',
            b'u' => {
                let unit = hex_quad(src)?;
                return feed_unit(pending, which(&mut self.scratch), unit)
                    .map_err(|e| err(src, e));
            }
            ESCAPE | b'(' | b')' | b'{' | b'}' | b':' | b'=' | b',' | b'#' => b,
            _ => return Err(err(src, SyntaxError::InvalidEscape(b))),
        };
        self.put(src, pending, literal, which)
    }

    /// Appends a raw byte, resolving any parked surrogate first.
    fn put<S: ByteSource>(
        &mut self,
        src: &mut S,
        pending: &mut Option<u32>,
        byte: u8,
        which: impl Fn(&mut Scratch) -> &mut Bounded,
    ) -> Result<(), DecodeError> {
        let buf = which(&mut self.scratch);
        flush_pending(pending, buf).map_err(|e| err(src, e))?;
        buf.push(byte).map_err(|e| err(src, e))
    }

    fn flush<S: ByteSource>(
        &mut self,
        src: &mut S,
        pending: &mut Option<u32>,
        which: impl Fn(&mut Scratch) -> &mut Bounded,
    ) -> Result<(), DecodeError> {
        flush_pending(pending, which(&mut self.scratch)).map_err(|e| err(src, e))
    }
}

impl Default for NativeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Advances the source past `levels` unmatched `{`s' worth of content
/// without allocating or emitting, honoring escapes, `(...)` values, and
/// comment placement on the way.
fn skip_block<S: ByteSource>(src: &mut S, levels: u32) -> Result<(), DecodeError> {
    let mut depth = levels;
    let mut boundary = true;
    while depth > 0 {
        let b = pull(src)?;
        match b {
            ESCAPE => {
                pull(src)?;
                boundary = false;
            }
            b'(' => {
                skip_value(src)?;
                boundary = false;
            }
            b'{' => {
                depth += 1;
                boundary = true;
            }
            b'}' => {
                depth -= 1;
                boundary = true;
            }
            b',' => boundary = true,
            b'#' => {
                if !boundary {
                    return Err(err(src, SyntaxError::MisplacedComment));
                }
                loop {
                    let c = pull(src)?;
                    if c == b'#' || c == b'\n' {
                        break;
                    }
                }
            }
            _ if is_space(b) => boundary = true,
            _ => boundary = false,
        }
    }
    Ok(())
}

/// Advances past a `(...)` value during a skip; the `(` is consumed.
fn skip_value<S: ByteSource>(src: &mut S) -> Result<(), DecodeError> {
    loop {
        let b = pull(src)?;
        match b {
            b')' => return Ok(()),
            ESCAPE => {
                pull(src)?;
            }
            b'(' => return Err(err(src, SyntaxError::Unexpected(b))),
            _ => {}
        }
    }
}
