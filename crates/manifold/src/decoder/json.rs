//! JSON decoder.
//!
//! Two interleaved loops per container: inside a map, a quoted or bare key
//! runs up to `:`, then a value; inside a list, values only. Values are
//! nested containers (recursing through the sink's `open`), quoted strings
//! with the usual escapes plus `\uXXXX` surrogate pairing, the strict
//! four-byte `null`/`NULL` literal, or bare tokens (numbers, `true`,
//! `false`, anything else) accumulated to the next structural delimiter.
//! Bytes at or below 0x20 are whitespace, skippable between tokens and
//! never inside them.

use std::sync::Arc;

use tracing::trace;

use super::{DepthStack, Scratch, err, feed_unit, flush_pending, hex_quad, more, pull};
use crate::{
    buffer::BufferPool,
    error::{DecodeError, SyntaxError},
    options::DecoderOptions,
    sink::{EventSink, Tag, TagKind},
    source::ByteSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Ran,
    Halted,
}

/// Streaming JSON decoder.
///
/// One [`decode`](Self::decode) call processes one JSON document to
/// completion or to its first fatal error. Reusable across documents;
/// dropping it returns the scratch arrays to the pool.
pub struct JsonDecoder {
    scratch: Scratch,
    depth: DepthStack,
}

impl JsonDecoder {
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
        let Some(b) = skip_ws(src)? else {
            return Ok(()); // empty document
        };
        let (flow, carry) = self.value(src, sink, b)?;
        if flow == Flow::Halted {
            let stack = self.depth;
            trace!(levels = stack.depth(), "sink halted, draining document");
            self.depth.reset();
            return skip_containers(src, stack);
        }
        let trailing = match carry {
            Some(c) if !is_ws(c) => Some(c),
            _ => skip_ws(src)?,
        };
        match trailing {
            None => Ok(()),
            Some(c) => Err(err(src, SyntaxError::Unexpected(c))),
        }
    }

    /// Parses one value whose first byte is `first`, submitting it under
    /// whatever key is currently in the key scratch. Bare tokens consume
    /// their terminating delimiter and return it as carry.
    fn value<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
        first: u8,
    ) -> Result<(Flow, Option<u8>), DecodeError> {
        match first {
            b'{' => Ok((self.container(src, sink, true)?, None)),
            b'[' => Ok((self.container(src, sink, false)?, None)),
            b'"' => {
                self.string(src, |s| &mut s.value)?;
                self.submit(sink, TagKind::Text);
                Ok((Flow::Ran, None))
            }
            b'n' | b'N' => {
                // Exactly `null`, ASCII-case-insensitively; anything else
                // starting with n/N is malformed.
                for expected in *b"ull" {
                    let b = pull(src)?;
                    if !b.eq_ignore_ascii_case(&expected) {
                        return Err(err(src, SyntaxError::InvalidLiteral));
                    }
                }
                self.submit(sink, TagKind::Null);
                Ok((Flow::Ran, None))
            }
            b'}' | b']' | b',' | b':' => Err(err(src, SyntaxError::Unexpected(first))),
            _ => self.token(src, sink, first),
        }
    }

    /// Accumulates a bare token (number, `true`, `false`, ...) until a
    /// structural delimiter or whitespace, which is returned as carry.
    fn token<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
        first: u8,
    ) -> Result<(Flow, Option<u8>), DecodeError> {
        self.scratch
            .value
            .push(first)
            .map_err(|e| err(src, e))?;
        loop {
            if !more(src)? {
                self.submit(sink, TagKind::Token);
                return Ok((Flow::Ran, None));
            }
            let b = src.read();
            if matches!(b, b',' | b'}' | b']') || is_ws(b) {
                self.submit(sink, TagKind::Token);
                return Ok((Flow::Ran, Some(b)));
            }
            self.scratch.value.push(b).map_err(|e| err(src, e))?;
        }
    }

    /// Parses a container body; the opening brace/bracket is consumed and
    /// the key scratch names the container.
    fn container<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
        map: bool,
    ) -> Result<Flow, DecodeError> {
        let kind = if map { TagKind::Map } else { TagKind::List };
        // Reserve the depth level first so a full stack never leaves the
        // sink with a dangling open.
        self.depth.open(map).map_err(|e| err(src, e))?;
        if !sink.open(Tag::bare(kind), self.scratch.key.buf()) {
            trace!("container rejected, skipping subtree");
            self.depth.close();
            self.scratch.reset();
            let mut stack = DepthStack::new();
            stack.open(map).map_err(|e| err(src, e))?;
            return skip_containers(src, stack).map(|()| Flow::Ran);
        }
        self.scratch.reset();
        if map { self.map_body(src, sink) } else { self.list_body(src, sink) }
    }

    fn map_body<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<Flow, DecodeError> {
        loop {
            let b = wpull(src)?;
            match b {
                b'}' => return self.finish(src, sink, true),
                b']' => return Err(mismatch(src, self.depth.is_map())),
                b',' => continue,
                b':' => return Err(err(src, SyntaxError::Unexpected(b))),
                b'"' => {
                    self.string(src, |s| &mut s.key)?;
                    self.expect_colon(src)?;
                }
                // A bare key consumes its own colon.
                _ => self.bare_key(src, b)?,
            }
            let b = wpull(src)?;
            let (flow, carry) = self.value(src, sink, b)?;
            if flow == Flow::Halted {
                return Ok(Flow::Halted);
            }
            let sep = match carry {
                Some(c) if !is_ws(c) => c,
                _ => wpull(src)?,
            };
            match sep {
                b',' => {}
                b'}' => return self.finish(src, sink, true),
                b']' => return Err(mismatch(src, self.depth.is_map())),
                other => return Err(err(src, SyntaxError::Unexpected(other))),
            }
        }
    }

    fn list_body<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<Flow, DecodeError> {
        loop {
            let b = wpull(src)?;
            match b {
                b']' => return self.finish(src, sink, false),
                b'}' => return Err(mismatch(src, self.depth.is_map())),
                b',' => continue,
                _ => {}
            }
            let (flow, carry) = self.value(src, sink, b)?;
            if flow == Flow::Halted {
                return Ok(Flow::Halted);
            }
            let sep = match carry {
                Some(c) if !is_ws(c) => c,
                _ => wpull(src)?,
            };
            match sep {
                b',' => {}
                b']' => return self.finish(src, sink, false),
                b'}' => return Err(mismatch(src, self.depth.is_map())),
                other => return Err(err(src, SyntaxError::Unexpected(other))),
            }
        }
    }

    /// Validates the closing byte against the open container kind, then
    /// closes it.
    fn finish<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
        closing_map: bool,
    ) -> Result<Flow, DecodeError> {
        if self.depth.is_map() != closing_map {
            return Err(mismatch(src, self.depth.is_map()));
        }
        self.depth.close();
        Ok(if sink.close() { Flow::Ran } else { Flow::Halted })
    }

    /// Accumulates a bare (unquoted) key up to `:`; `first` is its first
    /// byte. The colon itself is consumed here.
    fn bare_key<S: ByteSource>(&mut self, src: &mut S, first: u8) -> Result<(), DecodeError> {
        self.scratch.key.push(first).map_err(|e| err(src, e))?;
        loop {
            let b = pull(src)?;
            match b {
                b':' => return Ok(()),
                _ if is_ws(b) => {
                    let c = wpull(src)?;
                    if c == b':' {
                        return Ok(());
                    }
                    return Err(err(src, SyntaxError::Unexpected(c)));
                }
                b'"' | b'{' | b'}' | b'[' | b']' | b',' => {
                    return Err(err(src, SyntaxError::Unexpected(b)));
                }
                _ => self.scratch.key.push(b).map_err(|e| err(src, e))?,
            }
        }
    }

    fn expect_colon<S: ByteSource>(&mut self, src: &mut S) -> Result<(), DecodeError> {
        let b = wpull(src)?;
        if b == b':' { Ok(()) } else { Err(err(src, SyntaxError::Unexpected(b))) }
    }

    /// Reads a quoted string (opening quote consumed) into the buffer
    /// selected by `which`, decoding escapes inline.
    fn string<S: ByteSource>(
        &mut self,
        src: &mut S,
        which: impl Fn(&mut Scratch) -> &mut super::Bounded,
    ) -> Result<(), DecodeError> {
        let mut pending = None;
        loop {
            let b = match src.next() {
                Ok(b) => b,
                Err(crate::error::SourceError::UnexpectedEnd) => {
                    return Err(err(src, SyntaxError::UnterminatedString));
                }
                Err(e) => return Err(err(src, e)),
            };
            match b {
                b'"' => {
                    flush_pending(&mut pending, which(&mut self.scratch))
                        .map_err(|e| err(src, e))?;
                    return Ok(());
                }
                b'\\' => {
                    let e = pull(src)?;
                    let literal = match e {
                        b'"' => b'"',
                        b'\\' => b'\\',
                        b'/' => b'/',
                        b'b' => 0x08,
                        b'f' => 0x0C,
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'u' => {
                            let unit = hex_quad(src)?;
                            feed_unit(&mut pending, which(&mut self.scratch), unit)
                                .map_err(|e| err(src, e))?;
                            continue;
                        }
                        other => return Err(err(src, SyntaxError::InvalidEscape(other))),
                    };
                    let buf = which(&mut self.scratch);
                    flush_pending(&mut pending, buf).map_err(|e| err(src, e))?;
                    buf.push(literal).map_err(|e| err(src, e))?;
                }
                _ => {
                    let buf = which(&mut self.scratch);
                    flush_pending(&mut pending, buf).map_err(|e| err(src, e))?;
                    buf.push(b).map_err(|e| err(src, e))?;
                }
            }
        }
    }

    fn submit<K: EventSink>(&mut self, sink: &mut K, kind: TagKind) {
        sink.submit(
            Tag::bare(kind),
            self.scratch.key.buf(),
            self.scratch.value.buf(),
        );
        self.scratch.reset();
    }
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn is_ws(b: u8) -> bool {
    b <= b' '
}

/// Skips whitespace; returns the next significant byte or `None` at end
/// of input.
fn skip_ws<S: ByteSource>(src: &mut S) -> Result<Option<u8>, DecodeError> {
    loop {
        if !more(src)? {
            return Ok(None);
        }
        let b = src.read();
        if !is_ws(b) {
            return Ok(Some(b));
        }
    }
}

/// Like [`skip_ws`] where the grammar requires more input.
fn wpull<S: ByteSource>(src: &mut S) -> Result<u8, DecodeError> {
    loop {
        let b = pull(src)?;
        if !is_ws(b) {
            return Ok(b);
        }
    }
}

fn mismatch<S: ByteSource>(src: &S, open_is_map: bool) -> DecodeError {
    let (expected, found) = if open_is_map { ("map", "list") } else { ("list", "map") };
    err(src, SyntaxError::MismatchedClose { expected, found })
}

/// Advances the source past the containers recorded in `stack` without
/// emitting, honoring strings and escapes, and still validating bracket
/// kinds on the way.
fn skip_containers<S: ByteSource>(src: &mut S, mut stack: DepthStack) -> Result<(), DecodeError> {
    while !stack.is_empty() {
        let b = pull(src)?;
        match b {
            b'"' => loop {
                let c = match src.next() {
                    Ok(c) => c,
                    Err(crate::error::SourceError::UnexpectedEnd) => {
                        return Err(err(src, SyntaxError::UnterminatedString));
                    }
                    Err(e) => return Err(err(src, e)),
                };
                match c {
                    b'"' => break,
                    b'\\' => {
                        pull(src)?;
                    }
                    _ => {}
                }
            },
            b'{' => stack.open(true).map_err(|e| err(src, e))?,
            b'[' => stack.open(false).map_err(|e| err(src, e))?,
            b'}' => {
                if !stack.is_map() {
                    return Err(mismatch(src, stack.is_map()));
                }
                stack.close();
            }
            b']' => {
                if stack.is_map() {
                    return Err(mismatch(src, stack.is_map()));
                }
                stack.close();
            }
            _ => {}
        }
    }
    Ok(())
}
