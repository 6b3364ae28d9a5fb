//! Shared plumbing for the three decoders.
//!
//! Each decoder owns a [`Scratch`] (three pooled buffers for tag, key, and
//! value text, each with a configured ceiling), a [`DepthStack`] (the
//! two-word bitmask that bounds container nesting and remembers each
//! level's kind), and the surrogate-pairing state machine used when
//! decoding 4-hex-digit escapes.
//!
//! Everything here is byte-driven: decoders pull one byte at a time from a
//! [`ByteSource`] and never look ahead, so any helper that would need
//! lookahead instead hands unconsumed bytes back to the caller.

mod json;
mod markup;
mod native;

use std::sync::Arc;

pub use json::JsonDecoder;
pub use markup::MarkupDecoder;
pub use native::NativeDecoder;

use crate::{
    buffer::{BufferPool, ByteBuf, utf8},
    error::{DecodeError, ErrorSource, PoolError, SyntaxError},
    options::DecoderOptions,
    source::ByteSource,
};

/// Builds a [`DecodeError`] at the source's current position.
pub(crate) fn err<S: ByteSource>(src: &S, e: impl Into<ErrorSource>) -> DecodeError {
    DecodeError::new(e, src.position())
}

/// Pulls one byte where the grammar requires more input to exist.
pub(crate) fn pull<S: ByteSource>(src: &mut S) -> Result<u8, DecodeError> {
    src.next().map_err(|e| DecodeError::new(e, src.position()))
}

/// Whether at least one byte remains, with I/O errors positioned.
pub(crate) fn more<S: ByteSource>(src: &mut S) -> Result<bool, DecodeError> {
    src.has_more().map_err(|e| DecodeError::new(e, src.position()))
}

// ---- bounded scratch buffers -------------------------------------------

/// A pooled scratch buffer with a hard ceiling.
///
/// Appends past the ceiling fail with a resource error; the buffer is
/// reset, never reallocated, between submissions.
pub(crate) struct Bounded {
    buf: ByteBuf,
    limit: usize,
}

impl Bounded {
    fn new(pool: &Arc<BufferPool>, limit: usize) -> Self {
        Self { buf: ByteBuf::pooled(Arc::clone(pool)), limit }
    }

    #[inline]
    fn ensure(&self, extra: usize) -> Result<(), PoolError> {
        let requested = self.buf.len() + extra;
        if requested > self.limit {
            return Err(PoolError::CapacityExceeded { requested, ceiling: self.limit });
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, byte: u8) -> Result<(), PoolError> {
        self.ensure(1)?;
        self.buf.push(byte);
        Ok(())
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), PoolError> {
        self.ensure(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn push_code_point(&mut self, code: u32) -> Result<(), PoolError> {
        self.ensure(4)?;
        self.buf.push_code_point(code);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    /// The buffer as handed to sink calls.
    pub(crate) fn buf(&self) -> &ByteBuf {
        &self.buf
    }

    /// Moves this buffer's content into `other`, leaving this one empty.
    pub(crate) fn move_into(&mut self, other: &mut Bounded) -> Result<(), PoolError> {
        other.extend_from_slice(self.buf.as_bytes())?;
        self.clear();
        Ok(())
    }
}

/// The three scratch buffers every decoder owns.
///
/// Reset (not reallocated) after each `submit`/`open`; backing arrays
/// return to the pool only when the decoder itself is dropped.
pub(crate) struct Scratch {
    pub tag: Bounded,
    pub key: Bounded,
    pub value: Bounded,
}

impl Scratch {
    pub(crate) fn new(pool: &Arc<BufferPool>, options: &DecoderOptions) -> Self {
        Self {
            tag: Bounded::new(pool, options.tag_limit),
            key: Bounded::new(pool, options.key_limit),
            value: Bounded::new(pool, options.value_limit),
        }
    }

    /// Resets all three buffers, keeping their arrays.
    pub(crate) fn reset(&mut self) {
        self.tag.clear();
        self.key.clear();
        self.value.clear();
    }
}

// ---- nesting stack ------------------------------------------------------

/// Container-kind bookkeeping in two machine words.
///
/// `mask` has a single bit set marking the current depth; `data` records,
/// at each mask position, whether that open container is map-kind. Both
/// shift left on open and right on close, which caps nesting at
/// [`DepthStack::LIMIT`] levels — exceeding the cap is a hard error, not
/// silent truncation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DepthStack {
    data: u64,
    mask: u64,
}

impl DepthStack {
    /// Safely usable nesting levels in a 64-bit word.
    pub(crate) const LIMIT: u32 = 63;

    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a newly opened container of the given kind.
    pub(crate) fn open(&mut self, map: bool) -> Result<(), SyntaxError> {
        if self.mask >> (Self::LIMIT - 1) != 0 {
            return Err(SyntaxError::DepthExceeded(Self::LIMIT));
        }
        self.mask = if self.mask == 0 { 1 } else { self.mask << 1 };
        if map {
            self.data |= self.mask;
        } else {
            self.data &= !self.mask;
        }
        Ok(())
    }

    /// Whether the innermost open container is map-kind. Meaningless at
    /// depth zero.
    pub(crate) fn is_map(&self) -> bool {
        self.data & self.mask != 0
    }

    /// Pops one level.
    pub(crate) fn close(&mut self) {
        debug_assert!(self.mask != 0, "close on empty depth stack");
        self.mask >>= 1;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Number of currently open containers.
    pub(crate) fn depth(&self) -> u32 {
        if self.mask == 0 { 0 } else { self.mask.trailing_zeros() + 1 }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---- unicode escape pairing --------------------------------------------

/// Reads the four hex digits of a `\uXXXX`-style escape (the `\u` part is
/// already consumed) and returns the raw UTF-16 code unit.
pub(crate) fn hex_quad<S: ByteSource>(src: &mut S) -> Result<u32, DecodeError> {
    let mut quad = utf8::HexQuad::new();
    loop {
        let b = match src.next() {
            Ok(b) => b,
            Err(crate::error::SourceError::UnexpectedEnd) => {
                return Err(err(src, SyntaxError::TruncatedEscape));
            }
            Err(e) => return Err(err(src, e)),
        };
        if let Some(unit) = quad.feed(b).map_err(|e| err(src, e))? {
            return Ok(unit);
        }
    }
}

/// Feeds one decoded UTF-16 code unit into `buf`, pairing surrogates.
///
/// A high surrogate is parked in `pending` until the next unit arrives; a
/// valid low completes the pair, anything else writes the replacement
/// byte and is then classified fresh. Callers must
/// [`flush_pending`] before any non-escape byte and at token end.
pub(crate) fn feed_unit(
    pending: &mut Option<u32>,
    buf: &mut Bounded,
    unit: u32,
) -> Result<(), PoolError> {
    if let Some(high) = pending.take() {
        if utf8::is_low_surrogate(unit) {
            return buf.push_code_point(utf8::combine_surrogates(high, unit));
        }
        buf.push(utf8::REPLACEMENT)?;
    }
    if utf8::is_high_surrogate(unit) {
        *pending = Some(unit);
        Ok(())
    } else if utf8::is_low_surrogate(unit) {
        buf.push(utf8::REPLACEMENT)
    } else {
        buf.push_code_point(unit)
    }
}

/// Replaces a parked, unpaired high surrogate with `?`.
pub(crate) fn flush_pending(pending: &mut Option<u32>, buf: &mut Bounded) -> Result<(), PoolError> {
    if pending.take().is_some() {
        buf.push(utf8::REPLACEMENT)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::PoolOptions, source::SliceSource};

    fn bounded(limit: usize) -> Bounded {
        let pool = Arc::new(BufferPool::new(PoolOptions::default()));
        Bounded::new(&pool, limit)
    }

    #[test]
    fn depth_stack_tracks_kinds() {
        let mut d = DepthStack::new();
        assert!(d.is_empty());
        d.open(true).unwrap();
        d.open(false).unwrap();
        assert!(!d.is_map());
        assert_eq!(d.depth(), 2);
        d.close();
        assert!(d.is_map());
        d.close();
        assert!(d.is_empty());
    }

    #[test]
    fn depth_stack_caps_at_limit() {
        let mut d = DepthStack::new();
        for _ in 0..DepthStack::LIMIT {
            d.open(true).unwrap();
        }
        assert_eq!(d.depth(), DepthStack::LIMIT);
        assert_eq!(d.open(true).unwrap_err(), SyntaxError::DepthExceeded(63));
    }

    #[test]
    fn depth_stack_kind_survives_reopen() {
        let mut d = DepthStack::new();
        d.open(false).unwrap();
        d.open(true).unwrap();
        d.close();
        // Back inside the list; a stale map bit must not leak through.
        assert!(!d.is_map());
        d.open(false).unwrap();
        assert!(!d.is_map());
    }

    #[test]
    fn bounded_enforces_its_ceiling() {
        let mut b = bounded(4);
        b.extend_from_slice(b"abcd").unwrap();
        assert!(matches!(b.push(b'e'), Err(PoolError::CapacityExceeded { .. })));
        b.clear();
        b.push(b'x').unwrap();
        assert_eq!(b.as_bytes(), b"x");
    }

    #[test]
    fn hex_quad_reads_exactly_four() {
        let mut src = SliceSource::from("0041rest");
        assert_eq!(hex_quad(&mut src).unwrap(), 0x41);
        assert_eq!(src.remainder(), b"rest");
    }

    #[test]
    fn hex_quad_errors_are_positioned() {
        let mut src = SliceSource::from("00");
        let e = hex_quad(&mut src).unwrap_err();
        assert!(matches!(
            e.source(),
            ErrorSource::Syntax(SyntaxError::TruncatedEscape)
        ));
        assert_eq!(e.offset(), 2);
    }

    #[test]
    fn surrogate_pairing_and_replacement() {
        let mut buf = bounded(64);
        let mut pending = None;
        feed_unit(&mut pending, &mut buf, 0xD83D).unwrap();
        feed_unit(&mut pending, &mut buf, 0xDE00).unwrap();
        assert_eq!(buf.as_bytes(), "😀".as_bytes());

        buf.clear();
        feed_unit(&mut pending, &mut buf, 0xD800).unwrap();
        // A second high surrogate replaces the first and parks itself.
        feed_unit(&mut pending, &mut buf, 0xD801).unwrap();
        flush_pending(&mut pending, &mut buf).unwrap();
        assert_eq!(buf.as_bytes(), b"??");

        buf.clear();
        feed_unit(&mut pending, &mut buf, 0xDC00).unwrap();
        assert_eq!(buf.as_bytes(), b"?");
    }
}
