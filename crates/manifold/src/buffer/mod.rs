//! Growable, pool-backed byte buffers.
//!
//! [`ByteBuf`] is the currency for every key, value, and piece of
//! intermediate text in the crate: decoders accumulate into it, sinks read
//! from it, and the [`BufferPool`] recycles its backing arrays between
//! uses. Content is raw bytes; UTF-8 enters through the append methods
//! (`push_str`, `push_char`, `push_utf16`) which re-encode by hand, and
//! leaves through `to_str`, a lazily cached lossy decode.
//!
//! Two derived views are cached and invalidated on every mutation: the
//! polynomial content hash (`hash_code`) and the decoded string mirror
//! (`to_str`). Equality and ordering are by content, never by capacity.

mod pool;
pub(crate) mod utf8;

use std::{
    cell::{Cell, OnceCell},
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Range,
    sync::Arc,
};

use bstr::{BStr, ByteSlice};
use sha2::{Digest, Sha256, Sha512};

pub use pool::BufferPool;

use crate::error::PoolError;

/// Hash algorithms accepted by [`ByteBuf::digest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha256,
    Sha512,
}

/// A growable byte-backed sequence with UTF-8 append, cached hash/string
/// views, and a pluggable allocation strategy.
///
/// Buffers come in three forms:
/// - plain (`new`, `with_capacity`, `From` impls) — grow on the heap by
///   1.5×,
/// - pooled (`pooled`) — trade backing arrays through a [`BufferPool`],
/// - fixed (`fixed`) — read-only constants; mutation panics.
pub struct ByteBuf {
    data: Box<[u8]>,
    len: usize,
    pool: Option<Arc<BufferPool>>,
    fixed: bool,
    hash: Cell<Option<u32>>,
    text: OnceCell<Box<str>>,
}

impl ByteBuf {
    /// Creates an empty, unpooled buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::default(),
            len: 0,
            pool: None,
            fixed: false,
            hash: Cell::new(None),
            text: OnceCell::new(),
        }
    }

    /// Creates an unpooled buffer with at least `capacity` bytes backing it.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Self::new();
        if capacity > 0 {
            buf.data = vec![0u8; capacity].into_boxed_slice();
        }
        buf
    }

    /// Creates an empty buffer whose backing array is traded through
    /// `pool`. Scratch buffers reset between uses keep their array; only
    /// [`release`](Self::release) (or drop) hands it back.
    #[must_use]
    pub fn pooled(pool: Arc<BufferPool>) -> Self {
        let mut buf = Self::new();
        buf.pool = Some(pool);
        buf
    }

    /// Creates a read-only buffer around a pre-built constant key. The
    /// capacity is frozen: any mutation panics.
    #[must_use]
    pub fn fixed(bytes: &[u8]) -> Self {
        let mut buf = Self::new();
        buf.data = bytes.into();
        buf.len = bytes.len();
        buf.fixed = true;
        buf
    }

    /// Logical length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity of the backing array.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The live content.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    // ---- mutation ------------------------------------------------------

    /// Appends one byte.
    pub fn push(&mut self, byte: u8) {
        self.reserve(1);
        self.data[self.len] = byte;
        self.len += 1;
        self.dirty();
    }

    /// Appends a byte slice.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.reserve(bytes.len());
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        self.dirty();
    }

    /// Appends UTF-8 text.
    pub fn push_str(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
    }

    /// Appends one character, re-encoded to UTF-8.
    pub fn push_char(&mut self, ch: char) {
        let mut tmp = [0u8; 4];
        let n = utf8::encode(ch as u32, &mut tmp);
        self.extend_from_slice(&tmp[..n]);
    }

    /// Appends a Unicode scalar value by code point.
    ///
    /// `code` must not be a surrogate; decoders resolve (or replace)
    /// surrogates before calling this.
    pub(crate) fn push_code_point(&mut self, code: u32) {
        let mut tmp = [0u8; 4];
        let n = utf8::encode(code, &mut tmp);
        self.extend_from_slice(&tmp[..n]);
    }

    /// Appends a sequence of UTF-16 code units, re-encoding to UTF-8.
    ///
    /// A valid high+low surrogate pair becomes one four-byte sequence. An
    /// unpaired or inverted surrogate is replaced with `?` and encoding
    /// continues; this is the crate's lossy-recovery policy, not an error.
    pub fn push_utf16(&mut self, units: &[u16]) {
        let mut iter = units.iter().copied();
        while let Some(unit) = iter.next() {
            let unit = u32::from(unit);
            if utf8::is_high_surrogate(unit) {
                match iter.clone().next().map(u32::from) {
                    Some(low) if utf8::is_low_surrogate(low) => {
                        iter.next();
                        self.push_code_point(utf8::combine_surrogates(unit, low));
                    }
                    _ => self.push(utf8::REPLACEMENT),
                }
            } else if utf8::is_low_surrogate(unit) {
                self.push(utf8::REPLACEMENT);
            } else {
                self.push_code_point(unit);
            }
        }
    }

    /// Overwrites the byte at `index`; negative indices count from the
    /// end. Returns `false` if the index is out of range.
    pub fn set(&mut self, index: isize, byte: u8) -> bool {
        let Some(i) = self.resolve(index) else {
            return false;
        };
        self.assert_mutable();
        self.data[i] = byte;
        self.dirty();
        true
    }

    /// Shortens the buffer to `len` bytes; longer requests are no-ops.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.assert_mutable();
            self.len = len;
            self.dirty();
        }
    }

    /// Resets the buffer to length zero. A pooled buffer trades an
    /// oversized backing array back through the pool rather than keeping
    /// it; capacity stays usable for subsequent appends either way.
    pub fn clear(&mut self) {
        self.assert_mutable();
        self.len = 0;
        self.dirty();
        if let Some(pool) = &self.pool {
            let data = std::mem::take(&mut self.data);
            self.data = pool.exchange(data);
        }
    }

    /// Hands the backing array back to the pool and detaches it. The
    /// buffer stays valid but empty and unpooled; decoders call this at
    /// end of life.
    pub fn release(&mut self) {
        self.len = 0;
        self.dirty();
        let data = std::mem::take(&mut self.data);
        if let Some(pool) = self.pool.take() {
            pool.release(data);
        }
    }

    /// Ensures room for `additional` more bytes, growing through the pool
    /// when one is attached and by 1.5× (or the exact need, if larger)
    /// otherwise. A pool refusal falls back to a plain heap allocation.
    pub fn reserve(&mut self, additional: usize) {
        let min = self.len + additional;
        if min <= self.data.len() {
            return;
        }
        self.assert_mutable();
        if let Err(err) = self.grow(min) {
            // A ceiling refused us; the caller chose the infallible API,
            // so bypass the pool.
            tracing::trace!(%err, min, "pool refused growth, bypassing");
            self.grow_heap(min);
        }
    }

    /// Like [`reserve`](Self::reserve), but surfaces a pool refusal
    /// instead of bypassing it.
    ///
    /// # Errors
    ///
    /// [`PoolError::CapacityExceeded`] when the attached pool has a hard
    /// ceiling below the required capacity.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), PoolError> {
        let min = self.len + additional;
        if min <= self.data.len() {
            return Ok(());
        }
        self.assert_mutable();
        self.grow(min)
    }

    fn grow(&mut self, min: usize) -> Result<(), PoolError> {
        match &self.pool {
            Some(pool) => pool.acquire(&mut self.data, self.len, min),
            None => {
                self.grow_heap(min);
                Ok(())
            }
        }
    }

    fn grow_heap(&mut self, min: usize) {
        let target = min.max(self.data.len() + self.data.len() / 2);
        let mut fresh = vec![0u8; target].into_boxed_slice();
        fresh[..self.len].copy_from_slice(&self.data[..self.len]);
        self.data = fresh;
    }

    #[inline]
    fn assert_mutable(&self) {
        assert!(!self.fixed, "mutating a fixed ByteBuf");
    }

    #[inline]
    fn dirty(&mut self) {
        self.hash.set(None);
        self.text.take();
    }

    // ---- access --------------------------------------------------------

    /// Returns the byte at `index`; negative indices count from the end,
    /// so `get(-1)` is the last byte.
    #[must_use]
    pub fn get(&self, index: isize) -> Option<u8> {
        self.resolve(index).map(|i| self.data[i])
    }

    fn resolve(&self, index: isize) -> Option<usize> {
        let len = self.len as isize;
        let i = if index < 0 { len + index } else { index };
        (0..len).contains(&i).then_some(i as usize)
    }

    /// First occurrence of `needle` (a byte or a sub-slice).
    #[must_use]
    pub fn find<B: AsRef<[u8]>>(&self, needle: B) -> Option<usize> {
        self.as_bytes().find(needle.as_ref())
    }

    /// First occurrence of `needle` at or after `from`. A `from` beyond
    /// the end finds nothing.
    #[must_use]
    pub fn find_at<B: AsRef<[u8]>>(&self, from: usize, needle: B) -> Option<usize> {
        let bytes = self.as_bytes();
        if from > bytes.len() {
            return None;
        }
        bytes[from..].find(needle.as_ref()).map(|i| from + i)
    }

    /// Last occurrence of `needle`.
    #[must_use]
    pub fn rfind<B: AsRef<[u8]>>(&self, needle: B) -> Option<usize> {
        self.as_bytes().rfind(needle.as_ref())
    }

    /// Last occurrence of `needle` that starts at or before `from`.
    #[must_use]
    pub fn rfind_at<B: AsRef<[u8]>>(&self, from: usize, needle: B) -> Option<usize> {
        let needle = needle.as_ref();
        let end = from
            .saturating_add(needle.len())
            .min(self.len);
        self.as_bytes()[..end].rfind(needle)
    }

    #[must_use]
    pub fn contains<B: AsRef<[u8]>>(&self, needle: B) -> bool {
        self.find(needle).is_some()
    }

    #[must_use]
    pub fn starts_with<B: AsRef<[u8]>>(&self, prefix: B) -> bool {
        self.as_bytes().starts_with(prefix.as_ref())
    }

    #[must_use]
    pub fn ends_with<B: AsRef<[u8]>>(&self, suffix: B) -> bool {
        self.as_bytes().ends_with(suffix.as_ref())
    }

    /// Copies `range` out into an independent, unpooled buffer.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds, as slicing does.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> ByteBuf {
        ByteBuf::from(&self.as_bytes()[range])
    }

    /// The content decoded as UTF-8, computed lazily and cached until the
    /// next mutation. Invalid sequences decode lossily (U+FFFD).
    #[must_use]
    pub fn to_str(&self) -> &str {
        self.text
            .get_or_init(|| String::from_utf8_lossy(self.as_bytes()).into())
    }

    /// An owned copy of the live content.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Polynomial content hash (`h = 31*h + byte` over the raw bytes),
    /// computed lazily and cached until the next mutation. Equal contents
    /// always produce equal hashes, whatever the capacities involved.
    #[must_use]
    pub fn hash_code(&self) -> u32 {
        if let Some(h) = self.hash.get() {
            return h;
        }
        let mut h = 0u32;
        for &b in self.as_bytes() {
            h = h.wrapping_mul(31).wrapping_add(u32::from(b));
        }
        self.hash.set(Some(h));
        h
    }

    /// Hashes the content with `algorithm` and returns lowercase hex.
    #[must_use]
    pub fn digest(&self, algorithm: Algorithm) -> String {
        fn hex(bytes: &[u8]) -> String {
            use std::fmt::Write;
            let mut out = String::with_capacity(bytes.len() * 2);
            for b in bytes {
                let _ = write!(out, "{b:02x}");
            }
            out
        }
        match algorithm {
            Algorithm::Sha256 => hex(&Sha256::digest(self.as_bytes())),
            Algorithm::Sha512 => hex(&Sha512::digest(self.as_bytes())),
        }
    }

    // ---- lenient numeric views ----------------------------------------

    /// Parses the content as an integer, returning `default` on malformed
    /// input instead of failing. Accepts a sign and `0x`/`0o`/`0b`
    /// prefixes; surrounding ASCII whitespace is ignored.
    #[must_use]
    pub fn to_i64(&self, default: i64) -> i64 {
        parse_int(self.as_bytes()).unwrap_or(default)
    }

    /// See [`to_i64`](Self::to_i64); out-of-range values yield `default`.
    #[must_use]
    pub fn to_i32(&self, default: i32) -> i32 {
        parse_int(self.as_bytes())
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(default)
    }

    /// Parses the content as a float, returning `default` on malformed
    /// input.
    #[must_use]
    pub fn to_f64(&self, default: f64) -> f64 {
        std::str::from_utf8(self.as_bytes())
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    /// See [`to_f64`](Self::to_f64).
    #[must_use]
    pub fn to_f32(&self, default: f32) -> f32 {
        std::str::from_utf8(self.as_bytes())
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Parses `true`/`false`/`1`/`0` (ASCII case-insensitive), returning
    /// `default` for anything else.
    #[must_use]
    pub fn to_bool(&self, default: bool) -> bool {
        let bytes = trim_ascii(self.as_bytes());
        if bytes.eq_ignore_ascii_case(b"true") || bytes == b"1" {
            true
        } else if bytes.eq_ignore_ascii_case(b"false") || bytes == b"0" {
            false
        } else {
            default
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace());
    let Some(start) = start else { return &[] };
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).unwrap();
    &bytes[start..=end]
}

fn parse_int(bytes: &[u8]) -> Option<i64> {
    let bytes = trim_ascii(bytes);
    let (negative, bytes) = match bytes.first()? {
        b'-' => (true, &bytes[1..]),
        b'+' => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    let (radix, digits) = match bytes {
        [b'0', b'x' | b'X', rest @ ..] => (16, rest),
        [b'0', b'o' | b'O', rest @ ..] => (8, rest),
        [b'0', b'b' | b'B', rest @ ..] => (2, rest),
        _ => (10, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    // Accumulate negatively so i64::MIN parses without overflow.
    let mut acc = 0i64;
    for &b in digits {
        let d = (b as char).to_digit(radix)?;
        acc = acc
            .checked_mul(i64::from(radix))?
            .checked_sub(i64::from(d))?;
    }
    if negative { Some(acc) } else { acc.checked_neg() }
}

impl Default for ByteBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ByteBuf {
    fn drop(&mut self) {
        if self.pool.is_some() {
            self.release();
        }
    }
}

impl Clone for ByteBuf {
    /// Clones content only: the clone is unpooled and mutable.
    fn clone(&self) -> Self {
        ByteBuf::from(self.as_bytes())
    }
}

impl fmt::Debug for ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(BStr::new(self.as_bytes()), f)
    }
}

impl fmt::Display for ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl From<&[u8]> for ByteBuf {
    fn from(bytes: &[u8]) -> Self {
        let mut buf = ByteBuf::new();
        buf.extend_from_slice(bytes);
        buf
    }
}

impl From<&str> for ByteBuf {
    fn from(s: &str) -> Self {
        ByteBuf::from(s.as_bytes())
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(v: Vec<u8>) -> Self {
        let len = v.len();
        let mut buf = ByteBuf::new();
        buf.data = v.into_boxed_slice();
        buf.len = len;
        buf
    }
}

impl AsRef<[u8]> for ByteBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for ByteBuf {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteBuf {}

impl PartialOrd for ByteBuf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByteBuf {
    /// Lexicographic by unsigned byte, shorter prefix first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl PartialEq<[u8]> for ByteBuf {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for ByteBuf {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl PartialEq<str> for ByteBuf {
    /// Compares each byte as an unsigned Latin-1 code point against each
    /// character, so `[0xE9]` equals `"é"`.
    fn eq(&self, other: &str) -> bool {
        let mut chars = other.chars();
        for &b in self.as_bytes() {
            match chars.next() {
                Some(c) if c as u32 == u32::from(b) => {}
                _ => return false,
            }
        }
        chars.next().is_none()
    }
}

impl PartialEq<&str> for ByteBuf {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl Hash for ByteBuf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::options::PoolOptions;

    #[test]
    fn append_roundtrip() {
        let mut buf = ByteBuf::new();
        buf.push_str("grüße, ");
        buf.push_char('世');
        buf.push(b'!');
        assert_eq!(buf.to_str(), "grüße, 世!");
        assert_eq!(buf.len(), "grüße, 世!".len());
    }

    #[test]
    fn utf16_surrogate_pair_encodes_four_bytes() {
        let mut buf = ByteBuf::new();
        buf.push_utf16(&[0xD83D, 0xDE00]);
        assert_eq!(buf.as_bytes(), "😀".as_bytes());
    }

    #[test]
    fn unpaired_surrogates_are_replaced_not_errors() {
        let mut buf = ByteBuf::new();
        // high with no low, low alone, high at end of input
        buf.push_utf16(&[0xD800, 0x78, 0xDC00, 0xD83D]);
        assert_eq!(buf.as_bytes(), b"?x??");
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let mut buf = ByteBuf::from("abcd");
        assert_eq!(buf.get(0), Some(b'a'));
        assert_eq!(buf.get(-1), Some(b'd'));
        assert_eq!(buf.get(-4), Some(b'a'));
        assert_eq!(buf.get(-5), None);
        assert_eq!(buf.get(4), None);
        assert!(buf.set(-1, b'D'));
        assert_eq!(buf.as_bytes(), b"abcD");
        assert!(!buf.set(9, b'!'));
    }

    #[test]
    fn find_and_rfind() {
        let buf = ByteBuf::from("one, two, one");
        assert_eq!(buf.find("one"), Some(0));
        assert_eq!(buf.rfind("one"), Some(10));
        assert_eq!(buf.find([b',']), Some(3));
        assert_eq!(buf.find("three"), None);
        assert!(buf.contains("two"));
        assert!(buf.starts_with("one,"));
        assert!(buf.ends_with("one"));
    }

    #[test]
    fn find_from_an_offset() {
        let buf = ByteBuf::from("one, two, one");
        assert_eq!(buf.find_at(1, "one"), Some(10));
        assert_eq!(buf.find_at(10, "one"), Some(10));
        assert_eq!(buf.find_at(11, "one"), None);
        assert_eq!(buf.find_at(99, "one"), None);
        assert_eq!(buf.rfind_at(9, "one"), Some(0));
        assert_eq!(buf.rfind_at(10, "one"), Some(10));
        assert_eq!(buf.rfind_at(0, "one"), Some(0));
    }

    #[test]
    fn slice_is_independent() {
        let buf = ByteBuf::from("hello world");
        let mut part = buf.slice(6..11);
        assert_eq!(part.as_bytes(), b"world");
        part.push(b'!');
        assert_eq!(buf.as_bytes(), b"hello world");
    }

    #[test]
    fn caches_invalidate_on_mutation() {
        let mut buf = ByteBuf::from("ab");
        let h1 = buf.hash_code();
        assert_eq!(buf.to_str(), "ab");
        buf.push(b'c');
        assert_ne!(buf.hash_code(), h1);
        assert_eq!(buf.to_str(), "abc");
        buf.truncate(2);
        assert_eq!(buf.hash_code(), h1);
        assert_eq!(buf.to_str(), "ab");
    }

    #[test]
    fn equal_content_equal_hash_regardless_of_capacity() {
        let a = ByteBuf::from("kraity");
        let mut b = ByteBuf::with_capacity(1024);
        b.push_str("kraity");
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
    }

    #[test]
    fn polynomial_hash_matches_latin1_string_hash() {
        // "id" => 31*'i' + 'd'
        let buf = ByteBuf::from("id");
        assert_eq!(buf.hash_code(), 31 * u32::from(b'i') + u32::from(b'd'));
    }

    #[test]
    fn latin1_comparison_against_str() {
        let buf = ByteBuf::from(&[0xE9u8][..]);
        assert_eq!(buf, "é");
        assert_ne!(ByteBuf::from("abc"), "ab");
        assert_eq!(ByteBuf::from("abc"), "abc");
    }

    #[test]
    fn ordering_falls_back_to_length() {
        assert!(ByteBuf::from("ab") < ByteBuf::from("abc"));
        assert!(ByteBuf::from("ac") > ByteBuf::from("abc"));
    }

    #[test]
    fn lenient_integer_parsing() {
        assert_eq!(ByteBuf::from("123").to_i32(-1), 123);
        assert_eq!(ByteBuf::from(" -45 ").to_i64(0), -45);
        assert_eq!(ByteBuf::from("0x10").to_i32(0), 16);
        assert_eq!(ByteBuf::from("0b101").to_i32(0), 5);
        assert_eq!(ByteBuf::from("0o17").to_i32(0), 15);
        assert_eq!(ByteBuf::from("12a").to_i32(-1), -1);
        assert_eq!(ByteBuf::from("").to_i32(-1), -1);
        assert_eq!(ByteBuf::from("9223372036854775807").to_i64(0), i64::MAX);
        assert_eq!(ByteBuf::from("-9223372036854775808").to_i64(0), i64::MIN);
        assert_eq!(ByteBuf::from("9223372036854775808").to_i64(7), 7);
        // Too wide for i32 falls back to the default.
        assert_eq!(ByteBuf::from("4294967296").to_i32(-1), -1);
    }

    #[test]
    fn lenient_float_and_bool_parsing() {
        assert_eq!(ByteBuf::from("1.5").to_f64(0.0), 1.5);
        assert_eq!(ByteBuf::from("not a float").to_f64(2.5), 2.5);
        assert_eq!(ByteBuf::from("2.5").to_f32(0.0), 2.5);
        assert!(ByteBuf::from("TRUE").to_bool(false));
        assert!(!ByteBuf::from("false").to_bool(true));
        assert!(ByteBuf::from("1").to_bool(false));
        assert!(ByteBuf::from("maybe").to_bool(true));
    }

    #[test]
    fn digest_hex() {
        let buf = ByteBuf::from("abc");
        assert_eq!(
            buf.digest(Algorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(buf.digest(Algorithm::Sha512).len(), 128);
    }

    #[test]
    fn pooled_clear_keeps_usable_capacity() {
        let pool = Arc::new(BufferPool::new(PoolOptions::default()));
        let mut buf = ByteBuf::pooled(Arc::clone(&pool));
        buf.push_str("some scratch content");
        let cap = buf.capacity();
        assert!(cap >= 20);
        buf.clear();
        assert_eq!(buf.len(), 0);
        // Still usable without reallocating: capacity covers the append.
        assert!(buf.capacity() >= cap.min(pool.options().class_width));
        buf.push_str("again");
        assert_eq!(buf.as_bytes(), b"again");
    }

    #[test]
    fn release_detaches_the_pool() {
        let pool = Arc::new(BufferPool::new(PoolOptions::default()));
        let mut buf = ByteBuf::pooled(pool);
        buf.push_str("content");
        buf.release();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);
        // Further use grows on the heap instead of the pool.
        buf.push(b'x');
        assert_eq!(buf.as_bytes(), b"x");
    }

    #[test]
    fn pooled_growth_reuses_released_arrays() {
        let pool = Arc::new(BufferPool::new(PoolOptions::default()));
        {
            let mut warm = ByteBuf::pooled(Arc::clone(&pool));
            warm.extend_from_slice(&[0u8; 3000]);
        } // drop releases the ~3 KiB array into the pool
        let mut buf = ByteBuf::pooled(Arc::clone(&pool));
        buf.push_str("hi");
        buf.reserve(2500);
        assert!(buf.capacity() >= 2502);
        assert_eq!(buf.as_bytes(), b"hi");
    }

    #[test]
    fn try_reserve_surfaces_the_ceiling() {
        let pool = Arc::new(BufferPool::new(PoolOptions {
            ceiling: 64,
            ..Default::default()
        }));
        let mut buf = ByteBuf::pooled(pool);
        let err = buf.try_reserve(65).unwrap_err();
        assert!(matches!(err, PoolError::CapacityExceeded { .. }));
        // The infallible path bypasses instead.
        buf.reserve(65);
        assert!(buf.capacity() >= 65);
    }

    #[test]
    #[should_panic(expected = "fixed ByteBuf")]
    fn fixed_buffers_reject_mutation() {
        let mut buf = ByteBuf::fixed(b"const-key");
        buf.push(b'!');
    }

    #[test]
    fn fixed_buffers_read_fine() {
        let buf = ByteBuf::fixed(b"id");
        assert_eq!(buf.as_bytes(), b"id");
        assert_eq!(buf.to_str(), "id");
        assert_eq!(buf.hash_code(), ByteBuf::from("id").hash_code());
    }
}
