//! Decoder for the markup (XML-like) dialect.
//!
//! Elements open lazily: a start tag alone only parks the element name,
//! because a text-only element like `<id>1</id>` becomes a single leaf
//! `submit` rather than an open/close pair. What forces the real `open`
//! is the first attribute or the first child element; `</name>` then
//! either completes the parked leaf or closes the opened container, with
//! the close name validated byte-for-byte at every depth.
//!
//! `<?...?>` and `<!--...-->` are consumed and discarded, `<![CDATA[...]]>`
//! copies verbatim with no escape decoding, and exactly five entity
//! references (`&lt; &gt; &amp; &quot; &apos;`) decode in text and
//! attribute values — anything else behind `&` is a decode error.
//! Whitespace-only text between structural tags is discarded.

use std::sync::Arc;

use tracing::trace;

use super::{DepthStack, Scratch, err, more, pull};
use crate::{
    buffer::{BufferPool, ByteBuf},
    error::{DecodeError, SourceError, SyntaxError},
    options::DecoderOptions,
    sink::{EventSink, Tag, TagKind},
    source::ByteSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Ran,
    Halted,
}

/// Names of the currently opened (emitted) elements, newest last, stored
/// end-to-end in one pooled buffer.
struct NameStack {
    buf: ByteBuf,
    marks: Vec<usize>,
}

impl NameStack {
    fn new(pool: &Arc<BufferPool>) -> Self {
        Self { buf: ByteBuf::pooled(Arc::clone(pool)), marks: Vec::new() }
    }

    fn push(&mut self, name: &[u8]) {
        self.marks.push(self.buf.len());
        self.buf.extend_from_slice(name);
    }

    fn top(&self) -> &[u8] {
        let Some(&mark) = self.marks.last() else {
            return b"";
        };
        &self.buf.as_bytes()[mark..]
    }

    fn pop(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.buf.truncate(mark);
        }
    }

    fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    fn clear(&mut self) {
        self.marks.clear();
        self.buf.clear();
    }
}

/// Streaming decoder for the markup dialect.
///
/// One [`decode`](Self::decode) call processes one document to completion
/// or to its first fatal error. Reusable across documents; dropping it
/// returns the scratch arrays to the pool.
pub struct MarkupDecoder {
    scratch: Scratch,
    depth: DepthStack,
    names: NameStack,
    /// Whether the accumulated text holds anything worth emitting (a
    /// non-whitespace byte, an entity, or CDATA content).
    significant: bool,
}

impl MarkupDecoder {
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
            names: NameStack::new(&pool),
            significant: false,
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
        self.names.clear();
        self.significant = false;
        outcome
    }

    fn run<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<(), DecodeError> {
        loop {
            if !more(src)? {
                if !self.names.is_empty() || self.pending() {
                    return Err(err(src, SourceError::UnexpectedEnd));
                }
                return Ok(());
            }
            let b = src.read();
            match b {
                b'<' => {
                    if let Flow::Halted = self.dispatch(src, sink)? {
                        let levels = self.depth.depth();
                        trace!(levels, "sink halted, draining document");
                        self.depth.reset();
                        self.names.clear();
                        return skip_content(src, levels);
                    }
                }
                b'&' => {
                    self.guard_text(src, b)?;
                    let literal = entity(src)?;
                    self.scratch.value.push(literal).map_err(|e| err(src, e))?;
                    self.significant = true;
                }
                _ => {
                    if !is_space(b) {
                        self.guard_text(src, b)?;
                        self.significant = true;
                    }
                    if self.in_element() {
                        self.scratch.value.push(b).map_err(|e| err(src, e))?;
                    }
                }
            }
        }
    }

    /// Whether a start tag has been seen but not yet opened.
    fn pending(&self) -> bool {
        !self.scratch.tag.is_empty()
    }

    /// Whether text currently accumulates under some element.
    fn in_element(&self) -> bool {
        self.pending() || !self.names.is_empty()
    }

    /// Text content is only legal inside an element.
    fn guard_text<S: ByteSource>(&self, src: &S, byte: u8) -> Result<(), DecodeError> {
        if self.in_element() {
            Ok(())
        } else {
            Err(err(src, SyntaxError::Unexpected(byte)))
        }
    }

    /// Handles everything behind a `<`.
    fn dispatch<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<Flow, DecodeError> {
        let b = pull(src)?;
        match b {
            b'?' => {
                skip_instruction(src)?;
                Ok(Flow::Ran)
            }
            b'!' => {
                self.bang(src)?;
                Ok(Flow::Ran)
            }
            b'/' => self.close_tag(src, sink),
            b'>' | b'=' | b'"' | b'\'' | b'&' | b'<' => {
                Err(err(src, SyntaxError::Unexpected(b)))
            }
            _ if is_space(b) => Err(err(src, SyntaxError::Unexpected(b))),
            _ => self.start_tag(src, sink, b),
        }
    }

    /// `<!--...-->` is discarded; `<![CDATA[...]]>` copies verbatim.
    fn bang<S: ByteSource>(&mut self, src: &mut S) -> Result<(), DecodeError> {
        match pull(src)? {
            b'-' => {
                expect(src, b'-')?;
                skip_comment(src)
            }
            b'[' => {
                for want in *b"CDATA[" {
                    expect(src, want)?;
                }
                self.guard_text(src, b'[')?;
                self.cdata(src)
            }
            other => Err(err(src, SyntaxError::Unexpected(other))),
        }
    }

    /// Copies raw bytes until `]]>`, no escape decoding.
    fn cdata<S: ByteSource>(&mut self, src: &mut S) -> Result<(), DecodeError> {
        self.significant = true;
        loop {
            let b = pull(src)?;
            self.scratch.value.push(b).map_err(|e| err(src, e))?;
            if b == b'>' && self.scratch.value.as_bytes().ends_with(b"]]>") {
                self.scratch.value.truncate(self.scratch.value.len() - 3);
                return Ok(());
            }
        }
    }

    /// Parses a start tag whose name begins with `first`.
    fn start_tag<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
        first: u8,
    ) -> Result<Flow, DecodeError> {
        // A child element forces the parked parent open.
        if self.pending() && !self.open_pending(src, sink)? {
            // Parent rejected: the subtree to skip spans this child's
            // partially read start tag and the rest of the parent.
            if !skip_tag_rest(src)? {
                skip_content(src, 1)?;
            }
            skip_content(src, 1)?;
            self.clear_text();
            return Ok(Flow::Ran);
        }
        self.flush_text(sink)?;

        // Element name.
        self.scratch.tag.push(first).map_err(|e| err(src, e))?;
        let mut b = pull(src)?;
        loop {
            match b {
                b'>' | b'/' => break,
                _ if is_space(b) => break,
                b'<' | b'=' | b'"' | b'\'' | b'&' => {
                    return Err(err(src, SyntaxError::Unexpected(b)));
                }
                _ => self.scratch.tag.push(b).map_err(|e| err(src, e))?,
            }
            b = pull(src)?;
        }

        // Attributes, each an immediate submit inside the opened element.
        let mut opened = false;
        loop {
            if is_space(b) {
                b = wpull(src)?;
                continue;
            }
            match b {
                b'>' => {
                    // Without attributes the element stays parked; with
                    // them it is already open and content follows.
                    return Ok(Flow::Ran);
                }
                b'/' => {
                    expect(src, b'>')?;
                    if opened {
                        return self.finish(sink);
                    }
                    // Empty childless element: a single empty leaf.
                    self.submit_leaf(sink);
                    return Ok(Flow::Ran);
                }
                b'=' | b'"' | b'\'' | b'<' | b'&' => {
                    return Err(err(src, SyntaxError::Unexpected(b)));
                }
                _ => {
                    if !opened {
                        if !self.open_pending(src, sink)? {
                            if !skip_tag_rest(src)? {
                                skip_content(src, 1)?;
                            }
                            self.clear_text();
                            return Ok(Flow::Ran);
                        }
                        opened = true;
                    }
                    b = self.attribute(src, sink, b)?;
                    continue;
                }
            }
        }
    }

    /// Parses one `name="value"` attribute, `first` being the first name
    /// byte, and submits it. Returns the byte after the closing quote.
    fn attribute<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
        first: u8,
    ) -> Result<u8, DecodeError> {
        self.scratch.key.push(first).map_err(|e| err(src, e))?;
        let mut b = pull(src)?;
        loop {
            match b {
                b'=' => break,
                _ if is_space(b) => {
                    b = wpull(src)?;
                    if b != b'=' {
                        return Err(err(src, SyntaxError::Unexpected(b)));
                    }
                    break;
                }
                b'>' | b'/' | b'<' | b'"' | b'\'' | b'&' => {
                    return Err(err(src, SyntaxError::Unexpected(b)));
                }
                _ => {
                    self.scratch.key.push(b).map_err(|e| err(src, e))?;
                    b = pull(src)?;
                }
            }
        }
        let quote = wpull(src)?;
        if quote != b'"' && quote != b'\'' {
            return Err(err(src, SyntaxError::Unexpected(quote)));
        }
        loop {
            let b = pull(src)?;
            match b {
                _ if b == quote => break,
                b'&' => {
                    let literal = entity(src)?;
                    self.scratch.value.push(literal).map_err(|e| err(src, e))?;
                }
                b'<' => return Err(err(src, SyntaxError::Unexpected(b))),
                _ => self.scratch.value.push(b).map_err(|e| err(src, e))?,
            }
        }
        sink.submit(
            Tag::bare(TagKind::Text),
            self.scratch.key.buf(),
            self.scratch.value.buf(),
        );
        self.scratch.key.clear();
        self.scratch.value.clear();
        pull(src)
    }

    /// Parses `</name>`, validating against the parked leaf or the
    /// innermost opened element.
    fn close_tag<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<Flow, DecodeError> {
        self.scratch.key.clear();
        let mut b = pull(src)?;
        loop {
            match b {
                b'>' => break,
                _ if is_space(b) => {
                    b = wpull(src)?;
                    if b != b'>' {
                        return Err(err(src, SyntaxError::Unexpected(b)));
                    }
                    break;
                }
                b'<' | b'/' | b'=' | b'"' | b'\'' | b'&' => {
                    return Err(err(src, SyntaxError::Unexpected(b)));
                }
                _ => {
                    self.scratch.key.push(b).map_err(|e| err(src, e))?;
                    b = pull(src)?;
                }
            }
        }
        if self.scratch.key.is_empty() {
            return Err(err(src, SyntaxError::MismatchedTag));
        }
        if self.pending() {
            // The parked element turns out to be a leaf.
            if self.scratch.key.as_bytes() != self.scratch.tag.as_bytes() {
                return Err(err(src, SyntaxError::MismatchedTag));
            }
            if !self.significant {
                self.scratch.value.clear();
            }
            self.submit_leaf(sink);
            return Ok(Flow::Ran);
        }
        if self.scratch.key.as_bytes() != self.names.top() {
            return Err(err(src, SyntaxError::MismatchedTag));
        }
        self.scratch.key.clear();
        self.flush_text(sink)?;
        self.finish(sink)
    }

    /// Emits the deferred `open` for the parked element. On rejection the
    /// caller owns the skip; text and the parked name are dropped here.
    fn open_pending<S: ByteSource, K: EventSink>(
        &mut self,
        src: &mut S,
        sink: &mut K,
    ) -> Result<bool, DecodeError> {
        // Reserve the depth level first so a full stack never leaves the
        // sink with a dangling open.
        self.depth.open(true).map_err(|e| err(src, e))?;
        let tag = Tag::new(TagKind::Map, self.scratch.tag.as_bytes());
        if !sink.open(tag, self.scratch.tag.buf()) {
            trace!("element rejected, skipping subtree");
            self.depth.close();
            self.scratch.tag.clear();
            return Ok(false);
        }
        self.names.push(self.scratch.tag.as_bytes());
        self.scratch.tag.clear();
        Ok(true)
    }

    /// Closes the innermost opened element.
    fn finish<K: EventSink>(&mut self, sink: &mut K) -> Result<Flow, DecodeError> {
        self.depth.close();
        self.names.pop();
        Ok(if sink.close() { Flow::Ran } else { Flow::Halted })
    }

    /// Submits the parked element as a text leaf.
    fn submit_leaf<K: EventSink>(&mut self, sink: &mut K) {
        let tag = Tag::new(TagKind::Text, self.scratch.tag.as_bytes());
        sink.submit(tag, self.scratch.tag.buf(), self.scratch.value.buf());
        self.clear_text();
        self.scratch.tag.clear();
        self.scratch.key.clear();
    }

    /// Submits accumulated text as an anonymous leaf if it matters,
    /// discards it otherwise.
    fn flush_text<K: EventSink>(&mut self, sink: &mut K) -> Result<(), DecodeError> {
        if self.significant {
            self.scratch.key.clear();
            sink.submit(
                Tag::bare(TagKind::Text),
                self.scratch.key.buf(),
                self.scratch.value.buf(),
            );
        }
        self.clear_text();
        Ok(())
    }

    fn clear_text(&mut self) {
        self.scratch.value.clear();
        self.significant = false;
    }
}

impl Default for MarkupDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn expect<S: ByteSource>(src: &mut S, want: u8) -> Result<(), DecodeError> {
    let b = pull(src)?;
    if b == want {
        Ok(())
    } else {
        Err(err(src, SyntaxError::Unexpected(b)))
    }
}

fn wpull<S: ByteSource>(src: &mut S) -> Result<u8, DecodeError> {
    loop {
        let b = pull(src)?;
        if !is_space(b) {
            return Ok(b);
        }
    }
}

/// Decodes one entity reference (the `&` is consumed), returning its
/// literal byte. Exactly five are legal; anything else is an error.
fn entity<S: ByteSource>(src: &mut S) -> Result<u8, DecodeError> {
    let mut name = [0u8; 4];
    let mut len = 0;
    loop {
        let b = pull(src)?;
        if b == b';' {
            break;
        }
        if len == name.len() {
            return Err(err(src, SyntaxError::UnknownEntity));
        }
        name[len] = b;
        len += 1;
    }
    match &name[..len] {
        b"lt" => Ok(b'<'),
        b"gt" => Ok(b'>'),
        b"amp" => Ok(b'&'),
        b"quot" => Ok(b'"'),
        b"apos" => Ok(b'\''),
        _ => Err(err(src, SyntaxError::UnknownEntity)),
    }
}

/// Consumes a `<?...?>` processing instruction (the `<?` is consumed).
fn skip_instruction<S: ByteSource>(src: &mut S) -> Result<(), DecodeError> {
    let mut question = false;
    loop {
        let b = pull(src)?;
        if question && b == b'>' {
            return Ok(());
        }
        question = b == b'?';
    }
}

/// Consumes a comment body up to `-->` (the `<!--` is consumed).
fn skip_comment<S: ByteSource>(src: &mut S) -> Result<(), DecodeError> {
    let mut dashes = 0u8;
    loop {
        let b = pull(src)?;
        match b {
            b'-' => dashes = (dashes + 1).min(2),
            b'>' if dashes >= 2 => return Ok(()),
            _ => dashes = 0,
        }
    }
}

/// Consumes the rest of a start tag whose name is partially read,
/// returning `true` if it was self-closing.
fn skip_tag_rest<S: ByteSource>(src: &mut S) -> Result<bool, DecodeError> {
    loop {
        let b = pull(src)?;
        match b {
            b'>' => return Ok(false),
            b'/' => {
                expect(src, b'>')?;
                return Ok(true);
            }
            b'"' | b'\'' => loop {
                if pull(src)? == b {
                    break;
                }
            },
            b'<' => return Err(err(src, SyntaxError::Unexpected(b))),
            _ => {}
        }
    }
}

/// Advances past element content until `levels` unmatched closing tags
/// have been consumed, without allocating or emitting. Entity and
/// structure errors inside the skipped subtree still surface.
fn skip_content<S: ByteSource>(src: &mut S, levels: u32) -> Result<(), DecodeError> {
    let mut depth = levels;
    while depth > 0 {
        let b = pull(src)?;
        match b {
            b'<' => match pull(src)? {
                b'/' => {
                    loop {
                        let c = pull(src)?;
                        if c == b'>' {
                            break;
                        }
                    }
                    depth -= 1;
                }
                b'?' => skip_instruction(src)?,
                b'!' => match pull(src)? {
                    b'-' => {
                        expect(src, b'-')?;
                        skip_comment(src)?;
                    }
                    b'[' => {
                        for want in *b"CDATA[" {
                            expect(src, want)?;
                        }
                        // Raw until ]]>, two-bracket lookbehind.
                        let mut brackets = 0u8;
                        loop {
                            let c = pull(src)?;
                            match c {
                                b']' => brackets = (brackets + 1).min(2),
                                b'>' if brackets >= 2 => break,
                                _ => brackets = 0,
                            }
                        }
                    }
                    other => return Err(err(src, SyntaxError::Unexpected(other))),
                },
                _ => {
                    if !skip_tag_rest(src)? {
                        depth += 1;
                    }
                }
            },
            b'&' => {
                entity(src)?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    #[test]
    fn entity_table() {
        for (text, want) in [
            ("lt;", b'<'),
            ("gt;", b'>'),
            ("amp;", b'&'),
            ("quot;", b'"'),
            ("apos;", b'\''),
        ] {
            let mut src = SliceSource::from(text);
            assert_eq!(entity(&mut src).unwrap(), want);
        }
        let mut src = SliceSource::from("nbsp;");
        assert!(entity(&mut src).is_err());
        let mut src = SliceSource::from("toolong;");
        assert!(entity(&mut src).is_err());
    }

    #[test]
    fn skip_content_counts_elements() {
        let mut src = SliceSource::from("<b x='>'>text<c/></b></a>rest");
        skip_content(&mut src, 1).unwrap();
        assert_eq!(src.remainder(), b"rest");
    }

    #[test]
    fn skip_content_passes_comments_and_cdata() {
        let mut src = SliceSource::from("<!-- </a> --><![CDATA[</a>]]></a>tail");
        skip_content(&mut src, 1).unwrap();
        assert_eq!(src.remainder(), b"tail");
    }

    #[test]
    fn skip_content_still_validates_entities() {
        let mut src = SliceSource::from("&bogus;</a>");
        assert!(skip_content(&mut src, 1).is_err());
    }
}
