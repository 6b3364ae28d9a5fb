//! Push-based event emission.
//!
//! Decoders drive an [`EventSink`] with three calls: open a container,
//! submit a leaf, close a container. The sink is whatever binding layer
//! the caller prefers — the decoders depend only on this trait, never on a
//! concrete binding type.
//!
//! Rejecting an [`open`](EventSink::open) is the normal way to prune a
//! subtree: the decoder then advances the source past the rejected
//! container grammar-correctly, without emitting anything from inside it.

use crate::buffer::ByteBuf;

/// Container and leaf kinds carried by a [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// A map-like container (keyed entries).
    Map,
    /// A list-like container (positional entries).
    List,
    /// A leaf with a declared type tag (native notation's `tag:key(...)`).
    Scalar,
    /// Quoted or element text.
    Text,
    /// A bare, unquoted token.
    Token,
    /// An explicit null literal.
    Null,
}

/// A short marker communicating declared or inferred type and
/// container-kind information alongside each event.
///
/// `name` is the declared type/space text where the format has one (native
/// notation tags, markup element names) and empty where it does not
/// (JSON).
#[derive(Debug, Clone, Copy)]
pub struct Tag<'a> {
    pub kind: TagKind,
    pub name: &'a [u8],
}

impl<'a> Tag<'a> {
    #[must_use]
    pub fn new(kind: TagKind, name: &'a [u8]) -> Self {
        Self { kind, name }
    }

    /// A tag with no declared name.
    #[must_use]
    pub fn bare(kind: TagKind) -> Self {
        Self { kind, name: b"" }
    }

    /// Whether this tag opens a list-like container.
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.kind == TagKind::List
    }
}

/// The event-acceptance interface implemented by the binding layer.
///
/// The `key` and `value` buffers are decoder-owned scratch: they are valid
/// only for the duration of the call and are overwritten immediately
/// afterwards. A sink that keeps content must copy it.
pub trait EventSink {
    /// Requests a new nested container under the current one.
    ///
    /// Returning `false` rejects the container: the decoder skips the
    /// entire subtree from the stream without emitting further events for
    /// it, while still validating the skipped bytes.
    fn open(&mut self, tag: Tag<'_>, key: &ByteBuf) -> bool;

    /// Emits one leaf under the currently open container. `key` is empty
    /// for list elements and anonymous text.
    fn submit(&mut self, tag: Tag<'_>, key: &ByteBuf, value: &ByteBuf);

    /// Finishes the most recently opened container.
    ///
    /// Returning `false` tells the decoder the sink wants nothing further
    /// from this document; the decoder drains the remaining input without
    /// emitting and returns successfully.
    fn close(&mut self) -> bool;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn open(&mut self, tag: Tag<'_>, key: &ByteBuf) -> bool {
        (**self).open(tag, key)
    }

    fn submit(&mut self, tag: Tag<'_>, key: &ByteBuf, value: &ByteBuf) {
        (**self).submit(tag, key, value);
    }

    fn close(&mut self) -> bool {
        (**self).close()
    }
}
