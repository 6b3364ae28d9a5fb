//! Shared recording sink for the decoder integration tests.
#![allow(dead_code)] // each test binary uses a different subset

use manifold::{ByteBuf, EventSink, Tag, TagKind};

/// One recorded sink call, with all buffer content copied out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open { kind: TagKind, tag: String, key: String },
    Submit { kind: TagKind, tag: String, key: String, value: String },
    Close,
}

/// `Open` event constructor for expectation vectors.
pub fn open(kind: TagKind, tag: &str, key: &str) -> Event {
    Event::Open { kind, tag: tag.into(), key: key.into() }
}

/// `Submit` event constructor for expectation vectors.
pub fn submit(kind: TagKind, tag: &str, key: &str, value: &str) -> Event {
    Event::Submit {
        kind,
        tag: tag.into(),
        key: key.into(),
        value: value.into(),
    }
}

pub fn close() -> Event {
    Event::Close
}

/// A sink that copies every event out, optionally rejecting chosen
/// containers and halting after a chosen number of closes. It also
/// asserts the open/close discipline: `close` without a matching `open`
/// panics, and [`assert_balanced`](Recorder::assert_balanced) checks the
/// final nesting.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
    /// Container keys (or tag names, for keyless containers) to reject.
    pub reject: Vec<String>,
    /// Return `false` from `close` after this many closes.
    pub halt_after_closes: Option<usize>,
    depth: usize,
    closes: usize,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(key: &str) -> Self {
        Self { reject: vec![key.into()], ..Self::default() }
    }

    pub fn assert_balanced(&self) {
        assert_eq!(self.depth, 0, "unbalanced open/close events");
    }
}

impl EventSink for Recorder {
    fn open(&mut self, tag: Tag<'_>, key: &ByteBuf) -> bool {
        let key_text = key.to_str().to_owned();
        let tag_text = String::from_utf8_lossy(tag.name).into_owned();
        let probe = if key_text.is_empty() { &tag_text } else { &key_text };
        if self.reject.iter().any(|r| r == probe) {
            return false;
        }
        self.events.push(Event::Open { kind: tag.kind, tag: tag_text, key: key_text });
        self.depth += 1;
        true
    }

    fn submit(&mut self, tag: Tag<'_>, key: &ByteBuf, value: &ByteBuf) {
        self.events.push(Event::Submit {
            kind: tag.kind,
            tag: String::from_utf8_lossy(tag.name).into_owned(),
            key: key.to_str().to_owned(),
            value: value.to_str().to_owned(),
        });
    }

    fn close(&mut self) -> bool {
        assert!(self.depth > 0, "close without open");
        self.depth -= 1;
        self.closes += 1;
        self.events.push(Event::Close);
        self.halt_after_closes.is_none_or(|n| self.closes < n)
    }
}
