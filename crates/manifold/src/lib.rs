//! Multi-format streaming decoders over a pooled byte-buffer core.
//!
//! Three byte-driven decoders — a compact native notation, JSON, and a
//! markup (XML-like) dialect — parse raw byte streams into one uniform
//! stream of *open container / submit leaf / close container* events.
//! They share a small protocol: input is pulled a byte at a time through
//! [`ByteSource`], events are pushed through [`EventSink`], and all text
//! travels in [`ByteBuf`] scratch buffers whose backing arrays are
//! recycled through a size-classed [`BufferPool`].
//!
//! A sink can reject any container as it opens; the decoder then skips
//! the whole subtree grammar-correctly — through nested brackets, quoted
//! strings, escapes, and comments — without emitting anything from
//! inside it.
//!
//! ```rust
//! use manifold::{ByteBuf, EventSink, JsonDecoder, SliceSource, Tag};
//!
//! struct Dump(Vec<String>);
//!
//! impl EventSink for Dump {
//!     fn open(&mut self, _tag: Tag<'_>, key: &ByteBuf) -> bool {
//!         self.0.push(format!("open {}", key.to_str()));
//!         true
//!     }
//!     fn submit(&mut self, _tag: Tag<'_>, key: &ByteBuf, value: &ByteBuf) {
//!         self.0.push(format!("{} = {}", key.to_str(), value.to_str()));
//!     }
//!     fn close(&mut self) -> bool {
//!         self.0.push("close".into());
//!         true
//!     }
//! }
//!
//! let mut sink = Dump(Vec::new());
//! let mut src = SliceSource::from(r#"{"id": 1, "name": "kraity"}"#);
//! JsonDecoder::new().decode(&mut src, &mut sink).unwrap();
//! assert_eq!(sink.0, ["open ", "id = 1", "name = kraity", "close"]);
//! ```

mod buffer;
mod decoder;
mod error;
mod options;
mod sink;
mod source;

pub use buffer::{Algorithm, BufferPool, ByteBuf};
pub use decoder::{JsonDecoder, MarkupDecoder, NativeDecoder};
pub use error::{DecodeError, ErrorSource, PoolError, SourceError, SyntaxError};
pub use options::{DecoderOptions, PoolOptions};
pub use sink::{EventSink, Tag, TagKind};
pub use source::{ByteSource, Position, ReaderSource, SliceSource};
