//! The decoding pipeline: bytes → text → lines → events
//!
//! Each stage keeps only the state one connection needs:
//!
//! - [`Utf8Decoder`] holds an incomplete multi-byte sequence between chunks
//! - [`LineExtractor`] holds text not yet terminated by a line break
//! - [`EventParser`] holds the event being accumulated
//!
//! [`Pipeline`] bundles the three for the stream drivers.
//!
//! # Example
//!
//! ```
//! use ssec::streaming::Pipeline;
//! use ssec::Event;
//!
//! let mut pipeline = Pipeline::new();
//! assert!(pipeline.feed(b"event: greeting\ndata: hel").events.is_empty());
//!
//! let outcome = pipeline.feed(b"lo\n\n");
//! assert_eq!(outcome.events, vec![Event::new("greeting", "hello")]);
//! ```

mod decode;
mod lines;
mod parser;

pub use decode::Utf8Decoder;
pub use lines::{extract_lines, LineExtractor};
pub use parser::{EventParser, ParseOutcome};

/// Decoder, line framer and parser for one connection
#[derive(Debug, Default)]
pub struct Pipeline {
    decoder: Utf8Decoder,
    lines: LineExtractor,
    parser: EventParser,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one body chunk through all three stages
    pub fn feed(&mut self, chunk: &[u8]) -> ParseOutcome {
        let text = self.decoder.decode(chunk);
        let lines = self.lines.extract(&text);
        self.parser.parse(lines)
    }

    /// Drop all partial state before a new connection
    pub fn reset(&mut self) {
        self.decoder = Utf8Decoder::new();
        self.lines.clear();
        self.parser.reset();
    }
}
