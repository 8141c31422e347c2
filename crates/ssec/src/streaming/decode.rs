//! Incremental UTF-8 decoding of body chunks

use std::char::REPLACEMENT_CHARACTER;

const BOM: char = '\u{FEFF}';

/// Turns a sequence of byte chunks into text.
///
/// A multi-byte sequence cut by a chunk boundary is held back until the next
/// chunk completes it. Invalid sequences become U+FFFD, one per maximal
/// invalid subpart, so decoding chunk by chunk gives the same text as
/// decoding everything at once.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Incomplete trailing sequence from the previous chunk
    pending: Vec<u8>,
    /// Whether any text has been produced yet (for BOM stripping)
    started: bool,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let buffered = std::mem::take(&mut self.pending);
        let joined;
        let input: &[u8] = if buffered.is_empty() {
            chunk
        } else {
            joined = [buffered.as_slice(), chunk].concat();
            &joined
        };

        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Truncated sequence at the end: wait for more bytes
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }

        self.strip_bom(out)
    }

    /// Flush a dangling incomplete sequence as U+FFFD.
    ///
    /// For finite bodies; the stream drivers drop the tail on reconnect instead.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        self.strip_bom(REPLACEMENT_CHARACTER.to_string())
    }

    /// Bytes held back waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn strip_bom(&mut self, mut text: String) -> String {
        if !self.started && !text.is_empty() {
            self.started = true;
            if text.starts_with(BOM) {
                text.drain(..BOM.len_utf8());
            }
        }
        text
    }
}
