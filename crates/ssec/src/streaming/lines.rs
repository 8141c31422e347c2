//! Line framing over decoded text

/// Split `buffer` into complete lines and the unterminated remainder.
///
/// Recognizes `\r\n`, `\n` and `\r`. Lines are returned without their
/// terminator. A `\r` at the very end of the buffer counts as a terminator.
pub fn extract_lines(buffer: &str) -> (Vec<&str>, &str) {
    let bytes = buffer.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&buffer[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            b'\n' => {
                lines.push(&buffer[start..i]);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }

    (lines, &buffer[start..])
}

/// Stateful line framer for one connection.
///
/// Keeps the unterminated remainder between calls. A CRLF pair split across
/// two batches is treated as a single terminator.
#[derive(Debug, Default)]
pub struct LineExtractor {
    buffer: String,
    /// Previous batch ended with a bare `\r`
    trailing_cr: bool,
}

impl LineExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text and return every line it completes
    pub fn extract(&mut self, text: &str) -> Vec<String> {
        // An empty batch must not consume a pending `\r`
        if text.is_empty() {
            return Vec::new();
        }
        let text = if std::mem::take(&mut self.trailing_cr) {
            text.strip_prefix('\n').unwrap_or(text)
        } else {
            text
        };
        if text.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(text);
        self.trailing_cr = self.buffer.ends_with('\r');

        let (lines, remainder) = extract_lines(&self.buffer);
        let lines: Vec<String> = lines.into_iter().map(str::to_owned).collect();
        let consumed = self.buffer.len() - remainder.len();
        self.buffer.drain(..consumed);
        lines
    }

    /// Text received but not yet terminated
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// Drop any buffered partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.trailing_cr = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    /// Rebuild the buffer from lines, the terminators actually present, and the remainder
    fn reassemble(buffer: &str) -> String {
        let (lines, remainder) = extract_lines(buffer);
        let mut out = String::new();
        let mut rest = buffer;
        for line in lines {
            out.push_str(line);
            rest = &rest[line.len()..];
            let terminator = if rest.starts_with("\r\n") {
                "\r\n"
            } else if rest.starts_with('\r') {
                "\r"
            } else {
                "\n"
            };
            out.push_str(terminator);
            rest = &rest[terminator.len()..];
        }
        out.push_str(remainder);
        out
    }

    #[rstest]
    #[case("", &[], "")]
    #[case("no terminator", &[], "no terminator")]
    #[case("a\nb\n", &["a", "b"], "")]
    #[case("a\r\nb\r\n", &["a", "b"], "")]
    #[case("a\rb\r", &["a", "b"], "")]
    #[case("a\n\nb", &["a", ""], "b")]
    #[case("a\r\n\r\nrest", &["a", ""], "rest")]
    #[case("mixed\r\nline\nendings\rtail", &["mixed", "line", "endings"], "tail")]
    #[case("\n\r\n\r", &["", "", ""], "")]
    fn test_extract_lines(
        #[case] buffer: &str,
        #[case] expected: &[&str],
        #[case] remainder: &str,
    ) {
        let (lines, rest) = extract_lines(buffer);
        assert_eq!(lines, expected);
        assert_eq!(rest, remainder);
    }

    #[rstest]
    #[case("data: a\r\ndata: b\n\nid: 1\rpartial")]
    #[case("\r\r\n\n\r")]
    #[case("only text")]
    #[case("ünï\ncödé\r\n🎉")]
    fn test_reassembly_reconstructs_buffer(#[case] buffer: &str) {
        assert_eq!(reassemble(buffer), buffer);
        let (_, remainder) = extract_lines(buffer);
        assert!(!remainder.contains(['\r', '\n']));
    }

    #[test]
    fn test_extractor_keeps_remainder_between_calls() {
        let mut extractor = LineExtractor::new();
        assert!(extractor.extract("data: hel").is_empty());
        assert_eq!(extractor.remainder(), "data: hel");
        assert_eq!(extractor.extract("lo\n\nda"), vec!["data: hello", ""]);
        assert_eq!(extractor.remainder(), "da");
    }

    #[test]
    fn test_extractor_joins_split_crlf() {
        let mut extractor = LineExtractor::new();
        assert_eq!(extractor.extract("data: a\r"), vec!["data: a"]);
        // The LF completing the CRLF must not produce an extra blank line
        assert_eq!(extractor.extract("\n\r\n"), vec![""]);
    }

    #[test]
    fn test_extractor_empty_batch_keeps_split_crlf() {
        let mut extractor = LineExtractor::new();
        assert_eq!(extractor.extract("data: a\r"), vec!["data: a"]);
        assert!(extractor.extract("").is_empty());
        assert_eq!(extractor.extract("\n\r\n"), vec![""]);
    }

    #[test]
    fn test_extractor_bare_cr_followed_by_text() {
        let mut extractor = LineExtractor::new();
        assert_eq!(extractor.extract("a\r"), vec!["a"]);
        assert_eq!(extractor.extract("b\r"), vec!["b"]);
        assert_eq!(extractor.extract("\r"), vec![""]);
    }

    #[test]
    fn test_extractor_lone_lf_after_split_crlf() {
        let mut extractor = LineExtractor::new();
        assert_eq!(extractor.extract("a\r"), vec!["a"]);
        assert!(extractor.extract("\n").is_empty());
        assert_eq!(extractor.extract("\n"), vec![""]);
    }

    #[test]
    fn test_clear() {
        let mut extractor = LineExtractor::new();
        extractor.extract("partial");
        extractor.clear();
        assert_eq!(extractor.remainder(), "");
    }
}
