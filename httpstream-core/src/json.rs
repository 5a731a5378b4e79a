//! Incremental framing of concatenated JSON documents.
//!
//! Stream bodies are a sequence of top-level JSON documents, separated by
//! whitespace or written back to back. Bytes arrive in arbitrary slices, so
//! [`JsonStreamDecoder`] buffers the tail of an unfinished document between
//! feeds and emits every complete one as soon as its last byte is seen.

use bytes::{Buf, BytesMut};
use serde_json::Value;

use crate::error::DecodeError;

/// Largest single document [`JsonStreamDecoder`] buffers by default.
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Buffers body bytes and yields complete top-level JSON documents.
///
/// Document boundaries are found by a byte scanner that tracks nesting and
/// string state across feeds, so each byte is scanned once and `serde_json`
/// only ever sees a complete document.
///
/// # Example
///
/// ```
/// use httpstream_core::JsonStreamDecoder;
///
/// let mut decoder = JsonStreamDecoder::new();
/// let mut seen = Vec::new();
/// decoder.feed(br#"{"id":1}{"id""#, |v| seen.push(v)).unwrap();
/// decoder.feed(br#":2}"#, |v| seen.push(v)).unwrap();
/// assert_eq!(seen.len(), 2);
/// ```
#[derive(Debug)]
pub struct JsonStreamDecoder {
    /// Bytes of the document currently being assembled.
    buffer: BytesMut,
    /// Bytes of `buffer` already run through the scanner.
    scanned: usize,
    frame: Frame,
    /// Total bytes already handed out or skipped.
    consumed: u64,
    max_document: usize,
}

impl Default for JsonStreamDecoder {
    fn default() -> Self {
        Self::with_max_document(DEFAULT_MAX_DOCUMENT_SIZE)
    }
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A decoder that fails once one document grows past `limit` bytes.
    pub fn with_max_document(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            frame: Frame::default(),
            consumed: 0,
            max_document: limit,
        }
    }

    pub fn max_document(&self) -> usize {
        self.max_document
    }

    /// Append `data` and emit every document it completes, in order.
    ///
    /// Returns the number of documents emitted by this call.
    pub fn feed<F>(&mut self, data: &[u8], on_value: F) -> Result<usize, DecodeError>
    where
        F: FnMut(Value),
    {
        self.buffer.extend_from_slice(data);
        self.drain(false, on_value)
    }

    /// Flush the decoder at end of body.
    ///
    /// A bare number at the very end of the buffer is only emitted here,
    /// since more digits could still have followed it. Returns `true` when
    /// an incomplete document was left over and discarded.
    pub fn finish<F>(&mut self, on_value: F) -> Result<bool, DecodeError>
    where
        F: FnMut(Value),
    {
        self.drain(true, on_value)?;
        let partial = self.has_partial();
        self.reset();
        Ok(partial)
    }

    /// Number of bytes waiting for the rest of their document.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a started but unfinished document is buffered.
    pub fn has_partial(&self) -> bool {
        self.frame.started
    }

    /// Drop any buffered bytes. Used when a connection is torn down.
    pub fn reset(&mut self) {
        self.consumed += self.buffer.len() as u64;
        self.buffer.clear();
        self.scanned = 0;
        self.frame = Frame::default();
    }

    fn drain<F>(&mut self, at_end: bool, mut on_value: F) -> Result<usize, DecodeError>
    where
        F: FnMut(Value),
    {
        // Invariant: a started document always begins at buffer[0].
        let mut emitted = 0;
        let mut start = 0;
        let mut pos = self.scanned;
        let len = self.buffer.len();

        while pos < len {
            let end = match self.frame.step(self.buffer[pos]) {
                Step::Skip => {
                    pos += 1;
                    start = pos;
                    continue;
                }
                Step::More => {
                    pos += 1;
                    continue;
                }
                Step::EndAfter => pos + 1,
                Step::EndBefore => pos,
            };
            self.emit(start, end, &mut on_value)?;
            emitted += 1;
            start = end;
            pos = end;
        }

        if at_end && self.frame.scalar {
            self.frame = Frame::default();
            self.emit(start, len, &mut on_value)?;
            emitted += 1;
            start = len;
        }

        let keep_from = if self.frame.started { start } else { len };
        self.buffer.advance(keep_from);
        self.consumed += keep_from as u64;
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_document {
            let offset = self.consumed;
            self.reset();
            return Err(DecodeError::DocumentTooLarge {
                offset,
                limit: self.max_document,
            });
        }
        Ok(emitted)
    }

    /// Parse `buffer[start..end]`, a complete document, and hand it out.
    fn emit<F>(&mut self, start: usize, end: usize, on_value: &mut F) -> Result<(), DecodeError>
    where
        F: FnMut(Value),
    {
        match serde_json::from_slice::<Value>(&self.buffer[start..end]) {
            Ok(value) => {
                on_value(value);
                Ok(())
            }
            Err(err) => {
                let offset = self.consumed + start as u64;
                self.reset();
                Err(DecodeError::Json {
                    offset,
                    message: err.to_string(),
                })
            }
        }
    }
}

/// What the scanner learned from one byte.
enum Step {
    /// Whitespace between documents.
    Skip,
    More,
    /// The document ends with this byte.
    EndAfter,
    /// The document ended just before this byte, which starts the next one.
    EndBefore,
}

/// Scanner state for the document being assembled.
#[derive(Debug, Default, Clone, Copy)]
struct Frame {
    started: bool,
    /// A bare number or literal, which ends at the first delimiter.
    scalar: bool,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl Frame {
    fn step(&mut self, byte: u8) -> Step {
        if !self.started {
            if is_whitespace(byte) {
                return Step::Skip;
            }
            self.started = true;
            match byte {
                b'{' | b'[' => self.depth = 1,
                b'"' => self.in_string = true,
                _ => self.scalar = true,
            }
            return Step::More;
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
                if self.depth == 0 {
                    return self.close(Step::EndAfter);
                }
            }
            return Step::More;
        }

        if self.scalar {
            if is_whitespace(byte) || matches!(byte, b'{' | b'}' | b'[' | b']' | b',' | b':' | b'"') {
                return self.close(Step::EndBefore);
            }
            return Step::More;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth -= 1;
                if self.depth == 0 {
                    return self.close(Step::EndAfter);
                }
            }
            _ => {}
        }
        Step::More
    }

    fn close(&mut self, step: Step) -> Step {
        *self = Frame::default();
        step
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(decoder: &mut JsonStreamDecoder, data: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();
        decoder.feed(data, |v| out.push(v)).unwrap();
        out
    }

    #[test]
    fn test_back_to_back_documents() {
        let mut decoder = JsonStreamDecoder::new();
        let values = collect(&mut decoder, br#"{"a":1}{"b":2}[3]"#);
        assert_eq!(values, vec![json!({"a":1}), json!({"b":2}), json!([3])]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_newline_delimited_documents() {
        let mut decoder = JsonStreamDecoder::new();
        let values = collect(&mut decoder, b"{\"a\":1}\r\n\r\n  {\"b\":\"x y\"}\n");
        assert_eq!(values, vec![json!({"a":1}), json!({"b":"x y"})]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_document_split_across_every_byte() {
        let input = r#"{"interaction":{"content":"café \"quoted\""}} {"n":[1,2,3]}"#.as_bytes();
        let mut decoder = JsonStreamDecoder::new();
        let mut values = Vec::new();
        for byte in input.iter() {
            decoder.feed(std::slice::from_ref(byte), |v| values.push(v)).unwrap();
        }
        assert_eq!(
            values,
            vec![
                json!({"interaction":{"content":"café \"quoted\""}}),
                json!({"n":[1,2,3]}),
            ]
        );
    }

    #[test]
    fn test_multibyte_utf8_split_between_feeds() {
        let input = "{\"t\":\"héllo\"}".as_bytes();
        let split = input.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut decoder = JsonStreamDecoder::new();
        assert!(collect(&mut decoder, &input[..split]).is_empty());
        assert_eq!(collect(&mut decoder, &input[split..]), vec![json!({"t":"héllo"})]);
    }

    #[test]
    fn test_trailing_number_waits_for_delimiter() {
        let mut decoder = JsonStreamDecoder::new();
        assert!(collect(&mut decoder, b"12").is_empty());
        assert_eq!(collect(&mut decoder, b"34 "), vec![json!(1234)]);

        assert!(collect(&mut decoder, b"5").is_empty());
        let mut tail = Vec::new();
        let partial = decoder.finish(|v| tail.push(v)).unwrap();
        assert!(!partial);
        assert_eq!(tail, vec![json!(5)]);
    }

    #[test]
    fn test_finish_reports_partial_document() {
        let mut decoder = JsonStreamDecoder::new();
        assert_eq!(collect(&mut decoder, br#"{"a":1} {"b":"#), vec![json!({"a":1})]);
        assert!(decoder.has_partial());

        let partial = decoder.finish(|_| panic!("partial document must not be emitted")).unwrap();
        assert!(partial);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_invalid_json_reports_document_offset() {
        let mut decoder = JsonStreamDecoder::new();
        let mut values = Vec::new();
        let err = decoder
            .feed(br#"{"ok":true} {"bad": nope}"#, |v| values.push(v))
            .unwrap_err();

        assert_eq!(values, vec![json!({"ok":true})]);
        match err {
            DecodeError::Json { offset, .. } => assert_eq!(offset, 12),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_delimiters_inside_strings_are_ignored() {
        let mut decoder = JsonStreamDecoder::new();
        let values = collect(&mut decoder, br#"{"a":"}{]["} ["\\", "\"}"] "top""#);
        assert_eq!(
            values,
            vec![json!({"a":"}{]["}), json!(["\\", "\"}"]), json!("top")]
        );
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_large_document_in_small_slices() {
        let items: Vec<String> = (0..20_000).map(|i| format!(r#"{{"i":{i},"s":"x{{"}}"#)).collect();
        let input = format!("[{}] true", items.join(","));
        let mut decoder = JsonStreamDecoder::new();
        let mut values = Vec::new();
        for slice in input.as_bytes().chunks(1024) {
            decoder.feed(slice, |v| values.push(v)).unwrap();
        }
        decoder.finish(|v| values.push(v)).unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_array().map(Vec::len), Some(20_000));
        assert_eq!(values[0][19_999], json!({"i":19_999,"s":"x{"}));
        assert_eq!(values[1], json!(true));
    }

    #[test]
    fn test_partial_document_keeps_scan_position() {
        let mut decoder = JsonStreamDecoder::new();
        assert!(collect(&mut decoder, b"  {\"a\":[1,").is_empty());
        assert_eq!(decoder.buffered(), 8);
        assert!(decoder.has_partial());
        assert_eq!(collect(&mut decoder, b"2]}"), vec![json!({"a":[1,2]})]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_document_over_limit_is_rejected() {
        let mut decoder = JsonStreamDecoder::with_max_document(16);
        assert_eq!(collect(&mut decoder, br#"{"ok":1} {"s":""#), vec![json!({"ok":1})]);

        let err = decoder
            .feed(b"abcdefghijklmnop", |_| panic!("oversized document must not be emitted"))
            .unwrap_err();
        assert_eq!(err, DecodeError::DocumentTooLarge { offset: 9, limit: 16 });
        assert_eq!(decoder.buffered(), 0);
        assert!(!decoder.has_partial());

        assert_eq!(collect(&mut decoder, b"[1]"), vec![json!([1])]);
    }
}
