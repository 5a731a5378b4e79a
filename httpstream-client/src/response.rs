//! Parsed response status line and headers.

use std::collections::HashMap;

/// Status line and headers of a stream response.
///
/// Header names are stored as sent. Repeated headers keep the last value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseHead {
    version: String,
    status: Option<u16>,
    message: String,
    headers: HashMap<String, String>,
}

impl ResponseHead {
    /// Parse a complete head from its lines, stopping at the first blank one.
    pub fn parse<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut parser = HeadParser::default();
        for line in lines {
            if parser.push_line(line) {
                break;
            }
        }
        parser.finish()
    }

    /// Protocol version from the status line, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Status code, or `None` if no parsable status line was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Reason phrase from the status line.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header, preferring an exact name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// Whether the body uses chunked transfer coding.
    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding").is_some_and(|value| {
            value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.header("Content-Encoding")
    }

    /// `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Builds a [`ResponseHead`] one raw line at a time.
#[derive(Debug, Default)]
pub(crate) struct HeadParser {
    head: ResponseHead,
    lines: usize,
}

impl HeadParser {
    /// Feed one line, terminator optional. Returns `true` at the blank line
    /// that ends the head.
    pub(crate) fn push_line(&mut self, line: &str) -> bool {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return true;
        }

        self.lines += 1;
        if self.lines == 1 {
            self.parse_status_line(line);
        } else if let Some((name, value)) = line.split_once(": ") {
            self.head
                .headers
                .insert(name.to_owned(), value.trim_end().to_owned());
        }
        false
    }

    /// Whether any line has been received yet.
    pub(crate) fn is_empty(&self) -> bool {
        self.lines == 0
    }

    pub(crate) fn finish(self) -> ResponseHead {
        self.head
    }

    fn parse_status_line(&mut self, line: &str) {
        let mut parts = line.trim().splitn(3, char::is_whitespace);
        self.head.version = parts.next().unwrap_or_default().to_owned();
        self.head.status = parts.next().and_then(|code| code.parse().ok());
        self.head.message = parts.next().unwrap_or_default().trim().to_owned();
    }
}
