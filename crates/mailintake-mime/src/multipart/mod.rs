//! Multipart bodies (RFC 2046).
//!
//! [`MultipartReader`] splits one multipart body into its parts. The
//! [`walk`] function drives the reader recursively and classifies every
//! leaf according to the enclosing [`PartContext`].

mod walker;

pub use walker::{BodyAccumulator, PartContext, WalkOutput, walk};
pub(crate) use walker::decode_text;

use crate::error::{Error, Result};
use crate::header::Headers;
use memchr::memmem;

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    /// Part headers.
    pub headers: Headers,
    /// Part body, still transfer-encoded.
    pub body: &'a [u8],
}

impl Part<'_> {
    /// Raw Content-Type value, empty when absent.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.headers.get_or_empty("Content-Type")
    }

    /// Raw Content-Transfer-Encoding value, empty when absent.
    #[must_use]
    pub fn transfer_encoding(&self) -> &str {
        self.headers.get_or_empty("Content-Transfer-Encoding")
    }
}

/// A delimiter line found in the body.
#[derive(Debug, Clone, Copy)]
struct Delimiter {
    /// Where the content before the delimiter ends (line break excluded).
    content_end: usize,
    /// First byte after the delimiter line.
    next: usize,
    /// `--boundary--`.
    close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Parts,
    Done,
}

/// Forward-only reader over the parts of one multipart body.
#[derive(Debug)]
pub struct MultipartReader<'a> {
    data: &'a [u8],
    dash_boundary: Vec<u8>,
    pos: usize,
    state: State,
}

impl<'a> MultipartReader<'a> {
    /// Creates a reader for `body` using `boundary` (without the leading
    /// dashes).
    #[must_use]
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());

        Self {
            data: body,
            dash_boundary,
            pos: 0,
            state: State::Preamble,
        }
    }

    /// Returns the next part, or `None` after the close delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMultipart`] if the body has no opening
    /// delimiter or ends before the close delimiter, and
    /// [`Error::InvalidHeader`] for a malformed part header block.
    pub fn next_part(&mut self) -> Result<Option<Part<'a>>> {
        if self.state == State::Preamble {
            let Some(opening) = self.find_delimiter(0) else {
                self.state = State::Done;
                return Err(Error::InvalidMultipart(
                    "no opening boundary delimiter".into(),
                ));
            };
            tracing::trace!(offset = opening.next, "skipped multipart preamble");
            self.pos = opening.next;
            self.state = if opening.close { State::Done } else { State::Parts };
        }

        if self.state == State::Done {
            return Ok(None);
        }

        let Some(delimiter) = self.find_delimiter(self.pos) else {
            self.state = State::Done;
            return Err(Error::InvalidMultipart(
                "body ended before the close delimiter".into(),
            ));
        };

        let raw = &self.data[self.pos..delimiter.content_end.max(self.pos)];
        tracing::trace!(
            start = self.pos,
            len = raw.len(),
            close = delimiter.close,
            "multipart part"
        );

        self.pos = delimiter.next;
        if delimiter.close {
            self.state = State::Done;
        }

        let (headers, body) = Headers::split_message(raw)?;
        Ok(Some(Part { headers, body }))
    }

    /// Finds the first delimiter line at or after `from`.
    fn find_delimiter(&self, from: usize) -> Option<Delimiter> {
        let haystack = self.data.get(from..)?;

        memmem::find_iter(haystack, &self.dash_boundary)
            .map(|offset| from + offset)
            .find_map(|start| self.delimiter_at(start))
    }

    fn delimiter_at(&self, start: usize) -> Option<Delimiter> {
        let data = self.data;
        if start > 0 && data[start - 1] != b'\n' {
            return None;
        }

        let mut rest = &data[start + self.dash_boundary.len()..];
        let close = rest.starts_with(b"--");
        if close {
            rest = &rest[2..];
        }

        // Transport padding, then the end of the line.
        let padding = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        rest = &rest[padding..];
        let line_break = if rest.starts_with(b"\r\n") {
            2
        } else if rest.starts_with(b"\n") {
            1
        } else if rest.is_empty() || close {
            // The close delimiter may be followed directly by epilogue text.
            0
        } else {
            return None;
        };

        let next = data.len() - rest.len() + line_break;
        let content_end = if start >= 2 && data[start - 2] == b'\r' {
            start - 2
        } else {
            start.saturating_sub(1)
        };

        Some(Delimiter {
            content_end,
            next,
            close,
        })
    }
}

impl<'a> Iterator for MultipartReader<'a> {
    type Item = Result<Part<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_part().transpose()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn parts(body: &[u8], boundary: &str) -> Result<Vec<(Headers, Vec<u8>)>> {
        MultipartReader::new(body, boundary)
            .map(|part| part.map(|p| (p.headers, p.body.to_vec())))
            .collect()
    }

    #[test]
    fn test_two_parts_crlf() {
        let body = concat!(
            "preamble\r\n",
            "--xyz\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first\r\n",
            "--xyz\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>second</b>\r\n",
            "--xyz--\r\n",
            "epilogue\r\n",
        );

        let parts = parts(body.as_bytes(), "xyz").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0.get("content-type"), Some("text/plain"));
        assert_eq!(parts[0].1, b"first");
        assert_eq!(parts[1].0.get("content-type"), Some("text/html"));
        assert_eq!(parts[1].1, b"<b>second</b>");
    }

    #[test]
    fn test_lf_and_padding() {
        let body = "--b \nX-A: 1\n\nline\n\n--b--";
        let parts = parts(body.as_bytes(), "b").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0.get("x-a"), Some("1"));
        assert_eq!(parts[0].1, b"line\n");
    }

    #[test]
    fn test_boundary_prefix_is_not_delimiter() {
        let body = "--b\n\n--bb is body text\n--b--\n";
        let parts = parts(body.as_bytes(), "b").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, b"--bb is body text");
    }

    #[test]
    fn test_delimiter_must_start_line() {
        let body = "--b\n\ninline --b text\n--b--\n";
        let parts = parts(body.as_bytes(), "b").unwrap();
        assert_eq!(parts[0].1, b"inline --b text");
    }

    #[test]
    fn test_part_without_headers() {
        let body = "--b\r\n\r\nno headers\r\n--b--\r\n";
        let parts = parts(body.as_bytes(), "b").unwrap();
        assert!(parts[0].0.is_empty());
        assert_eq!(parts[0].1, b"no headers");
    }

    #[test]
    fn test_empty_multipart() {
        assert!(parts(b"--b--\r\n", "b").unwrap().is_empty());
    }

    #[test]
    fn test_missing_opening_delimiter() {
        let err = parts(b"just text\r\n", "b").unwrap_err();
        assert!(matches!(err, Error::InvalidMultipart(_)));
    }

    #[test]
    fn test_missing_close_delimiter() {
        let mut reader = MultipartReader::new(b"--b\r\n\r\nbody\r\n--b\r\n\r\ntail", "b");
        assert!(reader.next_part().unwrap().is_some());
        assert!(matches!(reader.next_part(), Err(Error::InvalidMultipart(_))));
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_part_accessors() {
        let body = "--b\r\nContent-Type: image/png\r\nContent-Transfer-Encoding: base64\r\n\r\nAA==\r\n--b--";
        let mut reader = MultipartReader::new(body.as_bytes(), "b");
        let part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.content_type(), "image/png");
        assert_eq!(part.transfer_encoding(), "base64");
        assert_eq!(part.body, b"AA==");
    }
}
