//! MIME header handling.

use crate::error::{Error, Result};
use crate::rfc2047::decode_mime_sentence;
use std::collections::HashMap;

/// Fields whose display names are decoded by the address parser rather
/// than by [`decode_mime_sentence`].
pub const ADDRESS_FIELDS: [&str; 11] = [
    "from",
    "sender",
    "reply-to",
    "to",
    "cc",
    "bcc",
    "resent-from",
    "resent-sender",
    "resent-to",
    "resent-cc",
    "resent-bcc",
];

/// Collection of email headers.
///
/// Names are case-insensitive. Repeated fields keep every value in the
/// order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        let value = value.into();
        self.headers.entry(name).or_default().push(value);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets the first value for a header, or `""` when it is absent.
    #[must_use]
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all headers as `(lowercase name, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Parses headers from raw text.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///  continuation
    /// ```
    ///
    /// Parsing stops at the first empty line.
    ///
    /// # Errors
    ///
    /// Returns an error for a line with no colon or a continuation line with
    /// no field before it.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            // Check for continuation line (starts with space or tab)
            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((_, value)) = current.as_mut() else {
                    return Err(Error::InvalidHeader(format!(
                        "continuation line with no field: {line:?}"
                    )));
                };
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }

            // Save previous header if exists
            if let Some((name, value)) = current.take() {
                headers.add(name, value.trim());
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::InvalidHeader(format!("missing colon: {line:?}")));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::InvalidHeader(format!("empty field name: {line:?}")));
            }
            current = Some((name.to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim());
        }

        Ok(headers)
    }

    /// Splits a raw message (or part) into its header block and body.
    ///
    /// The header block ends at the first empty line; without one the whole
    /// input is headers and the body is empty. Header bytes that are not
    /// valid UTF-8 are read as windows-1252.
    ///
    /// # Errors
    ///
    /// Returns an error if the header block is malformed.
    pub fn split_message(raw: &[u8]) -> Result<(Self, &[u8])> {
        let (head, body) = split_header_block(raw);
        let headers = Self::parse(&decode_header_bytes(head))?;
        Ok((headers, body))
    }

    /// Returns a copy with every value passed through
    /// [`decode_mime_sentence`], except the address-bearing fields, which
    /// are kept raw.
    #[must_use]
    pub fn decoded(&self) -> Self {
        let headers = self
            .headers
            .iter()
            .map(|(name, values)| {
                let values = if ADDRESS_FIELDS.contains(&name.as_str()) {
                    values.clone()
                } else {
                    values.iter().map(|v| decode_mime_sentence(v)).collect()
                };
                (name.clone(), values)
            })
            .collect();

        Self { headers }
    }
}

fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut pos = 0;
    while let Some(offset) = memchr::memchr(b'\n', &raw[pos..]) {
        let end = pos + offset + 1;
        let line = &raw[pos..end];
        if line == b"\n" || line == b"\r\n" {
            return (&raw[..pos], &raw[end..]);
        }
        pos = end;
    }
    (raw, &raw[raw.len()..])
}

fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
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

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
        assert_eq!(headers.get_or_empty("X-Missing"), "");
    }

    #[test]
    fn test_headers_repeated() {
        let mut headers = Headers::new();
        headers.add("Received", "a");
        headers.add("received", "b");
        assert_eq!(headers.get_all("RECEIVED"), vec!["a", "b"]);
        assert_eq!(headers.get("Received"), Some("a"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            "\tcharset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(headers.get("Body"), None);
    }

    #[test]
    fn test_headers_parse_rejects_malformed() {
        assert!(matches!(
            Headers::parse("no colon here\r\n"),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(
            Headers::parse(" leading continuation\r\n"),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(Headers::parse(": value\r\n"), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_split_message() {
        let raw = b"Subject: hi\r\nX-A: 1\r\n\r\nline one\r\n\r\nline two\r\n";
        let (headers, body) = Headers::split_message(raw).unwrap();
        assert_eq!(headers.get("subject"), Some("hi"));
        assert_eq!(headers.get("x-a"), Some("1"));
        assert_eq!(body, b"line one\r\n\r\nline two\r\n");
    }

    #[test]
    fn test_split_message_without_headers() {
        let (headers, body) = Headers::split_message(b"\nbody only").unwrap();
        assert!(headers.is_empty());
        assert_eq!(body, b"body only");
    }

    #[test]
    fn test_split_message_without_body() {
        let (headers, body) = Headers::split_message(b"Subject: only headers").unwrap();
        assert_eq!(headers.get("subject"), Some("only headers"));
        assert!(body.is_empty());
    }

    #[test]
    fn test_split_message_latin_header_bytes() {
        let (headers, _) = Headers::split_message(b"Subject: caf\xe9\n\n").unwrap();
        assert_eq!(headers.get("subject"), Some("café"));
    }

    #[test]
    fn test_decoded_skips_address_fields() {
        let mut headers = Headers::new();
        headers.add("Subject", "=?utf-8?B?SMOpbGxv?=");
        headers.add("From", "=?utf-8?B?SMOpbGxv?= <a@example.com>");
        let decoded = headers.decoded();
        assert_eq!(decoded.get("subject"), Some("Héllo"));
        assert_eq!(decoded.get("from"), Some("=?utf-8?B?SMOpbGxv?= <a@example.com>"));
    }

    #[test]
    fn test_headers_iter() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");

        let mut count = 0;
        for (name, value) in headers.iter() {
            assert!(!name.is_empty());
            assert!(!value.is_empty());
            count += 1;
        }
        assert_eq!(count, 2);
    }
}
