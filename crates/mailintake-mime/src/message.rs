//! Parsed email structure and the parse entry point.

use crate::config::ParserConfig;
use crate::content_type::ContentType;
use crate::encoding::decode_content;
use crate::error::Result;
use crate::fields::HeaderFields;
use crate::header::Headers;
use crate::multipart::{PartContext, WalkOutput, decode_text, walk};
use chrono::{DateTime, FixedOffset};
use std::io::Read;

/// A file attached to a `multipart/mixed` message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Attachment {
    /// Decoded filename, or `attachment-<id>` when the part names none.
    pub filename: String,
    /// Media type without parameters, as declared.
    pub content_type: String,
    /// Decoded payload. Octet streams keep their raw, undecoded bytes.
    pub data: Vec<u8>,
}

/// An inline resource from a `multipart/alternative` or `related` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EmbeddedFile {
    /// Content-ID without angle brackets.
    pub cid: String,
    /// Declared Content-Type, parameters included.
    pub content_type: String,
    /// Decoded payload.
    pub data: Vec<u8>,
}

/// A parsed email message.
///
/// Exactly one of the body paths is taken: the text/HTML bodies and the
/// attachment lists for `text/*` and `multipart/*` messages, or `content`
/// for anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Email {
    /// All headers with encoded words decoded. Address fields are raw.
    pub headers: Headers,
    /// Typed header fields.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub fields: HeaderFields,
    /// Raw top-level Content-Type value.
    pub content_type: String,
    /// Every `text/plain` leaf, concatenated in document order.
    pub text_body: String,
    /// Every `text/html` leaf, concatenated in document order.
    pub html_body: String,
    /// Decoded body of a message that is neither text nor a supported
    /// multipart type.
    pub content: Option<Vec<u8>>,
    /// Attachments.
    pub attachments: Vec<Attachment>,
    /// Embedded files.
    pub embedded_files: Vec<EmbeddedFile>,
}

impl Email {
    /// Gets the decoded subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.fields.subject
    }

    /// Gets the Message-ID without angle brackets.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.fields.message_id
    }

    /// Gets the origination date.
    #[must_use]
    pub const fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.fields.date
    }
}

/// Email decoder.
///
/// A parser holds no per-message state and can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    /// Creates a parser with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser with the given configuration.
    #[must_use]
    pub const fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses a raw RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns the first error met. A typed header field failure is
    /// reported as [`crate::Error::Header`] carrying the fields decoded
    /// before it.
    pub fn parse(&self, raw: &[u8]) -> Result<Email> {
        let (raw_headers, body) = Headers::split_message(raw)?;
        let fields = HeaderFields::parse(&raw_headers)?;

        let declared = raw_headers.get_or_empty("Content-Type");
        let transfer_encoding = raw_headers.get_or_empty("Content-Transfer-Encoding");
        let content_type = ContentType::resolve(declared)?;

        let mut email = Email {
            headers: raw_headers.decoded(),
            fields,
            content_type: declared.to_string(),
            ..Email::default()
        };

        tracing::debug!(media_type = %content_type.mime_type(), "decoding message body");

        if let Some(context) = PartContext::of(&content_type) {
            let out: WalkOutput<String> = walk(context, &content_type, body, &self.config)?;
            email.text_body = out.text;
            email.html_body = out.html;
            email.attachments = out.attachments;
            email.embedded_files = out.embedded_files;
        } else if content_type.is("text/plain") {
            email.text_body = decode_text(body, transfer_encoding, declared)?;
        } else if content_type.is("text/html") {
            email.html_body = decode_text(body, transfer_encoding, declared)?;
        } else {
            email.content = Some(decode_content(body, transfer_encoding, declared)?);
        }

        Ok(email)
    }

    /// Reads a whole message from `reader` and parses it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if reading fails, otherwise as
    /// [`Parser::parse`].
    pub fn parse_reader<R: Read>(&self, mut reader: R) -> Result<Email> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        self.parse(&raw)
    }
}

/// Parses a raw message with the default configuration.
///
/// # Errors
///
/// See [`Parser::parse`].
pub fn parse_email(raw: &[u8]) -> Result<Email> {
    Parser::new().parse(raw)
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
    use crate::error::Error;

    #[test]
    fn test_single_part_text() {
        let raw = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test\r\n",
            "\r\n",
            "Hello, World!\r\n",
        );

        let email = parse_email(raw.as_bytes()).unwrap();
        assert_eq!(email.subject(), "Test");
        assert_eq!(email.fields.from[0].address, "sender@example.com");
        assert_eq!(email.content_type, "");
        assert_eq!(email.text_body, "Hello, World!");
        assert!(email.html_body.is_empty());
        assert!(email.content.is_none());
    }

    #[test]
    fn test_single_part_html() {
        let raw = b"Content-Type: text/html; charset=windows-1252\r\n\r\n<p>caf\xe9</p>\n";
        let email = parse_email(raw).unwrap();
        assert_eq!(email.html_body, "<p>café</p>");
        assert!(email.text_body.is_empty());
    }

    #[test]
    fn test_other_type_goes_to_content() {
        let raw = concat!(
            "Content-Type: application/pdf\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0=\r\n",
        );

        let email = parse_email(raw.as_bytes()).unwrap();
        assert_eq!(email.content.as_deref(), Some(&b"%PDF-"[..]));
        assert!(email.text_body.is_empty());
        assert!(email.attachments.is_empty());
    }

    #[test]
    fn test_unknown_transfer_encoding() {
        let raw = "Content-Transfer-Encoding: x-gzip\r\n\r\nbody";
        assert!(matches!(
            parse_email(raw.as_bytes()),
            Err(Error::UnknownTransferEncoding(_))
        ));
    }

    #[test]
    fn test_invalid_content_type() {
        let raw = "Content-Type: text/\r\n\r\nbody";
        let err = parse_email(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidContentType(ref v) if v == "text/"));
    }

    #[test]
    fn test_decoded_header_map() {
        let raw = concat!(
            "Subject: =?utf-8?Q?caf=C3=A9?=\r\n",
            "X-Mailer: =?utf-8?B?0J/QvtGH0YLQsA==?=\r\n",
            "To: =?utf-8?Q?Bob?= <bob@example.com>\r\n",
            "\r\n",
        );

        let email = parse_email(raw.as_bytes()).unwrap();
        assert_eq!(email.headers.get("subject"), Some("café"));
        assert_eq!(email.headers.get("x-mailer"), Some("Почта"));
        assert_eq!(email.headers.get("to"), Some("=?utf-8?Q?Bob?= <bob@example.com>"));
        assert_eq!(email.fields.to[0].name, "Bob");
    }

    #[test]
    fn test_parse_reader() {
        let raw: &[u8] = b"Subject: io\r\n\r\nbody";
        let email = Parser::new().parse_reader(raw).unwrap();
        assert_eq!(email.subject(), "io");
        assert_eq!(email.text_body, "body");
    }

    #[test]
    fn test_parse_reader_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("connection reset"))
            }
        }

        assert!(matches!(Parser::new().parse_reader(Broken), Err(Error::Io(_))));
    }

    #[test]
    fn test_parser_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Parser>();
    }
}
