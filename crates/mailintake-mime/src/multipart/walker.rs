//! Recursive classification of multipart bodies.

use super::{MultipartReader, Part};
use crate::config::ParserConfig;
use crate::content_type::ContentType;
use crate::encoding::{OCTET_STREAM, decode_content};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::message::{Attachment, EmbeddedFile};
use crate::rfc2047::decode_mime_sentence;
use std::fmt;

/// The multipart kinds the walker descends into.
///
/// The three differ only in which nested multipart kinds they recurse
/// into and how a leaf that is neither `text/plain` nor `text/html` is
/// classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartContext {
    /// `multipart/mixed`: leaves become attachments.
    Mixed,
    /// `multipart/alternative`: leaves become embedded files.
    Alternative,
    /// `multipart/related`: leaves become embedded files.
    Related,
}

impl PartContext {
    /// Returns the context for a `multipart/mixed|alternative|related`
    /// content type.
    #[must_use]
    pub fn of(content_type: &ContentType) -> Option<Self> {
        if !content_type.is_multipart() {
            return None;
        }
        match content_type.sub_type.as_str() {
            "mixed" => Some(Self::Mixed),
            "alternative" => Some(Self::Alternative),
            "related" => Some(Self::Related),
            _ => None,
        }
    }

    /// Returns the media type, e.g. `multipart/mixed`.
    #[must_use]
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Mixed => "multipart/mixed",
            Self::Alternative => "multipart/alternative",
            Self::Related => "multipart/related",
        }
    }

    /// Nested multipart kinds handled recursively inside this context.
    #[must_use]
    pub const fn nested(self) -> &'static [Self] {
        match self {
            Self::Mixed => &[Self::Alternative, Self::Related],
            Self::Alternative => &[Self::Related],
            Self::Related => &[Self::Alternative],
        }
    }
}

impl fmt::Display for PartContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type())
    }
}

/// Collects decoded `text/plain` or `text/html` leaves.
pub trait BodyAccumulator: Default {
    /// Adds one decoded leaf.
    fn push(&mut self, fragment: String);

    /// Appends everything collected by a nested walk.
    fn append(&mut self, other: Self);
}

/// Concatenates every leaf into one string.
impl BodyAccumulator for String {
    fn push(&mut self, fragment: String) {
        self.push_str(&fragment);
    }

    fn append(&mut self, other: Self) {
        self.push_str(&other);
    }
}

/// Keeps one entry per leaf, in document order.
impl BodyAccumulator for Vec<String> {
    fn push(&mut self, fragment: String) {
        Self::push(self, fragment);
    }

    fn append(&mut self, other: Self) {
        self.extend(other);
    }
}

/// Everything found in one multipart body, nested bodies included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOutput<B> {
    /// `text/plain` leaves.
    pub text: B,
    /// `text/html` leaves.
    pub html: B,
    /// Attachments (from `multipart/mixed` bodies only).
    pub attachments: Vec<Attachment>,
    /// Embedded files (from `multipart/alternative` and `related`).
    pub embedded_files: Vec<EmbeddedFile>,
}

/// Walks a multipart body of the given kind.
///
/// `content_type` is the resolved type of the multipart entity; it must
/// carry a `boundary` parameter.
///
/// # Errors
///
/// Fails on the first part that cannot be decoded or classified, on
/// malformed boundary structure, and when nesting exceeds
/// [`ParserConfig::max_depth`].
pub fn walk<B: BodyAccumulator>(
    context: PartContext,
    content_type: &ContentType,
    body: &[u8],
    config: &ParserConfig,
) -> Result<WalkOutput<B>> {
    let mut out = WalkOutput::default();
    Walker { config }.walk(context, content_type, body, 1, &mut out)?;
    Ok(out)
}

struct Walker<'c> {
    config: &'c ParserConfig,
}

impl Walker<'_> {
    fn walk<B: BodyAccumulator>(
        &self,
        context: PartContext,
        content_type: &ContentType,
        body: &[u8],
        depth: usize,
        out: &mut WalkOutput<B>,
    ) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(Error::NestingTooDeep {
                depth: self.config.max_depth,
            });
        }
        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        tracing::debug!(%context, depth, "walking multipart body");

        for part in MultipartReader::new(body, boundary) {
            let part = part?;
            self.part(context, &part, depth, out)?;
        }

        Ok(())
    }

    fn part<B: BodyAccumulator>(
        &self,
        context: PartContext,
        part: &Part<'_>,
        depth: usize,
        out: &mut WalkOutput<B>,
    ) -> Result<()> {
        let content_type = ContentType::resolve(part.content_type())?;
        let media_type = content_type.mime_type();

        if let Some(nested) =
            PartContext::of(&content_type).filter(|n| context.nested().contains(n))
        {
            tracing::debug!(%context, %media_type, "descending into nested multipart");
            let mut inner = WalkOutput::<B>::default();
            self.walk(nested, &content_type, part.body, depth + 1, &mut inner)?;
            out.text.append(inner.text);
            out.html.append(inner.html);
            out.attachments.extend(inner.attachments);
            out.embedded_files.extend(inner.embedded_files);
            return Ok(());
        }

        if content_type.is("text/plain") {
            tracing::debug!(%context, %media_type, "text body");
            out.text.push(decode_text(part.body, part.transfer_encoding(), part.content_type())?);
            return Ok(());
        }
        if content_type.is("text/html") {
            tracing::debug!(%context, %media_type, "html body");
            out.html.push(decode_text(part.body, part.transfer_encoding(), part.content_type())?);
            return Ok(());
        }

        match context {
            PartContext::Mixed if is_attachment(&part.headers, &content_type) => {
                tracing::debug!(%context, %media_type, "attachment");
                out.attachments.push(self.decode_attachment(part, &content_type)?);
                Ok(())
            }
            PartContext::Alternative | PartContext::Related if is_embedded_file(&part.headers) => {
                tracing::debug!(%context, %media_type, "embedded file");
                out.embedded_files.push(decode_embedded_file(part)?);
                Ok(())
            }
            _ => {
                tracing::warn!(%context, %media_type, "unsupported part type");
                Err(Error::UnsupportedPartType {
                    media_type,
                    context,
                })
            }
        }
    }

    fn decode_attachment(&self, part: &Part<'_>, content_type: &ContentType) -> Result<Attachment> {
        let decoded = decode_content(part.body, part.transfer_encoding(), part.content_type())?;
        // Octet streams keep the bytes exactly as they were on the wire.
        let data = if content_type.is(OCTET_STREAM) {
            part.body.to_vec()
        } else {
            decoded
        };

        let filename = filename(&part.headers).unwrap_or_else(|| self.config.fallback_filename());
        let declared = part.content_type();
        let media_type = declared.split(';').next().unwrap_or(declared).trim();

        Ok(Attachment {
            filename,
            content_type: media_type.to_ascii_lowercase(),
            data,
        })
    }
}

/// Decodes a text leaf and drops one trailing line break.
pub(crate) fn decode_text(
    body: &[u8],
    transfer_encoding: &str,
    content_type: &str,
) -> Result<String> {
    let decoded = decode_content(body, transfer_encoding, content_type)?;
    let text = String::from_utf8_lossy(&decoded);
    let trimmed = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(&text);
    Ok(trimmed.to_string())
}

/// A part is an attachment if it names a file or is an octet stream.
fn is_attachment(headers: &Headers, content_type: &ContentType) -> bool {
    filename(headers).is_some() || content_type.is(OCTET_STREAM)
}

/// A part is an embedded file if it declares a transfer encoding.
fn is_embedded_file(headers: &Headers) -> bool {
    !headers.get_or_empty("Content-Transfer-Encoding").trim().is_empty()
}

/// Content-Disposition `filename`, else Content-Type `name`, decoded and
/// without any directory components.
fn filename(headers: &Headers) -> Option<String> {
    let param = |header: &str, key: &str| {
        let parsed = ContentType::resolve(headers.get(header)?).ok()?;
        parsed.parameter(key).map(decode_mime_sentence)
    };

    let name = param("Content-Disposition", "filename").or_else(|| param("Content-Type", "name"))?;
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    (!base.is_empty()).then(|| base.to_string())
}

fn decode_embedded_file(part: &Part<'_>) -> Result<EmbeddedFile> {
    let cid = part.headers.get_or_empty("Content-Id").trim();
    let cid = cid.trim_start_matches('<').trim_end_matches('>');

    Ok(EmbeddedFile {
        cid: decode_mime_sentence(cid),
        content_type: part.content_type().to_string(),
        data: decode_content(part.body, part.transfer_encoding(), part.content_type())?,
    })
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
    use crate::config::SequentialIds;

    fn config() -> ParserConfig {
        ParserConfig::builder().ids(SequentialIds::default()).build()
    }

    fn run<B: BodyAccumulator>(content_type: &str, body: &str) -> Result<WalkOutput<B>> {
        let content_type = ContentType::resolve(content_type).unwrap();
        let context = PartContext::of(&content_type).unwrap();
        walk(context, &content_type, body.as_bytes(), &config())
    }

    #[test]
    fn test_context_of() {
        let ct = ContentType::parse("multipart/related; boundary=x").unwrap();
        assert_eq!(PartContext::of(&ct), Some(PartContext::Related));
        let ct = ContentType::parse("multipart/signed; boundary=x").unwrap();
        assert_eq!(PartContext::of(&ct), None);
        assert_eq!(PartContext::of(&ContentType::default()), None);
        assert_eq!(PartContext::Alternative.to_string(), "multipart/alternative");
    }

    #[test]
    fn test_nested_rules() {
        assert!(PartContext::Mixed.nested().contains(&PartContext::Related));
        assert!(!PartContext::Alternative.nested().contains(&PartContext::Alternative));
        assert!(!PartContext::Related.nested().contains(&PartContext::Mixed));
    }

    #[test]
    fn test_mixed_text_and_attachment() {
        let body = concat!(
            "--m\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "hello\r\n",
            "\r\n",
            "--m\r\n",
            "Content-Type: application/pdf; name=\"report.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0=\r\n",
            "--m--\r\n",
        );

        let out: WalkOutput<String> = run("multipart/mixed; boundary=m", body).unwrap();
        assert_eq!(out.text, "hello");
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(out.attachments[0].filename, "report.pdf");
        assert_eq!(out.attachments[0].content_type, "application/pdf");
        assert_eq!(out.attachments[0].data, b"%PDF-");
    }

    #[test]
    fn test_octet_stream_keeps_raw_bytes() {
        let body = concat!(
            "--m\r\n",
            "Content-Type: application/octet-stream\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "AAEC\r\n",
            "--m--\r\n",
        );

        let out: WalkOutput<String> = run("multipart/mixed; boundary=m", body).unwrap();
        assert_eq!(out.attachments[0].filename, "attachment-1");
        assert_eq!(out.attachments[0].data, b"AAEC");
    }

    #[test]
    fn test_octet_stream_type_is_lowercased() {
        let body = concat!(
            "--m\r\n",
            "Content-Type: Application/Octet-Stream; Name=\"blob.bin\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "AAEC\r\n",
            "--m--\r\n",
        );

        let out: WalkOutput<String> = run("multipart/mixed; boundary=m", body).unwrap();
        let attachment = &out.attachments[0];
        assert_eq!(attachment.filename, "blob.bin");
        assert_eq!(attachment.content_type, "application/octet-stream");
        assert_eq!(attachment.data, b"AAEC");
    }

    #[test]
    fn test_alternative_embedded_file() {
        let body = concat!(
            "--a\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--a\r\n",
            "Content-Type: text/calendar; method=REQUEST\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "Content-ID: <invite@example.com>\r\n",
            "\r\n",
            "QkVHSU4=\r\n",
            "--a--\r\n",
        );

        let out: WalkOutput<String> = run("multipart/alternative; boundary=a", body).unwrap();
        assert_eq!(out.text, "plain");
        assert!(out.attachments.is_empty());
        assert_eq!(out.embedded_files.len(), 1);
        let file = &out.embedded_files[0];
        assert_eq!(file.cid, "invite@example.com");
        assert_eq!(file.content_type, "text/calendar; method=REQUEST");
        assert_eq!(file.data, b"BEGIN");
    }

    #[test]
    fn test_alternative_requires_transfer_encoding() {
        let body = "--a\r\nContent-Type: text/calendar\r\n\r\nBEGIN\r\n--a--\r\n";
        let err = run::<String>("multipart/alternative; boundary=a", body).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedPartType { ref media_type, context: PartContext::Alternative }
                if media_type == "text/calendar"
        ));
    }

    #[test]
    fn test_related_embedded_file() {
        let body = concat!(
            "--r\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<img src=\"cid:logo\">\r\n",
            "--r\r\n",
            "Content-Type: image/png; name=logo.png\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "Content-ID: <logo>\r\n",
            "\r\n",
            "iVBORw==\r\n",
            "--r--\r\n",
        );

        let out: WalkOutput<String> = run("multipart/related; boundary=r", body).unwrap();
        assert_eq!(out.html, "<img src=\"cid:logo\">");
        assert_eq!(out.embedded_files.len(), 1);
        let file = &out.embedded_files[0];
        assert_eq!(file.cid, "logo");
        assert_eq!(file.content_type, "image/png; name=logo.png");
        assert_eq!(file.data, [0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_related_requires_transfer_encoding() {
        let body = "--r\r\nContent-Type: image/png\r\n\r\nxx\r\n--r--\r\n";
        let err = run::<String>("multipart/related; boundary=r", body).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedPartType { ref media_type, context: PartContext::Related }
                if media_type == "image/png"
        ));
        assert_eq!(err.to_string(), "Unsupported multipart/related inner media type: image/png");
    }

    #[test]
    fn test_mixed_rejects_unnamed_binary() {
        let body = "--m\r\nContent-Type: image/gif\r\nContent-Transfer-Encoding: base64\r\n\r\nR0lG\r\n--m--\r\n";
        let err = run::<String>("multipart/mixed; boundary=m", body).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPartType { context: PartContext::Mixed, .. }));
    }

    #[test]
    fn test_nested_mixed_is_not_descended() {
        let body = "--m\r\nContent-Type: multipart/mixed; boundary=n\r\n\r\n--n--\r\n--m--\r\n";
        let err = run::<String>("multipart/mixed; boundary=m", body).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedPartType { ref media_type, .. } if media_type == "multipart/mixed"
        ));
    }

    #[test]
    fn test_per_part_accumulator() {
        let body = concat!(
            "--a\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "one\r\n",
            "--a\r\n",
            "Content-Type: multipart/related; boundary=r\r\n",
            "\r\n",
            "--r\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "two\r\n",
            "--r--\r\n",
            "--a--\r\n",
        );

        let parts: WalkOutput<Vec<String>> = run("multipart/alternative; boundary=a", body).unwrap();
        assert_eq!(parts.text, vec!["one", "two"]);

        let joined: WalkOutput<String> = run("multipart/alternative; boundary=a", body).unwrap();
        assert_eq!(joined.text, "onetwo");
    }

    #[test]
    fn test_missing_boundary() {
        let ct = ContentType::parse("multipart/mixed").unwrap();
        let err = walk::<String>(PartContext::Mixed, &ct, b"", &config()).unwrap_err();
        assert!(matches!(err, Error::MissingBoundary));
    }

    #[test]
    fn test_nesting_limit() {
        let body = concat!(
            "--a\r\n",
            "Content-Type: multipart/related; boundary=r\r\n",
            "\r\n",
            "--r\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "deep\r\n",
            "--r--\r\n",
            "--a--\r\n",
        );
        let ct = ContentType::parse("multipart/alternative; boundary=a").unwrap();
        let shallow = ParserConfig::builder().max_depth(1).build();
        let err =
            walk::<String>(PartContext::Alternative, &ct, body.as_bytes(), &shallow).unwrap_err();
        assert!(matches!(err, Error::NestingTooDeep { depth: 1 }));
    }

    #[test]
    fn test_filename_discovery() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "application/pdf; name=\"type-name.pdf\"");
        assert_eq!(filename(&headers).as_deref(), Some("type-name.pdf"));

        headers.add("Content-Disposition", "attachment; filename=\"C:\\\\docs\\\\disp.pdf\"");
        assert_eq!(filename(&headers).as_deref(), Some("disp.pdf"));

        let mut encoded = Headers::new();
        encoded.add("Content-Disposition", "attachment; filename=\"=?utf-8?B?0L7RgtGH0ZHRgi5wZGY=?=\"");
        assert_eq!(filename(&encoded).as_deref(), Some("отчёт.pdf"));

        let mut extended = Headers::new();
        extended.add("Content-Disposition", "attachment; filename*=utf-8''%D0%B0.txt");
        assert_eq!(filename(&extended).as_deref(), Some("а.txt"));
    }

    #[test]
    fn test_decode_text_trims_one_line_break() {
        assert_eq!(decode_text(b"a\r\n\r\n", "", "").unwrap(), "a\r\n");
        assert_eq!(decode_text(b"a\n", "7bit", "").unwrap(), "a");
        assert_eq!(decode_text(b"a", "", "").unwrap(), "a");
    }
}
