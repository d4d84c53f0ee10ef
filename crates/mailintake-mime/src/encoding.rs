//! Transfer-encoding decoding.
//!
//! Supports Base64, Quoted-Printable and the identity encodings (`7bit`,
//! `8bit`, or no header at all). Decoded bytes are run through the charset
//! transcoder unless the part is `application/octet-stream`.

use crate::charset;
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// Media type whose payload is never reinterpreted as text.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// No Content-Transfer-Encoding header.
    Identity,
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Parses a Content-Transfer-Encoding value, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTransferEncoding`] for anything outside the
    /// supported set (`binary` included).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Self::Identity),
            "7bit" => Ok(Self::SevenBit),
            "8bit" => Ok(Self::EightBit),
            "base64" => Ok(Self::Base64),
            "quoted-printable" => Ok(Self::QuotedPrintable),
            _ => Err(Error::UnknownTransferEncoding(s.to_string())),
        }
    }

    /// Removes this transfer encoding from `raw`.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 payload is malformed.
    pub fn decode(self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(raw),
            Self::QuotedPrintable => Ok(decode_quoted_printable(raw)),
            Self::Identity | Self::SevenBit | Self::EightBit => Ok(raw.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => Ok(()),
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
        }
    }
}

/// Decodes a part body: transfer decoding first, then charset transcoding.
///
/// `content_type` is the raw Content-Type header value of the part. When its
/// media type is `application/octet-stream` the transfer-decoded bytes are
/// returned verbatim.
///
/// # Errors
///
/// Returns an error for unknown transfer encodings or malformed Base64.
pub fn decode_content(raw: &[u8], transfer_encoding: &str, content_type: &str) -> Result<Vec<u8>> {
    let decoded = TransferEncoding::parse(transfer_encoding)?.decode(raw)?;

    if is_octet_stream(content_type) {
        return Ok(decoded);
    }

    Ok(charset::transcode(&decoded, content_type).into_owned())
}

fn is_octet_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(OCTET_STREAM))
}

/// Decodes Base64 data with the standard alphabet.
///
/// Line breaks and other ASCII whitespace are ignored.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Decoding is lenient: an `=` that does not start a valid escape is kept
/// literally, trailing whitespace on each line is dropped, and soft line
/// breaks are removed. Hard line breaks keep their original form.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());

    for line in data.split_inclusive(|&b| b == b'\n') {
        let (content, ending) = split_line_ending(line);

        let content = trim_trailing_whitespace(content);

        // Soft line break
        if let Some(rest) = content.strip_suffix(b"=") {
            decode_escapes(rest, &mut result);
        } else {
            decode_escapes(content, &mut result);
            result.extend_from_slice(ending);
        }
    }

    result
}

fn split_line_ending(line: &[u8]) -> (&[u8], &[u8]) {
    if let Some(rest) = line.strip_suffix(b"\r\n") {
        (rest, &line[rest.len()..])
    } else if let Some(rest) = line.strip_suffix(b"\n") {
        (rest, &line[rest.len()..])
    } else {
        (line, &line[line.len()..])
    }
}

fn trim_trailing_whitespace(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |pos| pos + 1);
    &line[..end]
}

fn decode_escapes(line: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'=' {
            if let (Some(&hi), Some(&lo)) = (line.get(i + 1), line.get(i + 2)) {
                if let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(line[i]);
        i += 1;
    }
}

/// Value of one hexadecimal digit, either case.
pub(crate) const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
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
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("").unwrap(), TransferEncoding::Identity);
        assert_eq!(TransferEncoding::parse("7bit").unwrap(), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("8BIT").unwrap(), TransferEncoding::EightBit);
        assert_eq!(TransferEncoding::parse("Base64").unwrap(), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable").unwrap(),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_transfer_encoding_unknown() {
        let err = TransferEncoding::parse("x-uuencode").unwrap_err();
        assert!(matches!(err, Error::UnknownTransferEncoding(ref e) if e == "x-uuencode"));
        assert!(TransferEncoding::parse("binary").is_err());
    }

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert!(matches!(decode_base64(b"!!!!"), Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!"), b"Hello, World!");
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable(b"h=c3=a9llo"), "héllo".as_bytes());
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=  \nWorld\n"), b"HelloWorld\n");
    }

    #[test]
    fn test_quoted_printable_keeps_hard_breaks() {
        assert_eq!(decode_quoted_printable(b"one  \r\ntwo\r\n"), b"one\r\ntwo\r\n");
    }

    #[test]
    fn test_quoted_printable_invalid_escape_is_literal() {
        assert_eq!(decode_quoted_printable(b"a=ZZb=4"), b"a=ZZb=4");
    }

    #[test]
    fn test_decode_content_identity() {
        let out = decode_content(b"plain", "", "").unwrap();
        assert_eq!(out, b"plain");
    }

    #[test]
    fn test_decode_content_transcodes() {
        // "да" in windows-1251, base64
        let out = decode_content(b"5OA=", "base64", "text/plain; charset=windows-1251").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "да");
    }

    #[test]
    fn test_decode_content_octet_stream_skips_charset() {
        let out = decode_content(
            &[0xE4, 0xE0],
            "8bit",
            "Application/Octet-Stream; charset=windows-1251",
        )
        .unwrap();
        assert_eq!(out, vec![0xE4, 0xE0]);
    }

    #[test]
    fn test_decode_content_unknown_encoding() {
        assert!(matches!(
            decode_content(b"x", "gzip", "text/plain"),
            Err(Error::UnknownTransferEncoding(_))
        ));
    }
}
