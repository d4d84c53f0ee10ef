//! Single-byte charset transcoding.
//!
//! Only the four legacy charsets still common in inbound Russian and Western
//! European mail are transcoded. Anything else is assumed to already be
//! ASCII or UTF-8 and is passed through untouched.

use std::borrow::Cow;

use encoding_rs::Encoding;

/// Separator that introduces the charset parameter in a raw Content-Type.
const CHARSET_SEPARATOR: &str = "; charset=";

/// Supported single-byte charsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// Windows-1252 (Western European).
    Windows1252,
    /// ISO-8859-1 (Latin-1).
    Iso88591,
    /// KOI8-R (Cyrillic).
    Koi8R,
    /// Windows-1251 (Cyrillic).
    Windows1251,
}

const LABELS: [(&str, Charset); 4] = [
    ("windows-1252", Charset::Windows1252),
    ("iso-8859-1", Charset::Iso88591),
    ("koi8-r", Charset::Koi8R),
    ("windows-1251", Charset::Windows1251),
];

impl Charset {
    /// Looks up a charset by label, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        LABELS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, charset)| *charset)
    }

    /// Returns the canonical label.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Windows1252 => "windows-1252",
            Self::Iso88591 => "iso-8859-1",
            Self::Koi8R => "koi8-r",
            Self::Windows1251 => "windows-1251",
        }
    }

    /// Decodes bytes to text. Every byte value has a mapping, so this
    /// never fails.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            // encoding_rs treats the iso-8859-1 label as windows-1252, so
            // true Latin-1 goes through the dedicated helper.
            Self::Iso88591 => encoding_rs::mem::decode_latin1(bytes).into_owned(),
            Self::Windows1252 => decode_with(encoding_rs::WINDOWS_1252, bytes),
            Self::Koi8R => decode_with(encoding_rs::KOI8_R, bytes),
            Self::Windows1251 => decode_with(encoding_rs::WINDOWS_1251, bytes),
        }
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _had_replacements) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Extracts the charset value from a raw Content-Type string.
///
/// Only the literal `"; charset="` separator is recognised. The value runs
/// to the next `;` and is stripped of quotes and whitespace.
#[must_use]
pub fn charset_param(content_type: &str) -> Option<&str> {
    let (_, rest) = content_type.split_once(CHARSET_SEPARATOR)?;
    let value = rest.split(';').next().unwrap_or(rest);
    Some(value.trim_matches(|c: char| matches!(c, ' ' | '\t' | '"' | '\'' | '\r' | '\n')))
}

/// Transcodes `bytes` to UTF-8 according to the charset named in a raw
/// Content-Type value. Unknown or absent charsets borrow the input.
#[must_use]
pub fn transcode<'a>(bytes: &'a [u8], content_type: &str) -> Cow<'a, [u8]> {
    match charset_param(content_type).and_then(Charset::from_label) {
        Some(charset) => Cow::Owned(charset.decode(bytes).into_bytes()),
        None => Cow::Borrowed(bytes),
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
    use proptest::prelude::*;

    const ALL: [Charset; 4] = [
        Charset::Windows1252,
        Charset::Iso88591,
        Charset::Koi8R,
        Charset::Windows1251,
    ];

    #[test]
    fn test_from_label() {
        assert_eq!(Charset::from_label("KOI8-R"), Some(Charset::Koi8R));
        assert_eq!(Charset::from_label(" windows-1251 "), Some(Charset::Windows1251));
        assert_eq!(Charset::from_label("ISO-8859-1"), Some(Charset::Iso88591));
        assert_eq!(Charset::from_label("utf-8"), None);
        assert_eq!(Charset::from_label(""), None);
    }

    #[test]
    fn test_cyrillic_letters() {
        assert_eq!(Charset::Koi8R.decode(&[0xC1, 0xC2]), "аб");
        assert_eq!(Charset::Windows1251.decode(&[0xE0, 0xE1]), "аб");
    }

    #[test]
    fn test_latin1_is_not_windows_1252() {
        assert_eq!(Charset::Iso88591.decode(&[0x80]), "\u{80}");
        assert_eq!(Charset::Windows1252.decode(&[0x80]), "€");
        assert_eq!(Charset::Iso88591.decode(&[0xE9]), "é");
    }

    #[test]
    fn test_charset_param() {
        assert_eq!(charset_param("text/plain; charset=koi8-r"), Some("koi8-r"));
        assert_eq!(charset_param("text/plain; charset=\"UTF-8\""), Some("UTF-8"));
        assert_eq!(
            charset_param("text/plain; charset=windows-1251; format=flowed"),
            Some("windows-1251")
        );
        assert_eq!(charset_param("text/plain;charset=koi8-r"), None);
        assert_eq!(charset_param("text/plain"), None);
    }

    #[test]
    fn test_transcode_passthrough() {
        let bytes = "Привет".as_bytes();
        let out = transcode(bytes, "text/plain; charset=utf-8");
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), bytes);
    }

    #[test]
    fn test_transcode_koi8() {
        let out = transcode(
            &[0xF0, 0xD2, 0xC9, 0xD7, 0xC5, 0xD4],
            "text/plain; charset=\"KOI8-R\"",
        );
        assert_eq!(std::str::from_utf8(&out).unwrap(), "Привет");
    }

    #[test]
    fn test_every_byte_maps() {
        let all: Vec<u8> = (0..=255).collect();
        for charset in ALL {
            let text = charset.decode(&all);
            assert_eq!(text.chars().count(), 256, "{charset}");
        }
    }

    proptest! {
        #[test]
        fn transcode_is_total_and_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            for charset in ALL {
                let first = charset.decode(&bytes);
                let second = charset.decode(&bytes);
                prop_assert_eq!(first.chars().count(), bytes.len());
                prop_assert_eq!(first, second);
            }
        }
    }
}
