//! RFC 2047 encoded-word decoding for header values.
//!
//! [`decode_mime_sentence`] is applied to every non-address header value.
//! It first tries a whole-value KOI8-R decode for producers that wrap an
//! entire header in one oversized `=?koi8-r?...?=` block, then falls back to
//! decoding space-separated encoded words one by one.

use crate::charset::Charset;
use crate::encoding::{decode_quoted_printable, hex_value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::Encoding;

/// Case-insensitive marker that selects the KOI8-R whole-value path.
const KOI8_MARKER: &str = "=?koi8-r";
/// Length of `=?koi8-r?B?` / `=?koi8-r?Q?`.
const KOI8_PREFIX_LEN: usize = 11;

/// Character set named by an encoded word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordCharset {
    Utf8,
    Ascii,
    Table(Charset),
    Other(&'static Encoding),
}

impl WordCharset {
    fn from_label(label: &str) -> Option<Self> {
        // RFC 2231 allows a language suffix: charset*lang
        let label = label.split('*').next().unwrap_or(label);

        if label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
            return Some(Self::Utf8);
        }
        if label.eq_ignore_ascii_case("us-ascii") || label.eq_ignore_ascii_case("ascii") {
            return Some(Self::Ascii);
        }
        if let Some(charset) = Charset::from_label(label) {
            return Some(Self::Table(charset));
        }
        Encoding::for_label(label.as_bytes()).map(Self::Other)
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Self::Table(charset) => charset.decode(bytes),
            Self::Other(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }
}

/// Payload of one encoded word, still in its own charset.
struct EncodedWord {
    charset: WordCharset,
    bytes: Vec<u8>,
}

/// Parses `=?charset?encoding?text?=`. The whole token must be one word.
fn parse_word(word: &str) -> Option<EncodedWord> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let (label, rest) = inner.split_once('?')?;
    if label.is_empty() {
        return None;
    }
    let (encoding, text) = rest.split_once('?')?;

    let bytes = match encoding {
        "B" | "b" => STANDARD.decode(text).ok()?,
        "Q" | "q" => decode_q(text)?,
        _ => return None,
    };

    Some(EncodedWord {
        charset: WordCharset::from_label(label)?,
        bytes,
    })
}

/// Decodes the RFC 2047 "Q" encoding: `_` is a space, `=XX` a byte, and
/// everything else must be printable ASCII.
fn decode_q(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = hex_value(*bytes.get(i + 1)?)?;
                let lo = hex_value(*bytes.get(i + 2)?)?;
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
            b @ (b' '..=b'~' | b'\t' | b'\r' | b'\n') => out.push(b),
            _ => return None,
        }
        i += 1;
    }

    Some(out)
}

/// Decodes a single encoded word.
///
/// Returns `None` if `word` is not exactly one well-formed encoded word in a
/// known charset.
#[must_use]
pub fn decode_word(word: &str) -> Option<String> {
    parse_word(word).map(|w| w.charset.decode(&w.bytes))
}

/// Decodes a header value containing RFC 2047 encoded words.
///
/// Tokens are split on ASCII space. Decoded words are joined with no
/// separator; a literal token keeps one leading space unless it is the first
/// token. Consecutive words in the same charset are transcoded together so a
/// multi-byte character split across two words survives.
///
/// Values starting with `=?koi8-r` (any case) are first decoded as one
/// KOI8-R block; if that fails the value goes through the per-word path
/// instead, which leaves anything it cannot decode as it was.
#[must_use]
pub fn decode_mime_sentence(s: &str) -> String {
    if let Some(decoded) = decode_koi8_value(s) {
        return decoded;
    }

    let mut result = String::with_capacity(s.len());
    let mut run: Option<EncodedWord> = None;

    for (index, token) in s.split(' ').enumerate() {
        match parse_word(token) {
            Some(word) => match run.as_mut() {
                Some(current) if current.charset == word.charset => {
                    current.bytes.extend_from_slice(&word.bytes);
                }
                _ => {
                    flush(run.take(), &mut result);
                    run = Some(word);
                }
            },
            None => {
                flush(run.take(), &mut result);
                if index > 0 {
                    result.push(' ');
                }
                result.push_str(token);
            }
        }
    }
    flush(run, &mut result);

    result
}

fn flush(run: Option<EncodedWord>, out: &mut String) {
    if let Some(word) = run {
        out.push_str(&word.charset.decode(&word.bytes));
    }
}

fn decode_koi8_value(s: &str) -> Option<String> {
    let marked = s
        .get(..KOI8_MARKER.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(KOI8_MARKER));
    if !marked {
        return None;
    }

    let decoded = decode_koi8_block(s);
    if decoded.is_none() {
        tracing::debug!(value = s, "KOI8-R whole-value decode failed");
    }
    decoded
}

fn decode_koi8_block(s: &str) -> Option<String> {
    let prefix = s.get(..KOI8_PREFIX_LEN)?;
    let payload = s.get(KOI8_PREFIX_LEN..)?.strip_suffix("?=")?;

    let bytes = if prefix.eq_ignore_ascii_case("=?koi8-r?b?") {
        STANDARD.decode(payload).ok()?
    } else if prefix.eq_ignore_ascii_case("=?koi8-r?q?") {
        decode_quoted_printable(payload.as_bytes())
    } else {
        return None;
    };

    Some(Charset::Koi8R.decode(&bytes))
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
    fn test_decode_word() {
        assert_eq!(decode_word("=?utf-8?B?SMOpbGxv?=").as_deref(), Some("Héllo"));
        assert_eq!(decode_word("=?utf-8?Q?H=C3=A9llo?=").as_deref(), Some("Héllo"));
        assert_eq!(decode_word("=?ISO-8859-1?q?caf=E9_noir?=").as_deref(), Some("café noir"));
        assert_eq!(decode_word("=?windows-1251?B?5OA=?=").as_deref(), Some("да"));
    }

    #[test]
    fn test_decode_word_rejects() {
        assert_eq!(decode_word("Hello"), None);
        assert_eq!(decode_word("=??B?SMOpbGxv?="), None);
        assert_eq!(decode_word("=?utf-8?X?abc?="), None);
        assert_eq!(decode_word("=?utf-8?B?not base64?="), None);
        assert_eq!(decode_word("=?utf-8?Q?bad=ZZ?="), None);
        assert_eq!(decode_word("=?x-no-such-charset?B?YQ==?="), None);
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(decode_mime_sentence("Hello"), "Hello");
        assert_eq!(decode_mime_sentence("Hello  world "), "Hello  world ");
        assert_eq!(decode_mime_sentence(""), "");
    }

    #[test]
    fn test_adjacent_words_fuse() {
        let subject = "=?UTF-8?B?0J/RgNC40LLQtdGC?= =?UTF-8?B?INC80LjRgA==?= online \
                       =?UTF-8?B?INC60YPRgNGB?= =?UTF-8?B?INGB0LXQs9C+0LTQvdGP?=";
        assert_eq!(decode_mime_sentence(subject), "Привет мир online курс сегодня");
    }

    #[test]
    fn test_literal_after_word_keeps_space() {
        assert_eq!(decode_mime_sentence("=?utf-8?Q?Re:?= hello"), "Re: hello");
        assert_eq!(decode_mime_sentence("Re: =?utf-8?Q?caf=C3=A9?="), "Re:café");
    }

    #[test]
    fn test_split_multibyte_character() {
        assert_eq!(decode_mime_sentence("=?utf-8?B?0A==?= =?utf-8?B?nw==?="), "П");
    }

    #[test]
    fn test_koi8_whole_value_base64() {
        assert_eq!(
            decode_mime_sentence("=?KOI8-R?B?9MXNwSDQydPYzcE=?="),
            "Тема письма"
        );
    }

    #[test]
    fn test_koi8_whole_value_quoted_printable() {
        assert_eq!(decode_mime_sentence("=?koi8-r?Q?=EB=CF=CC?="), "Кол");
    }

    #[test]
    fn test_koi8_failure_falls_open() {
        let bad = "=?koi8-r?B?!!!?=";
        assert_eq!(decode_mime_sentence(bad), bad);
        let short = "=?koi8-r";
        assert_eq!(decode_mime_sentence(short), short);
        let no_trailer = "=?KOI8-R?B?9MXNwQ==";
        assert_eq!(decode_mime_sentence(no_trailer), no_trailer);
    }

    #[test]
    fn test_koi8_multiple_words_use_word_path() {
        assert_eq!(
            decode_mime_sentence("=?koi8-r?B?9MXNwQ==?= =?koi8-r?B?INDJ09jNwQ==?="),
            "Тема письма"
        );
    }
}
