//! MIME content type handling.
//!
//! [`ContentType::resolve`] is what the decoder uses for every header it
//! inspects: it applies the default for a missing header, removes duplicate
//! parameters and then parses the media-type grammar.

use crate::charset::Charset;
use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Characters that may not appear in a token (RFC 2045 `tspecials`).
const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg"). Empty for bare tokens such
    /// as a Content-Disposition of `attachment`.
    pub sub_type: String,
    /// Parameters with lowercased keys (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::new("text", "plain")
    }
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the media type without parameters, e.g. `text/plain`.
    #[must_use]
    pub fn mime_type(&self) -> String {
        if self.sub_type.is_empty() {
            self.main_type.clone()
        } else {
            format!("{}/{}", self.main_type, self.sub_type)
        }
    }

    /// Checks the media type against `type/subtype`, ignoring case.
    #[must_use]
    pub fn is(&self, mime_type: &str) -> bool {
        match mime_type.split_once('/') {
            Some((main, sub)) => {
                self.main_type.eq_ignore_ascii_case(main) && self.sub_type.eq_ignore_ascii_case(sub)
            }
            None => self.main_type.eq_ignore_ascii_case(mime_type) && self.sub_type.is_empty(),
        }
    }

    /// Returns a parameter by (lowercase) name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Resolves a raw header value the way the decoder needs it.
    ///
    /// An empty value means `text/plain` with no parameters. Anything else
    /// is sanitized with [`sanitize`] and then parsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContentType`] carrying the raw value if the
    /// sanitized value does not match the media-type grammar.
    pub fn resolve(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        Self::parse(&sanitize(raw)).map_err(|_| Error::InvalidContentType(raw.to_string()))
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// Type, subtype and parameter names are lowercased. RFC 2231 extended
    /// and continued parameters are folded into plain ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid or a parameter repeats.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidContentType(s.to_string());

        let (media, mut rest) = s.find(';').map_or((s, ""), |i| s.split_at(i));

        // Parse type/subtype
        let media = media.trim().to_ascii_lowercase();
        let (main_type, after_main) = take_token(&media);
        if main_type.is_empty() {
            return Err(invalid());
        }
        let sub_type = match after_main.strip_prefix('/') {
            Some(after_slash) => {
                let (sub_type, trailing) = take_token(after_slash);
                if sub_type.is_empty() || !trailing.is_empty() {
                    return Err(invalid());
                }
                sub_type
            }
            None if after_main.is_empty() => "",
            None => return Err(invalid()),
        };

        // Parse parameters
        let mut raw_params: HashMap<String, String> = HashMap::new();
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            let Some(after_semicolon) = rest.strip_prefix(';') else {
                return Err(invalid());
            };
            let after_semicolon = after_semicolon.trim_start();
            if after_semicolon.is_empty() {
                // Trailing semicolon
                break;
            }

            let (key, after_key) = take_token(after_semicolon);
            let Some(after_eq) = after_key.trim_start().strip_prefix('=') else {
                return Err(invalid());
            };
            let (value, after_value) = take_value(after_eq.trim_start()).ok_or_else(invalid)?;
            if key.is_empty() {
                return Err(invalid());
            }

            if raw_params.insert(key.to_ascii_lowercase(), value).is_some() {
                return Err(invalid());
            }
            rest = after_value;
        }

        Ok(Self {
            main_type: main_type.to_string(),
            sub_type: sub_type.to_string(),
            parameters: fold_extended_parameters(raw_params),
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime_type())?;

        let mut keys: Vec<_> = self.parameters.keys().collect();
        keys.sort();
        for key in keys {
            let value = &self.parameters[key];
            // Quote value if it contains special characters
            if value.is_empty()
                || value.contains(|c: char| c.is_whitespace() || TSPECIALS.contains(c))
            {
                write!(f, "; {key}=\"{value}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

/// Removes duplicate parameters from a raw Content-Type value.
///
/// The value is split on `;`, each piece trimmed and empty pieces dropped.
/// Parameters are compared by lowercased name; the first occurrence wins.
///
/// `text/html; charset=utf-8; charset="UTF-8"` becomes
/// `text/html; charset=utf-8`.
#[must_use]
pub fn sanitize(header: &str) -> String {
    let mut seen = HashSet::new();

    header
        .split(';')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .filter(|piece| {
            piece
                .split_once('=')
                .is_none_or(|(key, _)| seen.insert(key.to_ascii_lowercase()))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

const fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic()
        && !matches!(
            c,
            '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '='
        )
}

fn take_token(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !is_token_char(c)).unwrap_or(s.len());
    s.split_at(end)
}

/// Reads a token or quoted-string value. Returns `None` when neither is
/// present or a quoted string is unterminated.
fn take_value(s: &str) -> Option<(String, &str)> {
    let Some(quoted) = s.strip_prefix('"') else {
        let (token, rest) = take_token(s);
        return (!token.is_empty()).then(|| (token.to_string(), rest));
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((value, &quoted[i + 1..])),
            '\\' => value.push(chars.next()?.1),
            _ => value.push(c),
        }
    }

    None
}

/// Folds RFC 2231 parameters (`name*`, `name*0`, `name*1*`, ...) into
/// plain `name` entries. Extended values take precedence over plain ones.
fn fold_extended_parameters(raw: HashMap<String, String>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut continued = HashSet::new();

    for (key, value) in &raw {
        match key.split_once('*') {
            None => {
                params.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Some((name, "")) => {
                params.insert(name.to_string(), decode_extended_value(value));
            }
            Some((name, _)) => {
                continued.insert(name.to_string());
            }
        }
    }

    for name in continued {
        let mut bytes = Vec::new();
        let mut charset = None;
        for index in 0.. {
            if let Some(piece) = raw.get(&format!("{name}*{index}*")) {
                if index == 0 {
                    let (piece_charset, encoded) = split_charset(piece);
                    charset = piece_charset;
                    bytes.extend(percent_decode_str(encoded));
                } else {
                    bytes.extend(percent_decode_str(piece));
                }
            } else if let Some(piece) = raw.get(&format!("{name}*{index}")) {
                bytes.extend_from_slice(piece.as_bytes());
            } else {
                break;
            }
        }
        params.insert(name, decode_with_charset(charset, &bytes));
    }

    params
}

/// Splits `charset'language'value`; values without the prefix have no
/// charset.
fn split_charset(value: &str) -> (Option<&str>, &str) {
    let mut pieces = value.splitn(3, '\'');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(charset), Some(_language), Some(encoded)) => (Some(charset), encoded),
        _ => (None, value),
    }
}

fn decode_extended_value(value: &str) -> String {
    let (charset, encoded) = split_charset(value);
    let bytes: Vec<u8> = percent_decode_str(encoded).collect();
    decode_with_charset(charset, &bytes)
}

fn decode_with_charset(charset: Option<&str>, bytes: &[u8]) -> String {
    match charset.and_then(Charset::from_label) {
        Some(charset) => charset.decode(bytes),
        None => String::from_utf8_lossy(bytes).into_owned(),
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

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; Charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert!(ct.is("text/plain"));
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert_eq!(ct.mime_type(), "multipart/mixed");
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
        assert!(ct.is_multipart());
    }

    #[test]
    fn test_content_type_parse_escaped_quote() {
        let ct = ContentType::parse(r#"application/pdf; name="a \"b\" c.pdf""#).unwrap();
        assert_eq!(ct.parameter("name"), Some("a \"b\" c.pdf"));
    }

    #[test]
    fn test_content_type_parse_bare_token() {
        let ct = ContentType::parse("attachment; filename=report.pdf").unwrap();
        assert_eq!(ct.mime_type(), "attachment");
        assert_eq!(ct.parameter("filename"), Some("report.pdf"));
    }

    #[test]
    fn test_content_type_parse_trailing_semicolon() {
        let ct = ContentType::parse("text/html;").unwrap();
        assert!(ct.is("text/html"));
    }

    #[test]
    fn test_content_type_parse_rejects_garbage() {
        assert!(ContentType::parse("").is_err());
        assert!(ContentType::parse("text/").is_err());
        assert!(ContentType::parse("text/plain extra").is_err());
        assert!(ContentType::parse("text/plain; charset").is_err());
        assert!(ContentType::parse("text/plain; charset=\"open").is_err());
        assert!(ContentType::parse("text/plain; a=1; A=2").is_err());
    }

    #[test]
    fn test_rfc2231_extended_parameter() {
        let ct = ContentType::parse("attachment; filename*=utf-8''%D0%BE%D1%82%D1%87%D1%91%D1%82.pdf").unwrap();
        assert_eq!(ct.parameter("filename"), Some("отчёт.pdf"));
    }

    #[test]
    fn test_rfc2231_continuation() {
        let ct = ContentType::parse(
            "attachment; filename*0*=windows-1251''%EE%F2; filename*1=chet.txt",
        )
        .unwrap();
        assert_eq!(ct.parameter("filename"), Some("отchet.txt"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("text/plain; charset=utf-8"), "text/plain; charset=utf-8");
        assert_eq!(
            sanitize("text/plain; charset=utf-8; charset=utf-8"),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            sanitize("text/plain; charset=utf-8; charset=UTF-8"),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            sanitize("text/plain; charset=utf-8; charset=\"UTF-8\""),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            sanitize("text/plain;  CHARSET=koi8-r ;charset=utf-8;;"),
            "text/plain; CHARSET=koi8-r"
        );
    }

    #[test]
    fn test_resolve_default() {
        let ct = ContentType::resolve("").unwrap();
        assert!(ct.is("text/plain"));
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_resolve_duplicate_parameters() {
        let ct = ContentType::resolve("text/html; charset=utf-8; charset=\"UTF-8\"").unwrap();
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_resolve_carries_raw_value() {
        let err = ContentType::resolve("text/plain; charset=\"broken").unwrap_err();
        assert!(
            matches!(err, Error::InvalidContentType(ref raw) if raw == "text/plain; charset=\"broken")
        );
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("charset", "utf-8")
            .with_parameter("name", "a b.txt");
        assert_eq!(ct.to_string(), "text/plain; charset=utf-8; name=\"a b.txt\"");
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(raw in "[a-zA-Z/=; \"-]{0,40}") {
            let once = sanitize(&raw);
            prop_assert_eq!(sanitize(&once), once);
        }
    }
}
