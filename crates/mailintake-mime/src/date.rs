//! RFC 5322 date parsing.

use chrono::{DateTime, FixedOffset};

/// Accepted layouts after the weekday, tried in order. Each is also tried
/// with a trailing parenthesised zone name such as ` (PST)`.
const FORMATS: [&str; 2] = ["%d %b %Y %H:%M:%S %z", "%e %b %Y %H:%M:%S %z"];

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parses a `Date`-style header value.
///
/// Returns `None` if the value matches none of the accepted layouts. The
/// leading weekday name must be present but is not checked against the
/// date.
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = strip_weekday(value.trim())?;

    FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            let stripped = strip_zone_comment(value)?;
            FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(stripped, format).ok())
        })
}

/// Removes the `Www, ` prefix.
fn strip_weekday(value: &str) -> Option<&str> {
    let (day, rest) = value.split_once(", ")?;
    WEEKDAYS.contains(&day).then_some(rest)
}

/// Removes a trailing ` (ZONE)` comment.
fn strip_zone_comment(value: &str) -> Option<&str> {
    let (head, comment) = value.strip_suffix(')')?.rsplit_once(" (")?;
    let is_zone = !comment.is_empty()
        && comment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-');
    is_zone.then_some(head)
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
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_canonical() {
        let date = parse_date("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(date.year(), 2006);
        assert_eq!(date.day(), 2);
        assert_eq!(date.hour(), 15);
        assert_eq!(date.offset().local_minus_utc(), -7 * 3600);
    }

    #[test]
    fn test_single_digit_day() {
        let date = parse_date("Mon, 2 Jan 2006 15:04:05 +0300").unwrap();
        assert_eq!(date.day(), 2);
        assert_eq!(date.offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn test_zone_comment() {
        let date = parse_date("Tue, 14 Nov 2023 09:30:00 -0800 (PST)").unwrap();
        assert_eq!(date.month(), 11);
        assert_eq!(date.minute(), 30);
        assert!(parse_date("Tue, 7 Nov 2023 09:30:00 +0000 (UTC)").is_some());
    }

    #[test]
    fn test_weekday_not_checked_against_date() {
        // 14 Nov 2023 was a Tuesday.
        let date = parse_date("Mon, 14 Nov 2023 09:30:00 -0800").unwrap();
        assert_eq!(date.day(), 14);
        assert_eq!(date.weekday(), chrono::Weekday::Tue);
        assert!(parse_date("Sun, 7 Nov 2023 09:30:00 +0000 (UTC)").is_some());
    }

    #[test]
    fn test_weekday_syntax() {
        assert_eq!(strip_weekday("Fri, 1 Dec 2023"), Some("1 Dec 2023"));
        assert_eq!(strip_weekday("Fry, 1 Dec 2023"), None);
        assert!(parse_date("14 Nov 2023 09:30:00 -0800").is_none());
        assert!(parse_date("Friday, 14 Nov 2023 09:30:00 -0800").is_none());
    }

    #[test]
    fn test_rejects() {
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("2023-11-14T09:30:00Z").is_none());
        assert!(parse_date("Tue, 14 Nov 2023 09:30:00 -0800 (not a zone)").is_none());
        assert!(parse_date("Tue, 14 Nov 2023 09:30:00").is_none());
    }

    #[test]
    fn test_zone_comment_strip() {
        assert_eq!(strip_zone_comment("x (UTC)"), Some("x"));
        assert_eq!(strip_zone_comment("x ()"), None);
        assert_eq!(strip_zone_comment("x"), None);
    }
}
