//! Typed header fields.
//!
//! Fields are decoded in a fixed order through [`FieldParser`], which keeps
//! the first error it sees. Once an error is recorded every later field is
//! left at its zero value, so a failure in `Date` still returns `Subject`,
//! the senders and the recipients that came before it.

use crate::address::{Address, parse_address_list, parse_mailbox};
use crate::date::parse_date;
use crate::error::{Error, FieldError, Result};
use crate::header::Headers;
use crate::rfc2047::decode_mime_sentence;
use chrono::{DateTime, FixedOffset};

/// Structured metadata decoded from a message header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeaderFields {
    /// Decoded subject.
    pub subject: String,
    /// Sender mailbox.
    pub sender: Option<Address>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// Origination date.
    pub date: Option<DateTime<FixedOffset>>,
    /// Resent-From addresses.
    pub resent_from: Vec<Address>,
    /// Resent-Sender mailbox.
    pub resent_sender: Option<Address>,
    /// Resent-To addresses.
    pub resent_to: Vec<Address>,
    /// Resent-Cc addresses.
    pub resent_cc: Vec<Address>,
    /// Resent-Bcc addresses.
    pub resent_bcc: Vec<Address>,
    /// Resent-Message-ID without angle brackets.
    pub resent_message_id: String,
    /// Message-ID without angle brackets.
    pub message_id: String,
    /// In-Reply-To message ids.
    pub in_reply_to: Vec<String>,
    /// References message ids, oldest first.
    pub references: Vec<String>,
    /// Resent-Date.
    pub resent_date: Option<DateTime<FixedOffset>>,
}

impl HeaderFields {
    /// Decodes every typed field, stopping at the first failure.
    ///
    /// Returns the fields populated so far together with the error, if any.
    #[must_use]
    pub fn decode(headers: &Headers) -> (Self, Option<FieldError>) {
        let mut p = FieldParser::new(headers);

        let fields = Self {
            subject: p.text("Subject"),
            sender: p.mailbox("Sender"),
            from: p.addresses("From"),
            reply_to: p.addresses("Reply-To"),
            to: p.addresses("To"),
            cc: p.addresses("Cc"),
            bcc: p.addresses("Bcc"),
            date: p.date("Date"),
            resent_from: p.addresses("Resent-From"),
            resent_sender: p.mailbox("Resent-Sender"),
            resent_to: p.addresses("Resent-To"),
            resent_cc: p.addresses("Resent-Cc"),
            resent_bcc: p.addresses("Resent-Bcc"),
            resent_message_id: p.message_id("Resent-Message-ID"),
            message_id: p.message_id("Message-ID"),
            in_reply_to: p.message_ids("In-Reply-To"),
            references: p.message_ids("References"),
            resent_date: p.date("Resent-Date"),
        };

        (fields, p.error)
    }

    /// Decodes every typed field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Header`] with the first field error and the fields
    /// populated before it.
    pub fn parse(headers: &Headers) -> Result<Self> {
        match Self::decode(headers) {
            (fields, None) => Ok(fields),
            (fields, Some(source)) => Err(Error::Header {
                source,
                partial: Box::new(fields),
            }),
        }
    }
}

/// Fail-fast accumulator over one header block.
///
/// Each method returns the zero value without looking at the header once
/// an error has been recorded.
struct FieldParser<'h> {
    headers: &'h Headers,
    error: Option<FieldError>,
}

impl<'h> FieldParser<'h> {
    const fn new(headers: &'h Headers) -> Self {
        Self {
            headers,
            error: None,
        }
    }

    /// Raw value, or `None` once the accumulator has failed.
    fn raw(&self, field: &str) -> Option<&'h str> {
        if self.error.is_some() {
            return None;
        }
        Some(self.headers.get_or_empty(field))
    }

    fn fail<T: Default>(&mut self, error: FieldError) -> T {
        tracing::debug!(%error, "header field rejected");
        self.error = Some(error);
        T::default()
    }

    fn text(&self, field: &str) -> String {
        self.raw(field).map(decode_mime_sentence).unwrap_or_default()
    }

    fn addresses(&mut self, field: &'static str) -> Vec<Address> {
        let Some(value) = self.raw(field) else {
            return Vec::new();
        };
        if value.trim().is_empty() {
            return Vec::new();
        }
        match parse_address_list(value) {
            Ok(list) => list,
            Err(reason) => self.fail(FieldError::MalformedAddressList {
                field,
                value: value.to_string(),
                reason,
            }),
        }
    }

    fn mailbox(&mut self, field: &'static str) -> Option<Address> {
        let value = self.raw(field)?;
        if value.trim().is_empty() {
            return None;
        }
        match parse_mailbox(value) {
            Ok(address) => Some(address),
            Err(reason) => self.fail(FieldError::MalformedAddressList {
                field,
                value: value.to_string(),
                reason,
            }),
        }
    }

    fn date(&mut self, field: &'static str) -> Option<DateTime<FixedOffset>> {
        let value = self.raw(field)?;
        if value.is_empty() {
            return None;
        }
        match parse_date(value) {
            Some(date) => Some(date),
            None => self.fail(FieldError::MalformedDate {
                field,
                value: value.to_string(),
            }),
        }
    }

    fn message_id(&self, field: &str) -> String {
        self.raw(field).map(trim_message_id).unwrap_or_default()
    }

    fn message_ids(&self, field: &str) -> Vec<String> {
        self.raw(field)
            .map(|value| {
                value
                    .split(' ')
                    .filter(|token| !token.trim().is_empty())
                    .map(trim_message_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn trim_message_id(value: &str) -> String {
    value
        .trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
        .to_string()
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
    use chrono::Datelike;

    fn headers(text: &str) -> Headers {
        Headers::parse(text).unwrap()
    }

    #[test]
    fn test_all_fields() {
        let h = headers(concat!(
            "Subject: =?utf-8?B?0J/RgNC40LLQtdGC?=\r\n",
            "Sender: Desk <desk@example.com>\r\n",
            "From: Alice <alice@example.com>\r\n",
            "Reply-To: replies@example.com\r\n",
            "To: bob@example.com, Carol <carol@example.com>\r\n",
            "Cc: \r\n",
            "Date: Tue, 14 Nov 2023 09:30:00 -0800\r\n",
            "Message-ID: <abc@example.com>\r\n",
            "In-Reply-To: <one@x>\r\n",
            "References: <one@x>  <two@x>\r\n",
        ));

        let fields = HeaderFields::parse(&h).unwrap();
        assert_eq!(fields.subject, "Привет");
        assert_eq!(fields.sender, Some(Address::new("Desk", "desk@example.com")));
        assert_eq!(fields.from, vec![Address::new("Alice", "alice@example.com")]);
        assert_eq!(fields.reply_to[0].address, "replies@example.com");
        assert_eq!(fields.to.len(), 2);
        assert!(fields.cc.is_empty());
        assert!(fields.bcc.is_empty());
        assert_eq!(fields.date.unwrap().day(), 14);
        assert_eq!(fields.message_id, "abc@example.com");
        assert_eq!(fields.in_reply_to, vec!["one@x"]);
        assert_eq!(fields.references, vec!["one@x", "two@x"]);
        assert!(fields.resent_date.is_none());
    }

    #[test]
    fn test_missing_fields_are_zero() {
        let fields = HeaderFields::parse(&Headers::new()).unwrap();
        assert_eq!(fields, HeaderFields::default());
    }

    #[test]
    fn test_first_error_sticks() {
        let h = headers(concat!(
            "Subject: kept\r\n",
            "From: alice@example.com\r\n",
            "To: not an address\r\n",
            "Cc: carol@example.com\r\n",
            "Date: garbage\r\n",
            "Message-ID: <abc@example.com>\r\n",
        ));

        let (fields, error) = HeaderFields::decode(&h);
        assert_eq!(fields.subject, "kept");
        assert_eq!(fields.from.len(), 1);
        assert!(fields.to.is_empty());
        assert!(fields.cc.is_empty());
        assert!(fields.date.is_none());
        assert_eq!(fields.message_id, "");
        assert!(matches!(
            error,
            Some(FieldError::MalformedAddressList { field: "To", .. })
        ));
    }

    #[test]
    fn test_bad_date_is_header_error() {
        let h = headers("From: a@example.com\r\nDate: 14/11/2023\r\nMessage-ID: <x@y>\r\n");
        let err = HeaderFields::parse(&h).unwrap_err();
        let Error::Header { source, partial } = err else {
            panic!("expected header error");
        };
        assert_eq!(
            source,
            FieldError::MalformedDate {
                field: "Date",
                value: "14/11/2023".to_string()
            }
        );
        assert_eq!(partial.from.len(), 1);
        assert_eq!(partial.message_id, "");
    }

    #[test]
    fn test_sender_must_be_single() {
        let h = headers("Sender: a@example.com, b@example.com\r\n");
        let (_, error) = HeaderFields::decode(&h);
        assert!(matches!(
            error,
            Some(FieldError::MalformedAddressList { field: "Sender", .. })
        ));
    }

    #[test]
    fn test_resent_fields() {
        let h = headers(concat!(
            "Resent-From: Relay <relay@example.com>\r\n",
            "Resent-Sender: ops@example.com\r\n",
            "Resent-To: dave@example.com\r\n",
            "Resent-Cc: erin@example.com, frank@example.com\r\n",
            "Resent-Bcc: audit@example.com\r\n",
            "Resent-Message-ID: <resent-1@example.com>\r\n",
            "Resent-Date: Wed, 15 Nov 2023 10:00:00 +0100\r\n",
            "Message-ID: <orig@example.com>\r\n",
        ));

        let fields = HeaderFields::parse(&h).unwrap();
        assert_eq!(fields.resent_from, vec![Address::new("Relay", "relay@example.com")]);
        assert_eq!(fields.resent_sender, Some(Address::new("", "ops@example.com")));
        assert_eq!(fields.resent_to[0].address, "dave@example.com");
        assert_eq!(fields.resent_cc.len(), 2);
        assert_eq!(fields.resent_bcc[0].address, "audit@example.com");
        assert_eq!(fields.resent_message_id, "resent-1@example.com");
        assert_eq!(fields.message_id, "orig@example.com");
        assert_eq!(fields.resent_date.unwrap().day(), 15);
    }

    #[test]
    fn test_bad_resent_sender_stops_later_fields() {
        let h = headers(concat!(
            "Date: Tue, 14 Nov 2023 09:30:00 -0800\r\n",
            "Resent-From: relay@example.com\r\n",
            "Resent-Sender: a@example.com, b@example.com\r\n",
            "Resent-To: dave@example.com\r\n",
            "Resent-Message-ID: <resent-1@example.com>\r\n",
            "Message-ID: <orig@example.com>\r\n",
            "In-Reply-To: <parent@example.com>\r\n",
            "References: <root@example.com> <parent@example.com>\r\n",
            "Resent-Date: Wed, 15 Nov 2023 10:00:00 +0100\r\n",
        ));

        let (fields, error) = HeaderFields::decode(&h);
        assert!(matches!(
            error,
            Some(FieldError::MalformedAddressList { field: "Resent-Sender", .. })
        ));
        assert!(fields.date.is_some());
        assert_eq!(fields.resent_from.len(), 1);
        assert!(fields.resent_sender.is_none());
        assert!(fields.resent_to.is_empty());
        assert_eq!(fields.resent_message_id, "");
        assert_eq!(fields.message_id, "");
        assert!(fields.in_reply_to.is_empty());
        assert!(fields.references.is_empty());
        assert!(fields.resent_date.is_none());
    }

    #[test]
    fn test_resent_date_is_decoded_last() {
        let h = headers(concat!(
            "Resent-Message-ID: <resent-1@example.com>\r\n",
            "Message-ID: <orig@example.com>\r\n",
            "References: <root@example.com>\r\n",
            "Resent-Date: someday\r\n",
        ));

        let (fields, error) = HeaderFields::decode(&h);
        assert!(matches!(
            error,
            Some(FieldError::MalformedDate { field: "Resent-Date", .. })
        ));
        assert_eq!(fields.resent_message_id, "resent-1@example.com");
        assert_eq!(fields.message_id, "orig@example.com");
        assert_eq!(fields.references, vec!["root@example.com"]);
        assert!(fields.resent_date.is_none());
    }

    #[test]
    fn test_trim_message_id() {
        assert_eq!(trim_message_id(" <id@host> "), "id@host");
        assert_eq!(trim_message_id("id@host"), "id@host");
    }
}
