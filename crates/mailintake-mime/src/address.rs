//! RFC 5322 address lists.
//!
//! The grammar itself is `mailparse::addrparse`. This module flattens
//! groups into the surrounding list, decodes RFC 2047 encoded words in
//! display names and rejects mailboxes without a local part or a domain.

use crate::rfc2047::decode_mime_sentence;
use mailparse::{MailAddr, SingleInfo, addrparse};
use std::fmt;

/// What the grammar rejected.
type ParseResult<T> = std::result::Result<T, String>;

/// A single mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Address {
    /// Decoded display name, empty when the mailbox has none.
    pub name: String,
    /// `local@domain`.
    pub address: String,
}

impl Address {
    /// Creates an address.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    fn from_mailbox(info: &SingleInfo) -> ParseResult<Self> {
        let address = info.addr.trim();
        check_addr_spec(address)?;
        let name = info
            .display_name
            .as_deref()
            .map(|name| decode_mime_sentence(name.trim()))
            .unwrap_or_default();
        Ok(Self::new(name, address))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.address)
        } else {
            write!(f, "\"{}\" <{}>", self.name.replace('"', "\\\""), self.address)
        }
    }
}

/// Parses an address list. Group members are flattened in order and a
/// blank value is an empty list.
///
/// # Errors
///
/// Returns a short description of the first grammar violation.
pub fn parse_address_list(value: &str) -> ParseResult<Vec<Address>> {
    let list = addrparse(value).map_err(|err| err.to_string())?;

    let mut addresses = Vec::new();
    for entry in list.iter() {
        match entry {
            MailAddr::Single(info) => addresses.push(Address::from_mailbox(info)?),
            MailAddr::Group(group) => {
                for info in &group.addrs {
                    addresses.push(Address::from_mailbox(info)?);
                }
            }
        }
    }
    Ok(addresses)
}

/// Parses exactly one mailbox, as required by `Sender`.
///
/// # Errors
///
/// Returns a short description of the grammar violation, including for
/// groups and lists of more than one mailbox.
pub fn parse_mailbox(value: &str) -> ParseResult<Address> {
    let list = addrparse(value).map_err(|err| err.to_string())?;
    match list.as_slice() {
        [MailAddr::Single(info)] => Address::from_mailbox(info),
        _ => Err("expected a single mailbox".to_string()),
    }
}

/// An addr-spec needs a local part and a domain around one `@`.
fn check_addr_spec(address: &str) -> ParseResult<()> {
    let Some((local, domain)) = address.rsplit_once('@') else {
        return Err(format!("missing @ in address {address:?}"));
    };
    if local.is_empty() {
        return Err(format!("empty local part in {address:?}"));
    }
    if domain.is_empty() {
        return Err(format!("missing domain in {address:?}"));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(format!("whitespace in address {address:?}"));
    }
    Ok(())
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
    fn test_bare_address() {
        let list = parse_address_list("john.doe@example.com").unwrap();
        assert_eq!(list, vec![Address::new("", "john.doe@example.com")]);
    }

    #[test]
    fn test_display_names() {
        let list =
            parse_address_list("John Q. Public <jqp@example.com>, \"Doe, Jane\" <jane@example.org>")
                .unwrap();
        assert_eq!(
            list,
            vec![
                Address::new("John Q. Public", "jqp@example.com"),
                Address::new("Doe, Jane", "jane@example.org"),
            ]
        );
    }

    #[test]
    fn test_angle_only() {
        let list = parse_address_list("<only@example.com>").unwrap();
        assert_eq!(list, vec![Address::new("", "only@example.com")]);
    }

    #[test]
    fn test_encoded_display_name() {
        let list = parse_address_list("=?utf-8?B?0JjQstCw0L0=?= <ivan@example.ru>").unwrap();
        assert_eq!(list[0].name, "Иван");
        assert_eq!(list[0].address, "ivan@example.ru");
    }

    #[test]
    fn test_group_flattened() {
        let list = parse_address_list("Team: a@example.com, Bee <b@example.com>;").unwrap();
        let addresses: Vec<_> = list.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(addresses, vec!["a@example.com", "b@example.com"]);
        assert_eq!(list[1].name, "Bee");
    }

    #[test]
    fn test_empty_group() {
        assert!(parse_address_list("undisclosed-recipients:;").unwrap().is_empty());
    }

    #[test]
    fn test_blank() {
        assert!(parse_address_list("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed() {
        assert!(parse_address_list("not an address").is_err());
        assert!(parse_address_list("Alice <alice@example.com>, nobody").is_err());
    }

    #[test]
    fn test_addr_spec_checks() {
        assert!(check_addr_spec("a@example.com").is_ok());
        assert!(check_addr_spec("example.com").unwrap_err().contains("missing @"));
        assert!(check_addr_spec("@example.com").unwrap_err().contains("empty local part"));
        assert!(check_addr_spec("a@").unwrap_err().contains("missing domain"));
        assert!(check_addr_spec("a b@example.com").unwrap_err().contains("whitespace"));
    }

    #[test]
    fn test_single_mailbox() {
        assert_eq!(
            parse_mailbox("Sec <sec@example.com>").unwrap(),
            Address::new("Sec", "sec@example.com")
        );
        assert_eq!(
            parse_mailbox("a@example.com, b@example.com").unwrap_err(),
            "expected a single mailbox"
        );
        assert!(parse_mailbox("Team: a@example.com;").is_err());
        assert!(parse_mailbox("").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::new("", "a@b").to_string(), "<a@b>");
        assert_eq!(Address::new("A \"B\"", "a@b").to_string(), "\"A \\\"B\\\"\" <a@b>");
    }
}
