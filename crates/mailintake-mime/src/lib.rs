//! # mailintake-mime
//!
//! MIME decoding for received email.
//!
//! Takes one complete RFC 5322 message, as handed over by a mail transport
//! once the DATA phase is finished, and produces an [`Email`]: decoded
//! headers, typed header fields, text and HTML bodies, attachments and
//! embedded files.
//!
//! ## Features
//!
//! - **Headers**: RFC 2047 encoded words, including whole-value KOI8-R
//!   headers from non-conforming producers
//! - **Typed fields**: address lists, dates and message ids
//! - **Bodies**: Base64 and Quoted-Printable, with windows-1252,
//!   iso-8859-1, koi8-r and windows-1251 transcoded to UTF-8
//! - **Multipart**: mixed, alternative and related, nested
//!
//! ## Quick Start
//!
//! ```
//! use mailintake_mime::parse_email;
//!
//! let raw = b"Subject: =?utf-8?B?0J/RgNC40LLQtdGC?=\r\n\
//!             Content-Type: text/plain; charset=koi8-r\r\n\
//!             \r\n\
//!             \xf0\xd2\xc9\xd7\xc5\xd4\r\n";
//!
//! let email = parse_email(raw)?;
//! assert_eq!(email.subject(), "Привет");
//! assert_eq!(email.text_body, "Привет");
//! # Ok::<(), mailintake_mime::Error>(())
//! ```
//!
//! ### Configuration
//!
//! ```
//! use mailintake_mime::{Parser, ParserConfig, SequentialIds};
//!
//! let parser = Parser::with_config(
//!     ParserConfig::builder()
//!         .max_depth(8)
//!         .ids(SequentialIds::starting_at(1))
//!         .build(),
//! );
//! # let _ = parser;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod charset;
mod config;
mod content_type;
mod date;
mod error;
mod fields;
mod header;
mod message;

pub mod encoding;
pub mod multipart;
pub mod rfc2047;

pub use address::{Address, parse_address_list, parse_mailbox};
pub use charset::{Charset, transcode};
pub use config::{
    ClockIds, DEFAULT_MAX_DEPTH, IdSource, ParserConfig, ParserConfigBuilder, SequentialIds,
};
pub use content_type::{ContentType, sanitize as sanitize_content_type};
pub use date::parse_date;
pub use encoding::TransferEncoding;
pub use error::{Error, FieldError, Result};
pub use fields::HeaderFields;
pub use header::Headers;
pub use message::{Attachment, Email, EmbeddedFile, Parser, parse_email};
pub use multipart::PartContext;
pub use rfc2047::decode_mime_sentence;
