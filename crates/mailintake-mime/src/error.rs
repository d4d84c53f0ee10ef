//! Error types for MIME decoding.

use crate::fields::HeaderFields;
use crate::multipart::PartContext;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME decoding errors.
///
/// Every variant aborts the parse that produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unparsable Content-Type value (carries the raw value).
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// A multipart leaf matched no classification allowed in its context.
    #[error("Unsupported {context} inner media type: {media_type}")]
    UnsupportedPartType {
        /// Media type of the offending part.
        media_type: String,
        /// Enclosing multipart kind.
        context: PartContext,
    },

    /// Unrecognized Content-Transfer-Encoding value.
    #[error("Unknown transfer encoding: {0}")]
    UnknownTransferEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Invalid header line.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Missing boundary in multipart message.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// Invalid multipart structure.
    #[error("Invalid multipart structure: {0}")]
    InvalidMultipart(String),

    /// Multipart nesting exceeded the configured depth.
    #[error("Multipart nesting deeper than {depth} levels")]
    NestingTooDeep {
        /// Configured maximum depth.
        depth: usize,
    },

    /// A typed header field failed to parse.
    ///
    /// `partial` holds every field decoded before the failure; later fields
    /// are left at their zero value.
    #[error("{source}")]
    Header {
        /// The first field error encountered.
        source: FieldError,
        /// Fields populated up to the failure.
        partial: Box<HeaderFields>,
    },

    /// I/O error while reading the message.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed header field errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// Address list that does not match the RFC 5322 grammar.
    #[error("Malformed address list in {field}: {reason} ({value:?})")]
    MalformedAddressList {
        /// Header name.
        field: &'static str,
        /// Raw header value.
        value: String,
        /// What the grammar rejected.
        reason: String,
    },

    /// Date that matches none of the accepted formats.
    #[error("Malformed date in {field}: {value:?}")]
    MalformedDate {
        /// Header name.
        field: &'static str,
        /// Raw header value.
        value: String,
    },
}

impl Error {
    /// Returns the header field error, if this is one.
    #[must_use]
    pub const fn field_error(&self) -> Option<&FieldError> {
        match self {
            Self::Header { source, .. } => Some(source),
            _ => None,
        }
    }
}
