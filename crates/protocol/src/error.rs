//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering request framing and body decoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Content-Type errors
    /// The request did not declare a multipart content type.
    #[error("not a multipart content type: {0}")]
    NotMultipart(String),

    /// The multipart content type carries no usable boundary parameter.
    #[error("multipart boundary is missing")]
    MissingBoundary,

    /// The declared boundary is longer than allowed.
    #[error("multipart boundary too long: {len} bytes exceeds maximum of {max} bytes")]
    BoundaryTooLong {
        /// Actual boundary length.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    // Body framing errors
    /// A part header block grew past the allowed size without terminating.
    #[error("part header block too large: {size} bytes exceeds maximum of {max} bytes")]
    HeaderTooLarge {
        /// Buffered header size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The body violates multipart framing.
    #[error("malformed multipart body: {0}")]
    Malformed(String),

    /// The body ended before the closing delimiter was seen.
    #[error("multipart body ended before the closing delimiter")]
    UnexpectedEof,
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
