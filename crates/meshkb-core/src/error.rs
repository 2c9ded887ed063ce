//! Error types shared across the workspace.
//!
//! Malformed input is always fatal to the single message it arrived in and
//! never to the process; policy rejections (trust, domain, deadline,
//! bandwidth) are represented as receive statuses in `meshkb-transport`,
//! not as errors.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Errors that can occur while encoding, decoding, or sending messages.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A message or header could not be decoded.
    #[error("decoding error: {0}")]
    DecodingError(#[from] DecodingErrorKind),
    /// Wrapper around a std io error.
    #[error("an IO error occurred: {0}")]
    IoError(#[from] std::io::Error),
    /// The transport has been told to shut down.
    #[error("transport is shutting down")]
    ShuttingDown,
    /// The operation is not valid for this transport or message form.
    #[error("invalid transport operation")]
    InvalidTransport,
    /// The send buffer could not hold the encoded message.
    #[error("unable to allocate send buffer of {0} bytes")]
    AllocationFailure(usize),
}

/// Fine-grained decoding failures, fatal to the message they occur in.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodingErrorKind {
    /// The buffer ended before the field being read.
    #[error("buffer truncated")]
    Truncated,
    /// The 8-byte identifier matched no known header variant.
    #[error("unknown message identifier")]
    UnknownIdentifier,
    /// A record's declared length exceeds the remaining buffer.
    #[error("record length overruns remaining buffer")]
    LengthOverrun,
    /// A value carried an unrecognized type tag.
    #[error("unknown value type tag")]
    UnknownValueType,
    /// A key, domain, or originator field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidString,
    /// The message type field held an unrecognized value.
    #[error("unknown message type")]
    UnknownMessageType,
}
