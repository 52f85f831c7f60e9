//! Error types for the codec crate.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug)]
pub enum CodecError {
    /// I/O error from the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source ended before the requested bytes were available.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A string length prefix exceeded the configured cap.
    #[error("string length {len} exceeds maximum of {max} bytes")]
    StringTooLong {
        /// The offending length.
        len: usize,
        /// The configured maximum.
        max: usize,
    },

    /// String bytes were not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
}
