//! Error types for the core crate.

use std::io;
use thiserror::Error;
use tqdb_codec::CodecError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, Error>;

/// Errors that can occur in database operations.
///
/// A failed mutation leaves the database logically unchanged: the rewrite
/// engine's atomic swap keeps the previous file authoritative, and a failed
/// WAL append truncates back to the prior end of the log.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument was invalid (zero id, empty path, closed handle).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },

    /// The requested record (or query field) does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// The record type is already registered.
    #[error("already exists: {message}")]
    Exists {
        /// Description of the conflict.
        message: String,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed data encountered while decoding a record.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The database file is structurally corrupt.
    #[error("corrupt database: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// A fixed capacity was exhausted (type table, query conditions).
    #[error("capacity exhausted: {message}")]
    Full {
        /// Description of the exhausted capacity.
        message: String,
    },

    /// The instance lock could not be acquired within the timeout.
    #[error("lock acquisition timed out")]
    Timeout,

    /// The record type has not been registered on this instance.
    #[error("record type not registered: {type_name}")]
    NotRegistered {
        /// Name of the unregistered type.
        type_name: String,
    },
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn exists(message: impl Into<String>) -> Self {
        Self::Exists {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates a capacity-exhausted error.
    pub fn full(message: impl Into<String>) -> Self {
        Self::Full {
            message: message.into(),
        }
    }

    /// Creates a not-registered error.
    pub fn not_registered(type_name: impl Into<String>) -> Self {
        Self::NotRegistered {
            type_name: type_name.into(),
        }
    }

    /// Returns true if this error means "record not found".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
