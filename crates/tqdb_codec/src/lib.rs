//! # TQDB Codec
//!
//! Buffered binary serialization primitives for TQDB files.
//!
//! This crate provides:
//! - [`Writer`] - buffered output with a running CRC-32 over every byte written
//! - [`Reader`] - buffered input with a running CRC-32 over every byte consumed
//!   (including bytes advanced over by [`Reader::skip`])
//! - [`crc32_update`] / [`crc32_finalize`] - the incremental CRC-32 used across
//!   all TQDB file structures
//!
//! All integers and floats are serialized as fixed-width little-endian values,
//! so files are portable across architectures. Strings are UTF-8 with a `u16`
//! length prefix, capped at [`MAX_STRING_LEN`] bytes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crc;
mod error;
mod reader;
mod writer;

pub use crc::{crc32_finalize, crc32_update};
pub use error::{CodecError, CodecResult};
pub use reader::Reader;
pub use writer::Writer;

/// Maximum length in bytes of a serialized string.
///
/// A length prefix above this value is treated as corruption on read and
/// rejected on write.
pub const MAX_STRING_LEN: usize = 4096;
