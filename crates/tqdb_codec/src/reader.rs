//! Buffered binary reader with a running CRC.

use crate::crc::{crc32_finalize, crc32_update, CRC32_INIT};
use crate::error::{CodecError, CodecResult};
use crate::MAX_STRING_LEN;
use std::io::Read;

/// A buffered reader that deserializes TQDB primitives.
///
/// Every byte consumed - including bytes advanced over by [`Reader::skip`] -
/// is folded into a running CRC-32, so a skip-based traversal produces the
/// same checksum as a full read. The buffer is caller-owned (a slice of the
/// database's scratch buffer).
pub struct Reader<'a> {
    src: &'a mut dyn Read,
    buf: &'a mut [u8],
    filled: usize,
    pos: usize,
    crc: u32,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `src` using `buf` for batching.
    pub fn new(src: &'a mut dyn Read, buf: &'a mut [u8]) -> Self {
        Self {
            src,
            buf,
            filled: 0,
            pos: 0,
            crc: CRC32_INIT,
        }
    }

    /// Returns the finalized CRC-32 over everything consumed so far.
    #[must_use]
    pub fn crc(&self) -> u32 {
        crc32_finalize(self.crc)
    }

    fn refill(&mut self) -> CodecResult<()> {
        self.filled = self.src.read(self.buf)?;
        self.pos = 0;
        if self.filled == 0 {
            return Err(CodecError::UnexpectedEof);
        }
        Ok(())
    }

    /// Reads exactly `out.len()` bytes.
    pub fn read_raw(&mut self, out: &mut [u8]) -> CodecResult<()> {
        let mut written = 0;
        while written < out.len() {
            let avail = self.filled - self.pos;
            if avail > 0 {
                let take = (out.len() - written).min(avail);
                out[written..written + take]
                    .copy_from_slice(&self.buf[self.pos..self.pos + take]);
                self.pos += take;
                written += take;
            } else {
                self.refill()?;
            }
        }
        self.crc = crc32_update(self.crc, out);
        Ok(())
    }

    /// Advances past `len` bytes without materializing them.
    pub fn skip(&mut self, mut len: usize) -> CodecResult<()> {
        while len > 0 {
            let avail = self.filled - self.pos;
            if avail > 0 {
                let take = len.min(avail);
                self.crc =
                    crc32_update(self.crc, &self.buf[self.pos..self.pos + take]);
                self.pos += take;
                len -= take;
            } else {
                self.refill()?;
            }
        }
        Ok(())
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        let mut b = [0u8; 1];
        self.read_raw(&mut b)?;
        Ok(b[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let mut b = [0u8; 2];
        self.read_raw(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let mut b = [0u8; 4];
        self.read_raw(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        let mut b = [0u8; 4];
        self.read_raw(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        let mut b = [0u8; 8];
        self.read_raw(&mut b)?;
        Ok(i64::from_le_bytes(b))
    }

    /// Reads a little-endian `f32`.
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        let mut b = [0u8; 4];
        self.read_raw(&mut b)?;
        Ok(f32::from_le_bytes(b))
    }

    /// Reads a little-endian `f64`.
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        let mut b = [0u8; 8];
        self.read_raw(&mut b)?;
        Ok(f64::from_le_bytes(b))
    }

    /// Reads a `bool` encoded as a single byte.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a `u16`-length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::StringTooLong`] if the length prefix exceeds
    /// [`MAX_STRING_LEN`], or [`CodecError::InvalidUtf8`] if the bytes are
    /// not valid UTF-8.
    pub fn read_str(&mut self) -> CodecResult<String> {
        let len = usize::from(self.read_u16()?);
        if len > MAX_STRING_LEN {
            return Err(CodecError::StringTooLong {
                len,
                max: MAX_STRING_LEN,
            });
        }
        let mut bytes = vec![0u8; len];
        self.read_raw(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Advances past one length-prefixed string without materializing it.
    pub fn skip_str(&mut self) -> CodecResult<()> {
        let len = usize::from(self.read_u16()?);
        if len > MAX_STRING_LEN {
            return Err(CodecError::StringTooLong {
                len,
                max: MAX_STRING_LEN,
            });
        }
        self.skip(len)
    }
}
