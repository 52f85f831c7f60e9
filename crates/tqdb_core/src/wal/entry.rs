//! WAL header and entry serialization.

use crate::error::{CoreResult, Error};
use crate::types::RecordId;
use std::io::{Read, Write};
use tqdb_codec::{crc32_finalize, crc32_update};

/// WAL file magic, `"TWAL"` when read as little-endian bytes.
pub const WAL_MAGIC: u32 = 0x4C41_5754;

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Size of the fixed WAL header in bytes.
pub const WAL_HEADER_SIZE: u64 = 16;

/// Byte offset of `entry_count` inside the WAL header.
pub(crate) const WAL_COUNT_OFFSET: u64 = 12;

/// Fixed bytes of one entry before its payload:
/// crc (4) + op (1) + type_index (1) + id (4) + data_len (4).
const ENTRY_FIXED_SIZE: usize = 14;

/// Sanity cap on a single entry's payload length.
const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Staged operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOp {
    /// A newly added record; payload is the serialized record.
    Add = 1,
    /// A replacement for an existing record; payload is the new value.
    Update = 2,
    /// A tombstone; no payload.
    Delete = 3,
}

impl WalOp {
    /// Converts a byte to an operation, `None` for unknown values.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Add),
            2 => Some(Self::Update),
            3 => Some(Self::Delete),
            _ => None,
        }
    }

    /// Converts the operation to its wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The fixed WAL header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    /// WAL format version.
    pub version: u16,
    /// Reserved flag bits.
    pub flags: u16,
    /// CRC of the main file at the time the WAL was (re)created.
    pub db_crc: u32,
    /// Number of entries in the log.
    pub entry_count: u32,
}

impl WalHeader {
    /// Reads and validates a header from the current position.
    ///
    /// Returns `None` when the bytes are missing, carry the wrong magic, or
    /// a version newer than this library supports.
    pub fn read_from(f: &mut impl Read) -> Option<Self> {
        let mut buf = [0u8; WAL_HEADER_SIZE as usize];
        f.read_exact(&mut buf).ok()?;

        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if magic != WAL_MAGIC || version > WAL_VERSION {
            return None;
        }
        Some(Self {
            version,
            flags: u16::from_le_bytes([buf[6], buf[7]]),
            db_crc: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            entry_count: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Writes the header at the current position.
    pub fn write_to(&self, f: &mut impl Write) -> std::io::Result<()> {
        f.write_all(&WAL_MAGIC.to_le_bytes())?;
        f.write_all(&self.version.to_le_bytes())?;
        f.write_all(&self.flags.to_le_bytes())?;
        f.write_all(&self.db_crc.to_le_bytes())?;
        f.write_all(&self.entry_count.to_le_bytes())
    }
}

/// One staged mutation in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// The staged operation.
    pub op: WalOp,
    /// Index of the record's type in registration order.
    pub type_index: u8,
    /// The record id.
    pub id: RecordId,
    /// Serialized record bytes; empty for deletes.
    pub payload: Vec<u8>,
}

impl WalEntry {
    /// CRC-32 over the entry's fields, excluding the CRC itself.
    #[must_use]
    pub fn entry_crc(&self) -> u32 {
        let mut crc = 0xFFFF_FFFF;
        crc = crc32_update(crc, &[self.op.as_byte(), self.type_index]);
        crc = crc32_update(crc, &self.id.as_u32().to_le_bytes());
        crc = crc32_update(crc, &(self.payload.len() as u32).to_le_bytes());
        crc = crc32_update(crc, &self.payload);
        crc32_finalize(crc)
    }

    /// Serializes the entry, CRC first.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENTRY_FIXED_SIZE + self.payload.len());
        buf.extend_from_slice(&self.entry_crc().to_le_bytes());
        buf.push(self.op.as_byte());
        buf.push(self.type_index);
        buf.extend_from_slice(&self.id.as_u32().to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Reads and validates one entry from the current position.
    ///
    /// Truncation and CRC mismatch both surface as errors; callers treat
    /// either as the end of the valid prefix of the log.
    pub fn read_from(f: &mut impl Read) -> CoreResult<Self> {
        let mut fixed = [0u8; ENTRY_FIXED_SIZE];
        f.read_exact(&mut fixed)?;

        let stored_crc = u32::from_le_bytes([fixed[0], fixed[1], fixed[2], fixed[3]]);
        let op = WalOp::from_byte(fixed[4])
            .ok_or_else(|| Error::corrupt(format!("unknown WAL op {}", fixed[4])))?;
        let type_index = fixed[5];
        let id = RecordId::new(u32::from_le_bytes([
            fixed[6], fixed[7], fixed[8], fixed[9],
        ]));
        let data_len =
            u32::from_le_bytes([fixed[10], fixed[11], fixed[12], fixed[13]]);
        if data_len > MAX_PAYLOAD_LEN {
            return Err(Error::corrupt(format!(
                "WAL payload length {data_len} exceeds cap"
            )));
        }

        let mut payload = vec![0u8; data_len as usize];
        f.read_exact(&mut payload)?;

        let entry = Self {
            op,
            type_index,
            id,
            payload,
        };
        let computed = entry.entry_crc();
        if computed != stored_crc {
            return Err(Error::corrupt(format!(
                "WAL entry CRC mismatch: stored {stored_crc:08x}, computed {computed:08x}"
            )));
        }
        Ok(entry)
    }

    /// Bytes this entry occupies on disk.
    #[must_use]
    pub fn disk_len(&self) -> u64 {
        (ENTRY_FIXED_SIZE + self.payload.len()) as u64
    }
}
