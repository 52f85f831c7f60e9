//! Main-file format: header layout, counts vector, on-open recovery.
//!
//! ## Layout
//!
//! ```text
//! | magic (4) | version (2) | flags (2) | crc (4) | reserved (4) |
//! | count[0] (4) | ... | count[N-1] (4) |
//! | records of type 0 | records of type 1 | ... |
//! ```
//!
//! All fields little-endian. `N` is the number of registered types, in
//! registration order. The header CRC covers every byte after the header.

use crate::error::CoreResult;
use crate::record::TypeTable;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tqdb_codec::{crc32_finalize, crc32_update};

/// Main file magic, `"TQDB"` when read as little-endian bytes.
pub const MAGIC: u32 = 0x4244_5154;

/// Current main file format version.
pub const VERSION: u16 = 1;

/// Size of the fixed main-file header in bytes.
pub const HEADER_SIZE: u64 = 16;

/// Byte offset of the integrity CRC inside the header.
pub const HEADER_CRC_OFFSET: u64 = 8;

/// The fixed main-file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainHeader {
    /// Format version.
    pub version: u16,
    /// Reserved flag bits.
    pub flags: u16,
    /// CRC-32 over everything after the header.
    pub crc: u32,
    /// Reserved.
    pub reserved: u32,
}

impl MainHeader {
    /// Reads and validates a header from the current position.
    ///
    /// Returns `None` when the bytes are missing, carry the wrong magic, or
    /// a version newer than this library supports.
    pub fn read_from(f: &mut impl Read) -> Option<Self> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        f.read_exact(&mut buf).ok()?;

        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if magic != MAGIC || version > VERSION {
            return None;
        }
        Some(Self {
            version,
            flags: u16::from_le_bytes([buf[6], buf[7]]),
            crc: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            reserved: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Writes the header at the current position.
    pub fn write_to(&self, f: &mut impl Write) -> std::io::Result<()> {
        f.write_all(&MAGIC.to_le_bytes())?;
        f.write_all(&self.version.to_le_bytes())?;
        f.write_all(&self.flags.to_le_bytes())?;
        f.write_all(&self.crc.to_le_bytes())?;
        f.write_all(&self.reserved.to_le_bytes())
    }
}

/// The sidecar paths a database instance operates on.
#[derive(Debug, Clone)]
pub(crate) struct DbPaths {
    pub db: PathBuf,
    pub tmp: PathBuf,
    pub bak: PathBuf,
}

/// Opens the main file for reading, applying the recovery ladder.
///
/// If the primary file is missing, an interrupted rewrite is recovered by
/// promoting `.tmp` (the rewrite finished but the final rename did not),
/// then `.bak` (an interrupted rollback). When the primary is present, any
/// stale `.tmp` is removed. A header with the wrong magic or an unsupported
/// version makes the file count as absent.
///
/// On success the file is positioned immediately after the header.
pub(crate) fn open_main_for_read(paths: &DbPaths) -> CoreResult<Option<File>> {
    let mut file = match File::open(&paths.db) {
        Ok(f) => {
            let _ = fs::remove_file(&paths.tmp);
            Some(f)
        }
        Err(_) => {
            if paths.tmp.exists() && fs::rename(&paths.tmp, &paths.db).is_ok() {
                tracing::debug!(path = %paths.db.display(), "recovered main file from .tmp");
                File::open(&paths.db).ok()
            } else if paths.bak.exists() && fs::rename(&paths.bak, &paths.db).is_ok() {
                tracing::debug!(path = %paths.db.display(), "recovered main file from .bak");
                File::open(&paths.db).ok()
            } else {
                None
            }
        }
    };

    if let Some(f) = file.as_mut() {
        if MainHeader::read_from(f).is_none() {
            return Ok(None);
        }
    }
    Ok(file)
}

/// Reads the per-type counts vector from a file positioned after the header.
///
/// A short read leaves the remaining counts at zero; a count above the
/// type's sanity cap is treated as zero (the file belongs to a foreign
/// schema).
pub(crate) fn read_counts(f: &mut File, types: &TypeTable) -> Vec<u32> {
    let mut counts = vec![0u32; types.len()];
    for (i, slot) in counts.iter_mut().enumerate() {
        let mut buf = [0u8; 4];
        if f.read_exact(&mut buf).is_err() {
            break;
        }
        let c = u32::from_le_bytes(buf);
        if c <= types.entry(i).max_count {
            *slot = c;
        }
    }
    counts
}

/// Computes the CRC-32 over everything after the header.
///
/// This is the value the header's CRC field must carry. The file position
/// is left at end-of-file.
pub fn compute_body_crc(f: &mut File) -> std::io::Result<u32> {
    f.seek(SeekFrom::Start(HEADER_SIZE))?;
    let mut crc = 0xFFFF_FFFF;
    let mut buf = [0u8; 256];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        crc = crc32_update(crc, &buf[..n]);
    }
    Ok(crc32_finalize(crc))
}

/// Computes the CRC-32 over an entire file, 0 if the file is missing.
///
/// Used to witness the main file's state in the WAL header.
pub(crate) fn compute_whole_file_crc(path: &std::path::Path) -> u32 {
    let Ok(mut f) = File::open(path) else {
        return 0;
    };
    let mut crc = 0xFFFF_FFFF;
    let mut buf = [0u8; 256];
    loop {
        match f.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => crc = crc32_update(crc, &buf[..n]),
        }
    }
    crc32_finalize(crc)
}
