//! Write-ahead log.
//!
//! When enabled, mutations append one entry per logical operation here
//! instead of invoking the rewrite engine, and reads layer the log over the
//! main file. Crossing a threshold (entry count or file size) triggers a
//! checkpoint that folds the staged entries into the main file and resets
//! the log to a fresh header.
//!
//! ## Recovery policy
//!
//! - Missing or header-corrupt log on open: discarded and recreated; the
//!   main file alone is authoritative.
//! - Valid header with pending entries: replay is deferred until record
//!   types are registered (`recovery_pending`), because decoding payloads
//!   needs the registered codecs. The first CRUD call after registration
//!   checkpoints the log.
//! - Per-entry CRC mismatch or truncated tail during any scan: the log's
//!   valid prefix ends at the last good entry; the tail is truncated by the
//!   next append.

mod entry;

pub use entry::{WalEntry, WalHeader, WalOp, WAL_HEADER_SIZE, WAL_MAGIC, WAL_VERSION};

use crate::error::CoreResult;
use crate::format::compute_whole_file_crc;
use crate::types::RecordId;
use entry::WAL_COUNT_OFFSET;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::warn;

/// Snapshot of the WAL's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalStats {
    /// Number of valid entries in the log.
    pub entries: u32,
    /// Current log file size in bytes.
    pub file_size: u64,
}

/// In-memory state of the write-ahead log.
pub(crate) struct Wal {
    path: PathBuf,
    main_path: PathBuf,
    entry_count: u32,
    /// Length of the valid prefix; bytes beyond it are a corrupt tail.
    file_size: u64,
    db_crc: u32,
    max_entries: usize,
    max_size: u64,
    recovery_pending: bool,
}

/// Result of resolving one (type, id) against the log.
pub(crate) enum WalFind {
    /// No entry for the key.
    Absent,
    /// The newest entry is a tombstone.
    Deleted,
    /// The newest entry carries a value.
    Present {
        op: WalOp,
        payload: Vec<u8>,
    },
}

impl Wal {
    /// Opens (or creates) the log and loads its metadata.
    ///
    /// Entry payloads are not parsed here; if the header reports pending
    /// entries, `recovery_pending` is set and the caller checkpoints once
    /// types are registered.
    pub fn open(
        path: PathBuf,
        main_path: PathBuf,
        max_entries: usize,
        max_size: u64,
    ) -> CoreResult<Self> {
        let mut wal = Self {
            path,
            main_path,
            entry_count: 0,
            file_size: WAL_HEADER_SIZE,
            db_crc: 0,
            max_entries,
            max_size,
            recovery_pending: false,
        };

        match File::open(&wal.path) {
            Err(_) => wal.recreate()?,
            Ok(mut f) => match WalHeader::read_from(&mut f) {
                Some(hdr) => {
                    wal.entry_count = hdr.entry_count;
                    wal.file_size = f.metadata()?.len();
                    wal.db_crc = hdr.db_crc;
                    if hdr.entry_count > 0 {
                        wal.recovery_pending = true;
                    }
                }
                None => {
                    warn!(path = %wal.path.display(), "discarding WAL with invalid header");
                    drop(f);
                    let _ = fs::remove_file(&wal.path);
                    wal.recreate()?;
                }
            },
        }
        Ok(wal)
    }

    /// Number of valid entries currently staged.
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Whether deferred replay is still owed.
    pub fn recovery_pending(&self) -> bool {
        self.recovery_pending
    }

    /// Marks deferred replay as handled.
    pub fn clear_recovery_pending(&mut self) {
        self.recovery_pending = false;
    }

    pub fn stats(&self) -> WalStats {
        WalStats {
            entries: self.entry_count,
            file_size: self.file_size,
        }
    }

    /// True once an append threshold has been crossed.
    pub fn should_checkpoint(&self) -> bool {
        (self.max_entries > 0 && self.entry_count as usize >= self.max_entries)
            || (self.max_size > 0 && self.file_size >= self.max_size)
    }

    /// Rewrites the log as empty, witnessing the current main-file CRC.
    pub fn reset(&mut self) -> CoreResult<()> {
        self.recreate()
    }

    fn recreate(&mut self) -> CoreResult<()> {
        self.db_crc = compute_whole_file_crc(&self.main_path);
        let mut f = File::create(&self.path)?;
        WalHeader {
            version: WAL_VERSION,
            flags: 0,
            db_crc: self.db_crc,
            entry_count: 0,
        }
        .write_to(&mut f)?;
        f.flush()?;
        self.entry_count = 0;
        self.file_size = WAL_HEADER_SIZE;
        Ok(())
    }

    /// Appends one entry and persists the new entry count.
    ///
    /// Any corrupt tail left behind by an earlier scan is truncated first.
    /// A partial write is undone by truncating back to the previous end, so
    /// the log never retains a half-entry.
    pub fn append(&mut self, entry: &WalEntry) -> CoreResult<()> {
        let mut f = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(f) => f,
            Err(_) => {
                self.recreate()?;
                OpenOptions::new().read(true).write(true).open(&self.path)?
            }
        };

        let disk_len = f.metadata()?.len();
        if disk_len > self.file_size {
            f.set_len(self.file_size)?;
        }

        let entry_start = self.file_size;
        f.seek(SeekFrom::Start(entry_start))?;

        let bytes = entry.encode();
        if let Err(e) = f.write_all(&bytes) {
            let _ = f.set_len(entry_start);
            return Err(e.into());
        }

        self.entry_count += 1;
        self.file_size = entry_start + bytes.len() as u64;

        f.seek(SeekFrom::Start(WAL_COUNT_OFFSET))?;
        f.write_all(&self.entry_count.to_le_bytes())?;
        f.flush()?;
        Ok(())
    }

    /// Walks the valid prefix of the log, oldest entry first.
    ///
    /// The first truncated or CRC-invalid entry ends the walk; the log's
    /// in-memory state shrinks to the valid prefix so the next append
    /// truncates the dead tail.
    pub fn scan(&mut self, mut visit: impl FnMut(WalEntry)) -> CoreResult<()> {
        if self.entry_count == 0 {
            return Ok(());
        }
        let Ok(f) = File::open(&self.path) else {
            self.entry_count = 0;
            self.file_size = WAL_HEADER_SIZE;
            return Ok(());
        };

        let mut reader = BufReader::new(f);
        reader.seek(SeekFrom::Start(WAL_HEADER_SIZE))?;

        let mut valid_entries = 0u32;
        let mut valid_size = WAL_HEADER_SIZE;
        for _ in 0..self.entry_count {
            match WalEntry::read_from(&mut reader) {
                Ok(entry) => {
                    valid_entries += 1;
                    valid_size += entry.disk_len();
                    visit(entry);
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        valid_entries,
                        error = %e,
                        "WAL tail is corrupt; keeping valid prefix"
                    );
                    self.entry_count = valid_entries;
                    self.file_size = valid_size;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Resolves a key against the log; the newest matching entry wins.
    pub fn find(&mut self, type_index: u8, id: RecordId) -> CoreResult<WalFind> {
        let mut newest: Option<WalEntry> = None;
        self.scan(|entry| {
            if entry.type_index == type_index && entry.id == id {
                newest = Some(entry);
            }
        })?;

        Ok(match newest {
            None => WalFind::Absent,
            Some(e) if e.op == WalOp::Delete => WalFind::Deleted,
            Some(e) => WalFind::Present {
                op: e.op,
                payload: e.payload,
            },
        })
    }

    /// Collects the log's entries for one type, deduplicated by id.
    ///
    /// Slots keep the position of the id's first appearance (so WAL-only
    /// additions iterate in insertion order) while carrying the newest op
    /// and payload.
    pub fn load_for_type(
        &mut self,
        type_index: u8,
    ) -> CoreResult<Vec<(RecordId, WalOp, Vec<u8>)>> {
        let mut slots: Vec<(RecordId, WalOp, Vec<u8>)> = Vec::new();
        self.scan(|entry| {
            if entry.type_index != type_index {
                return;
            }
            match slots.iter_mut().find(|(id, _, _)| *id == entry.id) {
                Some(slot) => {
                    slot.1 = entry.op;
                    slot.2 = entry.payload;
                }
                None => slots.push((entry.id, entry.op, entry.payload)),
            }
        })?;
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_wal(dir: &tempfile::TempDir) -> Wal {
        Wal::open(
            dir.path().join("t.wal"),
            dir.path().join("t.tqdb"),
            100,
            64 * 1024,
        )
        .unwrap()
    }

    fn entry(op: WalOp, id: u32, payload: &[u8]) -> WalEntry {
        WalEntry {
            op,
            type_index: 0,
            id: RecordId::new(id),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn fresh_wal_has_header_only() {
        let dir = tempdir().unwrap();
        let wal = open_wal(&dir);
        assert_eq!(wal.entry_count(), 0);
        assert_eq!(wal.stats().file_size, WAL_HEADER_SIZE);
        assert!(!wal.recovery_pending());
    }

    #[test]
    fn append_then_find() {
        let dir = tempdir().unwrap();
        let mut wal = open_wal(&dir);
        wal.append(&entry(WalOp::Add, 1, b"one")).unwrap();
        wal.append(&entry(WalOp::Update, 1, b"two")).unwrap();
        wal.append(&entry(WalOp::Add, 2, b"three")).unwrap();

        match wal.find(0, RecordId::new(1)).unwrap() {
            WalFind::Present { op, payload } => {
                assert_eq!(op, WalOp::Update);
                assert_eq!(payload, b"two");
            }
            _ => panic!("expected newest entry"),
        }
        assert!(matches!(
            wal.find(0, RecordId::new(3)).unwrap(),
            WalFind::Absent
        ));
    }

    #[test]
    fn delete_shadows_earlier_add() {
        let dir = tempdir().unwrap();
        let mut wal = open_wal(&dir);
        wal.append(&entry(WalOp::Add, 1, b"v")).unwrap();
        wal.append(&entry(WalOp::Delete, 1, b"")).unwrap();
        assert!(matches!(
            wal.find(0, RecordId::new(1)).unwrap(),
            WalFind::Deleted
        ));
    }

    #[test]
    fn reopen_sets_recovery_pending() {
        let dir = tempdir().unwrap();
        {
            let mut wal = open_wal(&dir);
            wal.append(&entry(WalOp::Add, 1, b"v")).unwrap();
        }
        let wal = open_wal(&dir);
        assert_eq!(wal.entry_count(), 1);
        assert!(wal.recovery_pending());
    }

    #[test]
    fn invalid_header_recreates_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wal");
        fs::write(&path, b"not a wal header at all").unwrap();

        let wal = Wal::open(path, dir.path().join("t.tqdb"), 100, 64 * 1024).unwrap();
        assert_eq!(wal.entry_count(), 0);
        assert!(!wal.recovery_pending());
    }

    #[test]
    fn corrupt_tail_is_dropped_and_truncated_on_append() {
        let dir = tempdir().unwrap();
        let mut wal = open_wal(&dir);
        wal.append(&entry(WalOp::Add, 1, b"good")).unwrap();
        let good_size = wal.stats().file_size;
        wal.append(&entry(WalOp::Add, 2, b"bad")).unwrap();

        // Flip a byte inside the second entry's payload.
        let path = dir.path().join("t.wal");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        // Scan stops at the corrupt entry and shrinks the valid prefix.
        assert!(matches!(
            wal.find(0, RecordId::new(2)).unwrap(),
            WalFind::Absent
        ));
        assert_eq!(wal.entry_count(), 1);

        // The next append overwrites the dead tail.
        wal.append(&entry(WalOp::Add, 3, b"after")).unwrap();
        assert_eq!(wal.entry_count(), 2);
        assert!(matches!(
            wal.find(0, RecordId::new(3)).unwrap(),
            WalFind::Present { .. }
        ));
        assert!(wal.stats().file_size > good_size);
    }

    #[test]
    fn threshold_by_entries() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(
            dir.path().join("t.wal"),
            dir.path().join("t.tqdb"),
            2,
            0,
        )
        .unwrap();
        wal.append(&entry(WalOp::Add, 1, b"")).unwrap();
        assert!(!wal.should_checkpoint());
        wal.append(&entry(WalOp::Add, 2, b"")).unwrap();
        assert!(wal.should_checkpoint());
    }

    #[test]
    fn threshold_by_size() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(
            dir.path().join("t.wal"),
            dir.path().join("t.tqdb"),
            0,
            64,
        )
        .unwrap();
        wal.append(&entry(WalOp::Add, 1, &[0u8; 64])).unwrap();
        assert!(wal.should_checkpoint());
    }

    #[test]
    fn reset_clears_entries() {
        let dir = tempdir().unwrap();
        let mut wal = open_wal(&dir);
        wal.append(&entry(WalOp::Add, 1, b"v")).unwrap();
        wal.reset().unwrap();
        assert_eq!(wal.entry_count(), 0);
        assert_eq!(wal.stats().file_size, WAL_HEADER_SIZE);
        assert!(matches!(
            wal.find(0, RecordId::new(1)).unwrap(),
            WalFind::Absent
        ));
    }

    #[test]
    fn load_for_type_dedups_keeping_first_position() {
        let dir = tempdir().unwrap();
        let mut wal = open_wal(&dir);
        wal.append(&entry(WalOp::Add, 1, b"a1")).unwrap();
        wal.append(&entry(WalOp::Add, 2, b"b1")).unwrap();
        wal.append(&entry(WalOp::Update, 1, b"a2")).unwrap();
        wal.append(&WalEntry {
            op: WalOp::Add,
            type_index: 1,
            id: RecordId::new(9),
            payload: b"other type".to_vec(),
        })
        .unwrap();

        let slots = wal.load_for_type(0).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].0, RecordId::new(1));
        assert_eq!(slots[0].1, WalOp::Update);
        assert_eq!(slots[0].2, b"a2");
        assert_eq!(slots[1].0, RecordId::new(2));
    }
}
