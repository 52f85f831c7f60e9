//! Database configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default scratch buffer size in bytes.
pub const DEFAULT_SCRATCH_SIZE: usize = 8192;

/// Smallest scratch buffer the database will operate with.
pub const MIN_SCRATCH_SIZE: usize = 256;

/// Default WAL auto-checkpoint threshold in entries.
pub const DEFAULT_WAL_MAX_ENTRIES: usize = 100;

/// Default WAL auto-checkpoint threshold in bytes.
pub const DEFAULT_WAL_MAX_SIZE: u64 = 64 * 1024;

/// Default read-cache capacity in records.
pub const DEFAULT_CACHE_SIZE: usize = 16;

/// Default lock acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for opening a database.
///
/// Only the database path is required; every other field has a default.
/// Sidecar paths (`.tmp`, `.bak`, `.wal`) are derived from the database path
/// unless overridden.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the main database file.
    pub db_path: PathBuf,

    /// Temp file used by the rewrite engine (default: `db_path` + ".tmp").
    pub tmp_path: Option<PathBuf>,

    /// Backup file used by the atomic swap (default: `db_path` + ".bak").
    pub bak_path: Option<PathBuf>,

    /// Scratch buffer size; split in half between the read and write sides
    /// during a rewrite.
    pub scratch_size: usize,

    /// Whether mutations are staged in a write-ahead log.
    pub enable_wal: bool,

    /// WAL file path (default: `db_path` + ".wal").
    pub wal_path: Option<PathBuf>,

    /// Auto-checkpoint after this many WAL entries.
    pub wal_max_entries: usize,

    /// Auto-checkpoint once the WAL file reaches this size.
    pub wal_max_size: u64,

    /// Whether to keep an in-memory read cache.
    pub enable_cache: bool,

    /// Maximum number of cached records.
    pub cache_size: usize,

    /// How long an operation waits for the instance lock before returning
    /// a timeout error.
    pub lock_timeout: Duration,
}

impl Config {
    /// Creates a configuration for the given database path with defaults.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            tmp_path: None,
            bak_path: None,
            scratch_size: DEFAULT_SCRATCH_SIZE,
            enable_wal: true,
            wal_path: None,
            wal_max_entries: DEFAULT_WAL_MAX_ENTRIES,
            wal_max_size: DEFAULT_WAL_MAX_SIZE,
            enable_cache: false,
            cache_size: DEFAULT_CACHE_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets the temp file path.
    #[must_use]
    pub fn tmp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmp_path = Some(path.into());
        self
    }

    /// Sets the backup file path.
    #[must_use]
    pub fn bak_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bak_path = Some(path.into());
        self
    }

    /// Sets the scratch buffer size (clamped to [`MIN_SCRATCH_SIZE`]).
    #[must_use]
    pub const fn scratch_size(mut self, size: usize) -> Self {
        self.scratch_size = size;
        self
    }

    /// Enables or disables the write-ahead log.
    #[must_use]
    pub const fn enable_wal(mut self, value: bool) -> Self {
        self.enable_wal = value;
        self
    }

    /// Sets the WAL file path (implies `enable_wal`).
    #[must_use]
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(path.into());
        self.enable_wal = true;
        self
    }

    /// Sets the WAL entry-count checkpoint threshold (0 = default).
    #[must_use]
    pub const fn wal_max_entries(mut self, entries: usize) -> Self {
        self.wal_max_entries = entries;
        self
    }

    /// Sets the WAL size checkpoint threshold (0 = default).
    #[must_use]
    pub const fn wal_max_size(mut self, size: u64) -> Self {
        self.wal_max_size = size;
        self
    }

    /// Enables or disables the read cache.
    #[must_use]
    pub const fn enable_cache(mut self, value: bool) -> Self {
        self.enable_cache = value;
        self
    }

    /// Sets the cache capacity in records (0 = default).
    #[must_use]
    pub const fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Sets the lock acquisition timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub(crate) fn resolved_tmp_path(&self) -> PathBuf {
        self.tmp_path
            .clone()
            .unwrap_or_else(|| with_suffix(&self.db_path, ".tmp"))
    }

    pub(crate) fn resolved_bak_path(&self) -> PathBuf {
        self.bak_path
            .clone()
            .unwrap_or_else(|| with_suffix(&self.db_path, ".bak"))
    }

    pub(crate) fn resolved_wal_path(&self) -> PathBuf {
        self.wal_path
            .clone()
            .unwrap_or_else(|| with_suffix(&self.db_path, ".wal"))
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}
