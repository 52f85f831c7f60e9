//! Command implementations.

pub mod dump_wal;
pub mod inspect;
pub mod verify;

use std::path::{Path, PathBuf};

/// Derives the conventional WAL sidecar path.
pub fn wal_path_for(db_path: &Path) -> PathBuf {
    let mut s = db_path.as_os_str().to_os_string();
    s.push(".wal");
    PathBuf::from(s)
}
