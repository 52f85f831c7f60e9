//! Inspect command implementation.

use super::wal_path_for;
use std::fs::File;
use std::path::Path;
use tqdb_core::format::MainHeader;
use tqdb_core::WalHeader;

/// Runs the inspect command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}", path.display());

    let mut f = File::open(path)?;
    let size = f.metadata()?.len();
    match MainHeader::read_from(&mut f) {
        Some(hdr) => {
            println!("  format version: {}", hdr.version);
            println!("  flags:          {:#06x}", hdr.flags);
            println!("  integrity CRC:  {:#010x}", hdr.crc);
            println!("  file size:      {size} bytes");
        }
        None => {
            println!("  not a TQDB file (bad magic or unsupported version)");
            return Err("invalid main file header".into());
        }
    }

    let wal_path = wal_path_for(path);
    match File::open(&wal_path) {
        Ok(mut wf) => {
            let wal_size = wf.metadata()?.len();
            println!("WAL: {}", wal_path.display());
            match WalHeader::read_from(&mut wf) {
                Some(hdr) => {
                    println!("  format version:    {}", hdr.version);
                    println!("  witnessed main CRC: {:#010x}", hdr.db_crc);
                    println!("  staged entries:    {}", hdr.entry_count);
                    println!("  file size:         {wal_size} bytes");
                }
                None => println!("  invalid WAL header (will be recreated on open)"),
            }
        }
        Err(_) => println!("WAL: none"),
    }

    Ok(())
}
