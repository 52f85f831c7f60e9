//! Dump-wal command implementation.

use super::wal_path_for;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use tqdb_core::{WalEntry, WalHeader, WalOp, WAL_HEADER_SIZE};

/// Runs the dump-wal command.
pub fn run(path: &Path, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let wal_path = wal_path_for(path);
    let f = File::open(&wal_path)
        .map_err(|e| format!("cannot open {}: {e}", wal_path.display()))?;
    let mut reader = BufReader::new(f);

    let hdr = WalHeader::read_from(&mut reader).ok_or("invalid WAL header")?;
    println!(
        "WAL {} ({} entries, witnessed main CRC {:#010x})",
        wal_path.display(),
        hdr.entry_count,
        hdr.db_crc
    );

    reader.seek(SeekFrom::Start(WAL_HEADER_SIZE))?;
    let max = limit.unwrap_or(usize::MAX);
    for i in 0..hdr.entry_count as usize {
        if i >= max {
            println!("... ({} more)", hdr.entry_count as usize - i);
            break;
        }
        match WalEntry::read_from(&mut reader) {
            Ok(entry) => {
                let op = match entry.op {
                    WalOp::Add => "ADD",
                    WalOp::Update => "UPDATE",
                    WalOp::Delete => "DELETE",
                };
                println!(
                    "  [{i:4}] {op:<6} type={} id={} payload={}B",
                    entry.type_index,
                    entry.id,
                    entry.payload.len()
                );
            }
            Err(e) => {
                println!("  [{i:4}] corrupt entry: {e}");
                break;
            }
        }
    }

    Ok(())
}
