//! Verify command implementation.

use super::wal_path_for;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use tqdb_core::format::{compute_body_crc, MainHeader};
use tqdb_core::{WalEntry, WalHeader, WAL_HEADER_SIZE};

/// Runs the verify command.
///
/// Checks that the main file's header CRC matches its body and that every
/// WAL entry's CRC matches its contents. `wal_only` skips the main file.
pub fn run(path: &Path, wal_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut failures = 0usize;

    if !wal_only {
        match File::open(path) {
            Ok(mut f) => match MainHeader::read_from(&mut f) {
                Some(hdr) => {
                    let body = compute_body_crc(&mut f)?;
                    if body == hdr.crc {
                        println!("main file: OK ({:#010x})", hdr.crc);
                    } else {
                        println!(
                            "main file: CRC MISMATCH (header {:#010x}, body {body:#010x})",
                            hdr.crc
                        );
                        failures += 1;
                    }
                }
                None => {
                    println!("main file: invalid header");
                    failures += 1;
                }
            },
            Err(_) => println!("main file: missing (empty database)"),
        }
    }

    let wal_path = wal_path_for(path);
    match File::open(&wal_path) {
        Ok(f) => {
            let mut reader = BufReader::new(f);
            match WalHeader::read_from(&mut reader) {
                Some(hdr) => {
                    reader.seek(SeekFrom::Start(WAL_HEADER_SIZE))?;
                    let mut valid = 0u32;
                    let mut error = None;
                    for _ in 0..hdr.entry_count {
                        match WalEntry::read_from(&mut reader) {
                            Ok(_) => valid += 1,
                            Err(e) => {
                                error = Some(e);
                                break;
                            }
                        }
                    }
                    match error {
                        None => println!("WAL: OK ({valid} entries)"),
                        Some(e) => {
                            println!(
                                "WAL: corrupt tail after {valid}/{} entries ({e})",
                                hdr.entry_count
                            );
                            failures += 1;
                        }
                    }
                }
                None => {
                    println!("WAL: invalid header");
                    failures += 1;
                }
            }
        }
        Err(_) => println!("WAL: none"),
    }

    if failures == 0 {
        println!("verification passed");
        Ok(())
    } else {
        Err("verification failed".into())
    }
}
