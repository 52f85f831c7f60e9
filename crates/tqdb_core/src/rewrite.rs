//! Streaming copy-on-write rewrite engine.
//!
//! Every durable mutation funnels through [`apply`]: it streams the previous
//! main file into a fresh temp file while applying one mutation descriptor
//! (or, for checkpoints, a deduplicated batch of staged operations), then
//! installs the temp file with an atomic rename swap. On any failure the
//! previous file remains authoritative.
//!
//! Per-record rule order, first match wins: delete-by-id, filter-delete,
//! update-by-id, filter-modify, copy unchanged. Additions are appended at
//! the tail of their type's section, so a surviving record keeps its slot
//! relative to its neighbors.

use crate::error::CoreResult;
use crate::format::{
    self, DbPaths, MainHeader, HEADER_CRC_OFFSET, HEADER_SIZE, VERSION,
};
use crate::record::{BoxedRecord, TypeTable};
use crate::types::RecordId;
use std::any::Any;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use tqdb_codec::{Reader, Writer};
use tracing::warn;

/// A filter callback over an erased record: true keeps the record.
pub(crate) type KeepFn<'a> = &'a mut dyn FnMut(&(dyn Any + Send)) -> bool;

/// An in-place mutator over an erased record.
pub(crate) type ApplyFn<'a> = &'a mut dyn FnMut(&mut (dyn Any + Send));

/// One staged operation inside a checkpoint batch.
pub(crate) struct BatchOp {
    pub type_index: usize,
    pub id: RecordId,
    pub kind: BatchKind,
    consumed: bool,
}

impl BatchOp {
    pub fn new(type_index: usize, id: RecordId, kind: BatchKind) -> Self {
        Self {
            type_index,
            id,
            kind,
            consumed: false,
        }
    }
}

pub(crate) enum BatchKind {
    Add(BoxedRecord),
    Update(BoxedRecord),
    Delete,
}

/// The mutation a rewrite applies; at most one is active per pass.
pub(crate) enum Mutation<'a> {
    /// Rewrite without changes (compaction of the on-disk layout).
    Vacuum,
    Add {
        type_index: usize,
        record: BoxedRecord,
    },
    Update {
        type_index: usize,
        id: RecordId,
        record: BoxedRecord,
    },
    Delete {
        type_index: usize,
        id: RecordId,
    },
    DeleteWhere {
        type_index: usize,
        keep: KeepFn<'a>,
    },
    ModifyWhere {
        type_index: usize,
        filter: Option<KeepFn<'a>>,
        apply: ApplyFn<'a>,
    },
    /// Deduplicated staged operations from a WAL checkpoint.
    Batch(Vec<BatchOp>),
}

/// Applies one mutation, producing and installing a new main file.
pub(crate) fn apply(
    paths: &DbPaths,
    types: &TypeTable,
    scratch: &mut [u8],
    mut mutation: Mutation<'_>,
) -> CoreResult<()> {
    let src = format::open_main_for_read(paths)?;
    if let Err(e) = write_tmp(paths, types, scratch, &mut mutation, src) {
        let _ = fs::remove_file(&paths.tmp);
        return Err(e);
    }
    swap_into_place(paths)
}

fn write_tmp(
    paths: &DbPaths,
    types: &TypeTable,
    scratch: &mut [u8],
    mutation: &mut Mutation<'_>,
    mut src: Option<File>,
) -> CoreResult<()> {
    // Read access is needed after streaming to recompute the body CRC when
    // the counts vector gets patched.
    let mut dst = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&paths.tmp)?;

    // Header placeholder with a zeroed CRC, patched after streaming.
    MainHeader {
        version: VERSION,
        flags: 0,
        crc: 0,
        reserved: 0,
    }
    .write_to(&mut dst)?;

    let counts = match src.as_mut() {
        Some(f) => format::read_counts(f, types),
        None => vec![0; types.len()],
    };
    let projected = project_counts(&counts, mutation);

    let half = scratch.len() / 2;
    let (read_buf, write_buf) = scratch.split_at_mut(half);

    let mut actual = vec![0u32; types.len()];
    let streamed_crc;
    {
        let mut w = Writer::new(&mut dst, write_buf);
        for &c in &projected {
            w.write_u32(c)?;
        }

        let mut reader = src
            .as_mut()
            .map(|f| Reader::new(f, read_buf));

        for type_index in 0..types.len() {
            let vt = &types.entry(type_index).vtable;
            let mut written = 0u32;

            if let Some(r) = reader.as_mut() {
                for _ in 0..counts[type_index] {
                    let mut rec = (vt.decode)(r)?;
                    let id = (vt.id_of)(rec.as_ref())?;

                    match mutation {
                        Mutation::Delete {
                            type_index: t,
                            id: target,
                        } if *t == type_index && *target == id => continue,

                        Mutation::DeleteWhere { type_index: t, keep }
                            if *t == type_index =>
                        {
                            if !(keep)(rec.as_ref()) {
                                continue;
                            }
                        }

                        Mutation::Update {
                            type_index: t,
                            id: target,
                            record,
                        } if *t == type_index && *target == id => {
                            (vt.encode)(&mut w, record.as_ref())?;
                            written += 1;
                            continue;
                        }

                        Mutation::ModifyWhere {
                            type_index: t,
                            filter,
                            apply,
                        } if *t == type_index => {
                            let wanted = match filter {
                                Some(f) => (f)(rec.as_ref()),
                                None => true,
                            };
                            if wanted {
                                (apply)(rec.as_mut());
                            }
                        }

                        Mutation::Batch(ops) => {
                            if let Some(op) = ops.iter_mut().find(|o| {
                                !o.consumed
                                    && o.type_index == type_index
                                    && o.id == id
                            }) {
                                match &op.kind {
                                    BatchKind::Delete => {
                                        op.consumed = true;
                                        continue;
                                    }
                                    BatchKind::Update(replacement) => {
                                        (vt.encode)(&mut w, replacement.as_ref())?;
                                        written += 1;
                                        op.consumed = true;
                                        continue;
                                    }
                                    // Fresh ids never collide with existing
                                    // records; adds only append below.
                                    BatchKind::Add(_) => {}
                                }
                            }
                        }

                        _ => {}
                    }

                    (vt.encode)(&mut w, rec.as_ref())?;
                    written += 1;
                }
            }

            match mutation {
                Mutation::Add { type_index: t, record } if *t == type_index => {
                    (vt.encode)(&mut w, record.as_ref())?;
                    written += 1;
                }
                Mutation::Batch(ops) => {
                    for op in ops
                        .iter_mut()
                        .filter(|o| !o.consumed && o.type_index == type_index)
                    {
                        match &op.kind {
                            // An unconsumed update is an add staged earlier
                            // in the same log; append it like an add.
                            BatchKind::Add(record) | BatchKind::Update(record) => {
                                (vt.encode)(&mut w, record.as_ref())?;
                                written += 1;
                                op.consumed = true;
                            }
                            BatchKind::Delete => {}
                        }
                    }
                }
                _ => {}
            }

            actual[type_index] = written;
        }

        w.flush()?;
        streamed_crc = w.crc();
    }

    // Filters change counts only during streaming; patch the vector and
    // recompute the body CRC so the header stays truthful.
    let final_crc = if actual == projected {
        streamed_crc
    } else {
        dst.seek(SeekFrom::Start(HEADER_SIZE))?;
        for &c in &actual {
            dst.write_all(&c.to_le_bytes())?;
        }
        format::compute_body_crc(&mut dst)?
    };

    dst.seek(SeekFrom::Start(HEADER_CRC_OFFSET))?;
    dst.write_all(&final_crc.to_le_bytes())?;
    dst.sync_all()?;
    Ok(())
}

fn project_counts(counts: &[u32], mutation: &Mutation<'_>) -> Vec<u32> {
    let mut projected = counts.to_vec();
    match mutation {
        Mutation::Add { type_index, .. } => projected[*type_index] += 1,
        Mutation::Delete { type_index, .. } => {
            projected[*type_index] = projected[*type_index].saturating_sub(1);
        }
        Mutation::Batch(ops) => {
            for op in ops {
                match op.kind {
                    BatchKind::Add(_) => projected[op.type_index] += 1,
                    BatchKind::Delete => {
                        projected[op.type_index] =
                            projected[op.type_index].saturating_sub(1);
                    }
                    BatchKind::Update(_) => {}
                }
            }
        }
        _ => {}
    }
    projected
}

/// Installs `.tmp` as the main file.
///
/// The previous file is parked as `.bak` for the duration of the install;
/// if the final rename fails, the backup is restored.
fn swap_into_place(paths: &DbPaths) -> CoreResult<()> {
    let _ = fs::remove_file(&paths.bak);
    let had_previous = fs::rename(&paths.db, &paths.bak).is_ok();

    if let Err(e) = fs::rename(&paths.tmp, &paths.db) {
        warn!(
            path = %paths.db.display(),
            error = %e,
            "installing rewritten file failed; restoring backup"
        );
        if had_previous {
            let _ = fs::rename(&paths.bak, &paths.db);
        }
        let _ = fs::remove_file(&paths.tmp);
        return Err(e.into());
    }

    let _ = fs::remove_file(&paths.bak);
    Ok(())
}
