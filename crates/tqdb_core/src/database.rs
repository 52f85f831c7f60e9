//! Database facade: lifecycle, registration, CRUD, and the read overlay.

use crate::cache::{Cache, CacheStats};
use crate::config::{
    Config, DEFAULT_CACHE_SIZE, DEFAULT_SCRATCH_SIZE, DEFAULT_WAL_MAX_ENTRIES,
    DEFAULT_WAL_MAX_SIZE, MIN_SCRATCH_SIZE,
};
use crate::error::{CoreResult, Error};
use crate::format::{self, DbPaths};
use crate::record::{BoxedRecord, Record, TypeTable};
use crate::rewrite::{self, BatchKind, BatchOp, Mutation};
use crate::types::RecordId;
use crate::wal::{Wal, WalEntry, WalFind, WalOp, WalStats};
use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::time::Duration;
use tqdb_codec::{Reader, Writer};
use tracing::{debug, warn};

/// An embedded, file-backed record store.
///
/// Clients register each record type once after opening, then perform CRUD,
/// iteration, and queries by type and id. All state lives in a single main
/// file; mutations stream a new copy of it into place (optionally staged
/// through a write-ahead log first), so a failed operation never damages
/// the previous contents.
///
/// Every public operation serializes on one per-instance lock, acquired
/// with a configurable timeout. There are no background threads.
///
/// # Example
///
/// ```rust,ignore
/// let db = Database::open(Config::new("data.tqdb"))?;
/// db.register::<Item>()?;
///
/// let mut item = Item::new("widget", 7);
/// let id = db.add(&mut item)?;
/// let loaded: Item = db.get(id)?;
/// db.close()?;
/// ```
pub struct Database {
    inner: Mutex<Inner>,
    lock_timeout: Duration,
}

struct Inner {
    paths: DbPaths,
    types: TypeTable,
    scratch: Vec<u8>,
    wal: Option<Wal>,
    cache: Option<Cache>,
    closed: bool,
}

impl Database {
    /// Opens a database.
    ///
    /// The main file is not required to exist yet; it is created by the
    /// first mutation. An interrupted rewrite from a previous session is
    /// recovered here (or on first read) via the `.tmp`/`.bak` ladder, and
    /// WAL metadata is loaded with replay deferred until types are
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty database path and
    /// [`Error::Io`] when the WAL file cannot be created.
    pub fn open(config: Config) -> CoreResult<Self> {
        if config.db_path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("db_path is required"));
        }

        let paths = DbPaths {
            db: config.db_path.clone(),
            tmp: config.resolved_tmp_path(),
            bak: config.resolved_bak_path(),
        };

        let scratch_size = if config.scratch_size == 0 {
            DEFAULT_SCRATCH_SIZE
        } else {
            config.scratch_size.max(MIN_SCRATCH_SIZE)
        };

        let wal = if config.enable_wal {
            let max_entries = if config.wal_max_entries == 0 {
                DEFAULT_WAL_MAX_ENTRIES
            } else {
                config.wal_max_entries
            };
            let max_size = if config.wal_max_size == 0 {
                DEFAULT_WAL_MAX_SIZE
            } else {
                config.wal_max_size
            };
            Some(Wal::open(
                config.resolved_wal_path(),
                paths.db.clone(),
                max_entries,
                max_size,
            )?)
        } else {
            None
        };

        let cache = if config.enable_cache {
            let size = if config.cache_size == 0 {
                DEFAULT_CACHE_SIZE
            } else {
                config.cache_size
            };
            Some(Cache::new(size))
        } else {
            None
        };

        Ok(Self {
            inner: Mutex::new(Inner {
                paths,
                types: TypeTable::new(),
                scratch: vec![0u8; scratch_size],
                wal,
                cache,
                closed: false,
            }),
            lock_timeout: config.lock_timeout,
        })
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Inner>> {
        let guard = self
            .inner
            .try_lock_for(self.lock_timeout)
            .ok_or(Error::Timeout)?;
        if guard.closed {
            return Err(Error::invalid_argument("database is closed"));
        }
        Ok(guard)
    }

    /// Registers a record type.
    ///
    /// Must be called after open and before the first CRUD operation for
    /// that type; registration order is the on-disk type order, so it must
    /// be stable across sessions. The type's auto-id counter resumes past
    /// the largest id found in the main file and the WAL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exists`] for a duplicate name and [`Error::Full`]
    /// once the type table is exhausted.
    pub fn register<T: Record>(&self) -> CoreResult<()> {
        self.lock()?.register::<T>()
    }

    /// Adds a record, assigning it the next id for its type.
    ///
    /// The assigned id is stored into `record` and returned.
    pub fn add<T: Record>(&self, record: &mut T) -> CoreResult<RecordId> {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.add(record)
    }

    /// Fetches a record by id.
    ///
    /// Reads reflect every staged mutation: the cache is consulted first,
    /// then the WAL (newest entry wins), then the main file.
    pub fn get<T: Record>(&self, id: RecordId) -> CoreResult<T> {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.get(id)
    }

    /// Replaces an existing record; the target id is taken from `record`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record with that id is visible.
    pub fn update<T: Record>(&self, record: &T) -> CoreResult<()> {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.update(record)
    }

    /// Deletes a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record with that id is visible.
    pub fn delete<T: Record>(&self, id: RecordId) -> CoreResult<()> {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.delete::<T>(id)
    }

    /// Returns whether a record with this id is visible.
    pub fn exists<T: Record>(&self, id: RecordId) -> CoreResult<bool> {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.exists::<T>(id)
    }

    /// Counts the visible records of a type.
    pub fn count<T: Record>(&self) -> CoreResult<u32> {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.count::<T>()
    }

    /// Visits every visible record of a type.
    ///
    /// Records iterate in main-file order, followed by WAL-only additions
    /// in staging order. Returning `false` from the callback stops the
    /// iteration early.
    pub fn for_each<T, F>(&self, visit: F) -> CoreResult<()>
    where
        T: Record,
        F: FnMut(&T) -> bool,
    {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.for_each(visit)
    }

    /// Deletes every record of a type for which `keep` returns `false`.
    ///
    /// Staged WAL entries are checkpointed first so the filter sees every
    /// visible record.
    pub fn delete_where<T, F>(&self, keep: F) -> CoreResult<()>
    where
        T: Record,
        F: FnMut(&T) -> bool,
    {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.delete_where(keep)
    }

    /// Applies `apply` in place to every record matching `filter`.
    pub fn modify_where<T, F, M>(&self, filter: F, apply: M) -> CoreResult<()>
    where
        T: Record,
        F: FnMut(&T) -> bool,
        M: FnMut(&mut T),
    {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.modify_where(Some(filter), apply)
    }

    /// Applies `apply` in place to every record of a type.
    pub fn modify_all<T, M>(&self, apply: M) -> CoreResult<()>
    where
        T: Record,
        M: FnMut(&mut T),
    {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        inner.modify_where::<T, fn(&T) -> bool, M>(None, apply)
    }

    /// Rewrites the main file without changes, compacting its layout.
    pub fn vacuum(&self) -> CoreResult<()> {
        let mut inner = self.lock()?;
        inner.maybe_recover()?;
        let inner = &mut *inner;
        rewrite::apply(
            &inner.paths,
            &inner.types,
            &mut inner.scratch,
            Mutation::Vacuum,
        )
    }

    /// Forces pending writes to disk.
    ///
    /// Mutations are durable when their call returns, so this is a
    /// successful no-op, kept for API symmetry.
    pub fn flush(&self) -> CoreResult<()> {
        let _ = self.lock()?;
        Ok(())
    }

    /// Folds staged WAL entries into the main file.
    ///
    /// Invoked automatically when a WAL threshold is crossed and on close;
    /// with an empty WAL (or the WAL disabled) this does nothing.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.lock()?.checkpoint_locked()
    }

    /// Returns the WAL's entry count and file size (zeros when disabled).
    pub fn wal_stats(&self) -> CoreResult<WalStats> {
        let inner = self.lock()?;
        Ok(inner.wal.as_ref().map_or(
            WalStats {
                entries: 0,
                file_size: 0,
            },
            Wal::stats,
        ))
    }

    /// Returns cache hit/miss counters (zeros when disabled).
    pub fn cache_stats(&self) -> CoreResult<CacheStats> {
        let inner = self.lock()?;
        Ok(inner
            .cache
            .as_ref()
            .map(Cache::stats)
            .unwrap_or_default())
    }

    /// Empties the read cache and resets its counters.
    pub fn cache_clear(&self) -> CoreResult<()> {
        let mut inner = self.lock()?;
        if let Some(cache) = inner.cache.as_mut() {
            cache.clear();
            cache.reset_stats();
        }
        Ok(())
    }

    /// Closes the database, checkpointing any staged WAL entries.
    ///
    /// Subsequent operations fail with [`Error::InvalidArgument`]. Dropping
    /// an unclosed handle performs the same checkpoint best-effort.
    pub fn close(&self) -> CoreResult<()> {
        let mut inner = self
            .inner
            .try_lock_for(self.lock_timeout)
            .ok_or(Error::Timeout)?;
        if inner.closed {
            return Ok(());
        }
        let result = inner.checkpoint_locked();
        inner.closed = true;
        result
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if !inner.closed {
            if let Err(e) = inner.checkpoint_locked() {
                warn!(error = %e, "checkpoint on drop failed; WAL left for recovery");
            }
            inner.closed = true;
        }
    }
}

impl Inner {
    fn register<T: Record>(&mut self) -> CoreResult<()> {
        let type_index = self.types.insert::<T>()?;

        // Resume the auto-id counter past every id this type has ever been
        // assigned, in the main file or still staged in the WAL. The scan
        // is best-effort: a file written under a different registration
        // set stops it early without failing the registration.
        let mut max_id = 0u32;
        if let Ok(Some(mut f)) = format::open_main_for_read(&self.paths) {
            let counts = format::read_counts(&mut f, &self.types);
            let mut r = Reader::new(&mut f, &mut self.scratch);
            let mut intact = true;
            for t in 0..type_index {
                for _ in 0..counts[t] {
                    if (self.types.entry(t).vtable.skip)(&mut r).is_err() {
                        intact = false;
                        break;
                    }
                }
                if !intact {
                    break;
                }
            }
            if intact {
                for _ in 0..counts[type_index] {
                    match T::decode(&mut r) {
                        Ok(rec) => max_id = max_id.max(rec.id().as_u32()),
                        Err(_) => break,
                    }
                }
            }
        }
        if let Some(wal) = self.wal.as_mut() {
            wal.scan(|entry| {
                if usize::from(entry.type_index) == type_index {
                    max_id = max_id.max(entry.id.as_u32());
                }
            })?;
        }

        self.types.entry_mut(type_index).next_id = max_id + 1;
        Ok(())
    }

    /// Performs the deferred WAL replay owed from open, once types exist.
    fn maybe_recover(&mut self) -> CoreResult<()> {
        let pending = self
            .wal
            .as_ref()
            .is_some_and(Wal::recovery_pending);
        if pending && !self.types.is_empty() {
            if let Some(wal) = self.wal.as_mut() {
                wal.clear_recovery_pending();
            }
            debug!("recovering staged WAL entries from previous session");
            self.checkpoint_locked()?;
        }
        Ok(())
    }

    fn add<T: Record>(&mut self, record: &mut T) -> CoreResult<RecordId> {
        let type_index = self.types.require(T::type_name())?;

        let entry = self.types.entry_mut(type_index);
        let id = RecordId::new(entry.next_id);
        entry.next_id += 1;
        record.set_id(id);

        if self.wal.is_some() {
            let payload = encode_record(&mut self.scratch, record)?;
            self.wal_append(WalEntry {
                op: WalOp::Add,
                type_index: type_index as u8,
                id,
                payload,
            })?;
            self.cache_store(type_index, id, WalOp::Add, Some(Box::new(record.clone())));
            self.maybe_auto_checkpoint()?;
        } else {
            rewrite::apply(
                &self.paths,
                &self.types,
                &mut self.scratch,
                Mutation::Add {
                    type_index,
                    record: Box::new(record.clone()),
                },
            )?;
            self.cache_store(type_index, id, WalOp::Add, Some(Box::new(record.clone())));
        }
        Ok(id)
    }

    fn get<T: Record>(&mut self, id: RecordId) -> CoreResult<T> {
        if id.is_unassigned() {
            return Err(Error::invalid_argument("record id 0 is reserved"));
        }
        let type_index = self.types.require(T::type_name())?;

        if let Some(cache) = self.cache.as_mut() {
            if let Some((op, payload)) = cache.get(type_index as u8, id) {
                if op == WalOp::Delete {
                    return Err(not_found::<T>(id));
                }
                if let Some(rec) = payload.and_then(|p| p.downcast_ref::<T>()) {
                    return Ok(rec.clone());
                }
            }
        }

        match self.wal_find(type_index, id)? {
            WalFind::Deleted => return Err(not_found::<T>(id)),
            WalFind::Present { op, payload } => {
                let rec: T = decode_record(&mut self.scratch, &payload)?;
                self.cache_store(type_index, id, op, Some(Box::new(rec.clone())));
                return Ok(rec);
            }
            WalFind::Absent => {}
        }

        match self.find_in_main::<T>(type_index, id)? {
            Some(rec) => {
                self.cache_store(type_index, id, WalOp::Add, Some(Box::new(rec.clone())));
                Ok(rec)
            }
            None => Err(not_found::<T>(id)),
        }
    }

    fn update<T: Record>(&mut self, record: &T) -> CoreResult<()> {
        let id = record.id();
        if id.is_unassigned() {
            return Err(Error::invalid_argument("record id 0 is reserved"));
        }
        let type_index = self.types.require(T::type_name())?;
        if !self.exists::<T>(id)? {
            return Err(not_found::<T>(id));
        }

        if self.wal.is_some() {
            let payload = encode_record(&mut self.scratch, record)?;
            self.wal_append(WalEntry {
                op: WalOp::Update,
                type_index: type_index as u8,
                id,
                payload,
            })?;
            self.cache_store(
                type_index,
                id,
                WalOp::Update,
                Some(Box::new(record.clone())),
            );
            self.maybe_auto_checkpoint()
        } else {
            rewrite::apply(
                &self.paths,
                &self.types,
                &mut self.scratch,
                Mutation::Update {
                    type_index,
                    id,
                    record: Box::new(record.clone()),
                },
            )?;
            self.cache_store(
                type_index,
                id,
                WalOp::Update,
                Some(Box::new(record.clone())),
            );
            Ok(())
        }
    }

    fn delete<T: Record>(&mut self, id: RecordId) -> CoreResult<()> {
        if id.is_unassigned() {
            return Err(Error::invalid_argument("record id 0 is reserved"));
        }
        let type_index = self.types.require(T::type_name())?;
        if !self.exists::<T>(id)? {
            return Err(not_found::<T>(id));
        }

        if self.wal.is_some() {
            self.wal_append(WalEntry {
                op: WalOp::Delete,
                type_index: type_index as u8,
                id,
                payload: Vec::new(),
            })?;
            // Tombstone so reads answer "deleted" without a WAL scan.
            self.cache_store(type_index, id, WalOp::Delete, None);
            self.maybe_auto_checkpoint()
        } else {
            rewrite::apply(
                &self.paths,
                &self.types,
                &mut self.scratch,
                Mutation::Delete { type_index, id },
            )?;
            if let Some(cache) = self.cache.as_mut() {
                cache.invalidate(type_index as u8, id);
            }
            Ok(())
        }
    }

    fn exists<T: Record>(&mut self, id: RecordId) -> CoreResult<bool> {
        if id.is_unassigned() {
            return Ok(false);
        }
        let type_index = self.types.require(T::type_name())?;

        if let Some(cache) = self.cache.as_mut() {
            if let Some((op, payload)) = cache.get(type_index as u8, id) {
                if op == WalOp::Delete {
                    return Ok(false);
                }
                if payload.is_some() {
                    return Ok(true);
                }
            }
        }

        match self.wal_find(type_index, id)? {
            WalFind::Present { .. } => return Ok(true),
            WalFind::Deleted => return Ok(false),
            WalFind::Absent => {}
        }

        Ok(self.find_in_main::<T>(type_index, id)?.is_some())
    }

    fn count<T: Record>(&mut self) -> CoreResult<u32> {
        let type_index = self.types.require(T::type_name())?;

        let mut count = 0u32;
        if let Some(mut f) = format::open_main_for_read(&self.paths)? {
            count = format::read_counts(&mut f, &self.types)[type_index];
        }

        // Layer the WAL by tracking per-id liveness in staging order. An id
        // first seen as ADD lives only in the WAL; one first seen as UPDATE
        // or DELETE is already counted in the main file.
        if let Some(wal) = self.wal.as_mut() {
            if wal.entry_count() > 0 {
                let mut seen: Vec<(RecordId, bool)> = Vec::new();
                wal.scan(|entry| {
                    if usize::from(entry.type_index) != type_index {
                        return;
                    }
                    let slot = seen.iter_mut().find(|(id, _)| *id == entry.id);
                    match entry.op {
                        WalOp::Add => match slot {
                            Some((_, alive)) => {
                                if !*alive {
                                    count += 1;
                                    *alive = true;
                                }
                            }
                            None => {
                                count += 1;
                                seen.push((entry.id, true));
                            }
                        },
                        WalOp::Update => {
                            if slot.is_none() {
                                seen.push((entry.id, true));
                            }
                        }
                        WalOp::Delete => match slot {
                            Some((_, alive)) => {
                                if *alive {
                                    count = count.saturating_sub(1);
                                    *alive = false;
                                }
                            }
                            None => {
                                count = count.saturating_sub(1);
                                seen.push((entry.id, false));
                            }
                        },
                    }
                })?;
            }
        }
        Ok(count)
    }

    fn for_each<T, F>(&mut self, mut visit: F) -> CoreResult<()>
    where
        T: Record,
        F: FnMut(&T) -> bool,
    {
        let type_index = self.types.require(T::type_name())?;

        let raw = match self.wal.as_mut() {
            Some(wal) if wal.entry_count() > 0 => {
                wal.load_for_type(type_index as u8)?
            }
            _ => Vec::new(),
        };
        let mut overlay: Vec<OverlaySlot<T>> = Vec::with_capacity(raw.len());
        for (id, op, payload) in raw {
            let record = if op == WalOp::Delete {
                None
            } else {
                Some(decode_record(&mut self.scratch, &payload)?)
            };
            overlay.push(OverlaySlot {
                id,
                op,
                record,
                consumed: false,
            });
        }

        let mut stopped = false;
        if let Some(mut f) = format::open_main_for_read(&self.paths)? {
            let counts = format::read_counts(&mut f, &self.types);
            let mut r = Reader::new(&mut f, &mut self.scratch);
            for t in 0..type_index {
                for _ in 0..counts[t] {
                    (self.types.entry(t).vtable.skip)(&mut r)?;
                }
            }

            for _ in 0..counts[type_index] {
                let rec = T::decode(&mut r)?;
                match overlay.iter_mut().find(|s| s.id == rec.id()) {
                    Some(slot) => match slot.op {
                        WalOp::Delete => slot.consumed = true,
                        WalOp::Update => {
                            slot.consumed = true;
                            if let Some(updated) = slot.record.as_ref() {
                                stopped = !visit(updated);
                            }
                        }
                        WalOp::Add => stopped = !visit(&rec),
                    },
                    None => stopped = !visit(&rec),
                }
                if stopped {
                    break;
                }
            }
        }

        if !stopped {
            // Remaining slots are WAL-born: adds, and updates whose add was
            // staged earlier in the same log (no main-file record consumed
            // them). Deletes never re-emit.
            for slot in &overlay {
                if slot.consumed || slot.op == WalOp::Delete {
                    continue;
                }
                if let Some(added) = slot.record.as_ref() {
                    if !visit(added) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn delete_where<T, F>(&mut self, mut keep: F) -> CoreResult<()>
    where
        T: Record,
        F: FnMut(&T) -> bool,
    {
        let type_index = self.types.require(T::type_name())?;
        // Fold staged entries first so the filter sees every visible record.
        self.checkpoint_locked()?;

        let mut erased =
            |rec: &(dyn Any + Send)| rec.downcast_ref::<T>().map_or(true, &mut keep);
        rewrite::apply(
            &self.paths,
            &self.types,
            &mut self.scratch,
            Mutation::DeleteWhere {
                type_index,
                keep: &mut erased,
            },
        )?;

        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
        Ok(())
    }

    fn modify_where<T, F, M>(&mut self, filter: Option<F>, mut apply: M) -> CoreResult<()>
    where
        T: Record,
        F: FnMut(&T) -> bool,
        M: FnMut(&mut T),
    {
        let type_index = self.types.require(T::type_name())?;
        self.checkpoint_locked()?;

        let mut erased_apply = |rec: &mut (dyn Any + Send)| {
            if let Some(rec) = rec.downcast_mut::<T>() {
                apply(rec);
            }
        };
        match filter {
            Some(mut filter) => {
                let mut erased_filter = |rec: &(dyn Any + Send)| {
                    rec.downcast_ref::<T>().map_or(false, &mut filter)
                };
                rewrite::apply(
                    &self.paths,
                    &self.types,
                    &mut self.scratch,
                    Mutation::ModifyWhere {
                        type_index,
                        filter: Some(&mut erased_filter),
                        apply: &mut erased_apply,
                    },
                )?;
            }
            None => {
                rewrite::apply(
                    &self.paths,
                    &self.types,
                    &mut self.scratch,
                    Mutation::ModifyWhere {
                        type_index,
                        filter: None,
                        apply: &mut erased_apply,
                    },
                )?;
            }
        }

        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
        Ok(())
    }

    /// Folds the WAL into the main file and resets it.
    ///
    /// With no staged entries this is a no-op that does not touch the main
    /// file. On success the cache is emptied; on failure the WAL is left
    /// intact and the checkpoint can be retried.
    fn checkpoint_locked(&mut self) -> CoreResult<()> {
        let staged = match self.wal.as_ref() {
            None => return Ok(()),
            Some(wal) => wal.entry_count(),
        };
        if staged == 0 {
            return Ok(());
        }

        let type_count = self.types.len();
        let mut raw: Vec<WalEntry> = Vec::new();
        if let Some(wal) = self.wal.as_mut() {
            wal.scan(|entry| {
                if usize::from(entry.type_index) < type_count {
                    raw.push(entry);
                }
            })?;
        }

        // Deduplicate: only the newest operation per (type, id) survives.
        let mut newest = vec![true; raw.len()];
        for i in 0..raw.len() {
            for j in (i + 1)..raw.len() {
                if raw[j].type_index == raw[i].type_index && raw[j].id == raw[i].id {
                    newest[i] = false;
                    break;
                }
            }
        }

        let mut batch = Vec::new();
        for (entry, newest) in raw.into_iter().zip(newest) {
            if !newest {
                continue;
            }
            let type_index = usize::from(entry.type_index);
            let kind = match entry.op {
                WalOp::Delete => BatchKind::Delete,
                op => {
                    let record =
                        decode_boxed(&self.types, &mut self.scratch, type_index, &entry.payload)?;
                    if op == WalOp::Add {
                        BatchKind::Add(record)
                    } else {
                        BatchKind::Update(record)
                    }
                }
            };
            batch.push(BatchOp::new(type_index, entry.id, kind));
        }

        rewrite::apply(
            &self.paths,
            &self.types,
            &mut self.scratch,
            Mutation::Batch(batch),
        )?;

        if let Some(wal) = self.wal.as_mut() {
            wal.reset()?;
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
        debug!(entries = staged, "checkpoint folded WAL into main file");
        Ok(())
    }

    fn maybe_auto_checkpoint(&mut self) -> CoreResult<()> {
        if self.wal.as_ref().is_some_and(Wal::should_checkpoint) {
            self.checkpoint_locked()?;
        }
        Ok(())
    }

    fn wal_append(&mut self, entry: WalEntry) -> CoreResult<()> {
        match self.wal.as_mut() {
            Some(wal) => wal.append(&entry),
            None => Ok(()),
        }
    }

    fn wal_find(&mut self, type_index: usize, id: RecordId) -> CoreResult<WalFind> {
        match self.wal.as_mut() {
            Some(wal) if wal.entry_count() > 0 => wal.find(type_index as u8, id),
            _ => Ok(WalFind::Absent),
        }
    }

    fn cache_store(
        &mut self,
        type_index: usize,
        id: RecordId,
        op: WalOp,
        payload: Option<BoxedRecord>,
    ) {
        if let Some(cache) = self.cache.as_mut() {
            cache.put(type_index as u8, id, op, payload);
        }
    }

    /// Scans the main file for one record of the target type.
    fn find_in_main<T: Record>(
        &mut self,
        type_index: usize,
        id: RecordId,
    ) -> CoreResult<Option<T>> {
        let Some(mut f) = format::open_main_for_read(&self.paths)? else {
            return Ok(None);
        };
        let counts = format::read_counts(&mut f, &self.types);
        let mut r = Reader::new(&mut f, &mut self.scratch);

        for t in 0..type_index {
            for _ in 0..counts[t] {
                (self.types.entry(t).vtable.skip)(&mut r)?;
            }
        }
        for _ in 0..counts[type_index] {
            let rec = T::decode(&mut r)?;
            if rec.id() == id {
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }
}

/// One deduplicated WAL entry layered over the main file during iteration.
struct OverlaySlot<T> {
    id: RecordId,
    op: WalOp,
    record: Option<T>,
    consumed: bool,
}

fn not_found<T: Record>(id: RecordId) -> Error {
    Error::not_found(format!("{} record with id {id}", T::type_name()))
}

fn encode_record<T: Record>(scratch: &mut [u8], record: &T) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out, scratch);
    record.encode(&mut w)?;
    w.flush()?;
    Ok(out)
}

fn decode_record<T: Record>(scratch: &mut [u8], payload: &[u8]) -> CoreResult<T> {
    let mut src = payload;
    let mut r = Reader::new(&mut src, scratch);
    Ok(T::decode(&mut r)?)
}

fn decode_boxed(
    types: &TypeTable,
    scratch: &mut [u8],
    type_index: usize,
    payload: &[u8],
) -> CoreResult<BoxedRecord> {
    let mut src = payload;
    let mut r = Reader::new(&mut src, scratch);
    (types.entry(type_index).vtable.decode)(&mut r).map_err(Error::from)
}
