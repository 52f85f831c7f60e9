//! Bounded read cache keyed by (type index, id).
//!
//! A flat slot array scanned linearly - cache sizes are small (default 16)
//! and the table must work without a hashing dependency. Eviction picks the
//! slot with the oldest access tick. A DELETE is cached as a tombstone
//! (no payload) so reads can answer "deleted" without rescanning the WAL;
//! checkpoints clear the whole table.

use crate::record::BoxedRecord;
use crate::types::RecordId;
use crate::wal::WalOp;

/// Hit/miss counters for the read cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the WAL or main file.
    pub misses: u64,
}

struct Slot {
    /// `RecordId::UNASSIGNED` marks an empty slot.
    id: RecordId,
    type_index: u8,
    op: WalOp,
    payload: Option<BoxedRecord>,
    tick: u64,
}

pub(crate) struct Cache {
    slots: Vec<Slot>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                id: RecordId::UNASSIGNED,
                type_index: 0,
                op: WalOp::Add,
                payload: None,
                tick: 0,
            });
        }
        Self {
            slots,
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a key; a hit bumps its access tick.
    pub fn get(
        &mut self,
        type_index: u8,
        id: RecordId,
    ) -> Option<(WalOp, Option<&BoxedRecord>)> {
        if id.is_unassigned() {
            return None;
        }
        self.tick += 1;
        let tick = self.tick;
        let hit = self
            .slots
            .iter()
            .position(|s| !s.id.is_unassigned() && s.type_index == type_index && s.id == id);
        match hit {
            Some(index) => {
                self.hits += 1;
                let slot = &mut self.slots[index];
                slot.tick = tick;
                Some((slot.op, slot.payload.as_ref()))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts or replaces the entry for a key.
    ///
    /// `payload` is `None` for tombstones. An existing slot for the key is
    /// replaced in place; otherwise an empty slot is used, falling back to
    /// evicting the least recently used one.
    pub fn put(
        &mut self,
        type_index: u8,
        id: RecordId,
        op: WalOp,
        payload: Option<BoxedRecord>,
    ) {
        if id.is_unassigned() {
            return;
        }
        self.tick += 1;
        let tick = self.tick;

        let index = self
            .slots
            .iter()
            .position(|s| !s.id.is_unassigned() && s.type_index == type_index && s.id == id)
            .unwrap_or_else(|| self.victim_index());

        let slot = &mut self.slots[index];
        slot.id = id;
        slot.type_index = type_index;
        slot.op = op;
        slot.payload = payload;
        slot.tick = tick;
    }

    fn victim_index(&self) -> usize {
        let mut victim = 0;
        let mut min_tick = u64::MAX;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.id.is_unassigned() {
                return i;
            }
            if slot.tick < min_tick {
                min_tick = slot.tick;
                victim = i;
            }
        }
        victim
    }

    /// Drops the entry for a key, if present.
    pub fn invalidate(&mut self, type_index: u8, id: RecordId) {
        for slot in &mut self.slots {
            if !slot.id.is_unassigned() && slot.type_index == type_index && slot.id == id
            {
                slot.id = RecordId::UNASSIGNED;
                slot.payload = None;
                return;
            }
        }
    }

    /// Empties the whole table.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.id = RecordId::UNASSIGNED;
            slot.payload = None;
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }
}
