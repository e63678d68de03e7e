//! Entry slots for the cell index
//!
//! A slot holds one cell's identity: its id, the link to the next slot in its
//! bucket chain, its exclusive lock, and an optional type tag. Slots are addressed
//! by index and never move; free slots are recycled through a free list.

use std::sync::atomic::{AtomicI32, AtomicU16, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::index::latch::SpinLatch;
use crate::index::NO_ENTRY;
use crate::{CellId, CellType};

/// One entry slot
#[derive(Debug)]
pub struct CellEntry {
    key: AtomicU64,
    next: AtomicI32,
    latch: SpinLatch,
    cell_type: AtomicU16,
}

impl CellEntry {
    const fn new() -> Self {
        Self {
            key: AtomicU64::new(0),
            next: AtomicI32::new(NO_ENTRY),
            latch: SpinLatch::new(),
            cell_type: AtomicU16::new(0),
        }
    }

    /// Cell id stored in the slot. Stable while the slot is live.
    #[inline]
    pub fn key(&self) -> CellId {
        self.key.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_key(&self, key: CellId) {
        self.key.store(key, Ordering::Relaxed);
    }

    /// Next slot in the bucket chain. Only meaningful under the bucket latch.
    #[inline]
    pub fn next(&self) -> i32 {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_next(&self, next: i32) {
        self.next.store(next, Ordering::Relaxed);
    }

    /// Type tag. Only meaningful under the entry lock.
    #[inline]
    pub fn cell_type(&self) -> CellType {
        self.cell_type.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_cell_type(&self, cell_type: CellType) {
        self.cell_type.store(cell_type, Ordering::Relaxed);
    }

    /// The slot's exclusive lock
    #[inline]
    pub fn latch(&self) -> &SpinLatch {
        &self.latch
    }
}

/// Fixed-capacity array of entry slots with a free pool
pub struct EntryTable {
    entries: Box<[CellEntry]>,
    /// Slots below this index have been handed out at least once
    next_unused: AtomicU32,
    free_list: Mutex<Vec<u32>>,
}

impl EntryTable {
    /// Create a table of `capacity` free slots
    ///
    /// # Panics
    /// Panics if capacity exceeds i32::MAX
    pub fn new(capacity: u32) -> Self {
        assert!(capacity <= i32::MAX as u32, "Entry table too large");
        Self {
            entries: (0..capacity).map(|_| CellEntry::new()).collect(),
            next_unused: AtomicU32::new(0),
            free_list: Mutex::new(Vec::new()),
        }
    }

    /// Total number of slots
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Get a slot by index
    #[inline]
    pub fn entry(&self, slot: u32) -> &CellEntry {
        &self.entries[slot as usize]
    }

    /// Claim an unused slot.
    ///
    /// # Panics
    /// Panics when every slot is live. Capacity is sized by the caller, so running
    /// out is a broken precondition rather than a recoverable error.
    pub fn find_free_slot(&self) -> u32 {
        if let Some(slot) = self.free_list.lock().pop() {
            return slot;
        }

        let slot = self.next_unused.fetch_add(1, Ordering::AcqRel);
        if slot >= self.capacity() {
            self.next_unused.fetch_sub(1, Ordering::AcqRel);
            tracing::error!(capacity = self.capacity(), "entry table exhausted");
            panic!("entry table exhausted ({} slots)", self.capacity());
        }
        slot
    }

    /// Lock a slot that was just claimed and is not yet linked into any chain.
    #[inline]
    pub fn try_lock_new_slot(&self, slot: u32) -> bool {
        self.entry(slot).latch.try_lock()
    }

    /// Return an unlinked slot to the free pool.
    ///
    /// The caller must hold the slot's lock; it is released here, before the slot
    /// becomes claimable again.
    pub fn release_slot(&self, slot: u32) {
        let entry = self.entry(slot);
        entry.set_next(NO_ENTRY);
        entry.set_cell_type(0);
        entry.latch.unlock();
        self.free_list.lock().push(slot);
    }

    /// Number of slots currently in use
    pub fn live_slots(&self) -> u32 {
        let handed_out = self.next_unused.load(Ordering::Acquire);
        handed_out
            .min(self.capacity())
            .saturating_sub(self.free_list.lock().len() as u32)
    }
}

impl std::fmt::Debug for EntryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryTable")
            .field("capacity", &self.capacity())
            .field("live_slots", &self.live_slots())
            .finish()
    }
}
