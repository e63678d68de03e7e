//! Cell index for one partition
//!
//! Ties the bucket, entry and location tables to the partition's memory arena and
//! implements the chain lookup that every public operation starts with. The
//! public lock operations live in `ops.rs`.

mod ops;


use crate::arena::{ArenaConfig, ArenaStats, CellLocation, CellOffset, MemoryArena};
use crate::config::ConfigError;
use crate::index::bucket::{BucketGuard, BucketTable};
use crate::index::entry::EntryTable;
use crate::index::lease::CellLease;
use crate::index::location_table::LocationTable;
use crate::index::{KeyHash, NO_ENTRY};
use crate::status::{OperationType, Status};
use crate::utility::{is_power_of_two, next_power_of_two};
use crate::{CellId, CellType};

/// Spins before a waiting lookup starts yielding
const LOOKUP_SPIN_LIMIT: u32 = 32;

/// Configuration for a cell index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellIndexConfig {
    /// Number of buckets (must be power of 2)
    pub bucket_count: u32,
    /// Number of entry slots, i.e. the maximum number of live cells
    pub entry_capacity: u32,
    /// Whether each cell carries a type tag
    pub cell_type_enabled: bool,
    /// Arena configuration
    pub arena: ArenaConfig,
}

impl CellIndexConfig {
    /// Create a new configuration with the default arena
    pub fn new(bucket_count: u32, entry_capacity: u32) -> Self {
        Self {
            bucket_count,
            entry_capacity,
            cell_type_enabled: false,
            arena: ArenaConfig::default(),
        }
    }

    /// Size the bucket table for `entry_capacity` cells (one bucket per cell)
    pub fn for_capacity(entry_capacity: u32) -> Self {
        let bucket_count = next_power_of_two(entry_capacity.max(1) as u64).min(1 << 30) as u32;
        Self::new(bucket_count, entry_capacity)
    }

    /// Enable or disable type tags
    pub fn with_cell_types(mut self, enabled: bool) -> Self {
        self.cell_type_enabled = enabled;
        self
    }

    /// Set the arena configuration
    pub fn with_arena(mut self, arena: ArenaConfig) -> Self {
        self.arena = arena;
        self
    }

    /// Check the configuration for values the index cannot represent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_power_of_two(self.bucket_count as u64) || self.bucket_count >= i32::MAX as u32 {
            return Err(ConfigError::InvalidValue {
                key: "index.bucket_count".to_string(),
                value: self.bucket_count.to_string(),
            });
        }
        if self.entry_capacity == 0 || self.entry_capacity > i32::MAX as u32 {
            return Err(ConfigError::InvalidValue {
                key: "index.entry_capacity".to_string(),
                value: self.entry_capacity.to_string(),
            });
        }
        if self.arena.inline_capacity > CellOffset::MAX_INLINE as usize {
            return Err(ConfigError::InvalidValue {
                key: "arena.inline_capacity".to_string(),
                value: self.arena.inline_capacity.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CellIndexConfig {
    fn default() -> Self {
        Self::new(1 << 16, 1 << 20)
    }
}

/// Result of a chain lookup
///
/// The bucket latch is still held in both variants. On `Found`, the entry lock is
/// held too when the lookup was asked to take it.
pub(crate) enum Lookup<'a> {
    Found { slot: u32, bucket: BucketGuard<'a> },
    NotFound { bucket: BucketGuard<'a> },
}

/// Concurrent in-memory index of one partition's cells
pub struct CellIndex {
    buckets: BucketTable,
    entries: EntryTable,
    locations: LocationTable,
    arena: MemoryArena,
    cell_type_enabled: bool,
}

impl CellIndex {
    /// Build an index and its arena
    pub fn new(config: CellIndexConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let index = Self {
            buckets: BucketTable::new(config.bucket_count),
            entries: EntryTable::new(config.entry_capacity),
            locations: LocationTable::new(config.entry_capacity),
            arena: MemoryArena::new(&config.arena),
            cell_type_enabled: config.cell_type_enabled,
        };

        tracing::info!(
            bucket_count = config.bucket_count,
            entry_capacity = config.entry_capacity,
            inline_capacity = config.arena.inline_capacity,
            large_object_threshold = config.arena.large_object_threshold,
            cell_type_enabled = config.cell_type_enabled,
            "cell index created"
        );
        Ok(index)
    }

    /// Number of buckets
    #[inline]
    pub fn bucket_count(&self) -> u32 {
        self.buckets.size()
    }

    /// Maximum number of live cells
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.entries.capacity()
    }

    /// Whether cells carry type tags
    #[inline]
    pub fn cell_type_enabled(&self) -> bool {
        self.cell_type_enabled
    }

    /// The partition's arena
    #[inline]
    pub fn arena(&self) -> &MemoryArena {
        &self.arena
    }

    /// Number of live cells
    pub fn len(&self) -> usize {
        self.entries.live_slots() as usize
    }

    /// Check if the index holds no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the arena changed since the last checkpoint
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.arena.is_dirty()
    }

    /// Reset the arena's dirty flag, returning its previous value
    #[inline]
    pub fn clear_dirty(&self) -> bool {
        self.arena.clear_dirty()
    }

    /// Check if a cell exists
    pub fn contains(&self, cell_id: CellId) -> bool {
        matches!(self.lookup(cell_id, false), Lookup::Found { .. })
    }

    /// Current logical size of a cell
    pub fn cell_size(&self, cell_id: CellId) -> Option<usize> {
        self.lock_for_load(cell_id).ok().map(|lease| lease.size())
    }

    /// Type tag of a cell, when type tagging is enabled
    pub fn cell_type(&self, cell_id: CellId) -> Option<CellType> {
        if !self.cell_type_enabled {
            return None;
        }
        self.lock_for_access(cell_id)
            .ok()
            .and_then(|lease| lease.cell_type())
    }

    /// Remove a cell and return its storage and slot to the free pools.
    ///
    /// Waits for any outstanding lease on the cell to be released.
    pub fn remove(&self, cell_id: CellId) -> Status {
        match self.lookup(cell_id, true) {
            Lookup::NotFound { .. } => {
                ops::rejected(OperationType::Remove, cell_id, Status::CellNotFound)
            }
            Lookup::Found { slot, bucket } => {
                self.unlink(&bucket, slot);
                drop(bucket);

                let location = self.locations.load(slot);
                {
                    let mut section = self.arena.enter_allocation();
                    section.free(location.offset(), location.size() as usize);
                    section.mark_dirty();
                }
                self.locations.clear(slot);
                self.entries.release_slot(slot);

                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(cell_id, slot, size = location.size(), "cell removed");
                }
                Status::Success
            }
        }
    }

    /// Snapshot of index and arena usage
    ///
    /// Walks every chain under its bucket latch; intended for diagnostics.
    pub fn stats(&self) -> IndexStats {
        let mut used_buckets = 0u32;
        let mut longest_chain = 0u32;
        for index in 0..self.buckets.size() {
            let bucket = self.buckets.lock(index);
            let mut len = 0u32;
            let mut slot = bucket.head();
            while slot != NO_ENTRY {
                len += 1;
                slot = self.entries.entry(slot as u32).next();
            }
            if len > 0 {
                used_buckets += 1;
            }
            longest_chain = longest_chain.max(len);
        }

        IndexStats {
            bucket_count: self.buckets.size(),
            entry_capacity: self.entries.capacity(),
            live_cells: self.entries.live_slots(),
            used_buckets,
            longest_chain,
            arena: self.arena.stats(),
        }
    }

    /// Walk the bucket chain for `cell_id`.
    ///
    /// With `lock_entry`, a hit also takes the entry lock. If the entry is leased
    /// elsewhere, the bucket latch is dropped while waiting and the walk restarts,
    /// so a long-held lease never blocks the rest of its bucket.
    pub(crate) fn lookup(&self, cell_id: CellId, lock_entry: bool) -> Lookup<'_> {
        let bucket_index = self.buckets.index_of(KeyHash::from_cell_id(cell_id));
        let mut spins = 0u32;

        loop {
            let bucket = self.buckets.lock(bucket_index);
            let Some(slot) = self.find_in_chain(&bucket, cell_id) else {
                return Lookup::NotFound { bucket };
            };
            if !lock_entry || self.entries.entry(slot).latch().try_lock() {
                return Lookup::Found { slot, bucket };
            }
            drop(bucket);

            if spins < LOOKUP_SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    fn find_in_chain(&self, bucket: &BucketGuard<'_>, cell_id: CellId) -> Option<u32> {
        let mut slot = bucket.head();
        while slot != NO_ENTRY {
            let entry = self.entries.entry(slot as u32);
            if entry.key() == cell_id {
                return Some(slot as u32);
            }
            slot = entry.next();
        }
        None
    }

    fn unlink(&self, bucket: &BucketGuard<'_>, slot: u32) {
        let next = self.entries.entry(slot).next();
        if bucket.head() == slot as i32 {
            bucket.set_head(next);
            return;
        }

        let mut prev = bucket.head();
        while prev != NO_ENTRY {
            let entry = self.entries.entry(prev as u32);
            if entry.next() == slot as i32 {
                entry.set_next(next);
                return;
            }
            prev = entry.next();
        }
        debug_assert!(false, "slot {slot} not in bucket {}", bucket.index());
    }

    /// Claim, lock and link a fresh slot, then give it storage.
    ///
    /// Consumes the bucket guard: the latch is released once the slot is linked,
    /// before the allocation section is entered.
    fn insert_locked(
        &self,
        bucket: BucketGuard<'_>,
        cell_id: CellId,
        size: i32,
        cell_type: CellType,
    ) -> CellLease<'_> {
        let slot = self.entries.find_free_slot();
        if !self.entries.try_lock_new_slot(slot) {
            tracing::error!(slot, cell_id, "freshly claimed slot is already locked");
            panic!("freshly claimed slot {slot} is already locked");
        }

        let entry = self.entries.entry(slot);
        entry.set_key(cell_id);
        entry.set_next(bucket.head());
        bucket.set_head(slot as i32);
        drop(bucket);

        let ptr = {
            let mut section = self.arena.enter_allocation();
            let offset = section.allocate(size as usize, slot);
            let ptr = section.resolve(offset);
            if self.cell_type_enabled {
                entry.set_cell_type(cell_type);
            }
            self.locations.publish(slot, CellLocation::new(offset, size));
            ptr
        };

        self.lease(slot, cell_id, ptr, size)
    }

    /// Give a locked, live slot at least `size` bytes and publish the new pair.
    ///
    /// Storage is kept when it is already large enough (an inline cell gives back
    /// its padded tail), a large object grows in place, and an inline cell is
    /// relocated (its prefix is preserved).
    fn resize_locked(&self, slot: u32, size: i32) -> *mut u8 {
        let current = self.locations.load(slot);
        let mut section = self.arena.enter_allocation();

        let mut offset = current.offset();
        if size > current.size() {
            match offset {
                CellOffset::LargeObject(index) => {
                    section.grow_large_object(index, current.size() as usize, size as usize);
                }
                CellOffset::Inline(_) => {
                    offset = section.relocate(
                        offset,
                        current.size() as usize,
                        size as usize,
                        slot,
                    );
                    section.mark_dirty();
                }
            }
        } else if size < current.size() {
            section.shrink(offset, current.size() as usize, size as usize);
        }

        let ptr = section.resolve(offset);
        self.locations.publish(slot, CellLocation::new(offset, size));
        ptr
    }

    /// Lease for a locked, live slot at its current location
    fn lease_current(&self, slot: u32, cell_id: CellId) -> CellLease<'_> {
        let location = self.locations.load(slot);
        let ptr = self.arena.resolve(location.offset());
        self.lease(slot, cell_id, ptr, location.size())
    }

    fn lease(&self, slot: u32, cell_id: CellId, ptr: *mut u8, size: i32) -> CellLease<'_> {
        let cell_type = self
            .cell_type_enabled
            .then(|| self.entries.entry(slot).cell_type());
        CellLease::new(&self.entries, slot, cell_id, ptr, size as usize, cell_type)
    }
}

impl std::fmt::Debug for CellIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellIndex")
            .field("buckets", &self.buckets)
            .field("entries", &self.entries)
            .field("arena", &self.arena)
            .field("cell_type_enabled", &self.cell_type_enabled)
            .finish()
    }
}

/// Point-in-time index usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of buckets
    pub bucket_count: u32,
    /// Number of entry slots
    pub entry_capacity: u32,
    /// Live cells
    pub live_cells: u32,
    /// Buckets with at least one cell
    pub used_buckets: u32,
    /// Longest bucket chain
    pub longest_chain: u32,
    /// Arena usage
    pub arena: ArenaStats,
}

impl IndexStats {
    /// Entry slots available for new cells
    pub fn free_slots(&self) -> u32 {
        self.entry_capacity.saturating_sub(self.live_cells)
    }

    /// Live cells per bucket
    pub fn load_factor(&self) -> f64 {
        if self.bucket_count == 0 {
            0.0
        } else {
            self.live_cells as f64 / self.bucket_count as f64
        }
    }
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cell Index Statistics:")?;
        writeln!(f, "  Buckets: {} ({} used)", self.bucket_count, self.used_buckets)?;
        writeln!(f, "  Cells: {} / {}", self.live_cells, self.entry_capacity)?;
        writeln!(f, "  Load factor: {:.4}", self.load_factor())?;
        writeln!(f, "  Longest chain: {}", self.longest_chain)?;
        write!(f, "{}", self.arena)
    }
}
