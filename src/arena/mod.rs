//! Memory arena backing cell storage
//!
//! The arena is split into two areas:
//! - an inline region, one fixed block addressed by non-negative byte offsets and
//!   filled by a bump pointer
//! - a large-object table of independently allocated blocks, addressed by a
//!   1-based index that the index stores as a negative offset
//!
//! All changes to allocator bookkeeping go through an [`AllocationSection`], the
//! partition-wide critical section obtained from [`MemoryArena::enter_allocation`].
//! Translating an offset into a pointer ([`MemoryArena::resolve`]) does not need
//! the section; callers hold the owning entry's lock instead.

mod large_object;
mod location;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::constants::CACHE_LINE_BYTES;
use crate::size::MIB;
use crate::utility::{pad_alignment, AlignedBuffer};

use large_object::LargeObjectTable;

pub use location::{AtomicCellLocation, CellLocation, CellOffset};

/// Alignment of every cell allocation
pub const CELL_ALIGNMENT: usize = 8;

/// Default inline region size (64 MiB)
pub const DEFAULT_INLINE_CAPACITY: usize = 64 * MIB;

/// Default size at which a cell is placed in the large-object table (1 MiB)
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: usize = MIB;

/// Configuration for the memory arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Size of the inline region in bytes (at most `i32::MAX`)
    pub inline_capacity: usize,
    /// Cells of at least this many bytes go to the large-object table
    pub large_object_threshold: usize,
}

impl ArenaConfig {
    /// Create a new configuration
    pub fn new(inline_capacity: usize, large_object_threshold: usize) -> Self {
        Self {
            inline_capacity,
            large_object_threshold,
        }
    }

    /// Set the inline region size
    pub fn with_inline_capacity(mut self, inline_capacity: usize) -> Self {
        self.inline_capacity = inline_capacity;
        self
    }

    /// Set the large-object threshold
    pub fn with_large_object_threshold(mut self, threshold: usize) -> Self {
        self.large_object_threshold = threshold;
        self
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            inline_capacity: DEFAULT_INLINE_CAPACITY,
            large_object_threshold: DEFAULT_LARGE_OBJECT_THRESHOLD,
        }
    }
}

/// Point-in-time arena usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Size of the inline region
    pub inline_capacity: usize,
    /// Bytes handed out by the bump pointer so far
    pub inline_committed: usize,
    /// Committed inline bytes no longer owned by any cell
    pub inline_garbage: usize,
    /// Live large objects
    pub large_objects: usize,
    /// Total capacity of live large objects
    pub large_object_bytes: usize,
    /// Inline-sized requests that spilled into the large-object table
    pub inline_spills: u64,
    /// Whether the arena changed since the last checkpoint
    pub dirty: bool,
}

impl std::fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Arena Statistics:")?;
        writeln!(
            f,
            "  Inline: {} / {} bytes ({} garbage)",
            self.inline_committed, self.inline_capacity, self.inline_garbage
        )?;
        writeln!(
            f,
            "  Large objects: {} ({} bytes)",
            self.large_objects, self.large_object_bytes
        )?;
        writeln!(f, "  Inline spills: {}", self.inline_spills)?;
        write!(f, "  Dirty: {}", self.dirty)
    }
}

/// Bump-pointer bookkeeping for the inline region
#[derive(Debug, Default)]
struct InlineAllocator {
    head: usize,
    garbage: usize,
    spills: u64,
}

/// Private memory arena for one partition
pub struct MemoryArena {
    inline: AlignedBuffer,
    inline_capacity: usize,
    large_object_threshold: usize,
    allocator: Mutex<InlineAllocator>,
    large_objects: LargeObjectTable,
    dirty: AtomicBool,
}

impl MemoryArena {
    /// Create an arena with a zeroed inline region
    ///
    /// # Panics
    /// Panics if `inline_capacity` exceeds `i32::MAX` or the region cannot be allocated.
    pub fn new(config: &ArenaConfig) -> Self {
        assert!(
            config.inline_capacity <= CellOffset::MAX_INLINE as usize,
            "Inline region too large"
        );
        let inline = AlignedBuffer::zeroed(CACHE_LINE_BYTES, config.inline_capacity)
            .unwrap_or_else(|| {
                panic!(
                    "failed to allocate {} byte inline region",
                    config.inline_capacity
                )
            });

        Self {
            inline,
            inline_capacity: config.inline_capacity,
            large_object_threshold: config.large_object_threshold,
            allocator: Mutex::new(InlineAllocator::default()),
            large_objects: LargeObjectTable::new(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Enter the allocation critical section.
    ///
    /// Only one thread per arena is inside at a time. The section ends when the
    /// returned guard is dropped.
    #[inline]
    pub fn enter_allocation(&self) -> AllocationSection<'_> {
        AllocationSection {
            arena: self,
            inline: self.allocator.lock(),
        }
    }

    /// Translate an offset into a live address.
    ///
    /// The address is valid while the caller holds the lock of the entry that owns
    /// the offset; growing or freeing that entry's storage invalidates it.
    ///
    /// # Panics
    /// Panics if a large-object offset does not name a live object.
    #[inline]
    pub fn resolve(&self, offset: CellOffset) -> *mut u8 {
        match offset {
            CellOffset::Inline(offset) => {
                debug_assert!(offset as usize <= self.inline_capacity);
                // SAFETY: offsets handed out by the bump pointer never exceed the capacity,
                // so the result is inside the region or one past its end.
                unsafe { self.inline.as_mut_ptr().add(offset as usize) }
            }
            CellOffset::LargeObject(index) => self.large_objects.ptr(index),
        }
    }

    /// Flag the arena as modified since the last checkpoint
    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Check if the arena was modified since the last checkpoint
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Reset the dirty flag, returning its previous value
    #[inline]
    pub fn clear_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Size of the inline region
    #[inline]
    pub fn inline_capacity(&self) -> usize {
        self.inline_capacity
    }

    /// Size at which cells go to the large-object table
    #[inline]
    pub fn large_object_threshold(&self) -> usize {
        self.large_object_threshold
    }

    /// Entry slot that owns a large object
    pub fn large_object_owner(&self, index: u32) -> Option<u32> {
        self.large_objects.owner(index)
    }

    /// Snapshot of arena usage
    pub fn stats(&self) -> ArenaStats {
        let (inline_committed, inline_garbage, inline_spills) = {
            let inline = self.allocator.lock();
            (inline.head, inline.garbage, inline.spills)
        };
        let (large_objects, large_object_bytes) = self.large_objects.usage();

        ArenaStats {
            inline_capacity: self.inline_capacity,
            inline_committed,
            inline_garbage,
            large_objects,
            large_object_bytes,
            inline_spills,
            dirty: self.is_dirty(),
        }
    }
}

impl std::fmt::Debug for MemoryArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryArena")
            .field("inline_capacity", &self.inline_capacity)
            .field("large_object_threshold", &self.large_object_threshold)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Guard for the arena's allocation critical section
pub struct AllocationSection<'a> {
    arena: &'a MemoryArena,
    inline: MutexGuard<'a, InlineAllocator>,
}

impl AllocationSection<'_> {
    /// Allocate storage for a new cell owned by entry slot `owner`.
    ///
    /// Large objects start zeroed. Inline bytes may hold data from a released cell.
    /// Requests below the large-object threshold are placed inline while space
    /// remains; everything else becomes a large object.
    pub fn allocate(&mut self, size: usize, owner: u32) -> CellOffset {
        if size < self.arena.large_object_threshold {
            if let Some(offset) = self.bump(size) {
                return CellOffset::Inline(offset);
            }
            self.inline.spills += 1;
            if tracing::enabled!(tracing::Level::WARN) {
                tracing::warn!(
                    size,
                    owner,
                    head = self.inline.head,
                    capacity = self.arena.inline_capacity,
                    "inline region full, placing cell in large-object table"
                );
            }
        }

        let index = self.arena.large_objects.insert(size, owner);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(index, size, owner, "large object allocated");
        }
        CellOffset::LargeObject(index)
    }

    /// Move an inline cell into storage for `new_size` bytes, keeping its first
    /// `min(old_size, new_size)` bytes.
    ///
    /// The newest inline allocation is extended in place when the region allows it.
    /// Large objects are grown in place instead.
    pub fn relocate(
        &mut self,
        current: CellOffset,
        old_size: usize,
        new_size: usize,
        owner: u32,
    ) -> CellOffset {
        let CellOffset::Inline(old_offset) = current else {
            if let CellOffset::LargeObject(index) = current {
                self.grow_large_object(index, old_size, new_size);
            }
            return current;
        };

        let old_start = old_offset as usize;
        let old_padded = pad_alignment(old_size, CELL_ALIGNMENT);
        let new_padded = pad_alignment(new_size, CELL_ALIGNMENT);
        if new_size < self.arena.large_object_threshold
            && old_start + old_padded == self.inline.head
            && old_start + new_padded <= self.arena.inline_capacity
        {
            self.inline.head = old_start + new_padded;
            return current;
        }

        let target = self.allocate(new_size, owner);
        let src = self.arena.resolve(current);
        let dst = self.arena.resolve(target);
        // SAFETY: source and target are distinct allocations of at least
        // `old_size.min(new_size)` bytes, and the caller holds the owner's entry lock.
        unsafe {
            std::ptr::copy_nonoverlapping(src, dst, old_size.min(new_size));
        }
        self.release_inline(old_start, old_size);
        target
    }

    /// Grow a large object without changing its index.
    pub fn grow_large_object(&mut self, index: u32, old_size: usize, new_size: usize) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(index, old_size, new_size, "growing large object in place");
        }
        self.arena.large_objects.grow(index, old_size, new_size);
    }

    /// Trim an inline cell from `old_size` to `new_size` bytes without moving it.
    ///
    /// The padded tail past `new_size` goes back to the arena, so an inline cell's
    /// footprint always matches its published size. Large objects keep their capacity.
    pub fn shrink(&mut self, offset: CellOffset, old_size: usize, new_size: usize) {
        let CellOffset::Inline(start) = offset else {
            return;
        };
        let old_padded = pad_alignment(old_size, CELL_ALIGNMENT);
        let new_padded = pad_alignment(new_size, CELL_ALIGNMENT);
        if new_padded < old_padded {
            self.release_inline(start as usize + new_padded, old_padded - new_padded);
        }
    }

    /// Return a cell's storage to the arena.
    ///
    /// `size` is the cell's published size, which for inline cells is also its footprint.
    pub fn free(&mut self, offset: CellOffset, size: usize) {
        match offset {
            CellOffset::Inline(offset) => self.release_inline(offset as usize, size),
            CellOffset::LargeObject(index) => {
                let freed = self.arena.large_objects.remove(index);
                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(index, freed, "large object freed");
                }
            }
        }
    }

    /// Flag the arena as modified since the last checkpoint
    #[inline]
    pub fn mark_dirty(&self) {
        self.arena.mark_dirty();
    }

    /// Translate an offset into a live address
    #[inline]
    pub fn resolve(&self, offset: CellOffset) -> *mut u8 {
        self.arena.resolve(offset)
    }

    fn bump(&mut self, size: usize) -> Option<u32> {
        let padded = pad_alignment(size, CELL_ALIGNMENT);
        let start = self.inline.head;
        let end = start.checked_add(padded)?;
        if end > self.arena.inline_capacity {
            return None;
        }
        self.inline.head = end;
        Some(start as u32)
    }

    fn release_inline(&mut self, start: usize, size: usize) {
        let padded = pad_alignment(size, CELL_ALIGNMENT);
        if start + padded == self.inline.head {
            self.inline.head = start;
        } else {
            self.inline.garbage += padded;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> MemoryArena {
        MemoryArena::new(&ArenaConfig::new(256, 128))
    }

    fn write(arena: &MemoryArena, offset: CellOffset, bytes: &[u8]) {
        // SAFETY: tests own the arena exclusively and stay within the allocation.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), arena.resolve(offset), bytes.len()) }
    }

    fn read(arena: &MemoryArena, offset: CellOffset, len: usize) -> Vec<u8> {
        // SAFETY: as above.
        unsafe { std::slice::from_raw_parts(arena.resolve(offset), len).to_vec() }
    }

    #[test]
    fn test_inline_allocation_is_padded() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        assert_eq!(section.allocate(5, 0), CellOffset::Inline(0));
        assert_eq!(section.allocate(8, 1), CellOffset::Inline(8));
        assert_eq!(section.allocate(0, 2), CellOffset::Inline(16));
        assert_eq!(section.allocate(1, 3), CellOffset::Inline(16));
        drop(section);

        assert_eq!(arena.stats().inline_committed, 24);
    }

    #[test]
    fn test_threshold_selects_large_object() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        assert_eq!(section.allocate(127, 0), CellOffset::Inline(0));
        assert_eq!(section.allocate(128, 1), CellOffset::LargeObject(1));
        drop(section);

        assert_eq!(arena.large_object_owner(1), Some(1));
        let stats = arena.stats();
        assert_eq!(stats.large_objects, 1);
        assert_eq!(stats.inline_spills, 0);
    }

    #[test]
    fn test_full_inline_region_spills() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        assert_eq!(section.allocate(120, 0), CellOffset::Inline(0));
        assert_eq!(section.allocate(120, 1), CellOffset::Inline(120));
        assert_eq!(section.allocate(120, 2), CellOffset::LargeObject(1));
        drop(section);

        assert_eq!(arena.stats().inline_spills, 1);
    }

    #[test]
    fn test_relocate_extends_tail_in_place() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let offset = section.allocate(8, 0);
        let moved = section.relocate(offset, 8, 40, 0);
        assert_eq!(moved, offset);
        drop(section);

        assert_eq!(arena.stats().inline_committed, 40);
    }

    #[test]
    fn test_relocate_copies_prefix() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let first = section.allocate(8, 0);
        let _second = section.allocate(8, 1);
        drop(section);
        write(&arena, first, b"prefix!!");

        let mut section = arena.enter_allocation();
        let moved = section.relocate(first, 8, 32, 0);
        drop(section);

        assert_ne!(moved, first);
        assert_eq!(read(&arena, moved, 8), b"prefix!!");
        assert_eq!(arena.stats().inline_garbage, 8);
    }

    #[test]
    fn test_relocate_promotes_to_large_object() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let first = section.allocate(16, 4);
        drop(section);
        write(&arena, first, b"0123456789abcdef");

        let mut section = arena.enter_allocation();
        let moved = section.relocate(first, 16, 200, 4);
        drop(section);

        assert_eq!(moved, CellOffset::LargeObject(1));
        assert_eq!(read(&arena, moved, 16), b"0123456789abcdef");
        // The old range was the tail, so the bump pointer rewinds.
        assert_eq!(arena.stats().inline_committed, 0);
    }

    #[test]
    fn test_large_object_grows_in_place() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let offset = section.allocate(130, 0);
        drop(section);
        write(&arena, offset, b"large");

        let mut section = arena.enter_allocation();
        let moved = section.relocate(offset, 130, 1000, 0);
        drop(section);

        assert_eq!(moved, offset);
        assert_eq!(read(&arena, offset, 5), b"large");
        assert_eq!(arena.stats().large_object_bytes, 1000);
    }

    #[test]
    fn test_shrink_returns_tail_to_garbage() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let first = section.allocate(64, 0);
        let _second = section.allocate(8, 1);
        section.shrink(first, 64, 8);
        section.free(first, 8);
        drop(section);

        let stats = arena.stats();
        assert_eq!(stats.inline_committed, 72);
        assert_eq!(stats.inline_garbage, 64);
    }

    #[test]
    fn test_shrink_at_tail_rewinds_head() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let offset = section.allocate(64, 0);
        section.shrink(offset, 64, 13);
        assert_eq!(arena_head(&section), 16);

        section.free(offset, 13);
        assert_eq!(arena_head(&section), 0);
        drop(section);

        assert_eq!(arena.stats().inline_garbage, 0);
    }

    #[test]
    fn test_shrink_leaves_large_object_capacity() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let offset = section.allocate(1000, 0);
        section.shrink(offset, 1000, 10);
        drop(section);

        assert_eq!(arena.stats().large_object_bytes, 1000);
    }

    fn arena_head(section: &AllocationSection<'_>) -> usize {
        section.inline.head
    }

    #[test]
    fn test_free_large_object_recycles_index() {
        let arena = small_arena();
        let mut section = arena.enter_allocation();
        let offset = section.allocate(500, 0);
        section.free(offset, 500);
        assert_eq!(section.allocate(600, 1), offset);
    }

    #[test]
    fn test_dirty_flag() {
        let arena = small_arena();
        assert!(!arena.is_dirty());
        arena.enter_allocation().mark_dirty();
        assert!(arena.is_dirty());
        assert!(arena.clear_dirty());
        assert!(!arena.is_dirty());
    }
}
