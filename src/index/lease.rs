//! Scoped entry locks handed back to callers
//!
//! A successful lookup returns a [`CellLease`]: it owns the cell's entry lock and
//! the address of the cell's bytes. The lock is released exactly once, when the
//! lease is dropped or explicitly released.

use crate::index::entry::EntryTable;
use crate::{CellId, CellType};

/// Exclusive lease on one cell's storage
///
/// While the lease is alive no other operation can read, resize, relocate or
/// remove the cell, so the pointer and slices it hands out stay valid.
#[must_use = "dropping a lease immediately releases the cell lock"]
pub struct CellLease<'a> {
    entries: &'a EntryTable,
    slot: u32,
    cell_id: CellId,
    ptr: *mut u8,
    size: usize,
    cell_type: Option<CellType>,
}

impl<'a> CellLease<'a> {
    /// Wrap an entry lock that the caller already holds.
    pub(crate) fn new(
        entries: &'a EntryTable,
        slot: u32,
        cell_id: CellId,
        ptr: *mut u8,
        size: usize,
        cell_type: Option<CellType>,
    ) -> Self {
        debug_assert!(entries.entry(slot).latch().is_locked());
        debug_assert!(!ptr.is_null());
        Self {
            entries,
            slot,
            cell_id,
            ptr,
            size,
            cell_type,
        }
    }

    /// Entry slot index of the cell
    #[inline]
    pub fn entry_index(&self) -> u32 {
        self.slot
    }

    /// Cell id
    #[inline]
    pub fn cell_id(&self) -> CellId {
        self.cell_id
    }

    /// Logical size of the cell in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Type tag, when type tagging is enabled for the index
    #[inline]
    pub fn cell_type(&self) -> Option<CellType> {
        self.cell_type
    }

    /// Raw address of the cell's first byte
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// Raw mutable address of the cell's first byte
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    /// The cell's bytes
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the arena keeps `size` bytes at `ptr` alive and unmoved while the
        // entry lock is held, and the lock excludes every other accessor.
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    /// The cell's bytes, writable
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`; `&mut self` rules out aliasing through this lease.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    /// Release the entry lock now
    #[inline]
    pub fn release(self) {}
}

impl Drop for CellLease<'_> {
    fn drop(&mut self) {
        self.entries.entry(self.slot).latch().unlock();
    }
}

impl std::fmt::Debug for CellLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellLease")
            .field("entry_index", &self.slot)
            .field("cell_id", &self.cell_id)
            .field("size", &self.size)
            .field("cell_type", &self.cell_type)
            .finish()
    }
}

/// Outcome of `lock_for_add_or_use`
#[derive(Debug)]
pub enum AddOrUse<'a> {
    /// The cell already existed; the lease reports its current size
    Found(CellLease<'a>),
    /// A new cell was created with the requested size
    Created(CellLease<'a>),
}

impl<'a> AddOrUse<'a> {
    /// Status code for this outcome: `CellFound` or `CellNotFound` (created)
    #[inline]
    pub fn status(&self) -> crate::status::Status {
        match self {
            AddOrUse::Found(_) => crate::status::Status::CellFound,
            AddOrUse::Created(_) => crate::status::Status::CellNotFound,
        }
    }

    /// Check if the cell already existed
    #[inline]
    pub fn was_found(&self) -> bool {
        matches!(self, AddOrUse::Found(_))
    }

    /// Borrow the lease
    #[inline]
    pub fn lease(&self) -> &CellLease<'a> {
        match self {
            AddOrUse::Found(lease) | AddOrUse::Created(lease) => lease,
        }
    }

    /// Borrow the lease mutably
    #[inline]
    pub fn lease_mut(&mut self) -> &mut CellLease<'a> {
        match self {
            AddOrUse::Found(lease) | AddOrUse::Created(lease) => lease,
        }
    }

    /// Take the lease
    #[inline]
    pub fn into_lease(self) -> CellLease<'a> {
        match self {
            AddOrUse::Found(lease) | AddOrUse::Created(lease) => lease,
        }
    }
}
