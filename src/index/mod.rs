//! Concurrent cell index
//!
//! This module maps cell ids to their storage in the partition's memory arena.
//! It is built from four parallel structures:
//! - [`BucketTable`]: chain heads, one latch per bucket
//! - [`EntryTable`]: entry slots (id, chain link, entry lock, type tag)
//! - [`LocationTable`]: packed `(offset, size)` per slot
//! - [`MemoryArena`](crate::arena::MemoryArena): the bytes themselves
//!
//! Lock order is bucket latch, then entry lock, then the arena's allocation
//! section. The bucket latch is always released before the allocation section is
//! entered.

mod bucket;
mod cell_index;
mod entry;
mod latch;
mod lease;
mod location_table;

pub use bucket::{Bucket, BucketGuard, BucketTable};
pub use cell_index::{CellIndex, CellIndexConfig, IndexStats};
pub use entry::{CellEntry, EntryTable};
pub use latch::SpinLatch;
pub use lease::{AddOrUse, CellLease};
pub use location_table::LocationTable;

use crate::utility::hash_cell_id;
use crate::CellId;

/// Chain sentinel for "no next slot" and "empty bucket"
pub const NO_ENTRY: i32 = -1;

/// Hash of a cell id, used to pick a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyHash {
    hash: u64,
}

impl KeyHash {
    /// Create a new key hash
    #[inline]
    pub const fn new(hash: u64) -> Self {
        Self { hash }
    }

    /// Hash a cell id
    #[inline]
    pub fn from_cell_id(cell_id: CellId) -> Self {
        Self::new(hash_cell_id(cell_id))
    }

    /// Get the full hash value
    #[inline]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Get the bucket index for a given table size (a power of two)
    #[inline]
    pub const fn hash_table_index(&self, size: u64) -> usize {
        (self.hash as usize) & ((size as usize) - 1)
    }
}

impl From<u64> for KeyHash {
    #[inline]
    fn from(hash: u64) -> Self {
        Self::new(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_hash_index() {
        let hash = KeyHash::new(0b1011_0110);
        assert_eq!(hash.hash_table_index(16), 0b0110);
        assert_eq!(hash.hash_table_index(1), 0);
    }

    #[test]
    fn test_key_hash_from_cell_id() {
        assert_eq!(KeyHash::from_cell_id(7), KeyHash::from_cell_id(7));
        assert_eq!(KeyHash::from_cell_id(7).hash(), hash_cell_id(7));
    }
}
