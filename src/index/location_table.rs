use std::sync::atomic::Ordering;

use crate::arena::{AtomicCellLocation, CellLocation};

/// Packed `(offset, size)` pair per entry slot, indexed like the entry table.
///
/// Writers publish with one release store after the arena call completes;
/// readers take one acquire load and never see a mix of two writes.
pub struct LocationTable {
    locations: Box<[AtomicCellLocation]>,
}

impl LocationTable {
    /// Create a table of `capacity` empty locations
    pub fn new(capacity: u32) -> Self {
        Self {
            locations: (0..capacity).map(|_| AtomicCellLocation::empty()).collect(),
        }
    }

    /// Snapshot the location of a slot
    #[inline]
    pub fn load(&self, slot: u32) -> CellLocation {
        self.locations[slot as usize].load(Ordering::Acquire)
    }

    /// Publish a new location for a slot
    #[inline]
    pub fn publish(&self, slot: u32, location: CellLocation) {
        self.locations[slot as usize].store(location, Ordering::Release);
    }

    /// Reset a slot to the empty location
    #[inline]
    pub fn clear(&self, slot: u32) {
        self.publish(slot, CellLocation::EMPTY);
    }

    /// Number of locations
    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Check if the table has no locations
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
