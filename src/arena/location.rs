//! Packed cell locations
//!
//! A cell's storage is described by an `(offset, size)` pair. The pair is packed
//! into one 64-bit word so it can be published with a single atomic store and
//! observed with a single atomic load, never torn.

use std::sync::atomic::{AtomicU64, Ordering};

/// Where a cell's bytes live inside the arena.
///
/// Encoded in the index as a signed 32-bit offset: `Inline(o)` is `o` and
/// `LargeObject(i)` is `-i`. Large-object indices start at 1, so an encoded `0`
/// is always the start of the inline region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellOffset {
    /// Byte offset into the inline region
    Inline(u32),
    /// Index into the large-object table (1-based)
    LargeObject(u32),
}

impl CellOffset {
    /// Largest inline offset that fits the encoding
    pub const MAX_INLINE: u32 = i32::MAX as u32;

    /// Encode into the signed on-index representation
    #[inline]
    pub const fn encode(self) -> i32 {
        match self {
            CellOffset::Inline(offset) => offset as i32,
            CellOffset::LargeObject(index) => -(index as i32),
        }
    }

    /// Decode from the signed on-index representation
    #[inline]
    pub const fn decode(raw: i32) -> Self {
        if raw >= 0 {
            CellOffset::Inline(raw as u32)
        } else {
            CellOffset::LargeObject(raw.unsigned_abs())
        }
    }

    /// Check if the offset refers to a large object
    #[inline]
    pub const fn is_large_object(&self) -> bool {
        matches!(self, CellOffset::LargeObject(_))
    }
}

/// Packed `(offset, size)` pair
///
/// Layout:
/// - offset (bits 0..32): encoded [`CellOffset`]
/// - size (bits 32..64): logical cell size in bytes
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CellLocation(u64);

impl CellLocation {
    /// Location of a slot that holds no cell
    pub const EMPTY: Self = Self(0);

    const OFFSET_MASK: u64 = (1 << 32) - 1;
    const SIZE_SHIFT: u32 = 32;

    /// Pack an offset and a size
    #[inline]
    pub const fn new(offset: CellOffset, size: i32) -> Self {
        let offset_bits = (offset.encode() as u32) as u64;
        let size_bits = ((size as u32) as u64) << Self::SIZE_SHIFT;
        Self(offset_bits | size_bits)
    }

    /// Create from raw control value
    #[inline]
    pub const fn from_control(control: u64) -> Self {
        Self(control)
    }

    /// Get the raw control value
    #[inline]
    pub const fn control(&self) -> u64 {
        self.0
    }

    /// Encoded signed offset
    #[inline]
    pub const fn raw_offset(&self) -> i32 {
        (self.0 & Self::OFFSET_MASK) as u32 as i32
    }

    /// Decoded offset
    #[inline]
    pub const fn offset(&self) -> CellOffset {
        CellOffset::decode(self.raw_offset())
    }

    /// Logical size in bytes
    #[inline]
    pub const fn size(&self) -> i32 {
        (self.0 >> Self::SIZE_SHIFT) as u32 as i32
    }
}

impl std::fmt::Debug for CellLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellLocation")
            .field("offset", &self.offset())
            .field("size", &self.size())
            .finish()
    }
}

/// Atomic version of [`CellLocation`]
#[repr(transparent)]
pub struct AtomicCellLocation {
    control: AtomicU64,
}

impl AtomicCellLocation {
    /// Create a new atomic location
    #[inline]
    pub const fn new(location: CellLocation) -> Self {
        Self {
            control: AtomicU64::new(location.0),
        }
    }

    /// Create an empty location
    #[inline]
    pub const fn empty() -> Self {
        Self::new(CellLocation::EMPTY)
    }

    /// Load both halves in one atomic read
    #[inline]
    pub fn load(&self, ordering: Ordering) -> CellLocation {
        CellLocation(self.control.load(ordering))
    }

    /// Publish both halves in one atomic write
    #[inline]
    pub fn store(&self, location: CellLocation, ordering: Ordering) {
        self.control.store(location.0, ordering);
    }
}

impl Default for AtomicCellLocation {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for AtomicCellLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicCellLocation")
            .field("location", &self.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_encoding_is_unshifted() {
        assert_eq!(CellOffset::Inline(0).encode(), 0);
        assert_eq!(CellOffset::Inline(4096).encode(), 4096);
        assert_eq!(CellOffset::LargeObject(1).encode(), -1);
        assert_eq!(CellOffset::LargeObject(17).encode(), -17);

        assert_eq!(CellOffset::decode(0), CellOffset::Inline(0));
        assert_eq!(CellOffset::decode(-3), CellOffset::LargeObject(3));
        assert_eq!(
            CellOffset::decode(CellOffset::MAX_INLINE as i32),
            CellOffset::Inline(CellOffset::MAX_INLINE)
        );
    }

    #[test]
    fn test_location_packing() {
        let loc = CellLocation::new(CellOffset::Inline(128), 77);
        assert_eq!(loc.offset(), CellOffset::Inline(128));
        assert_eq!(loc.size(), 77);
        assert_eq!(loc.control(), (77u64 << 32) | 128);

        let lo = CellLocation::new(CellOffset::LargeObject(5), i32::MAX);
        assert_eq!(lo.raw_offset(), -5);
        assert_eq!(lo.offset(), CellOffset::LargeObject(5));
        assert_eq!(lo.size(), i32::MAX);
    }

    #[test]
    fn test_empty_location() {
        assert_eq!(CellLocation::EMPTY.offset(), CellOffset::Inline(0));
        assert_eq!(CellLocation::EMPTY.size(), 0);
        assert_eq!(CellLocation::default(), CellLocation::EMPTY);
    }

    #[test]
    fn test_atomic_location_store_load() {
        let atomic = AtomicCellLocation::empty();
        let loc = CellLocation::new(CellOffset::LargeObject(2), 1 << 20);
        atomic.store(loc, Ordering::Release);
        assert_eq!(atomic.load(Ordering::Acquire), loc);
    }
}
