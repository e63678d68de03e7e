//! Utility functions shared by the arena and the index
//!
//! Alignment helpers, owned aligned buffers, and cell id hashing.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

#[cfg(not(any(feature = "hash-xxh3", feature = "hash-xxh64")))]
compile_error!("Enable a hash feature: `hash-xxh3` (default) or `hash-xxh64`.");

/// Check if a value is a power of two
#[inline]
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Round up to the next power of two
#[inline]
pub const fn next_power_of_two(mut n: u64) -> u64 {
    if n == 0 {
        return 1;
    }
    n -= 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n |= n >> 32;
    n + 1
}

/// Pad a size to the specified alignment
#[inline]
pub const fn pad_alignment(size: usize, alignment: usize) -> usize {
    debug_assert!(is_power_of_two(alignment as u64));
    (size + alignment - 1) & !(alignment - 1)
}

/// Hash a cell id into a 64-bit value (deterministic across runs).
#[inline]
pub fn hash_cell_id(cell_id: u64) -> u64 {
    let bytes = cell_id.to_le_bytes();

    #[cfg(feature = "hash-xxh3")]
    {
        xxhash_rust::xxh3::xxh3_64(&bytes)
    }

    #[cfg(all(not(feature = "hash-xxh3"), feature = "hash-xxh64"))]
    {
        xxhash_rust::xxh64::xxh64(&bytes, 0)
    }
}

/// Owned, zero-initialized, aligned heap block
///
/// Backs both the arena's inline region and each large object. The block never
/// moves once allocated, so raw pointers into it stay valid until it is dropped.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a new zeroed aligned buffer.
    ///
    /// Zero-sized requests are rounded up to one byte so every buffer has a real
    /// address. Returns `None` for an invalid layout or when the allocator fails.
    pub fn zeroed(alignment: usize, size: usize) -> Option<Self> {
        debug_assert!(is_power_of_two(alignment as u64));
        let layout = Layout::from_size_align(size.max(1), alignment).ok()?;
        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).map(|ptr| Self { ptr, layout })
    }

    /// Get a pointer to the buffer
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr() as *const u8
    }

    /// Get a mutable pointer to the buffer
    ///
    /// Writers must hold whatever lock guards the bytes they touch; the buffer
    /// itself does not synchronize.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Get the size of the buffer
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Get a slice view of the buffer
    #[cfg(test)]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the block is `layout.size()` initialized bytes owned by `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// Get a mutable slice view of the buffer
    #[cfg(test)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `alloc_zeroed` with exactly this layout.
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("size", &self.layout.size())
            .field("alignment", &self.layout.align())
            .finish()
    }
}

// Safety: AlignedBuffer owns its memory; concurrent writes are coordinated by callers
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}
