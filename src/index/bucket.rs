//! Bucket table for the cell index
//!
//! Each bucket is the head of a singly linked chain of entry slots, guarded by its
//! own latch. Chain links are only read or written while the bucket latch is held.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::index::latch::SpinLatch;
use crate::index::{KeyHash, NO_ENTRY};
use crate::utility::is_power_of_two;

/// One chain head plus its latch
#[derive(Debug)]
pub struct Bucket {
    head: AtomicI32,
    latch: SpinLatch,
}

impl Bucket {
    /// Create an empty bucket
    pub const fn new() -> Self {
        Self {
            head: AtomicI32::new(NO_ENTRY),
            latch: SpinLatch::new(),
        }
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-size array of buckets
pub struct BucketTable {
    buckets: Box<[Bucket]>,
}

impl BucketTable {
    /// Create a table with `size` empty buckets
    ///
    /// # Panics
    /// Panics if size is not a power of two or exceeds i32::MAX
    pub fn new(size: u32) -> Self {
        assert!(size < i32::MAX as u32, "Bucket table size too large");
        assert!(
            is_power_of_two(size as u64),
            "Bucket table size must be power of 2"
        );
        Self {
            buckets: (0..size).map(|_| Bucket::new()).collect(),
        }
    }

    /// Get the number of buckets
    #[inline]
    pub fn size(&self) -> u32 {
        self.buckets.len() as u32
    }

    /// Bucket index for a hash
    #[inline]
    pub fn index_of(&self, hash: KeyHash) -> u32 {
        hash.hash_table_index(self.size() as u64) as u32
    }

    /// Lock a bucket and return a guard for its chain
    #[inline]
    pub fn lock(&self, index: u32) -> BucketGuard<'_> {
        let bucket = &self.buckets[index as usize];
        bucket.latch.lock();
        BucketGuard { bucket, index }
    }

    #[cfg(test)]
    fn head_relaxed(&self, index: u32) -> i32 {
        self.buckets[index as usize].head.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BucketTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketTable")
            .field("size", &self.size())
            .finish()
    }
}

/// Holds one bucket's latch until dropped
pub struct BucketGuard<'a> {
    bucket: &'a Bucket,
    index: u32,
}

impl BucketGuard<'_> {
    /// Bucket index this guard protects
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// First slot in the chain, or `NO_ENTRY`
    #[inline]
    pub fn head(&self) -> i32 {
        self.bucket.head.load(Ordering::Relaxed)
    }

    /// Replace the chain head
    #[inline]
    pub fn set_head(&self, slot: i32) {
        self.bucket.head.store(slot, Ordering::Relaxed);
    }

    /// Release the latch now
    #[inline]
    pub fn release(self) {}
}

impl Drop for BucketGuard<'_> {
    fn drop(&mut self) {
        self.bucket.latch.unlock();
    }
}
