use std::alloc::{handle_alloc_error, Layout};

use parking_lot::{Mutex, RwLock};

use crate::arena::CELL_ALIGNMENT;
use crate::utility::AlignedBuffer;

/// A separately allocated block for one oversized cell.
pub(super) struct LargeObject {
    buffer: AlignedBuffer,
    /// Entry slot that owns the object
    owner: u32,
}

impl LargeObject {
    fn allocate(size: usize, owner: u32) -> Self {
        let buffer = AlignedBuffer::zeroed(CELL_ALIGNMENT, size)
            .unwrap_or_else(|| handle_alloc_error(layout_for(size)));
        Self { buffer, owner }
    }
}

fn layout_for(size: usize) -> Layout {
    Layout::from_size_align(size.max(1), CELL_ALIGNMENT).unwrap_or_else(|_| Layout::new::<u64>())
}

/// Table of large objects, addressed by 1-based index.
///
/// - Index 0 is never handed out, so the encoded offset `-index` is always negative.
/// - Each object is its own heap block. Growing replaces the block but keeps the index.
/// - Freed indices go on a free list and are reused before the table is extended.
///
/// Mutations happen only inside the arena's allocation section; `ptr` may be called
/// from any thread holding the owning entry's lock.
pub(super) struct LargeObjectTable {
    objects: RwLock<Vec<Option<LargeObject>>>,
    free_list: Mutex<Vec<u32>>,
}

impl LargeObjectTable {
    pub(super) fn new() -> Self {
        Self {
            // Slot 0 is reserved.
            objects: RwLock::new(vec![None]),
            free_list: Mutex::new(Vec::new()),
        }
    }

    /// Allocate a zeroed object and return its index (never 0).
    pub(super) fn insert(&self, size: usize, owner: u32) -> u32 {
        let object = LargeObject::allocate(size, owner);

        if let Some(index) = self.free_list.lock().pop() {
            let mut objects = self.objects.write();
            debug_assert!(objects[index as usize].is_none());
            objects[index as usize] = Some(object);
            return index;
        }

        let mut objects = self.objects.write();
        objects.push(Some(object));
        (objects.len() - 1) as u32
    }

    /// Grow an object to `new_size`, keeping the first `old_size` bytes.
    ///
    /// # Panics
    /// Panics if `index` is not live.
    pub(super) fn grow(&self, index: u32, old_size: usize, new_size: usize) {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(index as usize)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("large object {index} is not live"));

        if object.buffer.size() >= new_size {
            return;
        }

        let replacement = LargeObject::allocate(new_size, object.owner);
        let keep = old_size.min(object.buffer.size());
        // SAFETY: both blocks are at least `keep` bytes and do not overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                object.buffer.as_ptr(),
                replacement.buffer.as_mut_ptr(),
                keep,
            );
        }
        *object = replacement;
    }

    /// Free an object and recycle its index.
    pub(super) fn remove(&self, index: u32) -> usize {
        let removed = {
            let mut objects = self.objects.write();
            objects.get_mut(index as usize).and_then(Option::take)
        };
        match removed {
            Some(object) => {
                self.free_list.lock().push(index);
                object.buffer.size()
            }
            None => 0,
        }
    }

    /// Start address of a live object.
    ///
    /// # Panics
    /// Panics if `index` is not live.
    pub(super) fn ptr(&self, index: u32) -> *mut u8 {
        let objects = self.objects.read();
        objects
            .get(index as usize)
            .and_then(Option::as_ref)
            .map(|object| object.buffer.as_mut_ptr())
            .unwrap_or_else(|| panic!("large object {index} is not live"))
    }

    #[cfg(test)]
    pub(super) fn capacity(&self, index: u32) -> Option<usize> {
        let objects = self.objects.read();
        objects
            .get(index as usize)
            .and_then(Option::as_ref)
            .map(|object| object.buffer.size())
    }

    /// Entry slot recorded as the object's owner
    pub(super) fn owner(&self, index: u32) -> Option<u32> {
        let objects = self.objects.read();
        objects
            .get(index as usize)
            .and_then(Option::as_ref)
            .map(|object| object.owner)
    }

    /// Number of live objects and their total capacity
    pub(super) fn usage(&self) -> (usize, usize) {
        let objects = self.objects.read();
        objects
            .iter()
            .flatten()
            .fold((0, 0), |(count, bytes), object| {
                (count + 1, bytes + object.buffer.size())
            })
    }

    #[cfg(test)]
    pub(super) fn free_list_len(&self) -> usize {
        self.free_list.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::LargeObjectTable;

    #[test]
    fn test_large_object_indices_start_at_one() {
        let table = LargeObjectTable::new();
        let a = table.insert(64, 7);
        let b = table.insert(64, 8);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(table.owner(a), Some(7));
        assert_eq!(table.usage(), (2, 128));
    }

    #[test]
    fn test_large_object_reuses_removed_index() {
        let table = LargeObjectTable::new();
        let a = table.insert(32, 0);
        let _b = table.insert(32, 1);

        assert_eq!(table.remove(a), 32);
        assert_eq!(table.free_list_len(), 1);
        assert_eq!(table.capacity(a), None);

        let c = table.insert(16, 2);
        assert_eq!(c, a);
        assert_eq!(table.free_list_len(), 0);
        assert_eq!(table.capacity(c), Some(16));
    }

    #[test]
    fn test_large_object_grow_keeps_prefix() {
        let table = LargeObjectTable::new();
        let index = table.insert(8, 3);
        let ptr = table.ptr(index);
        // SAFETY: the object is 8 bytes long and not shared.
        unsafe { std::ptr::copy_nonoverlapping(b"abcdefgh".as_ptr(), ptr, 8) };

        table.grow(index, 8, 4096);
        assert_eq!(table.capacity(index), Some(4096));
        assert_eq!(table.owner(index), Some(3));

        let grown = table.ptr(index);
        // SAFETY: the object is now 4096 bytes long.
        let bytes = unsafe { std::slice::from_raw_parts(grown, 4096) };
        assert_eq!(&bytes[..8], b"abcdefgh");
        assert!(bytes[8..].iter().all(|b| *b == 0));
    }

    #[test]
    #[should_panic]
    fn test_large_object_ptr_of_reserved_index_panics() {
        let table = LargeObjectTable::new();
        let _ = table.ptr(0);
    }
}
