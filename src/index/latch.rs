use std::sync::atomic::{AtomicBool, Ordering};

/// Spins before yielding the thread while waiting for a latch
const SPIN_LIMIT: u32 = 64;

/// Exclusive spin latch.
///
/// Used for both bucket and entry locks. Unlike a mutex guard, ownership of a
/// latch may be handed across call boundaries: the entry latch is acquired inside
/// a lookup and released later by the caller's lease.
#[repr(transparent)]
#[derive(Default)]
pub struct SpinLatch {
    locked: AtomicBool,
}

impl SpinLatch {
    /// Create an unlocked latch
    #[inline]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Try to acquire the latch without waiting
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire the latch, spinning and then yielding until it is free
    #[inline]
    pub fn lock(&self) {
        let mut spins = 0u32;
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                if spins < SPIN_LIMIT {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Release the latch
    #[inline]
    pub fn unlock(&self) {
        debug_assert!(self.is_locked(), "unlock called on a free latch");
        self.locked.store(false, Ordering::Release);
    }

    /// Check if the latch is currently held
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SpinLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinLatch")
            .field("locked", &self.is_locked())
            .finish()
    }
}
