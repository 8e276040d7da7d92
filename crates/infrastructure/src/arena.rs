//! Pre-allocated entry storage shared by the segmented tables.
//!
//! Slots are addressed by stable `u32` indices; a mutex-guarded free stack
//! hands them out. Ownership protocol: after `alloc` the caller is the sole
//! owner of the slot until it links the index into exactly one segment's
//! structures; from then on the slot is only touched under that segment's
//! lock, until it is unlinked again and returned via `release`. The free
//! stack and the segments therefore never reference the same index at the
//! same time.

use parking_lot::Mutex;
use std::cell::UnsafeCell;

/// Sentinel index for absent links.
pub const NIL: u32 = u32::MAX;

pub struct Arena<T> {
    slots: Box<[UnsafeCell<T>]>,
    free: Mutex<Vec<u32>>,
}

// SAFETY: slot access is serialized by the ownership protocol above; the
// free stack has its own mutex.
unsafe impl<T: Send> Sync for Arena<T> {}

impl<T: Default> Arena<T> {
    pub fn new(capacity: usize) -> Self {
        let slots: Box<[UnsafeCell<T>]> =
            (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
        // Low indices on top of the stack, matching insertion order in tests.
        let free: Vec<u32> = (0..capacity as u32).rev().collect();
        Self {
            slots,
            free: Mutex::new(free),
        }
    }

    /// Pop a free slot index. `None` when the arena is exhausted.
    pub fn alloc(&self) -> Option<u32> {
        self.free.lock().pop()
    }

    /// Return a slot to the free stack. The caller must have unlinked the
    /// index from any segment structures first.
    pub fn release(&self, index: u32) {
        debug_assert!((index as usize) < self.slots.len());
        self.free.lock().push(index);
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_len(&self) -> usize {
        self.free.lock().len()
    }

    /// Shared access to a slot.
    ///
    /// # Safety
    /// The caller must hold the lock of the segment that owns `index` (read
    /// or write), or be the sole owner of a freshly allocated index.
    #[inline]
    pub unsafe fn slot(&self, index: u32) -> &T {
        &*self.slots[index as usize].get()
    }

    /// Exclusive access to a slot.
    ///
    /// # Safety
    /// The caller must hold the *write* lock of the segment that owns
    /// `index`, or be the sole owner of a freshly allocated index, and must
    /// not hold any other reference to the same slot.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, index: u32) -> &mut T {
        &mut *self.slots[index as usize].get()
    }

    /// Snapshot of the free stack, for consistency scans in tests.
    #[cfg(any(test, debug_assertions))]
    pub fn free_indices(&self) -> Vec<u32> {
        self.free.lock().clone()
    }
}
