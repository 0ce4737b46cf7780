//! Grace-period reclamation for the work-list
//!
//! `work_list` is read lock-free by `next_job`'s traversal (see `work.rs`)
//! while `queue_work`/`clear_pending` mutate it under `wb_lock`. A job's
//! storage (and, for a heap job, its `Box`) must not be freed while a reader
//! might still be walking the list. This follows the usual RCU split-phase
//! idea (removal happens under a lock, reclamation is deferred to an
//! explicit `reclaim()` call once no reader is mid-traversal), but is
//! hand-rolled against this crate's own primitives rather than pulling in
//! an external RCU crate.
//!
//! Unlike a full RCU implementation, this tracks only "is anyone in a
//! traversal right now", not per-epoch reader generations: `reclaim()` is
//! safe to call any time, and simply leaves retired items queued if a
//! reader is still active, trying again next time it's called. Callers
//! never block waiting for quiescence; they just accept that reclamation of
//! a given item may happen a little later than the call that retired it.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::sync::SpinLock;

/// Tracks whether a lock-free reader is currently mid-traversal
pub struct Epoch {
    active_readers: AtomicUsize,
}

/// Held for the duration of one lock-free traversal of the guarded list
pub struct ReadGuard<'a> {
    epoch: &'a Epoch,
}

impl Epoch {
    pub const fn new() -> Self {
        Self {
            active_readers: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn pin(&self) -> ReadGuard<'_> {
        self.active_readers.fetch_add(1, Ordering::AcqRel);
        ReadGuard { epoch: self }
    }

    #[inline]
    pub fn is_quiescent(&self) -> bool {
        self.active_readers.load(Ordering::Acquire) == 0
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.epoch.active_readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Queue of items removed from a guarded list but not yet safe to free
pub struct DeferredFree<T> {
    pending: SpinLock<Vec<T>>,
}

impl<T> DeferredFree<T> {
    pub const fn new() -> Self {
        Self {
            pending: SpinLock::new(Vec::new()),
        }
    }

    /// Queue `item` for reclamation once no reader is mid-traversal
    pub fn retire(&self, item: T) {
        self.pending.lock().push(item);
    }

    /// Drop every retired item, if `epoch` currently shows no active
    /// readers, returning them for the caller to finalize. Items stay
    /// queued (and this returns empty) if a reader is still active.
    pub fn reclaim(&self, epoch: &Epoch) -> Vec<T> {
        if !epoch.is_quiescent() {
            return Vec::new();
        }
        core::mem::take(&mut *self.pending.lock())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T> Default for DeferredFree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaim_is_noop_while_reader_active() {
        let epoch = Epoch::new();
        let free: DeferredFree<u32> = DeferredFree::new();
        free.retire(1);
        let guard = epoch.pin();
        assert_eq!(free.reclaim(&epoch).len(), 0);
        assert_eq!(free.pending_count(), 1);
        drop(guard);
        assert_eq!(free.reclaim(&epoch), alloc::vec![1]);
        assert_eq!(free.pending_count(), 0);
    }

    #[test]
    fn reclaim_drains_after_quiescence() {
        let epoch = Epoch::new();
        let free: DeferredFree<u32> = DeferredFree::new();
        free.retire(1);
        free.retire(2);
        free.retire(3);
        assert!(epoch.is_quiescent());
        assert_eq!(free.reclaim(&epoch), alloc::vec![1, 2, 3]);
    }
}
