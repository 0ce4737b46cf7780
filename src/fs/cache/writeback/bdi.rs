//! Backing Device Info: per-device writeback state and the global registry
//!
//! One [`Bdi`] exists per backing device that wants writeback service. The
//! registry below follows the same `SpinLock<Vec<Arc<T>>>` shape as
//! [`crate::fs::block_dev::BlockDeviceManager`] rather than a bespoke
//! container.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::sync::SpinLock;

use super::epoch::{DeferredFree, Epoch};
use super::queue::InodeQueues;
use super::work::{JobId, JobTable};

/// A single tracked backing device
///
/// The `seen`/`pending` bitmap in `work.rs` is sized for N workers per
/// device, but this implementation runs exactly one default worker per
/// device, so `worker_count` is always 1.
pub struct Bdi {
    pub id: u64,
    pub queues: InodeQueues,
    pub jobs: JobTable,
    pub work_list: SpinLock<Vec<JobId>>,
    pub epoch: Epoch,
    pub retired: DeferredFree<JobId>,
    /// Tick of the last periodic (kupdate) pass
    pub last_old_flush: AtomicU64,
    pub registered: AtomicBool,
}

impl Bdi {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            queues: InodeQueues::new(),
            jobs: JobTable::new(),
            work_list: SpinLock::new(Vec::new()),
            epoch: Epoch::new(),
            retired: DeferredFree::new(),
            last_old_flush: AtomicU64::new(0),
            registered: AtomicBool::new(true),
        }
    }

    pub fn has_dirty_io(&self) -> bool {
        self.queues.dirty_count() > 0
    }
}

/// Global registry of backing devices known to the writeback engine
pub struct BdiRegistry {
    devices: SpinLock<Vec<Arc<Bdi>>>,
    next_id: AtomicU64,
}

impl BdiRegistry {
    const fn new() -> Self {
        Self {
            devices: SpinLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a new backing device, returning its id
    pub fn register(&self) -> Arc<Bdi> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bdi = Arc::new(Bdi::new(id));
        self.devices.lock().push(bdi.clone());
        bdi
    }

    pub fn unregister(&self, id: u64) {
        let mut devices = self.devices.lock();
        if let Some(pos) = devices.iter().position(|b| b.id == id) {
            devices[pos].registered.store(false, Ordering::Release);
            devices.remove(pos);
        }
    }

    pub fn get(&self, id: u64) -> Option<Arc<Bdi>> {
        self.devices.lock().iter().find(|b| b.id == id).cloned()
    }

    /// Snapshot of every registered device, for the single shared flusher
    /// task to round-robin over
    pub fn snapshot(&self) -> Vec<Arc<Bdi>> {
        self.devices.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }
}

static BDI_REGISTRY: BdiRegistry = BdiRegistry::new();

pub fn bdi_registry() -> &'static BdiRegistry {
    &BDI_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_distinct_ids() {
        let registry = BdiRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unregister_removes_from_snapshot() {
        let registry = BdiRegistry::new();
        let a = registry.register();
        registry.unregister(a.id);
        assert!(registry.is_empty());
        assert!(!a.registered.load(Ordering::Acquire));
    }
}
