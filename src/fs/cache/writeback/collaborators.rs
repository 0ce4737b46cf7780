//! External collaborator contracts
//!
//! The engine never touches a filesystem's page cache or on-disk inode
//! format directly; it calls out through these traits, the same way
//! `fs/block_dev.rs` isolates `BlockDeviceManager` from the concrete
//! `VirtioBlockDevice` behind the `BlockDevice` trait. Unit tests supply
//! deterministic fakes instead of a real filesystem.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::sync::SpinLock;

use super::control::WbControl;
use super::error::WbResult;
use super::inode::{InodeId, SuperblockId};

/// A file's page cache, as writeback needs to see it
pub trait Mapping: Send + Sync {
    /// Write pages subject to `wbc` (range, budget, sync mode). Implementors
    /// decrement `wbc.nr_to_write` per page written and increment
    /// `wbc.pages_skipped` per page deliberately left dirty.
    fn do_writepages(&self, wbc: &mut WbControl) -> WbResult<()>;

    /// Wait for all currently in-flight writeback pages to complete
    fn filemap_fdatawait(&self) -> WbResult<()>;

    /// True if the mapping still carries dirty-tagged pages after a
    /// `do_writepages` call (the writer bailed out early)
    fn has_dirty_pages(&self) -> bool;
}

/// Per-inode persistence hook
pub trait InodeOps: Send + Sync {
    fn mapping(&self) -> &dyn Mapping;

    /// Persist the inode's on-disk record. Only called when the captured
    /// dirty snapshot had a metadata bit set and the inode is not bad.
    fn write_inode(&self, wbc: &WbControl) -> WbResult<()>;

    fn is_bad(&self) -> bool {
        false
    }
}

/// Per-superblock hooks: pinning for the duration of a drain, and the
/// dirty-limit thresholds that gate background writeback
pub trait SuperblockOps: Send + Sync {
    /// Bump a reference and try-read-lock the mount semaphore; fails if the
    /// superblock is mid-unmount
    fn pin(&self) -> WbResult<()>;
    fn unpin(&self);

    /// `(background_limit_pages, hard_limit_pages)`
    fn dirty_limits(&self) -> (u64, u64);

    /// Current globally dirty page count, for comparison against
    /// `dirty_limits`'s background threshold
    fn global_dirty_count(&self) -> u64;

    /// Optional per-filesystem notification on first metadata dirtying
    fn dirty_inode(&self, _id: InodeId) {}
}

/// One registered superblock: its ops plus the device it's mounted on, so
/// `sync_inodes_sb(sb)` can find the `Bdi` to submit work against
struct SuperblockEntry {
    id: SuperblockId,
    bdi_id: u64,
    ops: Arc<dyn SuperblockOps>,
}

/// Registry mapping [`SuperblockId`] to its [`SuperblockOps`] implementation
/// and owning device
pub struct SuperblockRegistry {
    entries: SpinLock<Vec<SuperblockEntry>>,
}

impl SuperblockRegistry {
    const fn new() -> Self {
        Self {
            entries: SpinLock::new(Vec::new()),
        }
    }

    pub fn register(&self, id: SuperblockId, bdi_id: u64, ops: Arc<dyn SuperblockOps>) {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.id != id);
        entries.push(SuperblockEntry { id, bdi_id, ops });
    }

    pub fn unregister(&self, id: SuperblockId) {
        self.entries.lock().retain(|e| e.id != id);
    }

    pub fn get(&self, id: SuperblockId) -> Option<Arc<dyn SuperblockOps>> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.ops.clone())
    }

    /// Which device a superblock is mounted on, for routing `sync_inodes_sb`
    pub fn bdi_of(&self, id: SuperblockId) -> Option<u64> {
        self.entries.lock().iter().find(|e| e.id == id).map(|e| e.bdi_id)
    }
}

static SUPERBLOCK_REGISTRY: SuperblockRegistry = SuperblockRegistry::new();

pub fn superblock_registry() -> &'static SuperblockRegistry {
    &SUPERBLOCK_REGISTRY
}

/// Global `{nr_inodes, nr_unused}`-style counters, read by `wb_check_old_data_flush`
#[derive(Debug, Clone, Copy, Default)]
pub struct InodesStat {
    pub nr_inodes: u64,
    pub nr_unused: u64,
}

/// Snapshot of the system-wide inode counters, computed on demand from the
/// global inode table and every registered device's `B_UNUSED` queue rather
/// than tracked by a separate set of counters that could drift out of sync
pub fn inodes_stat() -> InodesStat {
    let nr_inodes = super::inode::inode_table().count() as u64;
    let nr_unused = super::bdi::bdi_registry()
        .snapshot()
        .iter()
        .map(|bdi| bdi.queues.unused_count() as u64)
        .sum();
    InodesStat { nr_inodes, nr_unused }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// Deterministic in-memory mapping for tests
    ///
    /// Uses atomics rather than `Cell` so the fake stays `Sync`, matching
    /// what a real `Arc<dyn Mapping>` shared across workers requires.
    pub struct MockMapping {
        pub dirty_pages: AtomicU64,
        pub fail_writepages: AtomicBool,
        pub fail_fdatawait: AtomicBool,
    }

    impl MockMapping {
        pub fn new(dirty_pages: u64) -> Self {
            Self {
                dirty_pages: AtomicU64::new(dirty_pages),
                fail_writepages: AtomicBool::new(false),
                fail_fdatawait: AtomicBool::new(false),
            }
        }
    }

    impl Mapping for MockMapping {
        fn do_writepages(&self, wbc: &mut WbControl) -> WbResult<()> {
            if self.fail_writepages.load(Ordering::Relaxed) {
                return Err(super::super::error::WritebackError::Io);
            }
            let remaining = self.dirty_pages.load(Ordering::Relaxed);
            let to_write = remaining.min(wbc.nr_to_write.max(0) as u64);
            self.dirty_pages.store(remaining - to_write, Ordering::Relaxed);
            wbc.nr_to_write -= to_write as i64;
            Ok(())
        }

        fn filemap_fdatawait(&self) -> WbResult<()> {
            if self.fail_fdatawait.load(Ordering::Relaxed) {
                return Err(super::super::error::WritebackError::Io);
            }
            Ok(())
        }

        fn has_dirty_pages(&self) -> bool {
            self.dirty_pages.load(Ordering::Relaxed) > 0
        }
    }

    /// Deterministic inode-ops fake wrapping a [`MockMapping`]
    pub struct MockInodeOps {
        pub mapping: MockMapping,
        pub fail_write_inode: AtomicBool,
        pub write_inode_calls: AtomicU64,
    }

    impl MockInodeOps {
        pub fn new(dirty_pages: u64) -> Self {
            Self {
                mapping: MockMapping::new(dirty_pages),
                fail_write_inode: AtomicBool::new(false),
                write_inode_calls: AtomicU64::new(0),
            }
        }
    }

    impl InodeOps for MockInodeOps {
        fn mapping(&self) -> &dyn Mapping {
            &self.mapping
        }

        fn write_inode(&self, _wbc: &WbControl) -> WbResult<()> {
            self.write_inode_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_write_inode.load(Ordering::Relaxed) {
                return Err(super::super::error::WritebackError::Io);
            }
            Ok(())
        }
    }

    /// Deterministic superblock-ops fake, always pinnable by default
    pub struct MockSuperblockOps {
        pub fail_pin: AtomicBool,
        pub background_limit: AtomicU64,
        pub hard_limit: AtomicU64,
        pub global_dirty: AtomicU64,
    }

    impl MockSuperblockOps {
        pub fn new() -> Self {
            Self {
                fail_pin: AtomicBool::new(false),
                background_limit: AtomicU64::new(100),
                hard_limit: AtomicU64::new(200),
                global_dirty: AtomicU64::new(0),
            }
        }
    }

    impl Default for MockSuperblockOps {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SuperblockOps for MockSuperblockOps {
        fn pin(&self) -> WbResult<()> {
            if self.fail_pin.load(Ordering::Relaxed) {
                return Err(super::super::error::WritebackError::PinFailed);
            }
            Ok(())
        }

        fn unpin(&self) {}

        fn dirty_limits(&self) -> (u64, u64) {
            (
                self.background_limit.load(Ordering::Relaxed),
                self.hard_limit.load(Ordering::Relaxed),
            )
        }

        fn global_dirty_count(&self) -> u64 {
            self.global_dirty.load(Ordering::Relaxed)
        }
    }
}
