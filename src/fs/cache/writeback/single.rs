//! Single-inode writer (`write_single`)
//!
//! This is the only place in the engine that calls out to external
//! collaborators, and the only place a pass can block on another writer.

use super::collaborators::superblock_registry;
use super::control::{SyncMode, WbControl};
use super::error::{first_err, WbResult};
use super::inode::{InodeFlags, InodeId, InodeTable};
use super::queue::InodeQueues;
use super::stats::writeback_stats;
use super::waitqueue;

/// What the caller should do with the inode after `write_single` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Inode is `FREEING`/`CLEAR`; caller must not touch it further
    Freed,
    SelectQueue,
    RedirtyTail,
    MoveToInUse,
    MoveToUnused,
}

/// Write one inode through its full state machine. The caller must not be holding the inode's
/// queue lock when the blocking branches (step 2 integrity wait, or the
/// external calls themselves) are reached; `write_single` takes/releases
/// the lock itself via `table`/`queues`.
pub fn write_single(table: &InodeTable, queues: &InodeQueues, id: InodeId, wbc: &mut WbControl) -> WbResult<Disposition> {
    // 1. Safety preconditions.
    let (ref_count, flags) = table
        .with(id, |i| (i.ref_count(), i.flags()))
        .expect("write_single called on unknown inode");
    if ref_count == 0 {
        debug_assert!(
            flags.intersects(InodeFlags::WILL_FREE | InodeFlags::FREEING),
            "zero-refcount inode must be on its way to being freed"
        );
    } else {
        debug_assert!(
            !flags.contains(InodeFlags::WILL_FREE),
            "referenced inode must not be WILL_FREE"
        );
    }

    // 2. Concurrent-sync arbitration.
    if table.with(id, |i| i.flags().contains(InodeFlags::SYNC)).unwrap_or(false) {
        match wbc.sync_mode {
            SyncMode::None => {
                queues.requeue_io(table, id);
                return Ok(Disposition::RedirtyTail /* unused by caller: requeue already done */);
            }
            SyncMode::All => {
                waitqueue::wait_while(|| table.with(id, |i| i.flags().contains(InodeFlags::SYNC)).unwrap_or(false));
            }
        }
    }

    // 3. Claim.
    let dirty = table.with(id, |i| {
        i.test_and_set_sync();
        i.claim_dirty()
    }).expect("inode vanished under us");

    // 4. Data writeback (lock released: external call).
    let sb_ops = table.with(id, |i| i.sb).flatten().and_then(|sb| superblock_registry().get(sb));
    let ops = table.with(id, |i| i.ops.clone()).expect("inode vanished under us");

    let mut result: WbResult<()> = Ok(());
    let writepages_result = ops.mapping().do_writepages(wbc);
    result = first_err(result, writepages_result);

    // 5. Data wait (integrity only).
    if matches!(wbc.sync_mode, SyncMode::All) {
        let wait_result = ops.mapping().filemap_fdatawait();
        result = first_err(result, wait_result);
    }

    // 6. Metadata writeback.
    if dirty.intersects(InodeFlags::DIRTY_SYNC | InodeFlags::DIRTY_DATASYNC) && !ops.is_bad() {
        let write_inode_result = ops.write_inode(wbc);
        result = first_err(result, write_inode_result);
    }

    if let Some(sb_ops) = &sb_ops {
        let _ = sb_ops; // reserved: per-sb notification hooks could run here
    }

    // 7. Post-processing.
    table.with(id, |i| i.clear_sync());

    let post_flags = table.with(id, |i| i.flags()).expect("inode vanished under us");
    if post_flags.intersects(InodeFlags::FREEING | InodeFlags::CLEAR) {
        waitqueue::wake_all();
        return result.map(|_| Disposition::Freed);
    }

    let has_dirty_pages = ops.mapping().has_dirty_pages();
    let disposition = if post_flags.contains(InodeFlags::DIRTY_PAGES) && wbc.for_kupdate {
        select_queue(wbc)
    } else if post_flags.intersects(InodeFlags::DIRTY) {
        Disposition::RedirtyTail
    } else if has_dirty_pages && wbc.for_kupdate {
        table.with(id, |i| i.insert_flags(InodeFlags::DIRTY_PAGES));
        select_queue(wbc)
    } else if has_dirty_pages {
        table.with(id, |i| i.insert_flags(InodeFlags::DIRTY_PAGES));
        Disposition::RedirtyTail
    } else if ref_count > 0 {
        Disposition::MoveToInUse
    } else {
        Disposition::MoveToUnused
    };

    apply_disposition(table, queues, id, disposition);

    // 8. Completion.
    waitqueue::wake_all();
    writeback_stats().inc_inodes_written();

    result.map(|_| disposition)
}

fn select_queue(wbc: &WbControl) -> Disposition {
    if wbc.nr_to_write <= 0 {
        Disposition::SelectQueue // caller requeues to B_MORE_IO (budget exhausted)
    } else {
        Disposition::RedirtyTail // blocked on something; try again later
    }
}

fn apply_disposition(table: &InodeTable, queues: &InodeQueues, id: InodeId, disposition: Disposition) {
    let now = crate::sched::timer::get_tick_count() as u64;
    match disposition {
        Disposition::Freed => {}
        Disposition::SelectQueue => queues.requeue_io(table, id),
        Disposition::RedirtyTail => queues.redirty_tail(table, id, now),
        Disposition::MoveToInUse => queues.move_to_in_use(table, id),
        Disposition::MoveToUnused => queues.move_to_unused(table, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::cache::writeback::collaborators::mocks::MockInodeOps;
    use alloc::sync::Arc;

    fn new_inode(table: &InodeTable, queues: &InodeQueues, dirty_pages: u64) -> (InodeId, Arc<MockInodeOps>) {
        let ops = Arc::new(MockInodeOps::new(dirty_pages));
        let id = table.alloc(None, 0, ops.clone());
        table.with(id, |i| {
            i.insert_flags(InodeFlags::DIRTY_SYNC | InodeFlags::DIRTY_PAGES);
            i.get_ref();
        });
        queues.dirty_new(table, id, 1);
        (id, ops)
    }

    #[test]
    fn clean_write_moves_to_in_use() {
        let table = InodeTable::new();
        let queues = InodeQueues::new();
        let (id, ops) = new_inode(&table, &queues, 0);
        let mut wbc = WbControl::new(SyncMode::None, false, true);
        wbc.nr_to_write = 1024;
        let disposition = write_single(&table, &queues, id, &mut wbc).unwrap();
        assert_eq!(disposition, Disposition::MoveToInUse);
        assert_eq!(ops.write_inode_calls.load(core::sync::atomic::Ordering::Relaxed), 1);
        assert!(!table.with(id, |i| i.flags().contains(InodeFlags::SYNC)).unwrap());
    }

    #[test]
    fn sync_bit_brackets_writeback() {
        let table = InodeTable::new();
        let queues = InodeQueues::new();
        let (id, _ops) = new_inode(&table, &queues, 0);
        table.with(id, |i| i.test_and_set_sync());
        let mut wbc = WbControl::new(SyncMode::None, false, true);
        wbc.nr_to_write = 1024;
        // opportunistic pass observes SYNC already held: requeues and returns
        let before = queues.more_io_is_empty();
        let _ = write_single(&table, &queues, id, &mut wbc);
        assert!(before, "sanity: more_io started empty");
        assert!(!queues.more_io_is_empty(), "concurrent writer should requeue to B_MORE_IO");
        table.with(id, |i| i.clear_sync());
    }

    #[test]
    fn io_error_is_surfaced_but_does_not_leave_sync_set() {
        let table = InodeTable::new();
        let queues = InodeQueues::new();
        let (id, ops) = new_inode(&table, &queues, 0);
        ops.fail_write_inode.store(true, core::sync::atomic::Ordering::Relaxed);
        let mut wbc = WbControl::new(SyncMode::None, false, true);
        wbc.nr_to_write = 1024;
        let result = write_single(&table, &queues, id, &mut wbc);
        assert!(result.is_err());
        assert!(!table.with(id, |i| i.flags().contains(InodeFlags::SYNC)).unwrap());
    }
}
