//! Flusher loop: `writeback_inodes`, `writeback_sb_inodes`,
//! `wb_writeback`, the periodic kupdate check, and the worker entry point.
//!
//! A more literal design spawns one worker task per backing device. This
//! kernel's `spawn_task` takes a bare `fn() -> !` with no closure capture,
//! so there is nowhere to stash a per-device argument; instead a single
//! shared [`bdi_writeback_task`] round-robins `BdiRegistry::snapshot()` each
//! cycle. Devices are still serviced independently (their own queues,
//! job tables, locks); only the worker *task* is shared.

use super::bdi::{bdi_registry, Bdi};
use super::collaborators::superblock_registry;
use super::config::{tunables, MAX_WRITEBACK_PAGES};
use super::control::WbControl;
use super::error::WbResult;
use super::inode::{InodeFlags, InodeTable, SuperblockId};
use super::queue::dirtied_after;
use super::single;
use super::stats::writeback_stats;
use super::waitqueue;
use super::work::{self, JobArgs};

const SUBSYS: &str = "writeback";

#[inline]
fn now() -> u64 {
    crate::sched::timer::get_tick_count() as u64
}

/// `true` if this sb (or the system, with no sb given) is at or above the
/// background dirty threshold and background writeback should proceed.
/// With no sb to consult, there is no threshold to check, so background
/// work is always allowed to proceed.
fn over_background_thresh(sb: Option<SuperblockId>) -> bool {
    let Some(sb) = sb else { return true };
    let Some(ops) = superblock_registry().get(sb) else { return true };
    let (bg_limit, _hard_limit) = ops.dirty_limits();
    ops.global_dirty_count() >= bg_limit
}

/// One pass over `B_IO`, possibly spanning several superblocks
pub fn writeback_inodes(bdi: &Bdi, table: &InodeTable, wbc: &mut WbControl) {
    wbc.wb_start = now();
    if !wbc.for_kupdate || bdi.queues.io_is_empty() {
        bdi.queues.queue_io(table, wbc.older_than);
    }
    writeback_stats().inc_passes_run();
    crate::log_debug!(SUBSYS, "pass start wb_start={} sb={:?}", wbc.wb_start, wbc.target_sb);

    loop {
        let Some(id) = bdi.queues.io_tail() else { break };
        let inode_sb = table.with(id, |i| i.sb).flatten();

        if let Some(target) = wbc.target_sb {
            if inode_sb != Some(target) {
                bdi.queues.redirty_tail(table, id, now());
                continue;
            }
        }

        let sb_ops = inode_sb.and_then(|sb| superblock_registry().get(sb));
        if let Some(ops) = &sb_ops {
            if ops.pin().is_err() {
                writeback_stats().inc_sb_pin_failures();
                crate::log_warn!(SUBSYS, "sb pin failed, requeuing inode {}", id);
                bdi.queues.requeue_io(table, id);
                continue;
            }
        }

        let stop = writeback_sb_inodes(bdi, table, inode_sb, wbc);

        if let Some(ops) = &sb_ops {
            ops.unpin();
        }

        if stop {
            break;
        }
    }

    crate::log_debug!(SUBSYS, "pass stop nr_to_write={} more_io={}", wbc.nr_to_write, wbc.more_io);
}

/// Drain contiguous same-superblock inodes from the tail of `B_IO`.
/// Returns `true` to stop the whole pass, `false` when this superblock's
/// run is done but other superblocks may remain in `B_IO`.
fn writeback_sb_inodes(bdi: &Bdi, table: &InodeTable, drained_sb: Option<SuperblockId>, wbc: &mut WbControl) -> bool {
    loop {
        let Some(id) = bdi.queues.io_tail() else { return true };
        let inode_sb = table.with(id, |i| i.sb).flatten();

        if let Some(target) = wbc.target_sb {
            if inode_sb != Some(target) {
                bdi.queues.redirty_tail(table, id, now());
                continue;
            }
        }

        if inode_sb != drained_sb {
            return false;
        }

        let flags = table.with(id, |i| i.flags()).unwrap_or(InodeFlags::empty());
        if flags.intersects(InodeFlags::NEW | InodeFlags::WILL_FREE) {
            bdi.queues.requeue_io(table, id);
            continue;
        }

        // Livelock guard: an inode redirtied after this pass began is left
        // at the tail, untouched, for a later pass with a fresh wb_start.
        let dirtied_when = table.with(id, |i| i.dirtied_when()).unwrap_or(0);
        if dirtied_after(dirtied_when, wbc.wb_start) {
            writeback_stats().inc_livelock_guard_trips();
            crate::log_debug!(SUBSYS, "livelock guard tripped at inode {}", id);
            return true;
        }

        // Committed to processing this inode: remove it from B_IO now.
        // write_single's own disposition re-files it (or, for Freed, leaves
        // it off every queue); removing it here is what makes the Freed
        // case correct, since write_single does not touch the queues then.
        bdi.queues.io_pop_tail();
        table.with(id, |i| i.get_ref());

        let pages_skipped_before = wbc.pages_skipped;
        match single::write_single(table, &bdi.queues, id, wbc) {
            Ok(_) => {}
            Err(e) => {
                wbc.record_error(e);
                crate::log_warn!(SUBSYS, "write_single failed for inode {}: {}", id, e);
            }
        }

        if wbc.pages_skipped > pages_skipped_before {
            bdi.queues.redirty_tail(table, id, now());
        }

        table.with(id, |i| i.put_ref());
        core::hint::spin_loop();

        if wbc.nr_to_write <= 0 {
            wbc.more_io = true;
            return true;
        }
        if !bdi.queues.more_io_is_empty() {
            wbc.more_io = true;
        }
    }
}

/// Outer driver of a single job: repeatedly slices the page budget across
/// `writeback_inodes` passes until the job's work is exhausted
pub fn wb_writeback(bdi: &Bdi, table: &InodeTable, args: &JobArgs) -> (i64, WbResult<()>) {
    let mut wbc = WbControl::new(args.sync_mode, args.for_kupdate, args.range_cyclic);
    wbc.target_sb = args.sb;
    if args.for_kupdate {
        wbc.older_than = Some(now().wrapping_sub(tunables().dirty_expire_interval_cs));
    }
    if !args.range_cyclic {
        wbc.range_start = 0;
        wbc.range_end = u64::MAX;
    }

    let mut nr_pages = args.nr_pages;
    let mut wrote = 0i64;

    loop {
        if nr_pages <= 0 {
            break;
        }
        if args.for_background && !over_background_thresh(args.sb) {
            break;
        }

        wbc.begin_slice(MAX_WRITEBACK_PAGES);
        writeback_inodes(bdi, table, &mut wbc);

        let wrote_this_slice = (MAX_WRITEBACK_PAGES - wbc.nr_to_write).max(0);
        wrote += wrote_this_slice;
        nr_pages = nr_pages.saturating_sub(wrote_this_slice);
        writeback_stats().add_pages_written(wrote_this_slice as u64);

        if wbc.nr_to_write <= 0 {
            continue;
        } else if !wbc.more_io {
            break;
        } else if wrote_this_slice > 0 {
            continue;
        } else {
            // No progress this slice but more_io says work remains: block
            // on the current B_MORE_IO tail's SYNC bit instead of spinning.
            if let Some(id) = bdi.queues.more_io_tail() {
                waitqueue::wait_while(|| table.with(id, |i| i.flags().contains(InodeFlags::SYNC)).unwrap_or(false));
            } else {
                break;
            }
        }
    }

    (wrote, wbc.first_error.map_or(Ok(()), Err))
}

/// Periodic "old data" flush: if enough time has passed since the last
/// kupdate pass on this device, run one covering every old dirty inode
fn wb_check_old_data_flush(bdi: &Bdi, table: &InodeTable) -> bool {
    use core::sync::atomic::Ordering;

    let interval = tunables().dirty_writeback_interval_cs;
    let last = bdi.last_old_flush.load(Ordering::Relaxed);
    let current = now();
    if current.wrapping_sub(last) < interval {
        return false;
    }
    bdi.last_old_flush.store(current, Ordering::Relaxed);

    let stat = super::collaborators::inodes_stat();
    let nr_pages = bdi.queues.dirty_count() as i64 + (stat.nr_inodes.saturating_sub(stat.nr_unused)) as i64;

    crate::log_trace!(SUBSYS, "kupdate check bdi={} nr_pages={}", bdi.id, nr_pages);

    let args = JobArgs {
        sb: None,
        sync_mode: super::control::SyncMode::None,
        nr_pages: nr_pages.max(0),
        for_kupdate: true,
        range_cyclic: true,
        for_background: false,
    };
    let (wrote, _) = wb_writeback(bdi, table, &args);
    wrote > 0
}

/// Drain every pending job on one device, running each to completion and
/// clearing the submitter's bit at the point the completion protocol requires
fn drain_jobs(bdi: &Bdi, table: &InodeTable) -> bool {
    let mut did_work = false;
    while let Some(id) = work::next_job(bdi) {
        let args = bdi.jobs.with(id, |j| j.args).expect("claimed job vanished");
        let sync_mode = args.sync_mode;

        if matches!(sync_mode, super::control::SyncMode::None) {
            // Opportunistic: submitters don't wait, clear pending up front.
            work::clear_pending(bdi, id);
        }

        let (wrote, result) = wb_writeback(bdi, table, &args);
        if let Err(e) = result {
            bdi.jobs.with(id, |j| j.record_error(e));
        }
        did_work |= wrote > 0;

        if matches!(sync_mode, super::control::SyncMode::All) {
            work::clear_pending(bdi, id);
        }

        work::reclaim(bdi);
    }
    did_work
}

/// No-op: with a single shared worker task there is no per-device worker
/// to target specifically. The shared task polls every registered device
/// each cycle regardless, so there is nothing to wake.
pub fn wake_worker(_bdi: &Bdi) {}

/// Entry point for the kernel's one shared flusher task
///
/// A more literal worker would exit after some idle timeout and be
/// respawned on demand by the next submitter, and would honor a stop
/// request checked between passes. `src/sched` has no task-exit or
/// cancellation call a running task can use on itself, and `spawn_task`
/// takes a bare `fn() -> !`, so there is no respawn path to hand a job to
/// either; this task simply runs forever, sleeping `dirty_writeback_interval`
/// between cycles, the same backoff a woken-but-idle worker would use.
pub fn bdi_writeback_task() -> ! {
    crate::log_info!(SUBSYS, "flusher task starting");
    let table = super::inode::inode_table();
    loop {
        for bdi in bdi_registry().snapshot() {
            drain_jobs(&bdi, table);
            wb_check_old_data_flush(&bdi, table);
        }

        let interval = tunables().dirty_writeback_interval_cs as usize;
        let deadline = crate::sched::timer::get_tick_count() + interval.max(1);
        waitqueue::wait_while(|| crate::sched::timer::get_tick_count() < deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::cache::writeback::collaborators::mocks::MockInodeOps;
    use crate::fs::cache::writeback::control::SyncMode;
    use alloc::sync::Arc;

    fn dirty_inode(table: &InodeTable, bdi: &Bdi, dirty_pages: u64) -> u64 {
        let ops = Arc::new(MockInodeOps::new(dirty_pages));
        let id = table.alloc(None, bdi.id, ops);
        table.with(id, |i| {
            i.insert_flags(InodeFlags::DIRTY_SYNC | InodeFlags::DIRTY_PAGES);
            i.get_ref();
        });
        // get_tick_count() is 0 in this test harness (no timer interrupts
        // fire), so dirtying at tick 0 keeps the inode from looking
        // "dirtied after wb_start" and tripping the livelock guard.
        bdi.queues.dirty_new(table, id, 0);
        id
    }

    #[test]
    fn writeback_inodes_drains_dirty_queue() {
        let table = InodeTable::new();
        let bdi = Bdi::new(0);
        dirty_inode(&table, &bdi, 0);

        let mut wbc = WbControl::new(SyncMode::None, false, true);
        wbc.nr_to_write = MAX_WRITEBACK_PAGES;
        writeback_inodes(&bdi, &table, &mut wbc);

        assert!(bdi.queues.io_is_empty());
        assert!(bdi.queues.dirty_is_empty());
    }

    #[test]
    fn wb_writeback_reports_first_error() {
        let table = InodeTable::new();
        let bdi = Bdi::new(0);
        let ops = Arc::new(MockInodeOps::new(0));
        ops.fail_write_inode.store(true, core::sync::atomic::Ordering::Relaxed);
        let id = table.alloc(None, bdi.id, ops);
        table.with(id, |i| {
            i.insert_flags(InodeFlags::DIRTY_SYNC);
            i.get_ref();
        });
        bdi.queues.dirty_new(&table, id, 1);

        let args = JobArgs {
            sb: None,
            sync_mode: SyncMode::All,
            nr_pages: i64::MAX,
            for_kupdate: false,
            range_cyclic: false,
            for_background: false,
        };
        let (_wrote, result) = wb_writeback(&bdi, &table, &args);
        assert!(result.is_err());
    }

    #[test]
    fn livelock_guard_leaves_inode_at_tail() {
        let table = InodeTable::new();
        let bdi = Bdi::new(0);
        let id = dirty_inode(&table, &bdi, 0);
        bdi.queues.queue_io(&table, None);
        // Dirty it again "in the future" relative to wb_start.
        table.with(id, |i| i.set_dirtied_when(u64::MAX / 2));

        let mut wbc = WbControl::new(SyncMode::None, false, true);
        wbc.nr_to_write = MAX_WRITEBACK_PAGES;
        wbc.wb_start = 0;
        let stop = writeback_sb_inodes(&bdi, &table, None, &mut wbc);
        assert!(stop);
        assert_eq!(bdi.queues.io_tail(), Some(id), "livelock guard must not pop the inode");
    }
}
