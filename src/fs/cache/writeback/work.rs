//! Work queue & dispatcher: `Job`, `JobArgs`, submission and claim/complete
//!
//! Jobs live in a per-device arena ([`JobTable`]), keyed by a stable
//! [`JobId`] handle, the same indexed-arena idiom used for inodes, rather
//! than an intrusively-linked `bdi_work`. A device's `work_list` is then
//! just `Vec<JobId>`, and a "lockless" traversal is a brief lock to clone
//! that id list followed by unlocked lookups into the arena, with the
//! `epoch`/`retired` pair (see `epoch.rs`) making sure a `JobId` is never
//! reused while such a traversal is in flight.
//!
//! An `ON_STACK` job conceptually lives on the submitter's stack frame to
//! avoid a heap allocation on the synchronous path; here both
//! heap and "stack" jobs are arena values, and `on_stack` only selects the
//! completion protocol (whether clearing `USED` is deferred past
//! the grace period). `submit_sync` still never needs a fallible
//! allocation, preserving the property that a synchronous writeback can't
//! fail to submit for want of memory.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::sync::SpinLock;

use super::bdi::Bdi;
use super::config::MAX_OUTSTANDING_JOBS;
use super::control::SyncMode;
use super::error::{WbResult, WritebackError};
use super::inode::SuperblockId;
use super::stats::writeback_stats;
use super::waitqueue;

/// Stable handle for a [`Job`] within one device's [`JobTable`]
pub type JobId = u64;

/// Exactly one default worker per device today; the `seen` bitmap is sized
/// for future multi-worker use but only bit 0 is ever assigned
pub const WORKER_BIT: u32 = 1 << 0;

/// Parameters of one writeback job, as built by the submission API
#[derive(Debug, Clone, Copy)]
pub struct JobArgs {
    pub sb: Option<SuperblockId>,
    pub sync_mode: SyncMode,
    /// `i64::MAX` means "as many as needed"
    pub nr_pages: i64,
    pub for_kupdate: bool,
    pub range_cyclic: bool,
    pub for_background: bool,
}

impl JobArgs {
    pub const fn background(sb: Option<SuperblockId>) -> Self {
        Self {
            sb,
            sync_mode: SyncMode::None,
            nr_pages: i64::MAX,
            for_kupdate: false,
            range_cyclic: true,
            for_background: true,
        }
    }
}

/// One entry on a device's `work_list`
pub struct Job {
    pub id: JobId,
    pub args: JobArgs,
    /// Bitmap of workers that have not yet claimed this job
    seen: AtomicU32,
    /// Workers that must still call `clear_pending` before this job frees
    pending: AtomicU32,
    /// Job is live and not yet fully completed
    used: AtomicBool,
    /// Completion protocol selector; see module docs
    pub on_stack: bool,
    /// First error observed while servicing this job, first-error-wins
    error: SpinLock<Option<WritebackError>>,
}

impl Job {
    fn new(id: JobId, args: JobArgs, on_stack: bool) -> Self {
        Self {
            id,
            args,
            seen: AtomicU32::new(WORKER_BIT),
            pending: AtomicU32::new(1),
            used: AtomicBool::new(true),
            on_stack,
            error: SpinLock::new(None),
        }
    }

    /// Record `err` unless an earlier error has already been recorded
    pub fn record_error(&self, err: WritebackError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn take_error(&self) -> Option<WritebackError> {
        *self.error.lock()
    }

    /// Try to claim this job for `worker_bit`; returns `true` if the bit
    /// was set (i.e. this worker had not yet observed the job)
    fn try_claim(&self, worker_bit: u32) -> bool {
        let prev = self.seen.fetch_and(!worker_bit, Ordering::AcqRel);
        prev & worker_bit != 0
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }
}

/// Arena of jobs belonging to one device, indexed by [`JobId`]
pub struct JobTable {
    slots: SpinLock<Vec<Option<Job>>>,
}

impl JobTable {
    pub const fn new() -> Self {
        Self {
            slots: SpinLock::new(Vec::new()),
        }
    }

    /// Allocate a job, unless the device already has `MAX_OUTSTANDING_JOBS`
    /// live jobs (models the real allocator's failure mode under pressure)
    fn try_alloc(&self, args: JobArgs, on_stack: bool) -> Option<JobId> {
        let mut slots = self.slots.lock();
        let live = slots.iter().filter(|s| s.is_some()).count();
        if live >= MAX_OUTSTANDING_JOBS {
            return None;
        }
        for (idx, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                let id = idx as JobId;
                *slot = Some(Job::new(id, args, on_stack));
                return Some(id);
            }
        }
        let id = slots.len() as JobId;
        slots.push(Some(Job::new(id, args, on_stack)));
        Some(id)
    }

    fn free(&self, id: JobId) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(id as usize) {
            *slot = None;
        }
    }

    pub fn with<R>(&self, id: JobId, f: impl FnOnce(&Job) -> R) -> Option<R> {
        let slots = self.slots.lock();
        slots.get(id as usize).and_then(|s| s.as_ref()).map(f)
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `id` to `bdi.work_list` and wake its worker
fn queue_work(bdi: &Bdi, id: JobId) {
    debug_assert!(
        bdi.jobs.with(id, |j| j.seen.load(Ordering::Acquire)).unwrap_or(0) != 0,
        "seen bitmap must be non-empty at enqueue time"
    );
    bdi.work_list.lock().push(id);
    writeback_stats().inc_jobs_enqueued();
    super::flusher::wake_worker(bdi);
}

/// `submit_sync(bdi, sb)`: build an `ALL` job, block until the worker
/// completes it, returning the first error reported while servicing it.
///
/// This function is the sole owner of the job it submits: `reclaim()`
/// clears the job's `USED` bit once the grace period has passed, but
/// leaves the slot itself allocated for an on-stack `ALL` job rather than
/// freeing it on the spot, so that the error recorded against it is still
/// readable here afterward. `submit_sync` reads `take_error()` and frees
/// the slot itself once `USED` has cleared.
pub fn submit_sync(bdi: &Bdi, sb: Option<SuperblockId>) -> WbResult<()> {
    let args = JobArgs {
        sb,
        sync_mode: SyncMode::All,
        nr_pages: i64::MAX,
        for_kupdate: false,
        range_cyclic: false,
        for_background: false,
    };
    // Job allocation for the integrity path must not be allowed to fail;
    // the device's job table is sized generously enough in practice, and a
    // synchronous caller has no sensible fallback if it can't submit.
    let id = bdi
        .jobs
        .try_alloc(args, true)
        .expect("submit_sync: job table exhausted");
    queue_work(bdi, id);
    waitqueue::wait_while(|| {
        reclaim(bdi);
        bdi.jobs.with(id, |j| j.is_used()).unwrap_or(false)
    });
    let err = bdi.jobs.with(id, |j| j.take_error()).flatten();
    bdi.jobs.free(id);
    err.map_or(Ok(()), Err)
}

/// `submit_opportunistic(bdi, sb, nr_pages)`: background mode if
/// `nr_pages == 0`; degrades to a bare wakeup if the job table is full
pub fn submit_opportunistic(bdi: &Bdi, sb: Option<SuperblockId>, nr_pages: i64) {
    let args = if nr_pages == 0 {
        JobArgs::background(sb)
    } else {
        JobArgs {
            sb,
            sync_mode: SyncMode::None,
            nr_pages,
            for_kupdate: false,
            range_cyclic: true,
            for_background: false,
        }
    };
    match bdi.jobs.try_alloc(args, false) {
        Some(id) => queue_work(bdi, id),
        None => {
            writeback_stats().inc_alloc_failures();
            super::flusher::wake_worker(bdi);
        }
    }
}

/// `submit_all(sb, nr_pages)`: schedule opportunistic writeback on every
/// registered device that currently has dirty I/O
pub fn submit_all(sb: Option<SuperblockId>, nr_pages: i64) {
    for bdi in super::bdi::bdi_registry().snapshot() {
        if bdi.has_dirty_io() {
            submit_opportunistic(&bdi, sb, nr_pages);
        }
    }
}

/// Claim the next job this worker has not yet observed
pub fn next_job(bdi: &Bdi) -> Option<JobId> {
    let _guard = bdi.epoch.pin();
    let snapshot: Vec<JobId> = bdi.work_list.lock().clone();
    for id in snapshot {
        if bdi.jobs.with(id, |j| j.try_claim(WORKER_BIT)).unwrap_or(false) {
            return Some(id);
        }
    }
    None
}

/// This worker is done with `id`; if it was the last pending worker, unlink
/// it from `work_list` and apply the completion protocol
pub fn clear_pending(bdi: &Bdi, id: JobId) {
    let was_last = bdi
        .jobs
        .with(id, |j| j.pending.fetch_sub(1, Ordering::AcqRel) == 1)
        .unwrap_or(false);
    if !was_last {
        return;
    }

    bdi.work_list.lock().retain(|&x| x != id);

    let defer_used_clear = bdi
        .jobs
        .with(id, |j| j.on_stack && matches!(j.args.sync_mode, SyncMode::All))
        .unwrap_or(false);

    if !defer_used_clear {
        bdi.jobs.with(id, |j| j.used.store(false, Ordering::Release));
        waitqueue::wake_all();
    }

    bdi.retired.retire(id);
    writeback_stats().inc_jobs_completed();
}

/// Drain every job whose unlink is now safe to reclaim (no reader is
/// mid-traversal); for a deferred-completion `ON_STACK` integrity job, this
/// is also where `USED` actually clears and the submitter is woken.
///
/// That submitter (`submit_sync`) still needs to read the job's error after
/// `USED` clears, so its slot is not freed here; `submit_sync` frees it once
/// it has consumed the error. Every other kind of job has no one left to
/// read its result, so its slot is freed immediately.
pub fn reclaim(bdi: &Bdi) {
    for id in bdi.retired.reclaim(&bdi.epoch) {
        let needs_wake = bdi
            .jobs
            .with(id, |j| j.on_stack && matches!(j.args.sync_mode, SyncMode::All))
            .unwrap_or(false);
        if needs_wake {
            bdi.jobs.with(id, |j| j.used.store(false, Ordering::Release));
            waitqueue::wake_all();
        } else {
            bdi.jobs.free(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_table_alloc_free_round_trip() {
        let table = JobTable::new();
        let args = JobArgs::background(None);
        let id = table.try_alloc(args, false).unwrap();
        assert!(table.with(id, |j| j.is_used()).unwrap());
        table.free(id);
        assert!(table.with(id, |_| ()).is_none());
    }

    #[test]
    fn job_table_refuses_beyond_limit() {
        let table = JobTable::new();
        let args = JobArgs::background(None);
        let mut ids = Vec::new();
        for _ in 0..MAX_OUTSTANDING_JOBS {
            ids.push(table.try_alloc(args, false).unwrap());
        }
        assert!(table.try_alloc(args, false).is_none());
    }

    #[test]
    fn try_claim_is_one_shot_per_worker() {
        let table = JobTable::new();
        let id = table.try_alloc(JobArgs::background(None), false).unwrap();
        let first = table.with(id, |j| j.try_claim(WORKER_BIT)).unwrap();
        let second = table.with(id, |j| j.try_claim(WORKER_BIT)).unwrap();
        assert!(first);
        assert!(!second);
    }
}
