//! Writeback statistics
//!
//! Atomic counters tracking engine activity, in the same style as
//! [`crate::metrics::SystemMetrics`]. Exposed for `/proc`-style reporting and
//! for tests that want to assert on pass/job counts without reaching into
//! internals.

use core::sync::atomic::{AtomicU64, Ordering};

/// Global writeback engine counters
pub struct WritebackStats {
    /// Number of `writeback_inodes` passes run
    pub passes_run: AtomicU64,
    /// Number of inodes that completed `write_single`
    pub inodes_written: AtomicU64,
    /// Number of pages reported written by `do_writepages`
    pub pages_written: AtomicU64,
    /// Number of jobs enqueued (heap + on-stack)
    pub jobs_enqueued: AtomicU64,
    /// Number of jobs whose `pending` counter reached zero
    pub jobs_completed: AtomicU64,
    /// Number of superblock pin failures
    pub sb_pin_failures: AtomicU64,
    /// Number of times the livelock guard stopped a pass early
    pub livelock_guard_trips: AtomicU64,
    /// Number of times `submit_opportunistic` degraded to a wakeup due to
    /// allocation failure
    pub alloc_failures: AtomicU64,
}

impl WritebackStats {
    const fn new() -> Self {
        Self {
            passes_run: AtomicU64::new(0),
            inodes_written: AtomicU64::new(0),
            pages_written: AtomicU64::new(0),
            jobs_enqueued: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            sb_pin_failures: AtomicU64::new(0),
            livelock_guard_trips: AtomicU64::new(0),
            alloc_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_passes_run(&self) {
        self.passes_run.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_inodes_written(&self) {
        self.inodes_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_pages_written(&self, n: u64) {
        self.pages_written.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_sb_pin_failures(&self) {
        self.sb_pin_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_livelock_guard_trips(&self) {
        self.livelock_guard_trips.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_alloc_failures(&self) {
        self.alloc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WritebackStatsSnapshot {
        WritebackStatsSnapshot {
            passes_run: self.passes_run.load(Ordering::Relaxed),
            inodes_written: self.inodes_written.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            sb_pin_failures: self.sb_pin_failures.load(Ordering::Relaxed),
            livelock_guard_trips: self.livelock_guard_trips.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`WritebackStats`], cheap to pass around
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WritebackStatsSnapshot {
    pub passes_run: u64,
    pub inodes_written: u64,
    pub pages_written: u64,
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub sb_pin_failures: u64,
    pub livelock_guard_trips: u64,
    pub alloc_failures: u64,
}

/// Global writeback statistics instance
pub static WRITEBACK_STATS: WritebackStats = WritebackStats::new();

/// Get a reference to the global writeback statistics
#[inline]
pub fn writeback_stats() -> &'static WritebackStats {
    &WRITEBACK_STATS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let stats = WritebackStats::new();
        assert_eq!(stats.snapshot(), WritebackStatsSnapshot::default());
        stats.inc_passes_run();
        stats.add_pages_written(7);
        let snap = stats.snapshot();
        assert_eq!(snap.passes_run, 1);
        assert_eq!(snap.pages_written, 7);
    }
}
