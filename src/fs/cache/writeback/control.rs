//! `WbControl`: per-pass writeback parameters and running counters
//!
//! One of these is built fresh for each `wb_writeback` slice and threaded
//! through `writeback_inodes` / `writeback_sb_inodes` / `write_single`,
//! carrying the same per-pass parameters a `writeback_control` block would.

use super::error::WritebackError;
use super::inode::SuperblockId;

/// What kind of writeback this pass performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Best-effort; concurrent writers may skip an inode already in flight
    None,
    /// Data-integrity; waits for in-flight writeback to complete
    All,
}

/// Per-pass writeback control block
#[derive(Debug, Clone, Copy)]
pub struct WbControl {
    pub sync_mode: SyncMode,
    /// Remaining page budget for this slice
    pub nr_to_write: i64,
    /// Inodes dirtied no later than this tick are eligible this pass
    pub older_than: Option<u64>,
    /// Restrict this pass to one superblock's inodes; `None` drains every sb
    pub target_sb: Option<SuperblockId>,
    /// Tick at which this `writeback_inodes` pass began (livelock guard)
    pub wb_start: u64,
    /// Cyclic range writeback (wrap around after `range_end`)
    pub range_cyclic: bool,
    pub range_start: u64,
    pub range_end: u64,
    /// Pages that `do_writepages` declined to submit (e.g. locked buffers)
    pub pages_skipped: u64,
    /// Set when some queue still has work after this slice
    pub more_io: bool,
    /// True only for the kernel's own periodic "old data" pass
    pub for_kupdate: bool,
    /// First error seen from `write_single` across this whole job,
    /// first-error-wins
    pub first_error: Option<WritebackError>,
}

impl WbControl {
    pub fn new(sync_mode: SyncMode, for_kupdate: bool, range_cyclic: bool) -> Self {
        let (range_start, range_end) = if range_cyclic {
            (0, 0)
        } else {
            (0, u64::MAX)
        };
        Self {
            sync_mode,
            nr_to_write: 0,
            older_than: None,
            target_sb: None,
            wb_start: 0,
            range_cyclic,
            range_start,
            range_end,
            pages_skipped: 0,
            more_io: false,
            for_kupdate,
            first_error: None,
        }
    }

    /// Record `err` unless an earlier error was already captured this job
    pub fn record_error(&mut self, err: WritebackError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    /// Reset the per-slice counters at the top of each `wb_writeback`
    /// iteration, keeping the pass-wide parameters (`sync_mode`,
    /// `range_cyclic`, `for_kupdate`, `older_than`) intact
    pub fn begin_slice(&mut self, nr_to_write: i64) {
        self.more_io = false;
        self.nr_to_write = nr_to_write;
        self.pages_skipped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_cyclic_range_spans_everything() {
        let wbc = WbControl::new(SyncMode::All, false, false);
        assert_eq!(wbc.range_start, 0);
        assert_eq!(wbc.range_end, u64::MAX);
    }

    #[test]
    fn begin_slice_resets_only_per_slice_fields() {
        let mut wbc = WbControl::new(SyncMode::None, true, true);
        wbc.older_than = Some(42);
        wbc.more_io = true;
        wbc.pages_skipped = 3;
        wbc.begin_slice(1024);
        assert_eq!(wbc.nr_to_write, 1024);
        assert_eq!(wbc.pages_skipped, 0);
        assert!(!wbc.more_io);
        assert_eq!(wbc.older_than, Some(42), "pass-wide field must survive begin_slice");
    }
}
