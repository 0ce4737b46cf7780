//! Tunables for the writeback engine
//!
//! These are read-only from the core's point of view; the administrative
//! layer (sysctl-equivalent) updates them through [`set_tunables`]. Centisecond
//! units and ratio-based dirty limits match the historical `dirty_writeback_centisecs`
//! /`dirty_expire_centisecs` naming this engine is modeled on.

use spin::RwLock;

/// Maximum number of pages written per flusher slice before yielding the
/// pass back to the outer loop
pub const MAX_WRITEBACK_PAGES: i64 = 1024;

/// Bound on outstanding jobs per backing device; `submit_opportunistic`
/// degrades to a bare worker wakeup once this is reached, matching the
/// "allocation failed" branch of the real kmalloc-backed job queue
pub const MAX_OUTSTANDING_JOBS: usize = 4096;

/// Writeback tunables
#[derive(Clone, Copy, Debug)]
pub struct WritebackTunables {
    /// Centiseconds between periodic (kupdate) passes
    pub dirty_writeback_interval_cs: u64,
    /// Centiseconds a page may stay dirty before it is considered "old"
    pub dirty_expire_interval_cs: u64,
    /// Background dirty limit, percent of free+reclaimable memory
    pub dirty_background_ratio: u8,
    /// Hard dirty limit, percent of free+reclaimable memory
    pub dirty_ratio: u8,
}

impl WritebackTunables {
    pub const fn default() -> Self {
        Self {
            dirty_writeback_interval_cs: 500,
            dirty_expire_interval_cs: 3000,
            dirty_background_ratio: 10,
            dirty_ratio: 20,
        }
    }
}

static TUNABLES: RwLock<WritebackTunables> = RwLock::new(WritebackTunables::default());

/// Snapshot the current tunables
pub fn tunables() -> WritebackTunables {
    *TUNABLES.read()
}

/// Replace the tunables wholesale (administrative layer only)
pub fn set_tunables(new: WritebackTunables) {
    *TUNABLES.write() = new;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let t = WritebackTunables::default();
        assert!(t.dirty_background_ratio < t.dirty_ratio);
        assert!(t.dirty_writeback_interval_cs > 0);
    }

    #[test]
    fn set_and_read_round_trip() {
        let mut t = tunables();
        t.dirty_ratio = 42;
        set_tunables(t);
        assert_eq!(tunables().dirty_ratio, 42);
        set_tunables(WritebackTunables::default());
    }
}
