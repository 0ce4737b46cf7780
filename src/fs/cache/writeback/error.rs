//! Error and result types for the writeback engine

/// Errors surfaced by the writeback engine and its external collaborators
///
/// These mirror the error kinds of the writeback design: they are
/// never exceptions, always returned through `Result`, and never abort the
/// flusher loop or leave an inode claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritebackError {
    /// `do_writepages`, `filemap_fdatawait`, or `write_inode` reported an I/O
    /// failure
    Io,
    /// Heap allocation of an opportunistic `Job` failed
    AllocFailed,
    /// Superblock pin failed (unmount racing with writeback)
    PinFailed,
}

impl core::fmt::Display for WritebackError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            WritebackError::Io => "I/O error during writeback",
            WritebackError::AllocFailed => "failed to allocate writeback job",
            WritebackError::PinFailed => "failed to pin superblock for writeback",
        };
        write!(f, "{}", s)
    }
}

/// Result type used throughout the writeback engine
pub type WbResult<T> = Result<T, WritebackError>;

/// Combine two results, keeping the first error encountered
///
/// Mirrors the "first-error-wins" propagation policy: `do_writepages`,
/// `filemap_fdatawait`, and `write_inode` are all invoked even if an earlier
/// one failed, but only the first failure is reported to the caller.
pub fn first_err(acc: WbResult<()>, next: WbResult<()>) -> WbResult<()> {
    match acc {
        Ok(()) => next,
        Err(e) => Err(e),
    }
}
