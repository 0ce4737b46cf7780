//! Bit-wait primitives
//!
//! The engine blocks on two bits: an inode's `SYNC` bit (integrity
//! writers waiting for a concurrent writer to finish) and a `Job`'s `USED`
//! bit (a synchronous submitter waiting for its job to complete). This
//! kernel has no futex or condvar facility yet (`src/sched` exposes no
//! sleep-queue API), so both are implemented as a spin-wait with exponential
//! backoff, mirroring [`crate::sync::SpinLock::lock`]'s own backoff loop.

const MAX_BACKOFF: usize = 256;

/// Spin until `poll` returns `false`, backing off exponentially between
/// checks to reduce bus contention
///
/// `poll` re-examines shared state (typically by briefly re-locking a
/// `SpinLock`-guarded flag) each iteration; there is no lock held across
/// calls to `poll` itself.
pub fn wait_while(mut poll: impl FnMut() -> bool) {
    let mut backoff = 1usize;
    while poll() {
        for _ in 0..backoff {
            core::hint::spin_loop();
        }
        if backoff < MAX_BACKOFF {
            backoff *= 2;
        }
    }
}

/// Marks a point where a real wait-queue implementation would wake parked
/// waiters. With spin-wait semantics this is a no-op: waiters observe the
/// cleared bit on their next poll. Kept as an explicit call so call sites
/// read the same whether or not the bit is actually watched by anyone, and
/// so a future condvar-backed implementation has an obvious seam to fill in.
#[inline]
pub fn wake_all() {}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn wait_while_returns_once_condition_clears() {
        let flag = AtomicBool::new(true);
        flag.store(false, Ordering::Relaxed);
        wait_while(|| flag.load(Ordering::Relaxed));
    }
}
