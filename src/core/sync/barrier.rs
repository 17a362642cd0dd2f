/*!
 * Quiescence Barrier
 *
 * Counts threads inside a region and lets one thread close the entrance
 * and wait until a given number of participants remain.
 *
 * # Encoding
 *
 * A single `AtomicIsize`: `n >= 0` while open, `!n` (that is `-n - 1`)
 * while locked, so "locked with zero participants" stays representable.
 */

use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::BARRIER_SPINS_BEFORE_YIELD;
use parking_lot_core::SpinWait;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[inline(always)]
fn participants(raw: isize) -> usize {
    if raw < 0 {
        (!raw) as usize
    } else {
        raw as usize
    }
}

/// Backoff: short busy spins, then processor yields
struct Backoff {
    spins: u32,
    spin: SpinWait,
}

impl Backoff {
    fn new() -> Self {
        Self {
            spins: 0,
            spin: SpinWait::new(),
        }
    }

    fn snooze(&mut self) {
        if self.spins < BARRIER_SPINS_BEFORE_YIELD {
            self.spin.spin_no_yield();
            self.spins += 1;
        } else {
            thread::yield_now();
        }
    }
}

#[derive(Debug, Default)]
pub struct QuiescenceBarrier {
    state: AtomicIsize,
}

impl QuiescenceBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the region, spinning while the barrier is locked
    pub fn enter(&self) {
        let mut backoff = Backoff::new();
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= 0
                && self
                    .state
                    .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return;
            }
            backoff.snooze();
        }
    }

    /// Enter only if the barrier is open right now
    pub fn try_enter(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        while current >= 0 {
            match self
                .state
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// Leave the region; allowed while locked
    pub fn leave(&self) -> SyncResult<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match current {
                0 | -1 => return Err(SyncError::BarrierUnderflow),
                n if n > 0 => n - 1,
                // locked: !n -> !(n - 1)
                n => n + 1,
            };
            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Enter and return a guard that leaves on drop
    pub fn enter_guard(&self) -> BarrierGuard<'_> {
        self.enter();
        BarrierGuard { barrier: self }
    }

    /// Close the entrance; only one thread may hold the barrier locked
    pub fn lock(&self) -> SyncResult<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current < 0 {
                return Err(SyncError::BarrierAlreadyLocked);
            }
            match self
                .state
                .compare_exchange_weak(current, !current, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Spin until exactly `n` participants remain inside
    pub fn wait(&self, n: usize) -> SyncResult<()> {
        let mut backoff = Backoff::new();
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= 0 {
                return Err(SyncError::BarrierNotLocked);
            }
            if participants(current) == n {
                return Ok(());
            }
            backoff.snooze();
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`
    pub fn wait_timeout(&self, n: usize, timeout: Duration) -> SyncResult<bool> {
        let deadline = Instant::now().checked_add(timeout);
        let mut backoff = Backoff::new();
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= 0 {
                return Err(SyncError::BarrierNotLocked);
            }
            if participants(current) == n {
                return Ok(true);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(false);
            }
            backoff.snooze();
        }
    }

    /// Reopen the entrance
    pub fn release(&self) -> SyncResult<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= 0 {
                return Err(SyncError::BarrierNotLocked);
            }
            match self
                .state
                .compare_exchange_weak(current, !current, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Participants currently inside
    pub fn count(&self) -> usize {
        participants(self.state.load(Ordering::Acquire))
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Acquire) < 0
    }
}

/// Leaves the barrier on drop
#[must_use = "if unused the barrier is left immediately"]
pub struct BarrierGuard<'a> {
    barrier: &'a QuiescenceBarrier,
}

impl Drop for BarrierGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.barrier.leave() {
            log::error!("barrier guard dropped on an empty barrier: {}", e);
        }
    }
}
