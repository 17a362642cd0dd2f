/*!
 * Condition Variable
 *
 * Wait/signal bound to one queued lock. Waiters sit on a private list
 * tagged `Condition` until a signal moves them onto the lock's sync queue,
 * where they reacquire with the hold count they released.
 */

use super::node::{Node, NodeRef, WaitStatus};
use super::queued::LockCore;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::SPIN_FOR_TIMEOUT_THRESHOLD;
use crate::core::sync::interrupt;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How an interrupt observed during a wait is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptMode {
    None,
    /// Interrupted after being signalled: re-raise the flag on exit
    Reinterrupt,
    /// Interrupted before being signalled: fail with `Interrupted`
    Throw,
}

struct ConditionState {
    lock: Arc<LockCore>,
    /// Condition list; only touched while the lock is held
    first: ArcSwapOption<Node>,
    last: ArcSwapOption<Node>,
}

/// Condition bound to a [`QueuedLock`](super::QueuedLock)
///
/// Every operation requires the calling thread to hold the lock and fails
/// with `SyncError::IllegalMonitorState` otherwise.
#[derive(Clone)]
pub struct Condition {
    state: Arc<ConditionState>,
}

impl Condition {
    pub(crate) fn new(lock: Arc<LockCore>) -> Self {
        Self {
            state: Arc::new(ConditionState {
                lock,
                first: ArcSwapOption::empty(),
                last: ArcSwapOption::empty(),
            }),
        }
    }

    fn check_owner(&self) -> SyncResult<()> {
        if self.state.lock.is_held_exclusively() {
            Ok(())
        } else {
            Err(SyncError::IllegalMonitorState)
        }
    }

    fn add_condition_waiter(&self) -> NodeRef {
        let state = &self.state;
        let mut last = state.last.load_full();
        if last.as_ref().is_some_and(|t| t.status() != WaitStatus::Condition) {
            self.unlink_cancelled_waiters();
            last = state.last.load_full();
        }
        let node = state.lock.queue.new_node(WaitStatus::Condition);
        match last {
            Some(tail) => tail.next_waiter.store(Some(node.clone())),
            None => state.first.store(Some(node.clone())),
        }
        state.last.store(Some(node.clone()));
        node
    }

    /// Release every hold; returns the saved count
    fn fully_release(&self, node: &NodeRef) -> SyncResult<usize> {
        let saved = self.state.lock.hold_count();
        match self.state.lock.release(saved) {
            Ok(true) => Ok(saved),
            _ => {
                node.set_status(WaitStatus::Cancelled);
                Err(SyncError::IllegalMonitorState)
            }
        }
    }

    fn unlink_cancelled_waiters(&self) {
        let state = &self.state;
        let mut cursor = state.first.load_full();
        let mut trail: Option<NodeRef> = None;
        while let Some(node) = cursor {
            let next = node.next_waiter.load_full();
            if node.status() != WaitStatus::Condition {
                node.next_waiter.store(None);
                match &trail {
                    Some(t) => t.next_waiter.store(next.clone()),
                    None => state.first.store(next.clone()),
                }
                if next.is_none() {
                    state.last.store(trail.clone());
                }
            } else {
                trail = Some(node);
            }
            cursor = next;
        }
    }

    fn check_interrupt_while_waiting(&self, node: &NodeRef) -> InterruptMode {
        if !interrupt::interrupted() {
            return InterruptMode::None;
        }
        if self.state.lock.queue.transfer_after_cancelled_wait(node) {
            InterruptMode::Throw
        } else {
            InterruptMode::Reinterrupt
        }
    }

    /// Reacquire with the saved holds, tidy the list and report interrupts
    fn finish_wait(&self, node: &NodeRef, saved: usize, mut mode: InterruptMode) -> SyncResult<()> {
        if self.state.lock.acquire_queued(node, saved) && mode != InterruptMode::Throw {
            mode = InterruptMode::Reinterrupt;
        }
        if node.next_waiter.load_full().is_some() {
            self.unlink_cancelled_waiters();
        }
        match mode {
            InterruptMode::Throw => Err(SyncError::Interrupted),
            InterruptMode::Reinterrupt => {
                interrupt::self_interrupt();
                Ok(())
            }
            InterruptMode::None => Ok(()),
        }
    }

    /// Wait until signalled or interrupted
    pub fn await_signal(&self) -> SyncResult<()> {
        if interrupt::interrupted() {
            return Err(SyncError::Interrupted);
        }
        self.check_owner()?;
        let node = self.add_condition_waiter();
        let saved = self.fully_release(&node)?;

        let mut mode = InterruptMode::None;
        while !self.state.lock.queue.is_on_sync_queue(&node) {
            thread::park();
            mode = self.check_interrupt_while_waiting(&node);
            if mode != InterruptMode::None {
                break;
            }
        }
        self.finish_wait(&node, saved, mode)
    }

    /// Wait until signalled; interrupts are remembered, not acted on
    pub fn await_uninterruptibly(&self) -> SyncResult<()> {
        self.check_owner()?;
        let node = self.add_condition_waiter();
        let saved = self.fully_release(&node)?;

        let mut interrupted = false;
        while !self.state.lock.queue.is_on_sync_queue(&node) {
            thread::park();
            if interrupt::interrupted() {
                interrupted = true;
            }
        }
        if self.state.lock.acquire_queued(&node, saved) || interrupted {
            interrupt::self_interrupt();
        }
        Ok(())
    }

    /// Returns `Ok(true)` when the deadline passed before a signal arrived
    fn await_deadline(&self, deadline: Instant) -> SyncResult<bool> {
        if interrupt::interrupted() {
            return Err(SyncError::Interrupted);
        }
        self.check_owner()?;
        let node = self.add_condition_waiter();
        let saved = self.fully_release(&node)?;

        let queue = &self.state.lock.queue;
        let mut timed_out = false;
        let mut mode = InterruptMode::None;
        while !queue.is_on_sync_queue(&node) {
            let now = Instant::now();
            if now >= deadline {
                timed_out = queue.transfer_after_cancelled_wait(&node);
                break;
            }
            let remaining = deadline - now;
            if remaining > SPIN_FOR_TIMEOUT_THRESHOLD {
                thread::park_timeout(remaining);
            }
            mode = self.check_interrupt_while_waiting(&node);
            if mode != InterruptMode::None {
                break;
            }
        }
        self.finish_wait(&node, saved, mode)?;
        Ok(timed_out)
    }

    /// Wait at most `nanos`; returns an estimate of the time left, `<= 0`
    /// meaning the wait timed out
    pub fn await_nanos(&self, nanos: u64) -> SyncResult<i64> {
        let start = Instant::now();
        let Some(deadline) = start.checked_add(Duration::from_nanos(nanos)) else {
            self.await_signal()?;
            return Ok(i64::MAX);
        };
        self.await_deadline(deadline)?;
        let now = Instant::now();
        let remaining = if now >= deadline {
            -i64::try_from((now - deadline).as_nanos()).unwrap_or(i64::MAX)
        } else {
            i64::try_from((deadline - now).as_nanos()).unwrap_or(i64::MAX)
        };
        Ok(remaining)
    }

    /// Wait at most `timeout`; `Ok(false)` when it elapsed unsignalled
    pub fn await_timeout(&self, timeout: Duration) -> SyncResult<bool> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.await_until(deadline),
            None => self.await_signal().map(|_| true),
        }
    }

    /// Wait until `deadline`; `Ok(false)` when it passed unsignalled
    pub fn await_until(&self, deadline: Instant) -> SyncResult<bool> {
        self.await_deadline(deadline).map(|timed_out| !timed_out)
    }

    /// Move the longest-waiting thread to the lock queue
    pub fn signal(&self) -> SyncResult<()> {
        self.check_owner()?;
        let state = &self.state;
        let mut cursor = state.first.load_full();
        while let Some(node) = cursor {
            let next = node.next_waiter.load_full();
            state.first.store(next.clone());
            if next.is_none() {
                state.last.store(None);
            }
            node.next_waiter.store(None);
            if state.lock.queue.transfer_for_signal(&node) {
                break;
            }
            cursor = next;
        }
        Ok(())
    }

    /// Move every waiting thread to the lock queue
    pub fn signal_all(&self) -> SyncResult<()> {
        self.check_owner()?;
        let state = &self.state;
        let mut cursor = state.first.swap(None);
        state.last.store(None);
        while let Some(node) = cursor {
            cursor = node.next_waiter.swap(None);
            state.lock.queue.transfer_for_signal(&node);
        }
        Ok(())
    }

    pub fn has_waiters(&self) -> SyncResult<bool> {
        Ok(self.waiter_count()? > 0)
    }

    /// Threads currently waiting on this condition
    pub fn waiter_count(&self) -> SyncResult<usize> {
        self.check_owner()?;
        let mut count = 0;
        let mut cursor = self.state.first.load_full();
        while let Some(node) = cursor {
            if node.status() == WaitStatus::Condition {
                count += 1;
            }
            cursor = node.next_waiter.load_full();
        }
        Ok(count)
    }
}

impl Drop for ConditionState {
    fn drop(&mut self) {
        let mut cursor = self.first.swap(None);
        self.last.store(None);
        while let Some(node) = cursor {
            cursor = node.next_waiter.swap(None);
        }
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::QueuedLock;
    use super::*;

    #[test]
    fn test_requires_lock() {
        let lock = QueuedLock::new();
        let cond = lock.new_condition();
        assert_eq!(cond.signal(), Err(SyncError::IllegalMonitorState));
        assert_eq!(cond.await_signal(), Err(SyncError::IllegalMonitorState));
        assert_eq!(cond.waiter_count(), Err(SyncError::IllegalMonitorState));
    }

    #[test]
    fn test_timed_wait_restores_holds() {
        let lock = QueuedLock::new();
        let cond = lock.new_condition();
        lock.lock();
        lock.lock();
        assert_eq!(cond.await_timeout(Duration::from_millis(10)), Ok(false));
        assert_eq!(lock.hold_count(), 2);
        assert_eq!(cond.waiter_count(), Ok(0));
        lock.unlock().unwrap();
        lock.unlock().unwrap();
    }

    #[test]
    fn test_await_nanos_reports_timeout() {
        let lock = QueuedLock::new();
        let cond = lock.new_condition();
        lock.lock();
        let remaining = cond.await_nanos(1_000_000).unwrap();
        assert!(remaining <= 0);
        lock.unlock().unwrap();
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let lock = QueuedLock::new();
        let cond = lock.new_condition();
        let (waiter_lock, waiter_cond) = (lock.clone(), cond.clone());

        let handle = thread::spawn(move || {
            waiter_lock.lock();
            let signalled = waiter_cond.await_timeout(Duration::from_secs(5));
            waiter_lock.unlock().unwrap();
            signalled
        });

        loop {
            lock.lock();
            if cond.has_waiters().unwrap() {
                cond.signal().unwrap();
                lock.unlock().unwrap();
                break;
            }
            lock.unlock().unwrap();
            thread::yield_now();
        }
        assert_eq!(handle.join().unwrap(), Ok(true));
    }
}
