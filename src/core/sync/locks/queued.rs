/*!
 * Queued Lock
 *
 * Reentrant exclusive lock over a CLH-style sync queue. Uncontended
 * acquires are a single CAS on the hold count; contended ones enqueue a
 * node and park until the predecessor hands over.
 *
 * # Variants
 *
 * - **Barging** (default): a free lock may be grabbed ahead of queued threads
 * - **Fair**: a free lock is granted in FIFO order
 * - **Pooled**: either of the above, recycling wait nodes from a fixed pool
 */

use super::condition::Condition;
use super::node::NodeRef;
use super::pool::NodePoolStats;
use super::queue::SyncQueue;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::SPIN_FOR_TIMEOUT_THRESHOLD;
use crate::core::sync::config::LockConfig;
use crate::core::sync::interrupt::{self, current_thread_id};
use log::trace;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared lock state; conditions hold a handle to it
pub(crate) struct LockCore {
    /// Hold count, 0 when free
    state: AtomicUsize,
    /// Owner thread id, meaningful only while `state > 0`
    owner: AtomicU64,
    fair: bool,
    pub(crate) queue: SyncQueue,
}

impl LockCore {
    fn new(config: &LockConfig) -> Self {
        Self {
            state: AtomicUsize::new(0),
            owner: AtomicU64::new(0),
            fair: config.is_fair(),
            queue: SyncQueue::new(config.pool_capacity()),
        }
    }

    #[inline]
    pub(crate) fn is_held_exclusively(&self) -> bool {
        self.state.load(Ordering::Acquire) > 0
            && self.owner.load(Ordering::Acquire) == current_thread_id()
    }

    #[inline]
    pub(crate) fn hold_count(&self) -> usize {
        self.state.load(Ordering::Acquire)
    }

    /// Single acquire attempt, honouring the fairness policy
    fn try_acquire(&self, acquires: usize) -> bool {
        self.try_acquire_with(acquires, self.fair)
    }

    fn try_acquire_with(&self, acquires: usize, fair: bool) -> bool {
        let me = current_thread_id();
        let count = self.state.load(Ordering::Acquire);
        if count == 0 {
            if (!fair || !self.queue.has_queued_predecessors())
                && self
                    .state
                    .compare_exchange(0, acquires, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.owner.store(me, Ordering::Release);
                return true;
            }
        } else if self.owner.load(Ordering::Acquire) == me {
            self.state.store(count + acquires, Ordering::Release);
            return true;
        }
        false
    }

    /// Drop `releases` holds; `Ok(true)` when the lock became free
    fn try_release(&self, releases: usize) -> SyncResult<bool> {
        let count = self.state.load(Ordering::Acquire);
        if count == 0 || count < releases || self.owner.load(Ordering::Acquire) != current_thread_id() {
            return Err(SyncError::IllegalMonitorState);
        }
        let remaining = count - releases;
        let free = remaining == 0;
        if free {
            self.owner.store(0, Ordering::Release);
        }
        self.state.store(remaining, Ordering::Release);
        Ok(free)
    }

    pub(crate) fn release(&self, releases: usize) -> SyncResult<bool> {
        if !self.try_release(releases)? {
            return Ok(false);
        }
        if let Some(head) = self.queue.head() {
            if head.status() as i32 != 0 {
                self.queue.unpark_successor(&head);
            }
        }
        Ok(true)
    }

    /// Uninterruptible acquire; re-raises a swallowed interrupt on return
    fn acquire(&self, acquires: usize) {
        if self.try_acquire(acquires) {
            return;
        }
        let node = self.queue.add_waiter();
        if self.acquire_queued(&node, acquires) {
            interrupt::self_interrupt();
        }
    }

    #[inline]
    fn try_promote(&self, node: &NodeRef, pred: &NodeRef, acquires: usize) -> bool {
        if self.queue.is_head(pred) && self.try_acquire(acquires) {
            self.queue.set_head(node);
            self.queue.retire(pred.clone());
            return true;
        }
        false
    }

    /// Acquire for an already-queued node. Returns whether the thread was
    /// interrupted while parked.
    pub(crate) fn acquire_queued(&self, node: &NodeRef, acquires: usize) -> bool {
        let mut interrupted = false;
        loop {
            let Some(pred) = node.prev.load_full() else {
                thread::yield_now();
                continue;
            };
            if self.try_promote(node, &pred, acquires) {
                return interrupted;
            }
            if self.queue.should_park_after_failed_acquire(&pred, node) {
                thread::park();
                if interrupt::interrupted() {
                    interrupted = true;
                }
            }
        }
    }

    fn acquire_interruptibly(&self, acquires: usize) -> SyncResult<()> {
        if interrupt::interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.try_acquire(acquires) {
            return Ok(());
        }
        let node = self.queue.add_waiter();
        loop {
            let Some(pred) = node.prev.load_full() else {
                thread::yield_now();
                continue;
            };
            if self.try_promote(&node, &pred, acquires) {
                return Ok(());
            }
            if self.queue.should_park_after_failed_acquire(&pred, &node) {
                thread::park();
                if interrupt::interrupted() {
                    self.queue.cancel_acquire(&node);
                    trace!("lock acquire interrupted");
                    return Err(SyncError::Interrupted);
                }
            }
        }
    }

    fn acquire_until(&self, acquires: usize, deadline: Instant) -> SyncResult<bool> {
        if interrupt::interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.try_acquire(acquires) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        let node = self.queue.add_waiter();
        loop {
            let Some(pred) = node.prev.load_full() else {
                thread::yield_now();
                continue;
            };
            if self.try_promote(&node, &pred, acquires) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                self.queue.cancel_acquire(&node);
                trace!("lock acquire timed out");
                return Ok(false);
            }
            let remaining = deadline - now;
            if self.queue.should_park_after_failed_acquire(&pred, &node)
                && remaining > SPIN_FOR_TIMEOUT_THRESHOLD
            {
                thread::park_timeout(remaining);
            }
            if interrupt::interrupted() {
                self.queue.cancel_acquire(&node);
                return Err(SyncError::Interrupted);
            }
        }
    }
}

/// Reentrant queued lock
///
/// Cloning yields another handle to the same lock.
///
/// # Example
///
/// ```
/// use taskweave::QueuedLock;
///
/// let lock = QueuedLock::fair();
/// lock.lock();
/// lock.lock();
/// assert_eq!(lock.hold_count(), 2);
/// lock.unlock().unwrap();
/// lock.unlock().unwrap();
/// assert!(!lock.is_locked());
/// ```
#[derive(Clone)]
pub struct QueuedLock {
    core: Arc<LockCore>,
}

impl Default for QueuedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuedLock {
    /// Barging lock without node pooling
    pub fn new() -> Self {
        Self::with_config(LockConfig::default())
    }

    /// FIFO lock without node pooling
    pub fn fair() -> Self {
        Self::with_config(LockConfig::fair())
    }

    /// Barging lock that recycles wait nodes
    pub fn pooled() -> Self {
        Self::with_config(LockConfig::pooled())
    }

    pub fn with_config(config: LockConfig) -> Self {
        Self {
            core: Arc::new(LockCore::new(&config)),
        }
    }

    /// Block until the lock is held. Interrupts raised while parked are
    /// remembered and re-raised once the lock is taken.
    pub fn lock(&self) {
        if !self.core.fair
            && self
                .core
                .state
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.core.owner.store(current_thread_id(), Ordering::Release);
            return;
        }
        self.core.acquire(1);
    }

    /// Take the lock only if it is free right now (or already ours).
    /// Barges even on a fair lock.
    pub fn try_lock(&self) -> bool {
        self.core.try_acquire_with(1, false)
    }

    /// Like [`lock`](Self::lock) but gives up with `SyncError::Interrupted`
    pub fn lock_interruptibly(&self) -> SyncResult<()> {
        self.core.acquire_interruptibly(1)
    }

    /// Wait at most `timeout`; `Ok(false)` on timeout
    pub fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_lock_until(deadline),
            None => self.lock_interruptibly().map(|_| true),
        }
    }

    /// Wait until `deadline`; `Ok(false)` on timeout
    pub fn try_lock_until(&self, deadline: Instant) -> SyncResult<bool> {
        self.core.acquire_until(1, deadline)
    }

    /// Drop one hold; fails if the caller is not the owner
    pub fn unlock(&self) -> SyncResult<()> {
        self.core.release(1).map(|_| ())
    }

    /// Condition bound to this lock
    pub fn new_condition(&self) -> Condition {
        Condition::new(self.core.clone())
    }

    /// Lock and return a guard that unlocks on drop
    pub fn guard(&self) -> QueuedLockGuard<'_> {
        self.lock();
        QueuedLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Guard if the lock is free right now
    pub fn try_guard(&self) -> Option<QueuedLockGuard<'_>> {
        self.try_lock().then(|| QueuedLockGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.core.hold_count() > 0
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.core.is_held_exclusively()
    }

    /// Holds by the calling thread (0 if it is not the owner)
    pub fn hold_count(&self) -> usize {
        if self.core.is_held_exclusively() {
            self.core.hold_count()
        } else {
            0
        }
    }

    pub fn has_queued_threads(&self) -> bool {
        self.core.queue.has_queued_threads()
    }

    /// Approximate number of threads waiting to acquire
    pub fn queue_length(&self) -> usize {
        self.core.queue.queue_length()
    }

    pub fn is_fair(&self) -> bool {
        self.core.fair
    }

    /// Node pool counters, `None` for unpooled locks
    pub fn pool_stats(&self) -> Option<NodePoolStats> {
        self.core.queue.pool_stats()
    }
}

impl std::fmt::Debug for QueuedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedLock")
            .field("fair", &self.core.fair)
            .field("holds", &self.core.hold_count())
            .field("queued", &self.core.queue.has_queued_threads())
            .finish()
    }
}

/// RAII guard; unlocks on drop and must stay on the locking thread
#[must_use = "if unused the lock is released immediately"]
pub struct QueuedLockGuard<'a> {
    lock: &'a QueuedLock,
    _not_send: PhantomData<*const ()>,
}

impl QueuedLockGuard<'_> {
    pub fn lock(&self) -> &QueuedLock {
        self.lock
    }
}

impl Drop for QueuedLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            log::error!("queued lock guard dropped without ownership: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_reentrant_hold_count() {
        let lock = QueuedLock::new();
        lock.lock();
        assert!(lock.try_lock());
        assert_eq!(lock.hold_count(), 2);
        lock.unlock().unwrap();
        assert!(lock.is_locked());
        lock.unlock().unwrap();
        assert!(!lock.is_locked());
        assert_eq!(lock.unlock(), Err(SyncError::IllegalMonitorState));
    }

    #[test]
    fn test_unlock_from_other_thread_fails() {
        let lock = QueuedLock::new();
        lock.lock();
        let other = lock.clone();
        let result = thread::spawn(move || other.unlock()).join().unwrap();
        assert_eq!(result, Err(SyncError::IllegalMonitorState));
        assert!(lock.is_held_by_current_thread());
        lock.unlock().unwrap();
    }

    #[test]
    fn test_try_lock_for_times_out() {
        let lock = QueuedLock::fair();
        lock.lock();
        let other = lock.clone();
        let acquired = thread::spawn(move || other.try_lock_for(Duration::from_millis(30)))
            .join()
            .unwrap();
        assert_eq!(acquired, Ok(false));
        assert!(!lock.has_queued_threads());
        lock.unlock().unwrap();
    }

    #[test]
    fn test_lock_interruptibly_pre_interrupted() {
        let lock = QueuedLock::new();
        interrupt::self_interrupt();
        assert_eq!(lock.lock_interruptibly(), Err(SyncError::Interrupted));
        assert!(!interrupt::is_interrupted());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_lock_preserves_interrupt() {
        let lock = QueuedLock::new();
        lock.lock();
        let other = lock.clone();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            tx.send(interrupt::Interrupter::current()).unwrap();
            other.lock();
            flag.store(true, Ordering::SeqCst);
            let was_interrupted = interrupt::interrupted();
            other.unlock().unwrap();
            was_interrupted
        });

        let interrupter = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();
        thread::sleep(Duration::from_millis(20));
        assert!(!done.load(Ordering::SeqCst));
        lock.unlock().unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_guard_unlocks_on_drop() {
        let lock = QueuedLock::pooled();
        {
            let _guard = lock.guard();
            assert!(lock.is_held_by_current_thread());
            assert!(lock.try_guard().is_some());
            assert_eq!(lock.hold_count(), 1);
        }
        assert!(!lock.is_locked());
    }
}
