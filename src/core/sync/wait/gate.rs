/*!
 * CAS Wait Gate
 *
 * Ownerless wait/notify built on a published generation counter and a
 * lock-free stack of waiter slots.
 *
 * # Protocol
 *
 * A waiter snapshots the generation, claims a slot, flags it `WAITING`,
 * re-reads the generation and only then parks. A caller bumps the
 * generation before scanning the slots, so either the waiter sees the new
 * generation or the caller sees the `WAITING` flag. No wake is lost.
 *
 * Slots are claimed by CAS and handed back after each wait, so the stack
 * only ever grows to the peak number of concurrent waiters.
 */

use super::wake::WakeResult;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::sync::interrupt;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

const FREE: u8 = 0;
const CLAIMED: u8 = 1;
const WAITING: u8 = 2;

thread_local! {
    static CURRENT_THREAD: Arc<Thread> = Arc::new(thread::current());
}

struct Slot {
    thread: ArcSwapOption<Thread>,
    state: AtomicU8,
    /// Fixed once the slot is published
    next: ArcSwapOption<Slot>,
}

impl Slot {
    fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(FREE, CLAIMED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Clear the waiting flag; succeeds for exactly one of waiter and waker
    fn try_unflag(&self) -> bool {
        self.state
            .compare_exchange(WAITING, CLAIMED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn unpark(&self) {
        if let Some(thread) = self.thread.load_full() {
            thread.unpark();
        }
    }

    fn release(&self) {
        self.thread.store(None);
        self.state.store(FREE, Ordering::Release);
    }
}

/// Generation-checked wait gate
///
/// # Example
///
/// ```
/// use taskweave::CasGate;
/// use std::time::Duration;
///
/// let gate = CasGate::new();
/// let seen = gate.generation();
/// gate.call();
/// // Already advanced: returns immediately
/// assert!(gate.await_generation(seen, Some(Duration::from_secs(1))));
/// ```
pub struct CasGate {
    generation: AtomicU64,
    top: ArcSwapOption<Slot>,
    waiters: AtomicUsize,
}

impl Default for CasGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CasGate {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            top: ArcSwapOption::empty(),
            waiters: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Threads currently inside a wait
    #[inline]
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Slots allocated so far (peak concurrent waiters)
    pub fn slot_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.top.load_full();
        while let Some(slot) = cursor {
            count += 1;
            cursor = slot.next.load_full();
        }
        count
    }

    fn claim_slot(&self) -> Arc<Slot> {
        let me = CURRENT_THREAD.with(Arc::clone);

        let mut cursor = self.top.load_full();
        while let Some(slot) = cursor {
            if slot.try_claim() {
                slot.thread.store(Some(me));
                return slot;
            }
            cursor = slot.next.load_full();
        }

        let slot = Arc::new(Slot {
            thread: ArcSwapOption::from(Some(me)),
            state: AtomicU8::new(CLAIMED),
            next: ArcSwapOption::empty(),
        });
        loop {
            let top = self.top.load_full();
            slot.next.store(top.clone());
            let previous = self.top.compare_and_swap(&top, Some(slot.clone()));
            let swapped = match (&*previous, &top) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if swapped {
                return slot;
            }
        }
    }

    /// Block until the generation differs from `expected` or the timeout
    /// elapses. Returns `true` if the generation advanced.
    pub fn await_generation(&self, expected: u64, timeout: Option<Duration>) -> bool {
        matches!(self.await_inner(expected, timeout, false), Ok(true))
    }

    /// Like [`await_generation`](Self::await_generation) but fails with
    /// `SyncError::Interrupted` when the calling thread is interrupted
    pub fn await_interruptibly(&self, expected: u64, timeout: Option<Duration>) -> SyncResult<bool> {
        self.await_inner(expected, timeout, true)
    }

    fn await_inner(&self, expected: u64, timeout: Option<Duration>, interruptible: bool) -> SyncResult<bool> {
        if interruptible && interrupt::interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.generation() != expected {
            return Ok(true);
        }
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let slot = self.claim_slot();
        self.waiters.fetch_add(1, Ordering::AcqRel);
        let outcome = loop {
            if self.generation() != expected {
                break Ok(true);
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break Ok(false);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            slot.state.store(WAITING, Ordering::SeqCst);
            if self.generation() == expected {
                match remaining {
                    Some(remaining) => thread::park_timeout(remaining),
                    None => thread::park(),
                }
            }
            slot.try_unflag();

            if interruptible && interrupt::interrupted() {
                break Err(SyncError::Interrupted);
            }
        };
        self.waiters.fetch_sub(1, Ordering::AcqRel);
        slot.release();
        outcome
    }

    /// Advance the generation and wake one parked waiter
    pub fn call(&self) -> WakeResult {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut cursor = self.top.load_full();
        while let Some(slot) = cursor {
            if slot.try_unflag() {
                slot.unpark();
                return WakeResult::Woken(1);
            }
            cursor = slot.next.load_full();
        }
        WakeResult::NoWaiters
    }

    /// Advance the generation and wake every waiter
    pub fn call_all(&self) -> WakeResult {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut woken = 0;
        let mut cursor = self.top.load_full();
        while let Some(slot) = cursor {
            if slot.state.load(Ordering::SeqCst) != FREE {
                if slot.try_unflag() {
                    woken += 1;
                }
                slot.unpark();
            }
            cursor = slot.next.load_full();
        }
        WakeResult::from_count(woken)
    }
}

impl std::fmt::Debug for CasGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasGate")
            .field("generation", &self.generation())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// Gate that wakes a single waiter per release
#[derive(Debug, Default)]
pub struct Semaphore {
    gate: CasGate,
}

impl Semaphore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next release; `false` on timeout
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let seen = self.gate.generation();
        self.gate.await_generation(seen, timeout)
    }

    pub fn release(&self) -> WakeResult {
        self.gate.call()
    }

    pub fn gate(&self) -> &CasGate {
        &self.gate
    }
}

/// Gate that wakes every waiter per notification
#[derive(Debug, Default)]
pub struct Monitor {
    gate: CasGate,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next notification; `false` on timeout
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let seen = self.gate.generation();
        self.gate.await_generation(seen, timeout)
    }

    pub fn notify_all(&self) -> WakeResult {
        self.gate.call_all()
    }

    pub fn gate(&self) -> &CasGate {
        &self.gate
    }
}
