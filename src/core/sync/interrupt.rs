/*!
 * Cooperative Thread Interruption
 *
 * Every thread owns an interrupt flag. Another thread holding an
 * [`Interrupter`] for it can raise the flag and unpark it; interruptible
 * blocking operations observe the flag after every wake-up, consume it and
 * unwind with `SyncError::Interrupted`.
 */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

struct ThreadState {
    id: u64,
    flag: Arc<AtomicBool>,
    thread: Thread,
}

thread_local! {
    static CURRENT: ThreadState = ThreadState {
        id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
        flag: Arc::new(AtomicBool::new(false)),
        thread: thread::current(),
    };
}

/// Small, non-zero identity of the calling thread (0 means "no thread")
#[inline]
pub fn current_thread_id() -> u64 {
    CURRENT.with(|state| state.id)
}

/// Handle used to interrupt a specific thread
#[derive(Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
    thread: Thread,
}

impl Interrupter {
    /// Handle for the calling thread
    pub fn current() -> Self {
        CURRENT.with(|state| Self {
            flag: state.flag.clone(),
            thread: state.thread.clone(),
        })
    }

    /// Raise the interrupt flag and wake the thread if it is parked
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
        self.thread.unpark();
    }

    /// Whether the flag is raised (does not consume it)
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter")
            .field("thread", &self.thread.name())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Test and clear the calling thread's interrupt flag
#[inline]
pub fn interrupted() -> bool {
    CURRENT.with(|state| state.flag.swap(false, Ordering::AcqRel))
}

/// Whether the calling thread's flag is raised (does not consume it)
#[inline]
pub fn is_interrupted() -> bool {
    CURRENT.with(|state| state.flag.load(Ordering::Acquire))
}

/// Re-raise the calling thread's flag after an uninterruptible wait swallowed it
#[inline]
pub fn self_interrupt() {
    CURRENT.with(|state| state.flag.store(true, Ordering::Release));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_thread_ids_unique_and_nonzero() {
        let main_id = current_thread_id();
        let other = thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(main_id, 0);
        assert_ne!(other, 0);
        assert_ne!(main_id, other);
        assert_eq!(main_id, current_thread_id());
    }

    #[test]
    fn test_interrupt_wakes_parked_thread() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            tx.send(Interrupter::current()).unwrap();
            while !is_interrupted() {
                thread::park();
            }
            interrupted()
        });

        let interrupter = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_interrupted_clears_flag() {
        self_interrupt();
        assert!(is_interrupted());
        assert!(interrupted());
        assert!(!interrupted());
    }
}
