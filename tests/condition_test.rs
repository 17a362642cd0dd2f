/*!
 * Condition Integration Tests
 *
 * Bounded-buffer handoff, timeouts and ownership checks
 */

use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use taskweave::{Condition, Interrupter, QueuedLock, SyncError};

/// Classic two-condition bounded buffer; the std mutex only guards the
/// VecDeque and is always taken inside the queued lock
struct BoundedBuffer {
    lock: QueuedLock,
    not_full: Condition,
    not_empty: Condition,
    items: Mutex<VecDeque<u32>>,
    capacity: usize,
}

impl BoundedBuffer {
    fn new(capacity: usize) -> Self {
        let lock = QueuedLock::fair();
        Self {
            not_full: lock.new_condition(),
            not_empty: lock.new_condition(),
            lock,
            items: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn put(&self, value: u32) {
        let _guard = self.lock.guard();
        while self.items.lock().unwrap().len() == self.capacity {
            self.not_full.await_uninterruptibly().unwrap();
        }
        self.items.lock().unwrap().push_back(value);
        self.not_empty.signal().unwrap();
    }

    fn take(&self) -> u32 {
        let _guard = self.lock.guard();
        loop {
            if let Some(value) = self.items.lock().unwrap().pop_front() {
                self.not_full.signal().unwrap();
                return value;
            }
            self.not_empty.await_uninterruptibly().unwrap();
        }
    }
}

#[test]
fn test_bounded_buffer_preserves_every_item() {
    let buffer = Arc::new(BoundedBuffer::new(2));

    let producers: Vec<_> = (0..3)
        .map(|p| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    buffer.put(p * 1000 + i);
                }
            })
        })
        .collect();

    let consumer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            let mut seen: Vec<u32> = (0..600).map(|_| buffer.take()).collect();
            seen.sort_unstable();
            seen
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    let seen = consumer.join().unwrap();

    let mut expected: Vec<u32> = (0..3).flat_map(|p| (0..200).map(move |i| p * 1000 + i)).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[test]
fn test_await_reacquires_with_same_hold_count() {
    let lock = QueuedLock::new();
    let cond = lock.new_condition();
    let ready = Arc::new(AtomicBool::new(false));

    let signaller = {
        let lock = lock.clone();
        let cond = cond.clone();
        let ready = ready.clone();
        thread::spawn(move || {
            while !ready.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            let _guard = lock.guard();
            cond.signal().unwrap();
        })
    };

    lock.lock();
    lock.lock();
    ready.store(true, Ordering::SeqCst);
    assert!(cond.await_timeout(Duration::from_secs(5)).unwrap());
    assert_eq!(lock.hold_count(), 2);
    lock.unlock().unwrap();
    lock.unlock().unwrap();
    signaller.join().unwrap();
}

#[test]
fn test_await_timeout_without_signal() {
    let lock = QueuedLock::new();
    let cond = lock.new_condition();
    let _guard = lock.guard();

    let start = Instant::now();
    assert!(!cond.await_timeout(Duration::from_millis(30)).unwrap());
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert!(lock.is_held_by_current_thread());
    assert!(cond.await_nanos(1_000_000).unwrap() <= 0);
    assert!(!cond.has_waiters().unwrap());
}

#[test]
fn test_operations_require_ownership() {
    let lock = QueuedLock::new();
    let cond = lock.new_condition();
    assert_eq!(cond.signal(), Err(SyncError::IllegalMonitorState));
    assert_eq!(cond.signal_all(), Err(SyncError::IllegalMonitorState));
    assert_eq!(cond.await_signal(), Err(SyncError::IllegalMonitorState));
    assert_eq!(cond.waiter_count(), Err(SyncError::IllegalMonitorState));
}

#[test]
fn test_signal_all_wakes_every_waiter() {
    let lock = QueuedLock::new();
    let cond = lock.new_condition();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let lock = lock.clone();
            let cond = cond.clone();
            thread::spawn(move || {
                let _guard = lock.guard();
                cond.await_timeout(Duration::from_secs(5)).unwrap()
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let _guard = lock.guard();
        if cond.waiter_count().unwrap() == 4 {
            cond.signal_all().unwrap();
            break;
        }
        assert!(Instant::now() < deadline);
        drop(_guard);
        thread::sleep(Duration::from_millis(1));
    }

    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
}

#[test]
fn test_interrupt_during_await_reacquires_lock() {
    let lock = QueuedLock::new();
    let cond = lock.new_condition();
    let (tx, rx) = mpsc::channel();

    let waiter = {
        let lock = lock.clone();
        let cond = cond.clone();
        thread::spawn(move || {
            let _guard = lock.guard();
            tx.send(Interrupter::current()).unwrap();
            let result = cond.await_signal();
            (result, lock.is_held_by_current_thread())
        })
    };

    let interrupter = rx.recv().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let _guard = lock.guard();
        if cond.has_waiters().unwrap() {
            break;
        }
        assert!(Instant::now() < deadline);
        drop(_guard);
        thread::sleep(Duration::from_millis(1));
    }
    interrupter.interrupt();

    let (result, held) = waiter.join().unwrap();
    assert_eq!(result, Err(SyncError::Interrupted));
    assert!(held);
    assert!(!lock.is_locked());
}
