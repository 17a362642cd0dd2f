/*!
 * Queued Lock Integration Tests
 *
 * Mutual exclusion, reentrancy, fairness and cancellation under contention
 */

use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use taskweave::{Interrupter, LockConfig, QueuedLock, SyncError};

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_mutual_exclusion_under_contention() {
    for lock in [QueuedLock::new(), QueuedLock::fair(), QueuedLock::pooled()] {
        let inside = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                let total = total.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let _guard = lock.guard();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(total.load(Ordering::SeqCst), 4000);
        assert!(!lock.is_locked());
        assert!(!lock.has_queued_threads());
    }
}

#[test]
fn test_reentrant_acquire_counts_holds() {
    let lock = QueuedLock::new();
    lock.lock();
    lock.lock();
    assert!(lock.try_lock());
    assert_eq!(lock.hold_count(), 3);

    lock.unlock().unwrap();
    lock.unlock().unwrap();
    assert!(lock.is_locked());
    lock.unlock().unwrap();
    assert!(!lock.is_locked());
    assert_eq!(lock.unlock(), Err(SyncError::IllegalMonitorState));
}

#[test]
fn test_unlock_from_other_thread_is_rejected() {
    let lock = QueuedLock::new();
    lock.lock();
    let other = lock.clone();
    let result = thread::spawn(move || other.unlock()).join().unwrap();
    assert_eq!(result, Err(SyncError::IllegalMonitorState));
    assert!(lock.is_held_by_current_thread());
    lock.unlock().unwrap();
}

#[test]
fn test_fair_lock_grants_in_arrival_order() {
    let lock = QueuedLock::fair();
    let order = Arc::new(Mutex::new(Vec::new()));

    // A holds the lock while B then C queue up behind it
    lock.lock();
    let spawn = |name: &'static str| {
        let lock = lock.clone();
        let order = order.clone();
        thread::spawn(move || {
            lock.lock();
            order.lock().unwrap().push(name);
            lock.unlock().unwrap();
        })
    };

    let b = spawn("B");
    wait_until(|| lock.queue_length() == 1);
    let c = spawn("C");
    wait_until(|| lock.queue_length() == 2);

    order.lock().unwrap().push("A");
    lock.unlock().unwrap();
    b.join().unwrap();
    c.join().unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn test_try_lock_for_times_out_and_leaves_queue_clean() {
    let lock = QueuedLock::with_config(LockConfig::fair());
    lock.lock();

    let other = lock.clone();
    let (acquired, elapsed) = thread::spawn(move || {
        let start = Instant::now();
        (other.try_lock_for(Duration::from_millis(50)).unwrap(), start.elapsed())
    })
    .join()
    .unwrap();

    assert!(!acquired);
    assert!(elapsed >= Duration::from_millis(50));
    assert_eq!(lock.queue_length(), 0);

    lock.unlock().unwrap();
    let other = lock.clone();
    assert!(thread::spawn(move || {
        let got = other.try_lock_for(Duration::from_secs(1)).unwrap();
        other.unlock().unwrap();
        got
    })
    .join()
    .unwrap());
}

#[test]
fn test_interrupted_waiter_is_cancelled() {
    let lock = QueuedLock::new();
    lock.lock();

    let (tx, rx) = mpsc::channel();
    let other = lock.clone();
    let waiter = thread::spawn(move || {
        tx.send(Interrupter::current()).unwrap();
        other.lock_interruptibly()
    });

    let interrupter = rx.recv().unwrap();
    wait_until(|| lock.queue_length() == 1);
    interrupter.interrupt();

    assert_eq!(waiter.join().unwrap(), Err(SyncError::Interrupted));
    lock.unlock().unwrap();

    // The cancelled node must not block later acquirers
    let other = lock.clone();
    thread::spawn(move || {
        other.lock();
        other.unlock().unwrap();
    })
    .join()
    .unwrap();
    assert!(!lock.is_locked());
}

#[test]
fn test_pooled_lock_reuses_nodes() {
    let lock = QueuedLock::pooled();
    for _ in 0..50 {
        lock.lock();
        let other = lock.clone();
        let waiter = thread::spawn(move || {
            other.lock();
            other.unlock().unwrap();
        });
        wait_until(|| lock.has_queued_threads());
        lock.unlock().unwrap();
        waiter.join().unwrap();
    }
    let stats = lock.pool_stats().unwrap();
    assert!(stats.allocated + stats.reused >= 50);
    assert!(QueuedLock::new().pool_stats().is_none());
}
