/*!
 * CAS Wait Gate Integration Tests
 *
 * Liveness of wait/notify under concurrent callers
 */

use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use taskweave::{CasGate, Interrupter, Monitor, Semaphore, SyncError, WakeResult};

#[test]
fn test_call_all_releases_every_waiter() {
    let gate = Arc::new(CasGate::new());
    let expected = gate.generation();

    let waiters: Vec<_> = (0..6)
        .map(|_| {
            let gate = gate.clone();
            thread::spawn(move || gate.await_generation(expected, Some(Duration::from_secs(5))))
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while gate.waiter_count() < 6 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(1));
    }
    gate.call_all();

    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
    assert_eq!(gate.waiter_count(), 0);
    assert!(gate.slot_count() <= 6);
}

#[test]
fn test_stale_generation_returns_immediately() {
    let gate = CasGate::new();
    let seen = gate.generation();
    assert_eq!(gate.call(), WakeResult::NoWaiters);
    let start = Instant::now();
    assert!(gate.await_generation(seen, None));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_timeout_without_call() {
    let gate = CasGate::new();
    let start = Instant::now();
    assert!(!gate.await_generation(gate.generation(), Some(Duration::from_millis(20))));
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn test_semaphore_ping_pong_never_stalls() {
    let ping = Arc::new(CasGate::new());
    let pong = Arc::new(CasGate::new());
    let rounds = 2_000;

    let responder = {
        let ping = ping.clone();
        let pong = pong.clone();
        thread::spawn(move || {
            let mut seen = 0;
            for _ in 0..rounds {
                assert!(ping.await_generation(seen, Some(Duration::from_secs(5))));
                seen = ping.generation();
                pong.call();
            }
        })
    };

    let mut seen = 0;
    for _ in 0..rounds {
        ping.call();
        assert!(pong.await_generation(seen, Some(Duration::from_secs(5))));
        seen = pong.generation();
    }
    responder.join().unwrap();
}

#[test]
fn test_semaphore_wakes_single_waiter() {
    let semaphore = Arc::new(Semaphore::new());
    let woken = Arc::new(AtomicUsize::new(0));

    let waiter = {
        let semaphore = semaphore.clone();
        let woken = woken.clone();
        thread::spawn(move || {
            if semaphore.wait(Some(Duration::from_secs(5))) {
                woken.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while semaphore.gate().waiter_count() == 0 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(1));
    }
    semaphore.release();
    waiter.join().unwrap();
    assert_eq!(woken.load(Ordering::SeqCst), 1);
}

#[test]
fn test_monitor_notify_all() {
    let monitor = Arc::new(Monitor::new());
    let expected = monitor.gate().generation();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let monitor = monitor.clone();
            thread::spawn(move || {
                monitor
                    .gate()
                    .await_generation(expected, Some(Duration::from_secs(5)))
            })
        })
        .collect();
    monitor.notify_all();
    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
}

#[test]
fn test_interruptible_wait() {
    let gate = Arc::new(CasGate::new());
    let (tx, rx) = mpsc::channel();
    let waiter = {
        let gate = gate.clone();
        thread::spawn(move || {
            tx.send(Interrupter::current()).unwrap();
            gate.await_interruptibly(gate.generation(), None)
        })
    };
    let interrupter = rx.recv().unwrap();
    interrupter.interrupt();
    assert_eq!(waiter.join().unwrap(), Err(SyncError::Interrupted));
}
