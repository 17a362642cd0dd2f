/*!
 * Timeout Scheduler Integration Tests
 *
 * Ordering, drift-free recurrence, stopping and observer hooks
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use taskweave::{SchedulerObserver, Task, TaskId, TimeoutScheduler, Timestamp};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Tasks run in key order; equal keys run in insertion order
    #[test]
    fn prop_tasks_run_in_time_order(delays in proptest::collection::vec(0u64..40, 1..12)) {
        let scheduler = TimeoutScheduler::start().unwrap();
        let base = Instant::now() + Duration::from_millis(150);
        let (tx, rx) = mpsc::channel();

        for (index, delay) in delays.iter().enumerate() {
            let tx = tx.clone();
            scheduler
                .try_add(Task::at(base + Duration::from_millis(*delay), move || {
                    tx.send(index).unwrap();
                }))
                .unwrap();
        }
        drop(tx);

        let observed: Vec<usize> = rx.iter().take(delays.len()).collect();
        let mut expected: Vec<usize> = (0..delays.len()).collect();
        expected.sort_by_key(|&i| delays[i]);
        prop_assert_eq!(observed, expected);
        scheduler.shutdown();
    }
}

#[test]
#[serial]
fn test_recurring_task_does_not_drift() {
    let scheduler = TimeoutScheduler::start().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let handle = scheduler
        .schedule_repeating(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    thread::sleep(Duration::from_millis(1050));
    handle.stop();
    let runs = runs.load(Ordering::SeqCst);
    assert!((9..=12).contains(&runs), "ran {} times", runs);
    scheduler.shutdown();
}

#[test]
#[serial]
fn test_slow_task_skips_missed_ticks() {
    let scheduler = TimeoutScheduler::start().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let handle = scheduler
        .schedule_repeating(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(35));
        })
        .unwrap();

    thread::sleep(Duration::from_millis(300));
    handle.stop();
    // Every run costs at least 35ms, so missed ticks are coalesced
    assert!(runs.load(Ordering::SeqCst) <= 10);
    assert!(handle.next_run().is_never());
    scheduler.shutdown();
}

#[test]
fn test_stop_from_inside_job() {
    let scheduler = TimeoutScheduler::start().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<taskweave::TaskHandle>>> = Arc::new(Mutex::new(None));

    let task = {
        let runs = runs.clone();
        let slot = slot.clone();
        Task::repeating(Duration::from_millis(5), move || {
            if runs.fetch_add(1, Ordering::SeqCst) == 2 {
                if let Some(handle) = slot.lock().unwrap().as_ref() {
                    handle.stop();
                }
            }
        })
    };
    *slot.lock().unwrap() = Some(task.handle());
    let handle = scheduler.try_add(task).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.is_stopped() {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }
    thread::sleep(Duration::from_millis(30));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(handle.run_count(), 3);
    slot.lock().unwrap().take();
}

#[derive(Default)]
struct Recorder {
    added: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    exited: AtomicUsize,
}

impl SchedulerObserver for Recorder {
    fn task_added(&self, _task: TaskId, _next_run: Timestamp) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    fn task_started(&self, _task: TaskId, _latency: Duration) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn task_stopped(&self, _task: TaskId) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn queue_exited(&self) {
        self.exited.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_observer_sees_lifecycle() {
    let scheduler = TimeoutScheduler::start().unwrap();
    let recorder = Arc::new(Recorder::default());
    scheduler.add_observer(recorder.clone());

    let (tx, rx) = mpsc::channel();
    scheduler
        .schedule_once(Duration::from_millis(1), move || tx.send(()).unwrap())
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let stopped = scheduler
        .schedule_once(Duration::from_millis(20), || {})
        .unwrap();
    stopped.stop();
    thread::sleep(Duration::from_millis(60));

    scheduler.shutdown();
    assert_eq!(recorder.added.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.started.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.exited.load(Ordering::SeqCst), 1);

    let stats = scheduler.stats();
    assert_eq!(stats.tasks_added, 2);
    assert_eq!(stats.tasks_run, 1);
    assert_eq!(stats.tasks_stopped, 1);
}
