/*!
 * Timeout Scheduler
 *
 * One dedicated thread drains a time-ordered heap of tasks. It sleeps on a
 * semaphore gate until the earliest task is due; adding a task that becomes
 * the new earliest one releases the gate so the sleeper re-plans.
 *
 * # Task lifecycle
 *
 * SCHEDULED -> DUE -> RUNNING -> requeued (repeating) or discarded (once).
 * A stopped task is discarded the next time it reaches the top.
 */

use super::config::SchedulerConfig;
use super::entry::Entry;
use super::observer::SchedulerObserver;
use super::stats::{AtomicSchedulerStats, SchedulerStats};
use super::task::{next_tick, Task, TaskHandle, TaskInner, TaskKind};
use crate::core::clock::Timestamp;
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::TASK_LATE_WARN_THRESHOLD;
use crate::core::sync::Semaphore;
use crate::core::types::panic_message;
use parking_lot::{Mutex, RwLock};
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

struct Shared {
    queue: Mutex<BinaryHeap<Entry>>,
    gate: Semaphore,
    seq: AtomicU64,
    running: AtomicBool,
    config: SchedulerConfig,
    observers: RwLock<Vec<Arc<dyn SchedulerObserver>>>,
    stats: AtomicSchedulerStats,
}

enum Step {
    Idle,
    Sleep(Duration),
    Stopped(Arc<TaskInner>),
    Due(Entry),
}

impl Shared {
    /// Push under a fresh key; returns whether it became the earliest entry
    fn enqueue(&self, task: Arc<TaskInner>, key: Timestamp) -> bool {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut queue = self.queue.lock();
        queue.push(Entry { key, seq, task });
        queue.peek().is_some_and(|top| top.seq == seq)
    }

    fn next_step(&self, now: Timestamp) -> Step {
        let mut queue = self.queue.lock();
        let Some(top) = queue.peek() else {
            return Step::Idle;
        };
        if top.task.is_stopped() {
            return match queue.pop() {
                Some(entry) => Step::Stopped(entry.task),
                None => Step::Idle,
            };
        }
        if top.key <= now {
            return match queue.pop() {
                Some(entry) => Step::Due(entry),
                None => Step::Idle,
            };
        }
        Step::Sleep(top.key.saturating_duration_since(now))
    }

    fn notify<F: Fn(&dyn SchedulerObserver)>(&self, f: F) {
        for observer in self.observers.read().iter() {
            f(observer.as_ref());
        }
    }

    fn discard_stopped(&self, task: &TaskInner) {
        self.stats.inc_stopped();
        debug!(task_id = task.id, "discarding stopped task");
        self.notify(|o| o.task_stopped(task.id));
    }

    fn run(&self, entry: Entry) {
        let Entry { key, task, .. } = entry;
        let started = Timestamp::now();
        let latency = started.saturating_duration_since(key);
        if latency > TASK_LATE_WARN_THRESHOLD {
            warn!(task_id = task.id, latency_ms = latency.as_millis() as u64, "task started late");
        }
        self.stats.record_run(latency);
        self.notify(|o| o.task_started(task.id, latency));

        let job = task.job.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job())) {
            self.stats.inc_failed();
            error!(
                task_id = task.id,
                panic = %panic_message(payload.as_ref()),
                "scheduled task panicked"
            );
        }
        task.record_run();

        match task.kind {
            TaskKind::Repeating { origin, interval } if !task.is_stopped() => {
                let next = next_tick(origin, interval, key, Timestamp::now());
                task.set_next_run(next);
                self.enqueue(task, next);
            }
            TaskKind::Repeating { .. } => self.discard_stopped(&task),
            TaskKind::Once { .. } => task.set_next_run(Timestamp::NEVER),
        }
    }

    fn timer_loop(&self) {
        info!(thread = %self.config.thread_name, "timer thread started");
        while self.running.load(Ordering::Acquire) {
            let generation = self.gate.gate().generation();
            match self.next_step(Timestamp::now()) {
                Step::Idle => {
                    self.gate.gate().await_generation(generation, None);
                }
                Step::Sleep(wait) => {
                    self.gate.gate().await_generation(generation, Some(wait));
                }
                Step::Stopped(task) => self.discard_stopped(&task),
                Step::Due(entry) => self.run(entry),
            }
        }

        if self.config.drain_on_shutdown {
            self.drain_due();
        }
        let dropped = {
            let mut queue = self.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        info!(dropped, "timer thread exiting");
        self.notify(|o| o.queue_exited());
    }

    fn drain_due(&self) {
        loop {
            match self.next_step(Timestamp::now()) {
                Step::Due(entry) => self.run(entry),
                Step::Stopped(task) => self.discard_stopped(&task),
                Step::Idle | Step::Sleep(_) => break,
            }
        }
    }
}

/// Dedicated-thread timeout scheduler
///
/// # Example
///
/// ```
/// use taskweave::TimeoutScheduler;
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// let scheduler = TimeoutScheduler::start().unwrap();
/// let (tx, rx) = mpsc::channel();
/// scheduler
///     .schedule_once(Duration::from_millis(5), move || tx.send(()).unwrap())
///     .unwrap();
/// rx.recv_timeout(Duration::from_secs(5)).unwrap();
/// scheduler.shutdown();
/// ```
pub struct TimeoutScheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutScheduler {
    /// Spawn with the default configuration
    pub fn start() -> SchedulerResult<Self> {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> SchedulerResult<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            gate: Semaphore::new(),
            seq: AtomicU64::new(0),
            running: AtomicBool::new(true),
            config,
            observers: RwLock::new(Vec::new()),
            stats: AtomicSchedulerStats::default(),
        });

        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name(shared.config.thread_name.clone())
            .spawn(move || worker.timer_loop())
            .map_err(|e| SchedulerError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Queue a task; `false` if the scheduler is shut down or the task was stopped
    pub fn add(&self, task: Task) -> bool {
        self.try_add(task).is_ok()
    }

    /// Queue a task, reporting why it was refused
    pub fn try_add(&self, task: Task) -> SchedulerResult<TaskHandle> {
        if !self.is_running() {
            return Err(SchedulerError::ShutDown);
        }
        let handle = task.handle();
        let inner = task.into_inner();
        if inner.is_stopped() {
            return Err(SchedulerError::TaskStopped(inner.id));
        }

        let key = inner.next_run();
        let id = inner.id;
        let earliest = self.shared.enqueue(inner, key);
        self.shared.stats.inc_added();
        self.shared.notify(|o| o.task_added(id, key));
        if earliest {
            self.shared.gate.release();
        }
        Ok(handle)
    }

    /// Run `job` every `interval`, first one interval from now
    pub fn schedule_repeating<F>(&self, interval: Duration, job: F) -> SchedulerResult<TaskHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.try_add(Task::repeating(interval, job))
    }

    /// Run `job` once after `delay`
    pub fn schedule_once<F>(&self, delay: Duration, job: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_add(Task::once(delay, job))
    }

    /// Run `job` once at `instant`
    pub fn schedule_at<F>(&self, instant: Instant, job: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_add(Task::at(instant, job))
    }

    /// Tasks currently queued (stopped tasks count until polled)
    pub fn size(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn add_observer(&self, observer: Arc<dyn SchedulerObserver>) {
        self.shared.observers.write().push(observer);
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Stop accepting tasks and terminate the timer thread. Idempotent.
    ///
    /// Called from a task running on the timer thread, this only signals the
    /// thread; it exits after the task returns.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.gate.release();

        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("timer thread terminated abnormally");
        } else {
            info!("timeout scheduler shut down");
        }
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TimeoutScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutScheduler")
            .field("running", &self.is_running())
            .field("size", &self.size())
            .finish()
    }
}
