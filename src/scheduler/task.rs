/*!
 * Scheduled Tasks
 * Task kinds, shared task state and the caller-facing handle
 */

use crate::core::clock::Timestamp;
use crate::core::types::{Job, SharedJob, TaskId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// When a task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Fire once at `at`
    Once { at: Timestamp },
    /// Fire at `origin + k * interval` for k = 0, 1, 2, ...
    Repeating { origin: Timestamp, interval: Duration },
}

impl TaskKind {
    fn first_run(&self) -> Timestamp {
        match *self {
            TaskKind::Once { at } => at,
            TaskKind::Repeating { origin, .. } => origin,
        }
    }
}

/// Next tick of a repeating schedule after `previous`, skipping every tick
/// that is already in the past at `now`
pub(crate) fn next_tick(origin: Timestamp, interval: Duration, previous: Timestamp, now: Timestamp) -> Timestamp {
    let step = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX).max(1);
    let following = previous.add(Duration::from_nanos(step));
    if following >= now {
        return following;
    }
    let elapsed = now.as_nanos().saturating_sub(origin.as_nanos());
    let ticks = elapsed.div_ceil(step);
    match ticks.checked_mul(step).and_then(|offset| origin.as_nanos().checked_add(offset)) {
        Some(nanos) if nanos < u64::MAX => Timestamp::from_nanos(nanos),
        _ => Timestamp::NEVER,
    }
}

pub(crate) struct TaskInner {
    pub(crate) id: TaskId,
    pub(crate) kind: TaskKind,
    pub(crate) job: SharedJob,
    next_run: AtomicU64,
    stopped: AtomicBool,
    runs: AtomicU64,
}

impl TaskInner {
    pub(crate) fn next_run(&self) -> Timestamp {
        if self.stopped.load(Ordering::Acquire) {
            Timestamp::NEVER
        } else {
            Timestamp::from_nanos(self.next_run.load(Ordering::Acquire))
        }
    }

    pub(crate) fn set_next_run(&self, at: Timestamp) {
        self.next_run.store(at.as_nanos(), Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn record_run(&self) -> u64 {
        self.runs.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// A task ready to be added to a [`TimeoutScheduler`](super::TimeoutScheduler)
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    fn build(kind: TaskKind, job: SharedJob) -> Self {
        let inner = TaskInner {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            job,
            next_run: AtomicU64::new(kind.first_run().as_nanos()),
            stopped: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Run `job` once after `delay`
    pub fn once<F>(delay: Duration, job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::once_at(Timestamp::now().add(delay), Box::new(job))
    }

    /// Run `job` once at `instant`
    pub fn at<F>(instant: Instant, job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::once_at(Timestamp::from_instant(instant), Box::new(job))
    }

    fn once_at(at: Timestamp, job: Job) -> Self {
        let cell = Mutex::new(Some(job));
        let shared: SharedJob = Arc::new(move || {
            if let Some(job) = cell.lock().take() {
                job();
            }
        });
        Self::build(TaskKind::Once { at }, shared)
    }

    /// Run `job` every `interval`, first one interval from now
    pub fn repeating<F>(interval: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::repeating_from(Timestamp::now().add(interval), interval, job)
    }

    /// Run `job` every `interval` starting at `origin`
    pub fn repeating_from<F>(origin: Timestamp, interval: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(TaskKind::Repeating { origin, interval }, Arc::new(job))
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn kind(&self) -> TaskKind {
        self.inner.kind
    }

    /// Handle that outlives the task's submission
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            inner: self.inner.clone(),
        }
    }

    pub(crate) fn into_inner(self) -> Arc<TaskInner> {
        self.inner
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// Caller-side control over a scheduled task
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

impl TaskHandle {
    /// Stop the task; it is discarded the next time the timer polls it
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    /// Completed executions so far
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::Acquire)
    }

    /// Next planned execution, `Timestamp::NEVER` once stopped or finished
    pub fn next_run(&self) -> Timestamp {
        self.inner.next_run()
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("stopped", &self.is_stopped())
            .field("runs", &self.run_count())
            .finish()
    }
}
