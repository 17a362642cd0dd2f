/*!
 * Scheduler Observers
 * Callbacks fired by the timer thread at task lifecycle points
 */

use crate::core::clock::Timestamp;
use crate::core::types::TaskId;
use std::time::Duration;

/// Lifecycle hooks; every method defaults to a no-op
///
/// Hooks run on the timer thread (or the adding thread for `task_added`)
/// and must not block.
pub trait SchedulerObserver: Send + Sync {
    fn task_added(&self, _task: TaskId, _next_run: Timestamp) {}

    /// `latency` is how late the task started relative to its planned run
    fn task_started(&self, _task: TaskId, _latency: Duration) {}

    fn task_stopped(&self, _task: TaskId) {}

    /// The timer thread has exited
    fn queue_exited(&self) {}
}
