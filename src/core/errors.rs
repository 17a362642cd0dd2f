/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::ThreadCategory;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the blocking primitives (locks, conditions, gates, barriers)
///
/// Timed waits report expiry through their return value, not an error.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SyncError {
    #[error("Lock is not held by the current thread")]
    #[diagnostic(
        code(sync::illegal_monitor_state),
        help("Only the owning thread may unlock, await or signal. Check lock/unlock pairing.")
    )]
    IllegalMonitorState,

    #[error("Blocking operation was interrupted")]
    #[diagnostic(
        code(sync::interrupted),
        help("Another thread interrupted this one. The interrupt flag has been consumed.")
    )]
    Interrupted,

    #[error("Quiescence barrier is already locked")]
    #[diagnostic(
        code(sync::barrier_already_locked),
        help("Only one thread may lock a barrier at a time. Call release() first.")
    )]
    BarrierAlreadyLocked,

    #[error("Quiescence barrier is not locked")]
    #[diagnostic(
        code(sync::barrier_not_locked),
        help("wait() and release() require a preceding lock().")
    )]
    BarrierNotLocked,

    #[error("Quiescence barrier left more often than entered")]
    #[diagnostic(
        code(sync::barrier_underflow),
        help("Every leave() must be paired with an earlier enter().")
    )]
    BarrierUnderflow,
}

/// Timeout scheduler errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedulerError {
    #[error("Timeout scheduler has been shut down")]
    #[diagnostic(
        code(scheduler::shut_down),
        help("No new tasks are accepted after shutdown().")
    )]
    ShutDown,

    #[error("Task {0} was stopped")]
    #[diagnostic(code(scheduler::task_stopped), help("Stopped tasks cannot be rescheduled."))]
    TaskStopped(u64),

    #[error("Failed to spawn timer thread: {0}")]
    #[diagnostic(
        code(scheduler::spawn_failed),
        help("The OS refused to create a thread. Check process thread limits.")
    )]
    SpawnFailed(String),
}

/// Job dispatcher errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("Queue for {category} is full ({size} jobs)")]
    #[diagnostic(
        code(dispatch::rejected),
        help("Producers outpace the workers. Drop, retry later or raise the queue capacity.")
    )]
    Rejected { category: ThreadCategory, size: usize },

    #[error("Dispatcher is shutting down")]
    #[diagnostic(
        code(dispatch::shutting_down),
        help("prepare_shutdown() was called; new jobs are refused.")
    )]
    ShuttingDown,

    #[error("Invalid pool size: {0}")]
    #[diagnostic(
        code(dispatch::invalid_pool_size),
        help("Core threads must not exceed max threads and max threads must be positive.")
    )]
    InvalidPoolSize(String),

    #[error("Failed to spawn worker thread: {0}")]
    #[diagnostic(
        code(dispatch::spawn_failed),
        help("The OS refused to create a thread. Check process thread limits.")
    )]
    SpawnFailed(String),

    #[error("Scheduler error: {0}")]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result type for blocking primitives
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Result type for timeout scheduler operations
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Result type for dispatcher operations
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_serialization() {
        let error = SyncError::BarrierAlreadyLocked;
        let json = serde_json::to_string(&error).unwrap();
        let deserialized: SyncError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, deserialized);
    }

    #[test]
    fn test_rejected_display() {
        let error = DispatchError::Rejected {
            category: ThreadCategory::Background,
            size: 16,
        };
        assert_eq!(error.to_string(), "Queue for background is full (16 jobs)");
    }

    #[test]
    fn test_dispatch_error_from_scheduler_error() {
        let error: DispatchError = SchedulerError::ShutDown.into();
        assert!(matches!(error, DispatchError::Scheduler(SchedulerError::ShutDown)));
    }
}
