/*!
 * Taskweave
 * Thread coordination toolkit: queued locks, conditions, wait gates,
 * quiescence barriers, a timeout scheduler and a job dispatcher
 */

pub mod core;
pub mod dispatch;
pub mod monitoring;
pub mod scheduler;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::sync::{
    interrupt, BarrierGuard, CasGate, Condition, Fairness, Interrupter, LockConfig, Monitor,
    NodePoolStats, QueuedLock, QueuedLockGuard, QuiescenceBarrier, Semaphore, WakeResult,
};
pub use crate::core::types::{Job, SharedJob, TaskId, ThreadCategory};
pub use crate::core::Timestamp;
pub use dispatch::{
    CategoryConfig, DispatchObserver, Dispatcher, DispatcherConfig, PoolConfig, PoolStats,
    Trigger, TriggerPolicy,
};
pub use monitoring::init_tracing;
pub use scheduler::{
    SchedulerConfig, SchedulerObserver, SchedulerStats, Task, TaskHandle, TaskKind,
    TimeoutScheduler,
};
