/*!
 * Timeout Scheduler Module
 * Dedicated-thread timer queue for one-shot and repeating tasks
 */

mod config;
mod entry;
mod observer;
mod stats;
mod task;
mod timer;

// Re-export public API
pub use config::SchedulerConfig;
pub use observer::SchedulerObserver;
pub use stats::SchedulerStats;
pub use task::{Task, TaskHandle, TaskKind};
pub use timer::TimeoutScheduler;
