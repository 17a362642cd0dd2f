/*!
 * Job Dispatcher Module
 * Per-category bounded queues, elastic worker pools and job triggers
 */

mod config;
mod dispatcher;
mod pool;
mod queue;
mod router;
mod trigger;

// Re-export public API
pub use config::{CategoryConfig, DispatcherConfig, PoolConfig};
pub use dispatcher::Dispatcher;
pub use pool::PoolStats;
pub use router::DispatchObserver;
pub use trigger::{Trigger, TriggerPolicy};
