/*!
 * Queued Locks
 *
 * CLH-queue based blocking lock with bound condition variables:
 * - Fair and barging acquisition
 * - Reentrant holds
 * - Interruptible and timed acquire / await
 * - Optional wait-node recycling
 */

mod condition;
mod node;
mod pool;
mod queue;
mod queued;

pub use condition::Condition;
pub use pool::NodePoolStats;
pub use queued::{QueuedLock, QueuedLockGuard};
