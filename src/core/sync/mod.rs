/*!
 * Synchronization Primitives
 *
 * Blocking primitives built directly on atomics and thread parking:
 * - Queued lock with conditions (CLH wait queue, fair or barging)
 * - CAS wait gate (generation-checked wait/notify)
 * - Quiescence barrier (entry/exit counting)
 * - Cooperative interrupts shared by all interruptible waits
 *
 * # Performance
 *
 * - Uncontended lock/unlock is a single CAS each
 * - Queue head/tail and the gate's slot stack are mutated only by CAS
 * - Parked threads cost no CPU; spinning is limited to sub-microsecond timeouts
 */

mod barrier;
mod config;
pub mod interrupt;
mod locks;
mod wait;

pub use barrier::{BarrierGuard, QuiescenceBarrier};
pub use config::{Fairness, LockConfig};
pub use interrupt::Interrupter;
pub use locks::{Condition, NodePoolStats, QueuedLock, QueuedLockGuard};
pub use wait::{CasGate, Monitor, Semaphore, WakeResult};
