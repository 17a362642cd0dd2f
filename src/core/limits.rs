/*!
 * System Limits and Constants
 *
 * Centralized location for tuning constants and default sizes.
 * Organized by domain (locks, gate, scheduler, dispatcher).
 *
 * - Performance-critical constants are marked with [PERF]
 */

use std::time::Duration;

// =============================================================================
// QUEUED LOCK
// =============================================================================

/// Remaining timeout below which a timed acquire spins instead of parking
/// [PERF] Parking costs more than this on every mainstream OS
pub const SPIN_FOR_TIMEOUT_THRESHOLD: Duration = Duration::from_micros(1);

/// Default number of recyclable wait nodes for pooled locks
pub const DEFAULT_NODE_POOL_CAPACITY: usize = 64;

/// Upper bound for a node pool
pub const MAX_NODE_POOL_CAPACITY: usize = 4096;

// =============================================================================
// QUIESCENCE BARRIER
// =============================================================================

/// Busy spins before the barrier starts yielding the processor
pub const BARRIER_SPINS_BEFORE_YIELD: u32 = 64;

// =============================================================================
// TIMEOUT SCHEDULER
// =============================================================================

/// Name of the timer thread
pub const TIMER_THREAD_NAME: &str = "taskweave-timer";

/// Lateness above which a task start is logged as delayed
pub const TASK_LATE_WARN_THRESHOLD: Duration = Duration::from_millis(50);

// =============================================================================
// JOB DISPATCHER
// =============================================================================

/// Default bounded capacity of each category queue
pub const DEFAULT_CATEGORY_QUEUE_CAPACITY: usize = 1024;

/// Hard upper bound for a category queue
pub const MAX_CATEGORY_QUEUE_CAPACITY: usize = 1 << 20;

/// Default minimum worker count per category
pub const DEFAULT_CORE_THREADS: usize = 1;

/// Default maximum worker count per category
pub const DEFAULT_MAX_THREADS: usize = 8;

/// How long an idle worker waits on its queue before re-checking retirement
pub const WORKER_IDLE_POLL: Duration = Duration::from_millis(50);

/// Elastic pool sampling period
pub const POOL_SAMPLE_INTERVAL: Duration = Duration::from_millis(40);

/// Weight of the previous average in the decayed utilization average
pub const POOL_UTILIZATION_DECAY: f64 = 0.8;

/// Decayed utilization above which the pool grows
pub const POOL_GROW_THRESHOLD: f64 = 0.75;

/// Decayed utilization below which the pool shrinks
pub const POOL_SHRINK_THRESHOLD: f64 = 0.25;

/// Delay before a decorator re-offers a job its queue rejected
pub const REJECTED_RETRY_DELAY: Duration = Duration::from_millis(5);

/// How often a blocked `put` re-checks whether the dispatcher still accepts jobs
pub const PUT_RECHECK_INTERVAL: Duration = Duration::from_millis(10);
