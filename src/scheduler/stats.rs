/*!
 * Lock-Free Scheduler Statistics
 * Atomic counters updated on the timer thread's hot path
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub tasks_added: u64,
    pub tasks_run: u64,
    pub tasks_failed: u64,
    pub tasks_stopped: u64,
    /// Sum of start latencies over all runs
    pub total_latency_micros: u64,
}

impl SchedulerStats {
    /// Mean start latency, zero before the first run
    pub fn average_latency(&self) -> Duration {
        if self.tasks_run == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.total_latency_micros / self.tasks_run)
        }
    }
}

/// Atomic scheduler statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Relaxed ordering; snapshots are per-counter accurate, not mutually consistent
#[repr(C, align(64))]
#[derive(Default)]
pub(crate) struct AtomicSchedulerStats {
    tasks_added: AtomicU64,
    tasks_run: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_stopped: AtomicU64,
    total_latency_micros: AtomicU64,
}

impl AtomicSchedulerStats {
    #[inline(always)]
    pub fn inc_added(&self) {
        self.tasks_added.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_run(&self, latency: Duration) {
        self.tasks_run.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_stopped(&self) {
        self.tasks_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_added: self.tasks_added.load(Ordering::Relaxed),
            tasks_run: self.tasks_run.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_stopped: self.tasks_stopped.load(Ordering::Relaxed),
            total_latency_micros: self.total_latency_micros.load(Ordering::Relaxed),
        }
    }
}
