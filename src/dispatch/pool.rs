/*!
 * Elastic Worker Pool
 *
 * Workers for one category queue. A periodic sampler folds the fraction of
 * busy workers into a decayed average and resizes the pool between its
 * core and max sizes: it grows by spawning a worker and shrinks by asking
 * one worker to exit the next time its poll of the queue comes back empty.
 */

use super::config::PoolConfig;
use super::queue::CategoryQueue;
use crate::core::errors::{DispatchError, DispatchResult};
use crate::core::types::{panic_message, Job, ThreadCategory};
use crate::monitoring::JobSpan;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Point-in-time pool state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub category: ThreadCategory,
    pub threads: usize,
    pub active: usize,
    pub core_threads: usize,
    pub max_threads: usize,
    /// Decayed busy fraction from the last sample
    pub utilization: f64,
    pub queued: usize,
    pub jobs_run: u64,
    pub jobs_failed: u64,
}

pub(crate) struct ElasticPool {
    queue: CategoryQueue,
    config: PoolConfig,
    core: AtomicUsize,
    max: AtomicUsize,
    /// Live workers, including those about to retire
    threads: AtomicUsize,
    /// Workers currently running a job
    active: AtomicUsize,
    /// Outstanding retirement requests
    retire: AtomicUsize,
    /// `f64` bits of the decayed utilization
    utilization: AtomicU64,
    stopping: AtomicBool,
    jobs_run: AtomicU64,
    jobs_failed: AtomicU64,
    next_worker: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ElasticPool {
    /// Create the pool and start its core workers
    pub fn start(queue: CategoryQueue, config: PoolConfig) -> DispatchResult<Arc<Self>> {
        config.validate()?;
        let pool = Arc::new(Self {
            queue,
            core: AtomicUsize::new(config.core_threads),
            max: AtomicUsize::new(config.max_threads),
            config,
            threads: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            retire: AtomicUsize::new(0),
            utilization: AtomicU64::new(0f64.to_bits()),
            stopping: AtomicBool::new(false),
            jobs_run: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            next_worker: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        });
        pool.ensure_core()?;
        Ok(pool)
    }

    #[inline]
    pub fn queue(&self) -> &CategoryQueue {
        &self.queue
    }

    #[inline]
    pub fn category(&self) -> ThreadCategory {
        self.queue.category()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn threads(&self) -> usize {
        self.threads.load(Ordering::Acquire)
    }

    fn spawn_worker(self: &Arc<Self>) -> DispatchResult<()> {
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let name = format!("taskweave-{}-{}", self.category(), index);
        self.threads.fetch_add(1, Ordering::AcqRel);

        let pool = self.clone();
        match thread::Builder::new().name(name).spawn(move || pool.worker_loop()) {
            Ok(handle) => {
                let mut handles = self.handles.lock();
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                Ok(())
            }
            Err(e) => {
                self.threads.fetch_sub(1, Ordering::AcqRel);
                error!(category = %self.category(), error = %e, "failed to spawn worker");
                Err(DispatchError::SpawnFailed(e.to_string()))
            }
        }
    }

    fn effective_threads(&self) -> usize {
        self.threads()
            .saturating_sub(self.retire.load(Ordering::Acquire))
    }

    fn ensure_core(self: &Arc<Self>) -> DispatchResult<()> {
        while !self.stopping.load(Ordering::Acquire)
            && self.effective_threads() < self.core.load(Ordering::Acquire)
        {
            self.spawn_worker()?;
        }
        Ok(())
    }

    /// Consume one outstanding retirement request
    fn try_retire(&self) -> bool {
        let mut pending = self.retire.load(Ordering::Acquire);
        while pending > 0 {
            match self
                .retire
                .compare_exchange_weak(pending, pending - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.threads.fetch_sub(1, Ordering::AcqRel);
                    return true;
                }
                Err(actual) => pending = actual,
            }
        }
        false
    }

    fn worker_loop(&self) {
        debug!(category = %self.category(), "worker started");
        loop {
            match self.queue.take_timeout(self.config.idle_poll) {
                Some(job) => self.run_job(job),
                None if self.stopping.load(Ordering::Acquire) => break,
                None if self.try_retire() => {
                    debug!(category = %self.category(), "worker retired");
                    return;
                }
                None => {}
            }
        }
        self.threads.fetch_sub(1, Ordering::AcqRel);
        debug!(category = %self.category(), "worker stopped");
    }

    fn run_job(&self, job: Job) {
        self.active.fetch_add(1, Ordering::AcqRel);
        let span = JobSpan::new(self.category());
        let outcome = {
            let _entered = span.enter();
            catch_unwind(AssertUnwindSafe(job))
        };
        span.finish(outcome.is_ok());
        if let Err(payload) = outcome {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
            error!(
                category = %self.category(),
                panic = %panic_message(payload.as_ref()),
                "job panicked"
            );
        }
        self.jobs_run.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Fold one observation into the decayed average and resize.
    /// Returns the new live thread count when the pool changed size.
    pub fn sample(self: &Arc<Self>) -> Option<usize> {
        if self.stopping.load(Ordering::Acquire) {
            return None;
        }
        let effective = self.effective_threads();
        let busy = if effective == 0 {
            if self.queue.is_empty() { 0.0 } else { 1.0 }
        } else {
            (self.active.load(Ordering::Acquire) as f64 / effective as f64).min(1.0)
        };

        let previous = f64::from_bits(self.utilization.load(Ordering::Acquire));
        let average = self.config.decay * previous + (1.0 - self.config.decay) * busy;
        self.utilization.store(average.to_bits(), Ordering::Release);

        let core = self.core.load(Ordering::Acquire);
        let max = self.max.load(Ordering::Acquire);
        if average > self.config.grow_threshold && effective < max {
            if self.spawn_worker().is_ok() {
                info!(category = %self.category(), threads = effective + 1, "pool grew");
                return Some(effective + 1);
            }
        } else if average < self.config.shrink_threshold && effective > core {
            self.retire.fetch_add(1, Ordering::AcqRel);
            info!(category = %self.category(), threads = effective - 1, "pool shrank");
            return Some(effective - 1);
        }
        None
    }

    pub fn set_core_threads(self: &Arc<Self>, core: usize) -> DispatchResult<()> {
        let max = self.max.load(Ordering::Acquire);
        if core > max {
            return Err(DispatchError::InvalidPoolSize(format!(
                "core_threads {} exceeds max_threads {}",
                core, max
            )));
        }
        self.core.store(core, Ordering::Release);
        self.ensure_core()
    }

    pub fn set_max_threads(&self, max: usize) -> DispatchResult<()> {
        let core = self.core.load(Ordering::Acquire);
        if max == 0 || max < core {
            return Err(DispatchError::InvalidPoolSize(format!(
                "max_threads {} must be positive and at least core_threads {}",
                max, core
            )));
        }
        self.max.store(max, Ordering::Release);
        let effective = self.effective_threads();
        if effective > max {
            self.retire.fetch_add(effective - max, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Let workers drain the queue and exit, then join them
    pub fn shutdown(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = std::mem::take(&mut *self.handles.lock());
        let me = thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                error!(category = %self.category(), "worker terminated abnormally");
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            category: self.category(),
            threads: self.threads(),
            active: self.active.load(Ordering::Acquire),
            core_threads: self.core.load(Ordering::Acquire),
            max_threads: self.max.load(Ordering::Acquire),
            utilization: f64::from_bits(self.utilization.load(Ordering::Acquire)),
            queued: self.queue.len(),
            jobs_run: self.jobs_run.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn pool(core: usize, max: usize) -> Arc<ElasticPool> {
        let config = PoolConfig {
            idle_poll: Duration::from_millis(5),
            ..PoolConfig::default().with_threads(core, max)
        };
        ElasticPool::start(CategoryQueue::new(ThreadCategory::Background, 64), config).unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_core_workers_started() {
        let pool = pool(2, 4);
        assert_eq!(pool.threads(), 2);
        pool.shutdown();
        assert_eq!(pool.threads(), 0);
    }

    #[test]
    fn test_panicking_job_is_contained() {
        let pool = pool(1, 1);
        pool.queue().offer(Box::new(|| panic!("bad job"))).ok().unwrap();
        assert!(wait_until(|| pool.stats().jobs_run == 1));
        assert_eq!(pool.stats().jobs_failed, 1);
        assert_eq!(pool.threads(), 1);
        pool.shutdown();
    }

    #[test]
    fn test_idle_pool_shrinks_to_core() {
        let pool = pool(1, 4);
        pool.set_core_threads(3).unwrap();
        assert_eq!(pool.threads(), 3);
        pool.set_core_threads(1).unwrap();

        for _ in 0..4 {
            pool.sample();
        }
        assert!(wait_until(|| pool.threads() == 1));
        pool.shutdown();
    }

    #[test]
    fn test_retirement_waits_for_backlog() {
        let pool = pool(1, 2);
        pool.set_core_threads(2).unwrap();
        pool.set_core_threads(1).unwrap();
        assert_eq!(pool.threads(), 2);

        let (release_tx, release_rx) = flume::unbounded::<()>();
        for _ in 0..2 {
            let rx = release_rx.clone();
            pool.queue()
                .offer(Box::new(move || {
                    let _ = rx.recv_timeout(Duration::from_secs(5));
                }))
                .ok()
                .unwrap();
        }
        assert!(wait_until(|| pool.stats().active == 2));

        let (seen_tx, seen_rx) = flume::unbounded();
        for _ in 0..10 {
            let observed = pool.clone();
            let seen_tx = seen_tx.clone();
            pool.queue()
                .offer(Box::new(move || seen_tx.send(observed.threads()).unwrap()))
                .ok()
                .unwrap();
        }
        pool.set_max_threads(1).unwrap();
        drop(release_tx);

        let seen: Vec<usize> = (0..10)
            .map(|_| seen_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, vec![2; 10]);
        assert!(wait_until(|| pool.threads() == 1));
        pool.shutdown();
    }

    #[test]
    fn test_busy_pool_grows_to_max() {
        let pool = pool(1, 3);
        let (release_tx, release_rx) = flume::unbounded::<()>();
        for _ in 0..3 {
            let rx = release_rx.clone();
            pool.queue()
                .offer(Box::new(move || {
                    let _ = rx.recv_timeout(Duration::from_secs(5));
                }))
                .ok()
                .unwrap();
        }
        for _ in 0..20 {
            pool.sample();
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(pool.threads(), 3);
        drop(release_tx);
        pool.shutdown();
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        let pool = pool(1, 2);
        assert!(pool.set_core_threads(3).is_err());
        assert!(pool.set_max_threads(0).is_err());
        assert!(pool.set_max_threads(1).is_ok());
        pool.shutdown();
    }
}
