/*!
 * Job Dispatcher
 *
 * Owns one bounded queue and one elastic pool per thread category, plus a
 * timeout scheduler used for delayed and periodic submissions, pool
 * sampling and retries of rejected trigger runs.
 *
 * # Shutdown
 *
 * `prepare_shutdown` stops intake and the samplers. `shutdown` also stops
 * the scheduler and lets every pool drain its queue before joining the
 * workers.
 */

use super::config::DispatcherConfig;
use super::pool::{ElasticPool, PoolStats};
use super::queue::CategoryQueue;
use super::router::{DispatchObserver, Router};
use super::trigger::{Trigger, TriggerPolicy};
use crate::core::errors::{DispatchError, DispatchResult};
use crate::core::types::{SharedJob, ThreadCategory};
use crate::scheduler::{TaskHandle, TimeoutScheduler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Dispatcher {
    router: Arc<Router>,
    scheduler: Arc<TimeoutScheduler>,
    samplers: Mutex<Vec<TaskHandle>>,
    stopped: AtomicBool,
}

impl Dispatcher {
    /// Validate `config`, start the pools and their samplers
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        config.validate()?;
        let scheduler = Arc::new(TimeoutScheduler::with_config(config.scheduler.clone())?);

        let mut pools = Vec::with_capacity(ThreadCategory::COUNT);
        for category in ThreadCategory::ALL {
            let settings = config.category(category);
            let queue = CategoryQueue::new(category, settings.queue_capacity);
            match ElasticPool::start(queue, settings.pool) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    pools.iter().for_each(|p: &Arc<ElasticPool>| p.shutdown());
                    scheduler.shutdown();
                    return Err(e);
                }
            }
        }
        let router = Arc::new(Router::new(pools));

        let mut samplers = Vec::with_capacity(ThreadCategory::COUNT);
        for pool in router.pools() {
            let category = pool.category();
            let interval = pool.config().sample_interval;
            let target = Arc::downgrade(&router);
            let handle = scheduler.schedule_repeating(interval, move || {
                if let Some(router) = target.upgrade() {
                    router.sample(category);
                }
            })?;
            samplers.push(handle);
        }

        info!(categories = ThreadCategory::COUNT, "dispatcher started");
        Ok(Self {
            router,
            scheduler,
            samplers: Mutex::new(samplers),
            stopped: AtomicBool::new(false),
        })
    }

    /// Start with default settings
    pub fn with_defaults() -> DispatchResult<Self> {
        Self::new(DispatcherConfig::default())
    }

    /// Non-blocking submit; `false` when the queue is full or intake stopped
    pub fn submit<F>(&self, category: ThreadCategory, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_submit(category, job).is_ok()
    }

    /// Non-blocking submit, reporting why the job was refused
    pub fn try_submit<F>(&self, category: ThreadCategory, job: F) -> DispatchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.router
            .offer(category, Box::new(job))
            .map_err(|e| e.into_error(category))
    }

    /// Blocking submit; waits for room in the category queue.
    /// Returns `ShuttingDown` if intake stops while waiting.
    pub fn put<F>(&self, category: ThreadCategory, job: F) -> DispatchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.router.put(category, Box::new(job))
    }

    /// Blocking submit that gives up after `timeout`
    pub fn put_timeout<F>(
        &self,
        category: ThreadCategory,
        job: F,
        timeout: Duration,
    ) -> DispatchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.router.put_timeout(category, Box::new(job), timeout)
    }

    /// Submit `job` once `delay` has elapsed
    pub fn submit_after<F>(
        &self,
        category: ThreadCategory,
        delay: Duration,
        job: F,
    ) -> DispatchResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let router = self.router.clone();
        let handle = self.scheduler.schedule_once(delay, move || {
            if let Err(e) = router.offer(category, Box::new(job)) {
                warn!(%category, error = %e.into_error(category), "delayed job dropped");
            }
        })?;
        Ok(handle)
    }

    /// Submit `job` every `interval`; stop it through the returned handle
    pub fn submit_every<F>(
        &self,
        category: ThreadCategory,
        interval: Duration,
        job: F,
    ) -> DispatchResult<TaskHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let router = self.router.clone();
        let job: SharedJob = Arc::new(job);
        let handle = self.scheduler.schedule_repeating(interval, move || {
            let job = job.clone();
            if let Err(e) = router.offer(category, Box::new(move || job())) {
                warn!(%category, error = %e.into_error(category), "periodic job skipped");
            }
        })?;
        Ok(handle)
    }

    /// Trigger that coalesces calls made while a run is active
    pub fn throttle<F>(
        &self,
        category: ThreadCategory,
        job: F,
        min_interval: Option<Duration>,
    ) -> Trigger
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.trigger(category, TriggerPolicy::Throttle { min_interval }, Arc::new(job))
    }

    /// Trigger running at most `max_concurrent` executions at once
    pub fn limit<F>(
        &self,
        category: ThreadCategory,
        job: F,
        max_concurrent: usize,
    ) -> DispatchResult<Trigger>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if max_concurrent == 0 {
            return Err(DispatchError::InvalidPoolSize(
                "limit max_concurrent must be positive".to_string(),
            ));
        }
        Ok(self.trigger(category, TriggerPolicy::Limit { max_concurrent }, Arc::new(job)))
    }

    fn trigger(&self, category: ThreadCategory, policy: TriggerPolicy, job: SharedJob) -> Trigger {
        Trigger::new(
            category,
            policy,
            job,
            self.router.clone(),
            self.scheduler.clone(),
        )
    }

    pub fn set_core_threads(&self, category: ThreadCategory, threads: usize) -> DispatchResult<()> {
        self.router.pool(category).set_core_threads(threads)
    }

    pub fn set_max_threads(&self, category: ThreadCategory, threads: usize) -> DispatchResult<()> {
        self.router.pool(category).set_max_threads(threads)
    }

    pub fn add_observer(&self, observer: Arc<dyn DispatchObserver>) {
        self.router.add_observer(observer);
    }

    /// Jobs waiting in the queue of `category`
    pub fn queue_len(&self, category: ThreadCategory) -> usize {
        self.router.pool(category).queue().len()
    }

    pub fn pool_stats(&self, category: ThreadCategory) -> PoolStats {
        self.router.pool(category).stats()
    }

    pub fn scheduler(&self) -> &TimeoutScheduler {
        &self.scheduler
    }

    pub fn is_accepting(&self) -> bool {
        self.router.is_accepting()
    }

    /// Refuse new jobs and stop resizing pools; queued jobs still run
    pub fn prepare_shutdown(&self) {
        if self.router.close() {
            for sampler in self.samplers.lock().drain(..) {
                sampler.stop();
            }
            info!("dispatcher stopped accepting jobs");
        }
    }

    /// Stop intake, drain every queue and join all threads. Idempotent.
    pub fn shutdown(&self) {
        self.prepare_shutdown();
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.shutdown();
        for pool in self.router.pools() {
            pool.shutdown();
        }
        info!("dispatcher shut down");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("accepting", &self.is_accepting())
            .finish()
    }
}
