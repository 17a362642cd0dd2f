/*!
 * Job Router
 * Routes jobs to their category pool and reports rejections
 */

use super::pool::ElasticPool;
use crate::core::errors::DispatchError;
use crate::core::limits::PUT_RECHECK_INTERVAL;
use crate::core::types::{Job, ThreadCategory};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Dispatcher event hooks; every method defaults to a no-op
pub trait DispatchObserver: Send + Sync {
    /// A job was refused because its category queue was full
    fn job_rejected(&self, _category: ThreadCategory, _queue_size: usize) {}

    /// The elastic pool of `category` now has `threads` live workers
    fn pool_resized(&self, _category: ThreadCategory, _threads: usize) {}
}

/// Why an offer did not go through
pub(crate) enum OfferError {
    /// Queue full; the job is handed back with the queue size
    Full(Job, usize),
    ShuttingDown,
}

impl OfferError {
    pub fn into_error(self, category: ThreadCategory) -> DispatchError {
        match self {
            OfferError::Full(_, size) => DispatchError::Rejected { category, size },
            OfferError::ShuttingDown => DispatchError::ShuttingDown,
        }
    }
}

pub(crate) struct Router {
    pools: Vec<Arc<ElasticPool>>,
    accepting: AtomicBool,
    observers: RwLock<Vec<Arc<dyn DispatchObserver>>>,
}

impl Router {
    pub fn new(pools: Vec<Arc<ElasticPool>>) -> Self {
        Self {
            pools,
            accepting: AtomicBool::new(true),
            observers: RwLock::new(Vec::new()),
        }
    }

    #[inline]
    pub fn pool(&self, category: ThreadCategory) -> &Arc<ElasticPool> {
        &self.pools[category.index()]
    }

    pub fn pools(&self) -> &[Arc<ElasticPool>] {
        &self.pools
    }

    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting; returns whether this call made the change
    pub fn close(&self) -> bool {
        self.accepting.swap(false, Ordering::AcqRel)
    }

    pub fn add_observer(&self, observer: Arc<dyn DispatchObserver>) {
        self.observers.write().push(observer);
    }

    pub fn notify<F: Fn(&dyn DispatchObserver)>(&self, f: F) {
        for observer in self.observers.read().iter() {
            f(observer.as_ref());
        }
    }

    /// Non-blocking routing
    pub fn offer(&self, category: ThreadCategory, job: Job) -> Result<(), OfferError> {
        if !self.is_accepting() {
            return Err(OfferError::ShuttingDown);
        }
        let queue = self.pool(category).queue();
        queue.offer(job).map_err(|job| {
            let size = queue.len();
            warn!(%category, size, capacity = queue.capacity(), "job rejected, queue full");
            self.notify(|o| o.job_rejected(category, size));
            OfferError::Full(job, size)
        })
    }

    /// Blocking routing; gives up with `ShuttingDown` once intake stops
    pub fn put(&self, category: ThreadCategory, mut job: Job) -> Result<(), DispatchError> {
        let queue = self.pool(category).queue();
        loop {
            if !self.is_accepting() {
                return Err(DispatchError::ShuttingDown);
            }
            match queue.put_timeout(job, PUT_RECHECK_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(returned) => job = returned,
            }
        }
    }

    /// Blocking routing bounded by `timeout`
    pub fn put_timeout(
        &self,
        category: ThreadCategory,
        job: Job,
        timeout: Duration,
    ) -> Result<(), DispatchError> {
        if !self.is_accepting() {
            return Err(DispatchError::ShuttingDown);
        }
        let queue = self.pool(category).queue();
        queue.put_timeout(job, timeout).map_err(|_| {
            let size = queue.len();
            self.notify(|o| o.job_rejected(category, size));
            DispatchError::Rejected { category, size }
        })
    }

    /// Run one sampling round for `category` and report resizes
    pub fn sample(&self, category: ThreadCategory) {
        if let Some(threads) = self.pool(category).sample() {
            self.notify(|o| o.pool_resized(category, threads));
        }
    }
}
