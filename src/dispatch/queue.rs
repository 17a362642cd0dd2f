/*!
 * Category Job Queue
 * Bounded FIFO of jobs for one thread category, backed by a flume channel
 */

use crate::core::types::{Job, ThreadCategory};
use std::time::Duration;

/// Bounded multi-producer multi-consumer job queue
///
/// The queue owns both channel ends, so sends never observe a
/// disconnected channel while the queue is alive.
pub(crate) struct CategoryQueue {
    category: ThreadCategory,
    capacity: usize,
    tx: flume::Sender<Job>,
    rx: flume::Receiver<Job>,
}

impl CategoryQueue {
    pub fn new(category: ThreadCategory, capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            category,
            capacity,
            tx,
            rx,
        }
    }

    #[inline]
    pub fn category(&self) -> ThreadCategory {
        self.category
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Non-blocking add; hands the job back when the queue is full
    pub fn offer(&self, job: Job) -> Result<(), Job> {
        self.tx.try_send(job).map_err(|e| match e {
            flume::TrySendError::Full(job) | flume::TrySendError::Disconnected(job) => job,
        })
    }

    /// Blocking add with a timeout; hands the job back on timeout
    pub fn put_timeout(&self, job: Job, timeout: Duration) -> Result<(), Job> {
        self.tx.send_timeout(job, timeout).map_err(|e| match e {
            flume::SendTimeoutError::Timeout(job) | flume::SendTimeoutError::Disconnected(job) => job,
        })
    }

    /// Wait up to `timeout` for the next job
    pub fn take_timeout(&self, timeout: Duration) -> Option<Job> {
        self.rx.recv_timeout(timeout).ok()
    }
}
