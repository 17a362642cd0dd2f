/*!
 * Job Triggers
 *
 * Reusable handles that run a job on a category pool under a policy:
 *
 * - **Throttle**: one execution in flight; triggers that arrive while it
 *   runs coalesce into exactly one follow-up run, optionally spaced by a
 *   minimum interval
 * - **Limit**: at most N concurrent executions; excess triggers wait as
 *   pending and start as running executions complete
 *
 * A run refused by a full queue is re-offered through the timeout
 * scheduler after a short delay, so no trigger is lost.
 */

use super::router::{OfferError, Router};
use crate::core::clock::Timestamp;
use crate::core::limits::REJECTED_RETRY_DELAY;
use crate::core::types::{panic_message, Job, SharedJob, ThreadCategory};
use crate::scheduler::TimeoutScheduler;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const IDLE: u8 = 0;
const ACTIVE: u8 = 1;

/// Execution policy of a [`Trigger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
    Throttle { min_interval: Option<Duration> },
    Limit { max_concurrent: usize },
}

struct TriggerInner {
    category: ThreadCategory,
    policy: TriggerPolicy,
    job: SharedJob,
    router: Arc<Router>,
    scheduler: Arc<TimeoutScheduler>,
    /// Throttle: IDLE or ACTIVE (a run is pending or running)
    state: AtomicU8,
    /// Throttle: total trigger calls
    wishes: AtomicU64,
    /// Throttle: start of the latest run, `Timestamp::NEVER` before the first
    last_start: AtomicU64,
    /// Limit: executions queued or running
    running: AtomicUsize,
    /// Limit: triggers waiting for a free slot
    pending: AtomicUsize,
    completed: AtomicU64,
}

impl TriggerInner {
    fn fire(self: &Arc<Self>) {
        match self.policy {
            TriggerPolicy::Throttle { .. } => {
                self.wishes.fetch_add(1, Ordering::SeqCst);
                if self
                    .state
                    .compare_exchange(IDLE, ACTIVE, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.launch_spaced();
                }
            }
            TriggerPolicy::Limit { .. } => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                self.drain_pending();
            }
        }
    }

    /// Offer one execution to the category queue
    fn launch(self: &Arc<Self>) {
        let me = self.clone();
        self.dispatch(Box::new(move || me.execute()));
    }

    /// Launch now, or once the minimum interval since the last start elapsed
    fn launch_spaced(self: &Arc<Self>) {
        let remaining = match self.policy {
            TriggerPolicy::Throttle {
                min_interval: Some(interval),
            } => self.until_interval_elapsed(interval),
            _ => Duration::ZERO,
        };
        if remaining.is_zero() {
            self.launch();
            return;
        }
        let me = self.clone();
        if self
            .scheduler
            .schedule_once(remaining, move || me.launch())
            .is_err()
        {
            self.abandon();
        }
    }

    fn until_interval_elapsed(&self, interval: Duration) -> Duration {
        let last = Timestamp::from_nanos(self.last_start.load(Ordering::SeqCst));
        if last.is_never() {
            return Duration::ZERO;
        }
        last.add(interval).saturating_duration_since(Timestamp::now())
    }

    fn dispatch(self: &Arc<Self>, job: Job) {
        match self.router.offer(self.category, job) {
            Ok(()) => {}
            Err(OfferError::ShuttingDown) => self.abandon(),
            Err(OfferError::Full(job, _)) => {
                let me = self.clone();
                let retry = self
                    .scheduler
                    .schedule_once(REJECTED_RETRY_DELAY, move || me.dispatch(job));
                if retry.is_err() {
                    self.abandon();
                }
            }
        }
    }

    /// A run could not be delivered; release what it held
    fn abandon(&self) {
        debug!(category = %self.category, "trigger run dropped, dispatcher stopping");
        match self.policy {
            TriggerPolicy::Throttle { .. } => self.state.store(IDLE, Ordering::SeqCst),
            TriggerPolicy::Limit { .. } => {
                self.running.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn execute(self: &Arc<Self>) {
        let seen = self.wishes.load(Ordering::SeqCst);
        self.last_start
            .store(Timestamp::now().as_nanos(), Ordering::SeqCst);
        let job = self.job.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job())) {
            error!(
                category = %self.category,
                panic = %panic_message(payload.as_ref()),
                "triggered job panicked"
            );
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        match self.policy {
            TriggerPolicy::Throttle { .. } => self.complete_throttled(seen),
            TriggerPolicy::Limit { .. } => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                self.drain_pending();
            }
        }
    }

    fn complete_throttled(self: &Arc<Self>, seen: u64) {
        if self.wishes.load(Ordering::SeqCst) == seen {
            self.state.store(IDLE, Ordering::SeqCst);
            // A trigger may have seen ACTIVE just before the store
            if self.wishes.load(Ordering::SeqCst) == seen
                || self
                    .state
                    .compare_exchange(IDLE, ACTIVE, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                return;
            }
        }
        self.launch_spaced();
    }

    fn max_concurrent(&self) -> usize {
        match self.policy {
            TriggerPolicy::Limit { max_concurrent } => max_concurrent,
            TriggerPolicy::Throttle { .. } => 1,
        }
    }

    /// Promote pending triggers while slots are free
    fn drain_pending(self: &Arc<Self>) {
        let max = self.max_concurrent();
        while self.pending.load(Ordering::SeqCst) > 0 {
            let running = self.running.load(Ordering::SeqCst);
            if running >= max {
                return;
            }
            if self
                .running
                .compare_exchange(running, running + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }
            let claimed = self
                .pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| p.checked_sub(1))
                .is_ok();
            if claimed {
                self.launch();
            } else {
                self.running.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        }
    }
}

/// Handle that runs a job under a [`TriggerPolicy`]
///
/// Cloning yields another handle to the same trigger state.
#[derive(Clone)]
pub struct Trigger {
    inner: Arc<TriggerInner>,
}

impl Trigger {
    pub(crate) fn new(
        category: ThreadCategory,
        policy: TriggerPolicy,
        job: SharedJob,
        router: Arc<Router>,
        scheduler: Arc<TimeoutScheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                category,
                policy,
                job,
                router,
                scheduler,
                state: AtomicU8::new(IDLE),
                wishes: AtomicU64::new(0),
                last_start: AtomicU64::new(Timestamp::NEVER.as_nanos()),
                running: AtomicUsize::new(0),
                pending: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Request an execution
    pub fn fire(&self) {
        self.inner.fire();
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.inner.policy
    }

    pub fn category(&self) -> ThreadCategory {
        self.inner.category
    }

    /// Executions finished so far
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Limit: executions queued or running. Throttle: 1 while active.
    pub fn running(&self) -> usize {
        match self.inner.policy {
            TriggerPolicy::Limit { .. } => self.inner.running.load(Ordering::SeqCst),
            TriggerPolicy::Throttle { .. } => self.inner.state.load(Ordering::SeqCst) as usize,
        }
    }

    /// Limit: triggers waiting for a slot. Throttle: always 0.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// No execution queued, running or waiting
    pub fn is_idle(&self) -> bool {
        self.running() == 0 && self.pending() == 0
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("category", &self.inner.category)
            .field("policy", &self.inner.policy)
            .field("completed", &self.completed())
            .finish()
    }
}
