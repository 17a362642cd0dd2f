/*!
 * Dispatcher Configuration
 *
 * Per-category queue and elastic pool settings. Defaults come from
 * `core::limits`; every struct is serde-friendly with field defaults.
 */

use crate::core::errors::{DispatchError, DispatchResult};
use crate::core::limits::{
    DEFAULT_CATEGORY_QUEUE_CAPACITY, DEFAULT_CORE_THREADS, DEFAULT_MAX_THREADS,
    MAX_CATEGORY_QUEUE_CAPACITY, POOL_GROW_THRESHOLD, POOL_SAMPLE_INTERVAL,
    POOL_SHRINK_THRESHOLD, POOL_UTILIZATION_DECAY, WORKER_IDLE_POLL,
};
use crate::core::types::ThreadCategory;
use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Elastic worker pool tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub core_threads: usize,
    pub max_threads: usize,
    /// How long an idle worker blocks on its queue between retirement checks
    pub idle_poll: Duration,
    pub sample_interval: Duration,
    /// Weight of the previous average in the decayed utilization
    pub decay: f64,
    pub grow_threshold: f64,
    pub shrink_threshold: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_threads: DEFAULT_CORE_THREADS,
            max_threads: DEFAULT_MAX_THREADS,
            idle_poll: WORKER_IDLE_POLL,
            sample_interval: POOL_SAMPLE_INTERVAL,
            decay: POOL_UTILIZATION_DECAY,
            grow_threshold: POOL_GROW_THRESHOLD,
            shrink_threshold: POOL_SHRINK_THRESHOLD,
        }
    }
}

impl PoolConfig {
    /// Fixed-size pool that never grows or shrinks
    pub fn fixed(threads: usize) -> Self {
        Self {
            core_threads: threads,
            max_threads: threads,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, core: usize, max: usize) -> Self {
        self.core_threads = core;
        self.max_threads = max;
        self
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.max_threads == 0 {
            return Err(DispatchError::InvalidPoolSize(
                "max_threads must be positive".to_string(),
            ));
        }
        if self.core_threads > self.max_threads {
            return Err(DispatchError::InvalidPoolSize(format!(
                "core_threads {} exceeds max_threads {}",
                self.core_threads, self.max_threads
            )));
        }
        if self.sample_interval.is_zero() || self.idle_poll.is_zero() {
            return Err(DispatchError::InvalidPoolSize(
                "sample_interval and idle_poll must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.decay) {
            return Err(DispatchError::InvalidPoolSize(format!(
                "decay {} must be within [0, 1)",
                self.decay
            )));
        }
        if self.shrink_threshold >= self.grow_threshold {
            return Err(DispatchError::InvalidPoolSize(format!(
                "shrink threshold {} must be below grow threshold {}",
                self.shrink_threshold, self.grow_threshold
            )));
        }
        Ok(())
    }
}

/// Settings for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub queue_capacity: usize,
    pub pool: PoolConfig,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CATEGORY_QUEUE_CAPACITY,
            pool: PoolConfig::default(),
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Applied to every category without an override
    pub defaults: CategoryConfig,
    pub overrides: BTreeMap<ThreadCategory, CategoryConfig>,
    /// Timer used for delayed, periodic and retried submissions
    pub scheduler: SchedulerConfig,
}

impl DispatcherConfig {
    pub fn with_override(mut self, category: ThreadCategory, config: CategoryConfig) -> Self {
        self.overrides.insert(category, config);
        self
    }

    /// Effective settings for `category`
    pub fn category(&self, category: ThreadCategory) -> CategoryConfig {
        self.overrides
            .get(&category)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn validate(&self) -> DispatchResult<()> {
        for category in ThreadCategory::ALL {
            let config = self.category(category);
            if config.queue_capacity == 0 || config.queue_capacity > MAX_CATEGORY_QUEUE_CAPACITY {
                return Err(DispatchError::InvalidPoolSize(format!(
                    "{} queue capacity {} out of range",
                    category, config.queue_capacity
                )));
            }
            config.pool.validate()?;
        }
        Ok(())
    }
}
