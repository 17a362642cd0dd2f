/*!
 * Synchronization Configuration
 *
 * Construction-time options for queued locks
 */

use crate::core::limits::{DEFAULT_NODE_POOL_CAPACITY, MAX_NODE_POOL_CAPACITY};
use serde::{Deserialize, Serialize};

/// Lock acquisition ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Fairness {
    /// A free lock may be taken even while others are queued
    #[default]
    Barging,
    /// A free lock is only taken when no other thread has queued earlier
    Fair,
}

/// Queued lock configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    pub fairness: Fairness,
    /// Capacity of the wait-node pool; `None` allocates every node
    pub node_pool: Option<usize>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            fairness: Fairness::Barging,
            node_pool: None,
        }
    }
}

impl LockConfig {
    /// FIFO hand-off, no node recycling
    pub const fn fair() -> Self {
        Self {
            fairness: Fairness::Fair,
            node_pool: None,
        }
    }

    /// Barging lock that recycles wait nodes
    pub const fn pooled() -> Self {
        Self {
            fairness: Fairness::Barging,
            node_pool: Some(DEFAULT_NODE_POOL_CAPACITY),
        }
    }

    pub const fn with_fairness(mut self, fairness: Fairness) -> Self {
        self.fairness = fairness;
        self
    }

    pub const fn with_node_pool(mut self, capacity: usize) -> Self {
        self.node_pool = Some(capacity);
        self
    }

    #[inline]
    pub fn is_fair(&self) -> bool {
        self.fairness == Fairness::Fair
    }

    /// Pool capacity clamped to the supported range
    pub fn pool_capacity(&self) -> Option<usize> {
        self.node_pool
            .map(|capacity| capacity.clamp(1, MAX_NODE_POOL_CAPACITY))
    }
}
