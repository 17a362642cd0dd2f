/*!
 * Scheduler Configuration
 */

use crate::core::limits::TIMER_THREAD_NAME;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name given to the timer thread
    pub thread_name: String,
    /// Run tasks that are already due before the timer thread exits
    pub drain_on_shutdown: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: TIMER_THREAD_NAME.to_string(),
            drain_on_shutdown: false,
        }
    }
}

impl SchedulerConfig {
    /// Default configuration that drains due tasks on shutdown
    pub fn draining() -> Self {
        Self {
            drain_on_shutdown: true,
            ..Self::default()
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
