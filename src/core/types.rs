/*!
 * Core Types
 * Common types shared by the scheduler and the dispatcher
 */

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Unit of work executed exactly once
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Unit of work that may be executed many times (recurring tasks, decorators)
pub type SharedJob = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduled task identifier
pub type TaskId = u64;

/// Fixed set of worker categories, each owning one bounded job queue
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThreadCategory {
    /// Latency-sensitive work that must never wait behind bulk jobs
    Realtime,
    /// Work triggered by user interaction
    Interactive,
    /// Bulk and maintenance work
    Background,
    /// Jobs that may block on I/O for long periods
    Blocking,
}

impl ThreadCategory {
    /// All categories, in index order
    pub const ALL: [ThreadCategory; 4] = [
        ThreadCategory::Realtime,
        ThreadCategory::Interactive,
        ThreadCategory::Background,
        ThreadCategory::Blocking,
    ];

    /// Number of categories
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index for per-category tables
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Parse from string representation
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "realtime" | "rt" => Ok(Self::Realtime),
            "interactive" | "ui" => Ok(Self::Interactive),
            "background" | "bg" => Ok(Self::Background),
            "blocking" | "io" => Ok(Self::Blocking),
            _ => Err(format!(
                "Invalid category '{}'. Valid: realtime, interactive, background, blocking",
                s
            )),
        }
    }

    /// Convert to string representation
    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Interactive => "interactive",
            Self::Background => "background",
            Self::Blocking => "blocking",
        }
    }
}

impl fmt::Display for ThreadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ThreadCategory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ThreadCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Human-readable message from a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
