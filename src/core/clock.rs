/*!
 * Monotonic Clock
 *
 * Process-wide monotonic timestamps stored as nanoseconds since a lazily
 * initialised epoch. Timestamps fit in a `u64` so they can live in atomics,
 * and `Timestamp::NEVER` is the sentinel for "not scheduled".
 */

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

#[inline]
fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic point in time with nanosecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Sentinel that sorts after every real timestamp
    pub const NEVER: Timestamp = Timestamp(u64::MAX);

    /// Current time
    #[inline]
    pub fn now() -> Self {
        Self::from_instant(Instant::now())
    }

    /// Convert from an `Instant` (instants before the epoch clamp to zero)
    #[inline]
    pub fn from_instant(instant: Instant) -> Self {
        let nanos = instant.saturating_duration_since(epoch()).as_nanos();
        Timestamp(u64::try_from(nanos).unwrap_or(u64::MAX - 1))
    }

    /// Build from raw nanoseconds since the epoch
    #[inline(always)]
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// Raw nanoseconds since the epoch
    #[inline(always)]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn is_never(self) -> bool {
        self.0 == u64::MAX
    }

    /// Convert back to an `Instant`, `None` for `NEVER`
    pub fn to_instant(self) -> Option<Instant> {
        if self.is_never() {
            None
        } else {
            Some(epoch() + Duration::from_nanos(self.0))
        }
    }

    /// Saturating addition; `NEVER` stays `NEVER`
    #[inline]
    pub fn add(self, duration: Duration) -> Self {
        if self.is_never() {
            return self;
        }
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(delta).min(u64::MAX - 1))
    }

    /// Time remaining until `self`, zero when already passed
    #[inline]
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}
