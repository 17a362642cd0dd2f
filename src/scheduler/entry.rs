/*!
 * Timer Queue Entries
 * Heap entries ordered by their insertion-time key
 */

use super::task::TaskInner;
use crate::core::clock::Timestamp;
use std::sync::Arc;

/// Queued task with the key it was inserted under
///
/// The key is a snapshot: a task's live `next_run` may move afterwards
/// without corrupting heap order.
pub(super) struct Entry {
    pub key: Timestamp,
    pub seq: u64,
    pub task: Arc<TaskInner>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest key (then the
        // earliest insertion) is on top
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
