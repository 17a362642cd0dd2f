/*!
 * Wait-Node Pool
 * Fixed-capacity free list of recyclable queue nodes, keyed by slot index
 */

use super::node::{Node, NodeRef, WaitStatus};
use arc_swap::ArcSwapOption;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::Thread;

/// Pool usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodePoolStats {
    /// Nodes handed out by reusing a recycled node
    pub reused: u64,
    /// Nodes that had to be freshly allocated
    pub allocated: u64,
    /// Recyclable slots
    pub capacity: usize,
}

/// Recycling allocator for wait nodes
///
/// # Performance
///
/// - **Bounded**: never holds more than `capacity` idle nodes
/// - **Lock-free**: free list is a `crossbeam_queue::ArrayQueue` of indices
/// - **ABA-safe**: a recycled node is only reused when the pool holds its sole reference
pub(crate) struct NodePool {
    slots: Box<[ArcSwapOption<Node>]>,
    free: ArrayQueue<usize>,
    reused: AtomicU64,
    allocated: AtomicU64,
}

impl NodePool {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let free = ArrayQueue::new(capacity);
        for idx in 0..capacity {
            let _ = free.push(idx);
        }
        Self {
            slots: (0..capacity).map(|_| ArcSwapOption::empty()).collect(),
            free,
            reused: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Take a node for `thread`, recycling an idle one when possible
    pub(crate) fn acquire(&self, thread: Thread, thread_id: u64, status: WaitStatus) -> NodeRef {
        let Some(idx) = self.free.pop() else {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            return Arc::new(Node::new(thread, thread_id, status, None));
        };

        if let Some(mut node) = self.slots[idx].swap(None) {
            if let Some(exclusive) = Arc::get_mut(&mut node) {
                exclusive.reset(thread, thread_id, status);
                self.reused.fetch_add(1, Ordering::Relaxed);
                return node;
            }
        }

        // Slot was empty or its node is still referenced elsewhere
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Arc::new(Node::new(thread, thread_id, status, Some(idx)))
    }

    /// Return a node that has left the queue for good
    pub(crate) fn recycle(&self, node: NodeRef) {
        if let Some(idx) = node.slot() {
            node.clear_links();
            self.slots[idx].store(Some(node));
            let _ = self.free.push(idx);
        }
    }

    /// Give back a node's slot without keeping the node itself
    ///
    /// Used for cancelled nodes that successors may still traverse.
    pub(crate) fn release_slot(&self, node: &Node) {
        if let Some(idx) = node.slot() {
            let _ = self.free.push(idx);
        }
    }

    pub(crate) fn stats(&self) -> NodePoolStats {
        NodePoolStats {
            reused: self.reused.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            capacity: self.capacity(),
        }
    }
}

impl Drop for NodePool {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            if let Some(node) = slot.swap(None) {
                node.clear_links();
            }
        }
    }
}
