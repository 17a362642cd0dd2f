/*!
 * CLH Sync Queue
 *
 * FIFO queue of blocked threads shared by the queued lock and its
 * conditions. `head` and `tail` are only ever mutated by compare-and-set;
 * each waiter's blocking state lives in its predecessor's status tag.
 *
 * # Invariants
 *
 * - The head node is never cancelled
 * - Only the thread that created a node cancels it
 * - `prev` links are authoritative, `next` links are hints that may lag
 */

use super::node::{cas_link, same, Node, NodeRef, WaitStatus};
use super::pool::{NodePool, NodePoolStats};
use crate::core::sync::interrupt::current_thread_id;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::thread;

pub(crate) struct SyncQueue {
    head: ArcSwapOption<Node>,
    tail: ArcSwapOption<Node>,
    pool: Option<NodePool>,
}

impl SyncQueue {
    pub(crate) fn new(pool_capacity: Option<usize>) -> Self {
        Self {
            head: ArcSwapOption::empty(),
            tail: ArcSwapOption::empty(),
            pool: pool_capacity.map(NodePool::new),
        }
    }

    /// Allocate (or recycle) a node for the calling thread
    pub(crate) fn new_node(&self, status: WaitStatus) -> NodeRef {
        let thread = thread::current();
        let id = current_thread_id();
        match &self.pool {
            Some(pool) => pool.acquire(thread, id, status),
            None => Arc::new(Node::new(thread, id, status, None)),
        }
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<NodeRef> {
        self.head.load_full()
    }

    #[inline]
    pub(crate) fn is_head(&self, node: &NodeRef) -> bool {
        match self.head.load_full() {
            Some(head) => Arc::ptr_eq(&head, node),
            None => false,
        }
    }

    /// Splice `node` onto the tail, installing a dummy head on first use.
    /// Returns the node's predecessor.
    pub(crate) fn enq(&self, node: &NodeRef) -> NodeRef {
        loop {
            match self.tail.load_full() {
                None => {
                    let dummy: NodeRef = Arc::new(Node::dummy());
                    if cas_link(&self.head, &None, Some(dummy.clone())) {
                        self.tail.store(Some(dummy));
                    } else {
                        thread::yield_now();
                    }
                }
                Some(tail) => {
                    node.prev.store(Some(tail.clone()));
                    let expected = Some(tail.clone());
                    if cas_link(&self.tail, &expected, Some(node.clone())) {
                        tail.next.store(Some(node.clone()));
                        return tail;
                    }
                }
            }
        }
    }

    /// Enqueue a fresh node for the calling thread
    pub(crate) fn add_waiter(&self) -> NodeRef {
        let node = self.new_node(WaitStatus::Zero);
        self.enq(&node);
        node
    }

    /// Promote `node` to head; only called by the thread that just acquired
    pub(crate) fn set_head(&self, node: &NodeRef) {
        node.mark_promoted();
        self.head.store(Some(node.clone()));
        node.prev.store(None);
    }

    /// Detach the previous head once its successor has been promoted
    pub(crate) fn retire(&self, old_head: NodeRef) {
        old_head.next.store(None);
        if let Some(pool) = &self.pool {
            pool.recycle(old_head);
        }
    }

    /// Decide whether a waiter whose acquire failed may park.
    ///
    /// Parks only once the predecessor carries `Signal`; otherwise skips
    /// cancelled predecessors or sets the tag and asks the caller to retry.
    pub(crate) fn should_park_after_failed_acquire(&self, pred: &NodeRef, node: &NodeRef) -> bool {
        let status = pred.status();
        if status == WaitStatus::Signal {
            return true;
        }
        if status == WaitStatus::Cancelled {
            let mut pred = pred.clone();
            while pred.is_cancelled() {
                match pred.prev.load_full() {
                    Some(prev) => pred = prev,
                    None => break,
                }
            }
            node.prev.store(Some(pred.clone()));
            pred.next.store(Some(node.clone()));
        } else {
            pred.cas_status(status, WaitStatus::Signal);
        }
        false
    }

    /// Wake the first live successor of `node`
    pub(crate) fn unpark_successor(&self, node: &NodeRef) {
        let status = node.status();
        if (status as i32) < 0 {
            node.cas_status(status, WaitStatus::Zero);
        }

        let mut successor = node.next.load_full();
        if successor.as_ref().map_or(true, |s| s.is_cancelled()) {
            // `next` is stale; walk back from the tail through `prev`
            successor = None;
            let mut cursor = self.tail.load_full();
            while let Some(current) = cursor {
                if Arc::ptr_eq(&current, node) {
                    break;
                }
                if !current.is_cancelled() {
                    successor = Some(current.clone());
                }
                cursor = current.prev.load_full();
            }
        }

        if let Some(successor) = successor {
            successor.unpark();
        }
    }

    /// Abandon an acquire attempt, re-splicing the queue around `node`
    pub(crate) fn cancel_acquire(&self, node: &NodeRef) {
        let Some(mut pred) = node.prev.load_full() else {
            return;
        };
        while pred.is_cancelled() {
            match pred.prev.load_full() {
                Some(prev) => pred = prev,
                None => break,
            }
            node.prev.store(Some(pred.clone()));
        }

        let pred_next = pred.next.load_full();
        node.set_status(WaitStatus::Cancelled);

        let this = Some(node.clone());
        if cas_link(&self.tail, &this, Some(pred.clone())) {
            cas_link(&pred.next, &pred_next, None);
        } else {
            let status = pred.status();
            let signalled = status == WaitStatus::Signal
                || ((status as i32) <= 0 && pred.cas_status(status, WaitStatus::Signal));
            if !self.is_head(&pred) && signalled && !pred.is_promoted() {
                if let Some(next) = node.next.load_full() {
                    if !next.is_cancelled() {
                        cas_link(&pred.next, &pred_next, Some(next));
                    }
                }
            } else {
                self.unpark_successor(node);
            }
            node.next.store(None);
        }

        if let Some(pool) = &self.pool {
            pool.release_slot(node);
        }
    }

    /// Whether some other thread has been waiting longer than the caller
    pub(crate) fn has_queued_predecessors(&self) -> bool {
        let tail = self.tail.load_full();
        let head = self.head.load_full();
        match head {
            Some(head) if !same(&Some(head.clone()), &tail) => match head.next.load_full() {
                Some(first) => first.thread_id() != current_thread_id(),
                None => true,
            },
            _ => false,
        }
    }

    pub(crate) fn has_queued_threads(&self) -> bool {
        !same(&self.head.load_full(), &self.tail.load_full())
    }

    /// Number of live waiters (approximate under concurrency)
    pub(crate) fn queue_length(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.tail.load_full();
        while let Some(node) = cursor {
            if !node.is_promoted() && !node.is_cancelled() {
                count += 1;
            }
            cursor = node.prev.load_full();
        }
        count
    }

    /// Whether a condition node has been transferred onto this queue
    pub(crate) fn is_on_sync_queue(&self, node: &NodeRef) -> bool {
        if node.status() == WaitStatus::Condition || node.prev.load_full().is_none() {
            return false;
        }
        if node.next.load_full().is_some() {
            return true;
        }
        self.find_from_tail(node)
    }

    fn find_from_tail(&self, node: &NodeRef) -> bool {
        let mut cursor = self.tail.load_full();
        while let Some(current) = cursor {
            if Arc::ptr_eq(&current, node) {
                return true;
            }
            cursor = current.prev.load_full();
        }
        false
    }

    /// Move a signalled condition node onto the sync queue.
    /// Returns `false` if the node was cancelled before the signal.
    pub(crate) fn transfer_for_signal(&self, node: &NodeRef) -> bool {
        if !node.cas_status(WaitStatus::Condition, WaitStatus::Zero) {
            return false;
        }
        let pred = self.enq(node);
        let status = pred.status();
        if pred.is_cancelled() || !pred.cas_status(status, WaitStatus::Signal) {
            node.unpark();
        }
        true
    }

    /// Transfer after a timed-out or interrupted condition wait.
    /// Returns `true` if the cancellation beat any signal.
    pub(crate) fn transfer_after_cancelled_wait(&self, node: &NodeRef) -> bool {
        if node.cas_status(WaitStatus::Condition, WaitStatus::Zero) {
            self.enq(node);
            return true;
        }
        // A signal won the race; wait for it to finish the enqueue
        while !self.is_on_sync_queue(node) {
            thread::yield_now();
        }
        false
    }

    pub(crate) fn pool_stats(&self) -> Option<NodePoolStats> {
        self.pool.as_ref().map(NodePool::stats)
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        self.head.store(None);
        let mut cursor = self.tail.swap(None);
        while let Some(node) = cursor {
            cursor = node.prev.swap(None);
            node.next.store(None);
            node.next_waiter.store(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enq_installs_dummy_head() {
        let queue = SyncQueue::new(None);
        assert!(!queue.has_queued_threads());

        let node = queue.add_waiter();
        let head = queue.head().unwrap();
        assert!(head.is_promoted());
        assert!(same(&node.prev.load_full(), &Some(head.clone())));
        assert!(same(&head.next.load_full(), &Some(node.clone())));
        assert!(queue.has_queued_threads());
        assert_eq!(queue.queue_length(), 1);
    }

    #[test]
    fn test_cancel_tail_restores_empty_queue() {
        let queue = SyncQueue::new(None);
        let node = queue.add_waiter();
        queue.cancel_acquire(&node);

        assert!(node.is_cancelled());
        assert!(!queue.has_queued_threads());
        assert_eq!(queue.queue_length(), 0);
    }

    #[test]
    fn test_cancelled_predecessor_is_skipped() {
        let queue = SyncQueue::new(None);
        let first = queue.add_waiter();
        let second = queue.add_waiter();
        queue.cancel_acquire(&first);

        let pred = second.prev.load_full().unwrap();
        assert!(pred.is_cancelled());
        assert!(!queue.should_park_after_failed_acquire(&pred, &second));

        let pred = second.prev.load_full().unwrap();
        assert!(queue.is_head(&pred));
        assert!(!queue.should_park_after_failed_acquire(&pred, &second));
        assert_eq!(pred.status(), WaitStatus::Signal);
        assert!(queue.should_park_after_failed_acquire(&pred, &second));
    }

    #[test]
    fn test_transfer_for_signal_only_once() {
        let queue = SyncQueue::new(None);
        let node = queue.new_node(WaitStatus::Condition);
        assert!(!queue.is_on_sync_queue(&node));

        assert!(queue.transfer_for_signal(&node));
        assert!(queue.is_on_sync_queue(&node));
        assert!(!queue.transfer_for_signal(&node));
    }

    #[test]
    fn test_cancelled_wait_beats_later_signal() {
        let queue = SyncQueue::new(None);
        let node = queue.new_node(WaitStatus::Condition);
        assert!(queue.transfer_after_cancelled_wait(&node));
        assert!(!queue.transfer_for_signal(&node));
        assert!(queue.is_on_sync_queue(&node));
    }

    #[test]
    fn test_has_queued_predecessors_for_other_thread() {
        let queue = Arc::new(SyncQueue::new(None));
        let queued = queue.clone();
        thread::spawn(move || {
            queued.add_waiter();
        })
        .join()
        .unwrap();

        assert!(queue.has_queued_predecessors());
    }
}
