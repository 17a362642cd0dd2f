/*!
 * Wait-Queue Node
 *
 * One blocked thread in a lock's sync queue or a condition's wait list.
 * Links are atomically swappable `Arc` handles; a node never holds a raw
 * pointer to a neighbour.
 */

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::Thread;

/// Node status tag
///
/// Positive values mean cancelled; negative values mean the node is waiting
/// for something, which lets hot paths test `> 0` / `<= 0` like the raw int.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Acquire attempt abandoned (timeout or interrupt)
    Cancelled = 1,
    /// Initial state on the sync queue
    Zero = 0,
    /// Successor is (or will be) parked and must be unparked on release
    Signal = -1,
    /// Node is on a condition list, not on the sync queue
    Condition = -2,
}

impl WaitStatus {
    #[inline(always)]
    fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Cancelled,
            -1 => Self::Signal,
            -2 => Self::Condition,
            _ => Self::Zero,
        }
    }
}

pub(crate) type NodeRef = Arc<Node>;

/// Wait-queue node
pub(crate) struct Node {
    status: AtomicI32,
    /// Predecessor on the sync queue (authoritative link)
    pub(crate) prev: ArcSwapOption<Node>,
    /// Successor on the sync queue (hint, may be stale)
    pub(crate) next: ArcSwapOption<Node>,
    /// Next node on a condition list; only touched while the lock is held
    pub(crate) next_waiter: ArcSwapOption<Node>,
    thread: Option<Thread>,
    thread_id: u64,
    /// Set once the node has been promoted to head
    promoted: AtomicBool,
    /// Pool slot this node belongs to, if any
    slot: Option<usize>,
}

impl Node {
    pub(crate) fn new(thread: Thread, thread_id: u64, status: WaitStatus, slot: Option<usize>) -> Self {
        Self {
            status: AtomicI32::new(status as i32),
            prev: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            next_waiter: ArcSwapOption::empty(),
            thread: Some(thread),
            thread_id,
            promoted: AtomicBool::new(false),
            slot,
        }
    }

    /// Dummy head installed when the queue is first contended
    pub(crate) fn dummy() -> Self {
        Self {
            status: AtomicI32::new(WaitStatus::Zero as i32),
            prev: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            next_waiter: ArcSwapOption::empty(),
            thread: None,
            thread_id: 0,
            promoted: AtomicBool::new(true),
            slot: None,
        }
    }

    /// Reinitialise a recycled node; requires exclusive ownership
    pub(crate) fn reset(&mut self, thread: Thread, thread_id: u64, status: WaitStatus) {
        *self.status.get_mut() = status as i32;
        *self.promoted.get_mut() = false;
        self.prev.store(None);
        self.next.store(None);
        self.next_waiter.store(None);
        self.thread = Some(thread);
        self.thread_id = thread_id;
    }

    #[inline(always)]
    pub(crate) fn status(&self) -> WaitStatus {
        WaitStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.status.load(Ordering::Acquire) > 0
    }

    #[inline(always)]
    pub(crate) fn set_status(&self, status: WaitStatus) {
        self.status.store(status as i32, Ordering::Release);
    }

    #[inline(always)]
    pub(crate) fn cas_status(&self, expect: WaitStatus, update: WaitStatus) -> bool {
        self.status
            .compare_exchange(expect as i32, update as i32, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline(always)]
    pub(crate) fn thread_id(&self) -> u64 {
        self.thread_id
    }

    #[inline(always)]
    pub(crate) fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub(crate) fn mark_promoted(&self) {
        self.promoted.store(true, Ordering::Release);
    }

    /// Whether this node is (or was) the queue head and so has no waiter behind it
    pub(crate) fn is_promoted(&self) -> bool {
        self.promoted.load(Ordering::Acquire)
    }

    pub(crate) fn unpark(&self) {
        if let Some(thread) = &self.thread {
            thread.unpark();
        }
    }

    /// Drop all outgoing links so no reference cycle survives the node
    pub(crate) fn clear_links(&self) {
        self.prev.store(None);
        self.next.store(None);
        self.next_waiter.store(None);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("status", &self.status())
            .field("thread_id", &self.thread_id)
            .field("promoted", &self.is_promoted())
            .field("slot", &self.slot)
            .finish()
    }
}

/// Identity comparison of two optional node handles
#[inline]
pub(crate) fn same(a: &Option<NodeRef>, b: &Option<NodeRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Compare-and-set a link, succeeding only if it still points at `current`
#[inline]
pub(crate) fn cas_link(
    link: &ArcSwapOption<Node>,
    current: &Option<NodeRef>,
    update: Option<NodeRef>,
) -> bool {
    let previous = link.compare_and_swap(current, update);
    same(&previous, current)
}
