//! Priority queue for pending requests
//!
//! A min-heap keyed by (priority, sequence number): lower priority values pop
//! first, FIFO among equals. All operations are non-blocking; the scheduler
//! waits on the queue's notifier.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::crawler::request::Request;

struct QueuedRequest {
    priority: u32,
    seq: u64,
    request: Request,
}

// Reverse comparison so the BinaryHeap max-heap behaves as a min-heap, with
// the monotonic sequence number breaking ties in insertion order.
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedRequest>,
    next_seq: u64,
}

/// Work queue shared by the coordinator and the worker pool.
#[derive(Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a request; its `priority` field decides its position.
    pub fn push(&self, request: Request) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueuedRequest {
                priority: request.priority,
                seq,
                request,
            });
        }
        self.notify.notify_waiters();
    }

    /// Pops the lowest-priority (earliest) request, if any.
    pub fn try_pop(&self) -> Option<Request> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.heap.pop().map(|q| q.request)
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all pending requests. Used when the global deadline fires.
    pub fn clear(&self) {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .heap
            .clear();
    }

    /// Resolves on the next `push`. Workers pair this with a short sleep so
    /// a notification raced between `try_pop` and `notified` is not lost.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
