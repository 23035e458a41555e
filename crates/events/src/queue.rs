//! Per-subscriber FIFO queue with a log-shedding bound.
//!
//! Producers never block: [`SubscriberQueue::push`] is synchronous and
//! always returns immediately. When the queue is at capacity the oldest
//! log event is discarded to make room. State-bearing events (progress,
//! item results, terminal) are never discarded, so the queue can exceed
//! its capacity only with those.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::event::ProgressEvent;

/// Result of a timed receive.
#[derive(Debug)]
pub enum Recv {
    /// An event was dequeued.
    Event(ProgressEvent),
    /// Nothing arrived within the timeout.
    Idle,
    /// The queue was closed and fully drained.
    Closed,
}

struct QueueState {
    events: VecDeque<ProgressEvent>,
    closed: bool,
}

/// Bounded queue feeding a single consumer.
pub struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event, shedding log events if the queue is full.
    ///
    /// Returns `false` if the event itself was shed (a log event arriving
    /// at a queue full of state-bearing events) or the queue is closed.
    pub fn push(&self, event: ProgressEvent) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }

            if state.events.len() >= self.capacity {
                let oldest_log = state
                    .events
                    .iter()
                    .position(|e| e.kind().is_droppable());
                match oldest_log {
                    Some(pos) => {
                        state.events.remove(pos);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    None if event.kind().is_droppable() => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return false;
                    }
                    None => {}
                }
            }

            state.events.push_back(event);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next event. Returns `None` once closed and drained.
    pub async fn recv(&self) -> Option<ProgressEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Wait up to `timeout` for the next event.
    pub async fn recv_timeout(&self, timeout: Duration) -> Recv {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(event)) => Recv::Event(event),
            Ok(None) => Recv::Closed,
            Err(_) => Recv::Idle,
        }
    }

    /// Close the queue. Buffered events can still be drained.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of log events shed since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
