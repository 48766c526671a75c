//! Bounded pending-frame queue
//!
//! Multi-producer push from any caller context, single-consumer async pop
//! on the session worker. When full, the oldest entry is dropped, bounding
//! memory while keeping the most recent state flowing.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Items carrying a capture timestamp
pub trait Timestamped {
    fn timestamp_ms(&self) -> u64;
}

impl Timestamped for crate::video::VideoFrame {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

impl Timestamped for crate::audio::AudioFrame {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

/// Outcome of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued
    Queued,
    /// Enqueued, displacing the oldest entry
    DroppedOldest,
    /// Rejected: timestamp not strictly greater than the last accepted one
    RejectedStale,
}

struct Inner<T> {
    items: VecDeque<T>,
    last_timestamp_ms: Option<u64>,
}

/// Bounded FIFO with drop-oldest overflow and strict timestamp ordering
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T: Timestamped> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                last_timestamp_ms: None,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push an item, never blocking
    pub fn push(&self, item: T) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if let Some(last) = inner.last_timestamp_ms {
                if item.timestamp_ms() <= last {
                    return PushOutcome::RejectedStale;
                }
            }
            inner.last_timestamp_ms = Some(item.timestamp_ms());

            if inner.items.len() >= self.capacity {
                inner.items.pop_front();
                inner.items.push_back(item);
                PushOutcome::DroppedOldest
            } else {
                inner.items.push_back(item);
                PushOutcome::Queued
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Pop the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Timestamp of the oldest pending item
    pub fn peek_timestamp(&self) -> Option<u64> {
        self.inner.lock().items.front().map(|i| i.timestamp_ms())
    }

    /// Wait until the queue is non-empty
    pub async fn wait_nonempty(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Drop all pending items, keeping the timestamp watermark
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.items.len();
        inner.items.clear();
        n
    }

    /// Reset the strict-ordering watermark (new capture timeline)
    pub fn reset_watermark(&self) {
        self.inner.lock().last_timestamp_ms = None;
    }
}
