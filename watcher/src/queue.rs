//! Bounded single-producer / single-consumer queues between the capture path
//! and the dispatchers.
//!
//! Pushing never blocks: when a queue is full the oldest pending item is
//! evicted and logged. Dropping the sender closes the queue; the receiver
//! keeps yielding buffered items and returns `None` once it is drained.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scene_watch_common::event::Record;
use tokio::sync::Notify;
use tracing::warn;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
    dropped: u64,
}

struct Shared<T> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }
}

pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

/// Create a queue holding at most `capacity` items (minimum 1).
pub fn bounded<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        name,
        capacity,
        inner: Mutex::new(Inner {
            items: VecDeque::with_capacity(capacity),
            closed: false,
            dropped: 0,
        }),
        notify: Notify::new(),
    });
    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

impl<T: Record> QueueSender<T> {
    /// Enqueue without blocking. Returns `false` if the oldest pending item
    /// had to be evicted to make room.
    pub fn push(&self, item: T) -> bool {
        let evicted = {
            let mut inner = self.shared.lock();
            let evicted = if inner.items.len() >= self.shared.capacity {
                inner.dropped += 1;
                inner.items.pop_front()
            } else {
                None
            };
            inner.items.push_back(item);
            evicted.map(|old| (old, inner.dropped))
        };
        self.shared.notify.notify_one();

        match evicted {
            Some((old, dropped_total)) => {
                warn!(
                    queue = self.shared.name,
                    kind = old.kind(),
                    ts = old.timestamp_ms(),
                    dropped_total,
                    "queue full, dropped oldest item"
                );
                false
            }
            None => true,
        }
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T> QueueReceiver<T> {
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Wait for the next item in FIFO order. `None` once closed and empty.
    pub async fn pop(&mut self) -> Option<T> {
        loop {
            {
                let mut inner = self.shared.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the unlock above and this await is not lost.
            self.shared.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    /// Items evicted by overflow since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}
