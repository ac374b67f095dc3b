//! Long-running consumers, one per queue.
//!
//! Each dispatcher drains its queue in FIFO order and hands every item to a
//! [`Handler`]. A failed item is logged and dropped; the loop moves on. The
//! loop ends once the queue is closed and empty, so shutdown drains cleanly.

mod motion;
mod picture;
mod scene;

use std::future::Future;

use scene_watch_common::event::Record;
use scene_watch_common::frame::FrameError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::queue::QueueReceiver;
use crate::sink::SinkError;
use crate::storage::StorageError;

pub use motion::MotionDispatcher;
pub use picture::PictureDispatcher;
pub use scene::SceneDispatcher;

pub trait Handler: Send + 'static {
    type Item: Record;

    fn name(&self) -> &'static str;

    fn handle(&mut self, item: Self::Item) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    /// Evicted by queue overflow before this dispatcher saw them.
    pub dropped: u64,
}

/// Drain `queue` through `handler` until the queue is closed and empty.
pub async fn run<H: Handler>(mut queue: QueueReceiver<H::Item>, mut handler: H) -> DispatchStats {
    let name = handler.name();
    let mut stats = DispatchStats::default();
    info!(dispatcher = name, queue = queue.name(), "dispatcher started");

    while let Some(item) = queue.pop().await {
        let kind = item.kind();
        let ts = item.timestamp_ms();
        match handler.handle(item).await {
            Ok(()) => {
                stats.delivered += 1;
                debug!(dispatcher = name, kind, ts, pending = queue.len(), "item delivered");
            }
            Err(e) => {
                stats.failed += 1;
                error!(dispatcher = name, kind, ts, error = %e, "item dropped");
            }
        }
    }

    stats.dropped = queue.dropped();
    info!(
        dispatcher = name,
        delivered = stats.delivered,
        failed = stats.failed,
        dropped = stats.dropped,
        "queue drained, dispatcher stopped"
    );
    stats
}

pub fn spawn<H: Handler>(queue: QueueReceiver<H::Item>, handler: H) -> JoinHandle<DispatchStats> {
    tokio::spawn(run(queue, handler))
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::bounded;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug)]
    struct Job {
        id: i64,
        delay_ms: u64,
        fail: bool,
    }

    impl Record for Job {
        fn kind(&self) -> &'static str {
            "job"
        }
        fn timestamp_ms(&self) -> i64 {
            self.id
        }
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    impl Handler for Recorder {
        type Item = Job;

        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&mut self, item: Job) -> Result<(), DispatchError> {
            tokio::time::sleep(Duration::from_millis(item.delay_ms)).await;
            self.seen.lock().unwrap().push(item.id);
            if item.fail {
                return Err(SinkError::Status {
                    code: 500,
                    message: "boom".into(),
                }
                .into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn processes_in_enqueue_order_regardless_of_latency() {
        let (tx, rx) = bounded("jobs", 64);
        let delays = [30, 1, 15, 0, 7, 22, 3, 0, 11, 5];
        for (id, delay_ms) in delays.iter().enumerate() {
            tx.push(Job {
                id: id as i64,
                delay_ms: *delay_ms,
                fail: false,
            });
        }
        drop(tx);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let stats = spawn(rx, Recorder { seen: Arc::clone(&seen) }).await.unwrap();

        assert_eq!(stats.delivered, 10);
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn failed_item_does_not_stall_queue() {
        let (tx, rx) = bounded("jobs", 8);
        for id in 0..4 {
            tx.push(Job {
                id,
                delay_ms: 0,
                fail: id == 1,
            });
        }
        drop(tx);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let stats = run(rx, Recorder { seen: Arc::clone(&seen) }).await;
        assert_eq!(stats, DispatchStats { delivered: 3, failed: 1, dropped: 0 });
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn items_pushed_while_running_are_drained_before_exit() {
        let (tx, rx) = bounded("jobs", 8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn(rx, Recorder { seen: Arc::clone(&seen) });

        for id in 0..5 {
            tx.push(Job {
                id,
                delay_ms: 2,
                fail: false,
            });
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.delivered, 5);
        assert_eq!(seen.lock().unwrap().len(), 5);
    }
}
