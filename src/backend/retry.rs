//! Decorates a [`ReplicaNode`] with a bounded buffer and a backoff worker so a
//! transiently-failing replica looks durable to callers, within a memory
//! budget.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{error, warn};

use crate::request::{QueryRequest, StatementResult, WriteRequest};
use crate::stats::RetryStats;

use super::node::Node;
use super::replica::ReplicaNode;

const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const MULTIPLIER: u32 = 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("buffer full")]
    BufferFull,
}

/// Bounded FIFO of pending `WriteRequest`s.
///
/// A mutex plus `tokio::sync::Notify` stands in for a condition variable;
/// `pop` loops on `notified()` to tolerate spurious wakeups exactly as a
/// condvar wait loop would.
#[derive(Debug)]
struct BufferList {
    queue: Mutex<VecDeque<WriteRequest>>,
    size: AtomicUsize,
    max_size: usize,
    notify: Notify,
    stats: Arc<RetryStats>,
}

impl BufferList {
    fn new(max_size: usize, stats: Arc<RetryStats>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            size: AtomicUsize::new(0),
            max_size,
            notify: Notify::new(),
            stats,
        }
    }

    fn add(&self, wr: WriteRequest) -> Result<(), Error> {
        let mut queue = self.queue.lock();
        let current = self.size.load(Ordering::Relaxed);
        if current + wr.size() > self.max_size {
            return Err(Error::BufferFull);
        }
        self.size.fetch_add(wr.size(), Ordering::Relaxed);
        self.stats.on_enqueue(wr.size());
        queue.push_back(wr);
        drop(queue);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> WriteRequest {
        loop {
            {
                let mut queue = self.queue.lock();
                if let Some(wr) = queue.pop_front() {
                    self.size.fetch_sub(wr.size(), Ordering::Relaxed);
                    self.stats.on_dequeue(wr.size());
                    return wr;
                }
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[cfg(test)]
    fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}

/// Asynchronously-durable wrapper around a [`ReplicaNode`].
#[derive(Debug)]
pub struct RetryNode {
    replica: Arc<ReplicaNode>,
    buffer: Arc<BufferList>,
}

impl RetryNode {
    /// Wrap `replica`, start its retry worker, and return it as a `Node`.
    pub fn new(replica: ReplicaNode, max_size: usize, max_interval: Duration) -> Arc<dyn Node> {
        Self::new_with_stats(replica, max_size, max_interval, RetryStats::new())
    }

    pub fn new_with_stats(
        replica: ReplicaNode,
        max_size: usize,
        max_interval: Duration,
        stats: Arc<RetryStats>,
    ) -> Arc<dyn Node> {
        let replica = Arc::new(replica);
        let buffer = Arc::new(BufferList::new(max_size, stats));

        let worker_replica = replica.clone();
        let worker_buffer = buffer.clone();
        tokio::spawn(async move {
            Self::run(worker_replica, worker_buffer, max_interval).await;
        });

        Arc::new(Self { replica, buffer })
    }

    /// Pop, retry with exponential backoff until it lands, repeat. The
    /// interval is local to every fresh pop: it always restarts at
    /// `INITIAL_INTERVAL`.
    async fn run(replica: Arc<ReplicaNode>, buffer: Arc<BufferList>, max_interval: Duration) {
        loop {
            let wr = buffer.pop().await;
            let mut interval = INITIAL_INTERVAL;
            loop {
                match replica.write_points(&wr).await {
                    Ok(()) => break,
                    Err(err) => {
                        warn!(%err, "retry worker: write failed, backing off");
                        tokio::time::sleep(interval).await;
                        interval = (interval * MULTIPLIER).min(max_interval);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Node for RetryNode {
    fn id(&self) -> u64 {
        self.replica.id()
    }

    async fn ping(&self) -> Result<(), crate::error::Error> {
        self.replica.ping().await
    }

    async fn query(&self, q: &QueryRequest) -> Result<StatementResult, crate::error::Error> {
        self.replica.query(q).await
    }

    async fn query_each(&self, q: &QueryRequest) -> Result<StatementResult, crate::error::Error> {
        self.replica.query_each(q).await
    }

    /// Try the underlying replica synchronously; on failure, hand the write
    /// to the retry buffer and tell the caller it succeeded anyway.
    ///
    /// This is intentional at-most-once, best-effort delivery with a bounded
    /// delay budget: the caller's only window into trouble is the retry
    /// gauges, not this return value. A questionable design, but one callers
    /// have come to rely on, so it's preserved here rather than corrected.
    async fn write_points(&self, wr: &WriteRequest) -> Result<(), crate::error::Error> {
        match self.replica.write_points(wr).await {
            Ok(()) => Ok(()),
            Err(_) => {
                if let Err(Error::BufferFull) = self.buffer.add(wr.clone()) {
                    self.buffer.stats.on_drop();
                    error!(
                        database = %wr.database,
                        size = wr.size(),
                        "retry buffer full, dropping write"
                    );
                }
                Ok(())
            }
        }
    }

    fn shutdown(&self) {
        self.replica.shutdown();
    }

    fn weight(&self) -> usize {
        self.replica.weight()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::WriteRequest;

    fn write_request(size_bytes: usize) -> WriteRequest {
        WriteRequest::new(vec![], "db", "", "", size_bytes)
    }

    #[test]
    fn add_rejects_when_full() {
        let stats = RetryStats::new();
        let buffer = BufferList::new(1024, stats);
        buffer.add(write_request(800)).unwrap();
        let err = buffer.add(write_request(800)).unwrap_err();
        assert_eq!(err, Error::BufferFull);
        assert_eq!(buffer.size(), 800);
    }

    #[test]
    fn size_tracks_contents() {
        let stats = RetryStats::new();
        let buffer = BufferList::new(1024, stats);
        assert_eq!(buffer.size(), 0);
        buffer.add(write_request(100)).unwrap();
        assert_eq!(buffer.size(), 100);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn pop_returns_fifo_order() {
        crate::logger();
        let stats = RetryStats::new();
        let buffer = Arc::new(BufferList::new(4096, stats));

        let mut first = write_request(10);
        first.database = "first".into();
        let mut second = write_request(10);
        second.database = "second".into();

        buffer.add(first).unwrap();
        buffer.add(second).unwrap();

        let popped_first = buffer.pop().await;
        let popped_second = buffer.pop().await;
        assert_eq!(popped_first.database, "first");
        assert_eq!(popped_second.database, "second");
    }

    #[tokio::test]
    async fn pop_blocks_until_entry_available() {
        crate::logger();
        let stats = RetryStats::new();
        let buffer = Arc::new(BufferList::new(4096, stats));
        let popper = buffer.clone();

        let handle = tokio::spawn(async move { popper.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        buffer.add(write_request(5)).unwrap();
        let wr = handle.await.unwrap();
        assert_eq!(wr.size(), 5);
    }
}
