//! Retry-buffer gauges: `retry_request_count` and `retry_buffer_size`, plus
//! `retry_dropped_count`, an additive counter that tracks buffer-full drops
//! the gauge alone can't distinguish from a quiet, empty buffer.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use super::open_metric::{Measurement, OpenMetric};

/// Shared, process-wide retry counters. One instance is handed to every
/// `RetryNode`'s `BufferList`; all retry buffers in the process add into the
/// same totals.
#[derive(Debug, Default)]
pub struct RetryStats {
    request_count: AtomicI64,
    buffer_size: AtomicI64,
    dropped_count: AtomicU64,
}

impl RetryStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on_enqueue(&self, size: usize) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.buffer_size.fetch_add(size as i64, Ordering::Relaxed);
    }

    pub(crate) fn on_dequeue(&self, size: usize) {
        self.request_count.fetch_sub(1, Ordering::Relaxed);
        self.buffer_size.fetch_sub(size as i64, Ordering::Relaxed);
    }

    pub(crate) fn on_drop(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> i64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> i64 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }
}

impl OpenMetric for RetryStats {
    fn name(&self) -> &str {
        "retry_buffer"
    }

    fn help(&self) -> &str {
        "Pending retry-buffer writes and their total size in bytes"
    }

    fn measurements(&self) -> Vec<Measurement> {
        vec![
            Measurement {
                labels: vec![("metric".into(), "retry_request_count".into())],
                value: self.request_count() as f64,
            },
            Measurement {
                labels: vec![("metric".into(), "retry_buffer_size".into())],
                value: self.buffer_size() as f64,
            },
            Measurement {
                labels: vec![("metric".into(), "retry_dropped_count".into())],
                value: self.dropped_count() as f64,
            },
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enqueue_and_dequeue_balance() {
        let stats = RetryStats::new();
        stats.on_enqueue(800);
        assert_eq!(stats.buffer_size(), 800);
        assert_eq!(stats.request_count(), 1);
        stats.on_dequeue(800);
        assert_eq!(stats.buffer_size(), 0);
        assert_eq!(stats.request_count(), 0);
    }

    #[test]
    fn drop_increments_distinct_counter() {
        let stats = RetryStats::new();
        stats.on_drop();
        stats.on_drop();
        assert_eq!(stats.dropped_count(), 2);
        assert_eq!(stats.buffer_size(), 0);
    }
}
