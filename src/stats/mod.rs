//! Process-wide metrics the core manipulates but does not expose over the
//! wire: a small-atomic-behind-a-registry pattern. The external metrics
//! surface registers `retry_request_count` and `retry_buffer_size` through
//! [`open_metric::OpenMetric`] and scrapes them however it likes (Prometheus
//! text exposition, JSON, etc), this crate never touches HTTP.

pub mod open_metric;
pub mod retry;

use std::sync::Arc;

pub use open_metric::{Measurement, OpenMetric};
pub use retry::RetryStats;

/// Crate-wide metrics registry, handed down to every retry-wrapped replica so
/// all of a process's `RetryNode`s add into the same counters, mirroring the
/// teacher's small-registry-of-atomics pattern (`stats::pools::Pools`).
#[derive(Debug, Clone)]
pub struct Stats {
    retry: Arc<RetryStats>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            retry: RetryStats::new(),
        }
    }

    /// Shared retry-buffer counters, handed to every `RetryNode` built from
    /// this registry.
    pub fn retry(&self) -> &Arc<RetryStats> {
        &self.retry
    }

    /// Every metric family the external metrics surface should scrape.
    pub fn families(&self) -> Vec<&dyn OpenMetric> {
        vec![self.retry.as_ref()]
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cloned_registry_shares_the_same_counters() {
        let stats = Stats::new();
        let cloned = stats.clone();
        stats.retry().on_enqueue(100);
        assert_eq!(cloned.retry().buffer_size(), 100);
    }

    #[test]
    fn families_exposes_the_retry_metric() {
        let stats = Stats::new();
        let families = stats.families();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name(), "retry_buffer");
    }
}
