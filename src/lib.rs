//! Routing, fan-out and retry engine for a sharded InfluxDB v1 / InfluxQL proxy.
//!
//! A weighted shard grid, a two-level node hierarchy (shard -> replicas),
//! concurrent write fan-out, per-statement query dispatch, a pluggable load
//! balancer and a bounded in-memory retry buffer. The HTTP listener, request
//! decoding/encoding and Prometheus translation layer are external
//! collaborators and live outside this crate.

pub mod backend;
pub mod config;
pub mod error;
pub mod hashing;
pub mod request;
pub mod stats;

pub use backend::engine::Engine;
pub use config::core::Config;
pub use error::Error;
pub use request::{Point, QueryRequest, Response, StatementResult, WriteRequest};
pub use stats::Stats;

/// Initialize a `tracing` subscriber for tests. Safe to call more than once.
#[cfg(test)]
pub(crate) fn logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
