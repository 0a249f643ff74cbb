//! Top-level error type. Leaf modules define their own narrow error enum,
//! and this one composes them with `#[from]` for anything that crosses the
//! `Engine` boundary.

use thiserror::Error;

pub use crate::backend::replica::Error as ReplicaError;
pub use crate::backend::retry::Error as RetryError;
pub use crate::request::ParseError;

/// Errors the routing/fan-out/retry core surfaces to its caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed write or query request.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Transport, backend or decode failure talking to a replica.
    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),

    /// The retry buffer rejected an enqueue.
    #[error("retry error: {0}")]
    Retry(#[from] RetryError),

    /// No shard/grid configured at all.
    #[error("no shards configured")]
    NoShards,

    /// A statement's keyword did not match any dispatch policy.
    #[error("invalid query: unrecognized statement kind")]
    InvalidQuery,
}
