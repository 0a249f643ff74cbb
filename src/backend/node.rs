//! The polymorphic `Node` capability: implemented by `ReplicaNode`,
//! `RetryNode` (decorating a `ReplicaNode`) and `ShardNode` (grouping either).

use async_trait::async_trait;

use crate::error::Error;
use crate::request::{QueryRequest, StatementResult, WriteRequest};

/// Anything the routing core can ping, query, write to and shut down.
///
/// A trait is used here because `ShardNode` genuinely wraps a heterogeneous
/// mix of bare and retry-wrapped replicas, and the only place that needs to
/// know which is `RetryNode`'s own constructor: a decorator over a trait
/// object, not a tagged enum.
#[async_trait]
pub trait Node: Send + Sync + std::fmt::Debug {
    /// Stable id used as a `ShardMapping` key. Uniqueness across nodes is the
    /// only requirement: it is not a content hash.
    fn id(&self) -> u64;

    async fn ping(&self) -> Result<(), Error>;

    /// Balance a read across replicas (`ShardNode`) or query the one replica
    /// a `ReplicaNode`/`RetryNode` has.
    async fn query(&self, q: &QueryRequest) -> Result<StatementResult, Error>;

    /// Sequential iteration over every replica, short-circuiting on the first
    /// error. Used for DDL-like statements that must land on every replica.
    async fn query_each(&self, q: &QueryRequest) -> Result<StatementResult, Error>;

    async fn write_points(&self, wr: &WriteRequest) -> Result<(), Error>;

    fn shutdown(&self);

    /// Placement weight; `ReplicaNode` is always 1 (weight lives on the
    /// shard), `ShardNode` carries its configured weight.
    fn weight(&self) -> usize;
}
