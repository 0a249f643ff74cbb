//! One logical shard: one or more replicas, fanned out to on write and
//! load-balanced across on read.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::config::database::ShardConfig;
use crate::hashing::crc32_ieee;
use crate::request::{QueryRequest, StatementResult, WriteRequest};
use crate::stats::RetryStats;

use super::lb::{Picker, RoundRobinPicker};
use super::node::Node;
use super::replica::ReplicaNode;

/// A logical shard backed by one or more replicas.
#[derive(Debug)]
pub struct ShardNode {
    id: u64,
    name: String,
    weight: usize,
    replicas: Vec<Arc<dyn Node>>,
    picker: RoundRobinPicker,
}

impl ShardNode {
    /// Build a shard from config. Panics if the replica list is empty: a
    /// shard with no replicas is a configuration error, not a recoverable
    /// runtime state.
    ///
    /// `stats` is the process-wide retry registry, forwarded to every
    /// retry-wrapped replica this shard builds.
    pub fn new(config: &ShardConfig, stats: &Arc<RetryStats>) -> Self {
        assert!(
            !config.replicas.is_empty(),
            "shard {:?} doesn't have any replica node",
            config.name
        );

        let replicas: Vec<Arc<dyn Node>> = config
            .replicas
            .iter()
            .map(|r| ReplicaNode::build(r, stats))
            .collect();

        let flag_string: String = config
            .replicas
            .iter()
            .map(|r| r.address.as_str())
            .collect::<Vec<_>>()
            .join("");
        let id = crc32_ieee(flag_string.as_bytes()) as u64;

        let picker = RoundRobinPicker::new(replicas.clone());

        Self {
            id,
            name: config.name.clone(),
            weight: config.weight(),
            replicas,
            picker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replicas(&self) -> &[Arc<dyn Node>] {
        &self.replicas
    }
}

#[async_trait]
impl Node for ShardNode {
    fn id(&self) -> u64 {
        self.id
    }

    /// First healthy replica wins; sequential.
    async fn ping(&self) -> Result<(), crate::error::Error> {
        let mut last_err = None;
        for replica in &self.replicas {
            match replica.ping().await {
                Ok(()) => return Ok(()),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.expect("shard must have at least one replica"))
    }

    /// Load-balance across replicas via the picker.
    async fn query(&self, q: &QueryRequest) -> Result<StatementResult, crate::error::Error> {
        self.picker.pick().query(q).await
    }

    /// Sequential iteration, returning on the first transport error or the
    /// first per-result embedded error. DDL-like statements that must
    /// succeed everywhere.
    async fn query_each(&self, q: &QueryRequest) -> Result<StatementResult, crate::error::Error> {
        let mut result = StatementResult::default();
        for replica in &self.replicas {
            result = replica.query(q).await?;
            if result.error.is_some() {
                return Ok(result);
            }
        }
        Ok(result)
    }

    /// Concurrent fan-out, one task per replica; last error wins, nil if all
    /// succeeded. Write-all best-effort, no durable consensus.
    async fn write_points(&self, wr: &WriteRequest) -> Result<(), crate::error::Error> {
        let tasks = self.replicas.iter().map(|replica| {
            let replica = replica.clone();
            let wr = wr.clone();
            async move { replica.write_points(&wr).await }
        });

        let results = join_all(tasks).await;
        let mut last_err = None;
        for result in results {
            if let Err(err) = result {
                debug!(%err, "replica write failed");
                last_err = Some(err);
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn shutdown(&self) {
        for replica in &self.replicas {
            replica.shutdown();
        }
    }

    fn weight(&self) -> usize {
        self.weight
    }
}
