//! Weighted placement table mapping hash slots to shards.

use std::sync::Arc;

use super::node::Node;
use super::shard::ShardNode;

/// A fixed-length sequence of shard references. Slot `i` holds the shard that
/// owns hash-slot `i`. Immutable after construction.
#[derive(Debug)]
pub struct Grid {
    slots: Vec<Arc<ShardNode>>,
}

impl Grid {
    /// Fill `size` slots round-robin over `shards`, each shard claiming
    /// `weight()` consecutive slots per pass, repeating until the grid is
    /// full. Gives each shard a placement frequency proportional to its
    /// weight with a deterministic layout.
    pub fn new(shards: &[Arc<ShardNode>], size: usize) -> Self {
        assert!(!shards.is_empty(), "grid requires at least one shard");

        let mut slots = Vec::with_capacity(size);
        'fill: loop {
            for shard in shards {
                for _ in 0..shard.weight() {
                    slots.push(shard.clone());
                    if slots.len() >= size {
                        break 'fill;
                    }
                }
            }
        }

        Self { slots }
    }

    /// Look up the shard owning `hash`.
    pub fn shard_for(&self, hash: u64) -> Arc<ShardNode> {
        let index = (hash % self.slots.len() as u64) as usize;
        self.slots[index].clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::node::Node;
    use crate::config::database::{ReplicaConfig, ShardConfig};
    use crate::stats::RetryStats;
    use std::collections::HashMap;
    use std::time::Duration;
    use url::Url;

    fn shard_with_weight(name: &str, weight: usize) -> Arc<ShardNode> {
        let config = ShardConfig {
            name: name.into(),
            weight,
            replicas: vec![ReplicaConfig {
                address: Url::parse("http://127.0.0.1:1").unwrap(),
                username: None,
                password: None,
                buffer_size_mb: 0,
                max_delay_interval: Duration::from_secs(10),
            }],
        };
        Arc::new(ShardNode::new(&config, &RetryStats::new()))
    }

    #[tokio::test]
    async fn weighting_matches_configured_proportions() {
        crate::logger();
        let shards = vec![shard_with_weight("a", 1), shard_with_weight("b", 3)];
        let grid = Grid::new(&shards, 100);

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for i in 0..grid.len() {
            *counts.entry(grid.shard_for(i as u64).id()).or_insert(0) += 1;
        }

        let total_weight = 4;
        for shard in &shards {
            let count = counts[&shard.id()];
            let expected = 100 * shard.weight() / total_weight;
            assert!(
                count == expected || count == expected + 1,
                "shard {} got {} slots, expected ~{}",
                shard.name(),
                count,
                expected
            );
        }
    }

    #[tokio::test]
    async fn equal_weight_shards_split_evenly() {
        crate::logger();
        let shards = vec![shard_with_weight("a", 1), shard_with_weight("b", 1)];
        let grid = Grid::new(&shards, 100);

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for i in 0..grid.len() {
            *counts.entry(grid.shard_for(i as u64).id()).or_insert(0) += 1;
        }
        for shard in &shards {
            let count = counts[&shard.id()];
            assert!(count == 50, "expected 50 got {count}");
        }
    }

    #[tokio::test]
    async fn routing_is_deterministic_across_calls() {
        crate::logger();
        let shards = vec![shard_with_weight("a", 1), shard_with_weight("b", 1)];
        let grid = Grid::new(&shards, 100);
        let hash = crate::hashing::fnv1a_64(b"weather");
        assert_eq!(grid.shard_for(hash).id(), grid.shard_for(hash).id());
    }
}
