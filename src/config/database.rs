use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

fn default_max_delay_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_weight() -> usize {
    1
}

/// One backend endpoint inside a shard.
///
/// `buffer_size_mb > 0` causes [`crate::backend::replica::ReplicaNode::build`] to
/// wrap the replica in a [`crate::backend::retry::RetryNode`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReplicaConfig {
    pub address: Url,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub buffer_size_mb: usize,
    #[serde(default = "default_max_delay_interval", with = "humantime_serde")]
    pub max_delay_interval: Duration,
}

/// One logical shard: a name, a placement weight and its replica set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ShardConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: usize,
    pub replicas: Vec<ReplicaConfig>,
}

impl ShardConfig {
    /// Weight, normalized: 0 (absent from a hand-written config) means 1.
    pub fn weight(&self) -> usize {
        if self.weight == 0 {
            1
        } else {
            self.weight
        }
    }
}
