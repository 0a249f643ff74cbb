//! Top-level dispatcher: shard-maps writes, dispatches statements by kind.

use std::collections::HashMap;
use std::sync::Arc;

use fnv::FnvHashMap;
use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::hashing::fnv1a_64;
use crate::request::{
    Point, QueryRequest, Response, Series, StatementKind, StatementResult, WriteRequest,
};
use crate::stats::Stats;

use super::grid::Grid;
use super::lb::{Picker, RoundRobinPicker};
use super::node::Node;
use super::shard::ShardNode;

/// Routes writes and queries across a weighted grid of shards.
#[derive(Debug)]
pub struct Engine {
    shards: Vec<Arc<ShardNode>>,
    grid: Grid,
    /// Picks one shard for cluster-wide metadata reads ("SHOW DATABASES" etc).
    metadata_picker: RoundRobinPicker,
    /// Process-wide retry counters, shared by every retry-wrapped replica
    /// this engine built.
    stats: Stats,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self, Error> {
        if config.shards.is_empty() {
            return Err(Error::NoShards);
        }

        let stats = Stats::new();
        let shards: Vec<Arc<ShardNode>> = config
            .shards
            .iter()
            .map(|shard_config| Arc::new(ShardNode::new(shard_config, stats.retry())))
            .collect();

        debug!(shards = shards.len(), grid_size = config.grid_size, "engine initialized");

        let grid = Grid::new(&shards, config.grid_size);
        let metadata_nodes: Vec<Arc<dyn Node>> = shards
            .iter()
            .map(|s| s.clone() as Arc<dyn Node>)
            .collect();
        let metadata_picker = RoundRobinPicker::new(metadata_nodes);

        Ok(Self {
            shards,
            grid,
            metadata_picker,
            stats,
        })
    }

    pub fn shards(&self) -> &[Arc<ShardNode>] {
        &self.shards
    }

    /// Process-wide retry-buffer metrics, for the external metrics surface
    /// to register and scrape.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn shard_for_point(&self, point: &Point) -> Arc<ShardNode> {
        self.grid.shard_for(fnv1a_64(point.name().as_bytes()))
    }

    fn shard_for_source(&self, source: &str) -> Arc<ShardNode> {
        self.grid.shard_for(fnv1a_64(source.as_bytes()))
    }

    /// Write a batch of points. A single configured shard skips hashing
    /// entirely; otherwise each point is hashed by measurement name, grouped
    /// by shard, and the groups are written concurrently.
    pub async fn write(&self, wr: WriteRequest) -> Result<(), Error> {
        if self.shards.len() == 1 {
            return self.shards[0].write_points(&wr).await;
        }

        let mut groups: FnvHashMap<u64, (Arc<ShardNode>, Vec<Point>)> = FnvHashMap::default();
        for point in wr.points.iter().cloned() {
            let shard = self.shard_for_point(&point);
            groups
                .entry(shard.id())
                .or_insert_with(|| (shard.clone(), Vec::new()))
                .1
                .push(point);
        }

        let tasks = groups.into_values().map(|(shard, points)| {
            let group_wr = wr.with_points(points);
            async move { shard.write_points(&group_wr).await }
        });

        let results = futures::future::join_all(tasks).await;
        let mut last_err = None;
        for result in results {
            if let Err(err) = result {
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Process statements one at a time, in input order, applying the
    /// dispatch policy per statement kind; short-circuits on the first error.
    pub async fn query(&self, qr: QueryRequest) -> Response {
        let mut results = Vec::with_capacity(qr.statements.len());

        for index in 0..qr.statements.len() {
            let statement_query = qr.single_statement(index);
            let kind = statement_query.statements[0].kind;

            let result = match kind {
                Some(StatementKind::Select) => self.dispatch_select(&statement_query).await,
                Some(StatementKind::EachNode) => self.dispatch_each_node(&statement_query).await,
                Some(StatementKind::OneNode) => self.dispatch_one_node(&statement_query).await,
                Some(StatementKind::MergeValues) => self.dispatch_merge_values(&statement_query).await,
                Some(StatementKind::MergeSeries) => self.dispatch_merge_series(&statement_query).await,
                None => Err(Error::InvalidQuery),
            };

            match result {
                Ok(result) => results.push(result),
                Err(err) => {
                    return Response {
                        results: Vec::new(),
                        error: Some(err.to_string()),
                    }
                }
            }
        }

        Response {
            results,
            error: None,
        }
    }

    /// SELECT: hash the FROM-clause source text, route to one shard.
    async fn dispatch_select(&self, qr: &QueryRequest) -> Result<StatementResult, Error> {
        let source = qr.statements[0]
            .source
            .as_deref()
            .ok_or(Error::InvalidQuery)?;
        let shard = self.shard_for_source(source);
        shard.query(qr).await
    }

    /// DDL/DML/user/retention/etc: every shard, every replica, abort on first error.
    async fn dispatch_each_node(&self, qr: &QueryRequest) -> Result<StatementResult, Error> {
        let mut result = StatementResult::default();
        for shard in &self.shards {
            result = shard.query_each(qr).await?;
        }
        Ok(result)
    }

    /// Cluster-wide config reads: any one shard, picked round-robin.
    async fn dispatch_one_node(&self, qr: &QueryRequest) -> Result<StatementResult, Error> {
        self.metadata_picker.pick().query(qr).await
    }

    /// SHOW MEASUREMENTS: concatenate each shard's first series' `values`,
    /// keeping the first shard's `name`/`columns`.
    async fn dispatch_merge_values(&self, qr: &QueryRequest) -> Result<StatementResult, Error> {
        let mut merged: Option<Series> = None;
        for shard in &self.shards {
            let result = shard.query(qr).await?;
            let Some(series) = result.series.into_iter().next() else {
                continue;
            };
            match merged.as_mut() {
                Some(existing) => existing.values.extend(series.values),
                None => merged = Some(series),
            }
        }

        Ok(StatementResult {
            statement_id: 0,
            series: merged.into_iter().collect(),
            error: None,
        })
    }

    /// SHOW DIAGNOSTICS / TAG KEYS / TAG VALUES: concatenate every shard's series list.
    async fn dispatch_merge_series(&self, qr: &QueryRequest) -> Result<StatementResult, Error> {
        let mut series = Vec::new();
        for shard in &self.shards {
            let result = shard.query(qr).await?;
            series.extend(result.series);
        }
        Ok(StatementResult {
            statement_id: 0,
            series,
            error: None,
        })
    }

    pub fn shutdown(&self) {
        for shard in &self.shards {
            shard.shutdown();
        }
    }
}

/// Groups points by the `ShardNode` that owns them.
#[derive(Debug, Default)]
pub struct ShardMapping {
    points: HashMap<u64, Vec<Point>>,
    nodes: HashMap<u64, Arc<ShardNode>>,
}

impl ShardMapping {
    pub fn map_point(&mut self, shard: Arc<ShardNode>, point: Point) {
        self.points.entry(shard.id()).or_default().push(point);
        self.nodes.entry(shard.id()).or_insert(shard);
    }

    pub fn points(&self) -> &HashMap<u64, Vec<Point>> {
        &self.points
    }

    pub fn nodes(&self) -> &HashMap<u64, Arc<ShardNode>> {
        &self.nodes
    }
}
