//! One backend endpoint reachable by URL with optional basic-auth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::database::ReplicaConfig;
use crate::hashing::crc32_ieee;
use crate::request::{QueryRequest, Response, StatementResult, WriteRequest};
use crate::stats::RetryStats;

use super::node::Node;
use super::retry::RetryNode;

const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const MAX_IDLE_CONNS_PER_HOST: usize = 100;
const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);

/// Errors talking HTTP to a replica.
#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("status code {0}")]
    Status(u16),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("unable to decode json: received status code {status} err: {err}")]
    Decode { status: u16, err: String },
    #[error("{0}")]
    Result(String),
    #[error("invalid replica url: {0}")]
    InvalidUrl(String),
}

/// A small pool of reusable line-protocol serialization buffers, so repeated
/// writes reuse an already-grown `String`'s capacity instead of allocating
/// and growing a fresh one every call.
#[derive(Debug, Default)]
struct BufferPool {
    buffers: Mutex<Vec<String>>,
}

impl BufferPool {
    fn get(&self) -> String {
        self.buffers.lock().pop().unwrap_or_default()
    }

    fn put(&self, mut buf: String) {
        buf.clear();
        self.buffers.lock().push(buf);
    }
}

/// A buffer checked out of a `BufferPool`, returned to it (cleared) on drop.
/// Routing the return through `Drop` rather than an explicit call at the end
/// of `write_points` means it happens on every exit path, including an early
/// `?` return from a serialization error.
struct PooledBuffer<'a> {
    buf: String,
    pool: &'a BufferPool,
}

impl std::ops::Deref for PooledBuffer<'_> {
    type Target = String;

    fn deref(&self) -> &String {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}

/// One InfluxDB v1 backend process.
#[derive(Debug)]
pub struct ReplicaNode {
    id: u64,
    client: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    alive: AtomicBool,
    write_buffers: BufferPool,
}

impl ReplicaNode {
    /// Build a `Node` from config: a bare `ReplicaNode`, or a `RetryNode`
    /// wrapping one when `buffer_size_mb > 0`.
    ///
    /// Pinging a freshly built bare replica is non-fatal to construction:
    /// it only updates the liveness flag in the background, logging and
    /// continuing on a failed startup ping rather than refusing to start.
    ///
    /// `stats` is the process-wide retry registry; every `RetryNode` built
    /// from a given `Engine` shares the same counters.
    pub fn build(config: &ReplicaConfig, stats: &Arc<RetryStats>) -> Arc<dyn Node> {
        let client = reqwest::Client::builder()
            .connect_timeout(DIAL_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
            .pool_idle_timeout(IDLE_CONN_TIMEOUT)
            .build()
            .expect("failed to build HTTP client for replica");

        let id = crc32_ieee(config.address.host_str().unwrap_or_default().as_bytes()) as u64;

        let replica = Self {
            id,
            client,
            base_url: config.address.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            alive: AtomicBool::new(false),
            write_buffers: BufferPool::default(),
        };

        if config.buffer_size_mb > 0 {
            info!(replica = %replica.base_url, "replica node is retry-buffered");
            let max_size = config.buffer_size_mb * 1024 * 1024;
            RetryNode::new_with_stats(replica, max_size, config.max_delay_interval, stats.clone())
        } else {
            let replica = Arc::new(replica);
            let spawned = replica.clone();
            tokio::spawn(async move {
                if let Err(err) = spawned.ping().await {
                    warn!(replica = %spawned.base_url, %err, "initial ping failed");
                }
            });
            replica
        }
    }

    fn url_with_path(&self, segment: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .expect("replica base url must be able to be a base");
            segments.pop_if_empty();
            segments.push(segment);
        }
        url
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }
}

#[async_trait]
impl Node for ReplicaNode {
    fn id(&self) -> u64 {
        self.id
    }

    async fn ping(&self) -> Result<(), crate::error::Error> {
        let url = self.url_with_path("ping");
        let req = self.apply_auth(self.client.get(url));
        let result = async {
            let resp = req.send().await.map_err(|e| Error::Transport(e.to_string()))?;
            if resp.status().as_u16() == 204 {
                Ok(())
            } else {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::Backend(body))
            }
        }
        .await;

        self.alive.store(result.is_ok(), Ordering::Relaxed);
        result.map_err(Into::into)
    }

    async fn query(&self, q: &QueryRequest) -> Result<StatementResult, crate::error::Error> {
        let stmt = &q.statements[0];
        let mut url = self.url_with_path("query");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &stmt.text);
            pairs.append_pair("db", &q.database);
            if !q.precision.is_empty() {
                pairs.append_pair("epoch", &q.precision);
            }
        }

        let req = self.apply_auth(self.client.post(url));
        let resp = req.send().await.map_err(|e| Error::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| Error::Transport(e.to_string()))?;

        let decoded: Result<Response, _> = serde_json::from_str(&body);
        debug!(status, "query response decoded");

        let response = match decoded {
            Ok(response) => response,
            Err(_) if body.is_empty() && status != 200 => {
                return Err(Error::Status(status).into());
            }
            Err(err) => return Err(Error::Decode { status, err: err.to_string() }.into()),
        };

        if status != 200 && response.error.is_none() {
            return Err(Error::Status(status).into());
        }
        if let Some(err) = response.error {
            return Err(Error::Result(err).into());
        }
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Result("no results in response".into()).into())
    }

    async fn query_each(&self, q: &QueryRequest) -> Result<StatementResult, crate::error::Error> {
        // A single replica has exactly one instance to query.
        self.query(q).await
    }

    async fn write_points(&self, wr: &WriteRequest) -> Result<(), crate::error::Error> {
        let mut body = PooledBuffer {
            buf: self.write_buffers.get(),
            pool: &self.write_buffers,
        };
        for point in &wr.points {
            body.push_str(&point.precision_string(&wr.precision)?);
            body.push('\n');
        }

        let mut url = self.url_with_path("write");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("db", &wr.database);
            pairs.append_pair("rp", &wr.retention_policy);
            pairs.append_pair("precision", &wr.precision);
        }

        let req = self.apply_auth(self.client.post(url).body(body.clone()));
        let resp = req.send().await.map_err(|e| Error::Transport(e.to_string()))?;
        let status = resp.status().as_u16();

        if status == 200 || status == 204 {
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(Error::Backend(text).into())
        }
    }

    fn shutdown(&self) {
        // reqwest's connection pool drains idle connections on drop; there is
        // no public "close now" handle to call eagerly here.
    }

    fn weight(&self) -> usize {
        1
    }
}
