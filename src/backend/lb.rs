//! Pluggable load balancer. Only round-robin is implemented; the `Picker`
//! trait leaves room for a weighted or least-loaded variant later.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::node::Node;

/// Selects one node from a fixed set on each call.
pub trait Picker: Send + Sync + std::fmt::Debug {
    fn pick(&self) -> Arc<dyn Node>;
}

/// Round-robin over a node list: an atomic index, advanced modulo the list
/// length on every pick. O(1), thread-safe under contention.
#[derive(Debug)]
pub struct RoundRobinPicker {
    nodes: Vec<Arc<dyn Node>>,
    next: AtomicUsize,
}

impl RoundRobinPicker {
    pub fn new(nodes: Vec<Arc<dyn Node>>) -> Self {
        Self {
            nodes,
            next: AtomicUsize::new(0),
        }
    }
}

impl Picker for RoundRobinPicker {
    fn pick(&self) -> Arc<dyn Node> {
        let len = self.nodes.len();
        let index = self.next.fetch_add(1, Ordering::Relaxed) % len;
        self.nodes[index].clone()
    }
}
