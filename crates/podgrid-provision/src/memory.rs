//! In-memory node repository.
//!
//! A hashmap-backed [`ProvisionRepository`] with the same capability
//! surface as the real store, used by unit and integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use podgrid_core::{ApplicationId, Hostname, Node, NodeState};

use crate::error::ProvisionResult;
use crate::repository::ProvisionRepository;

/// Thread-safe in-memory repository; clones share the same node map.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvisionRepository {
    nodes: Arc<Mutex<HashMap<Hostname, Node>>>,
}

impl MemoryProvisionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node.
    pub fn put(&self, node: Node) {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes.insert(node.hostname.clone(), node);
    }

    /// Look up a node by hostname.
    pub fn node(&self, hostname: &str) -> Option<Node> {
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes.get(hostname).cloned()
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProvisionRepository for MemoryProvisionRepository {
    fn nodes_of(
        &self,
        application: &ApplicationId,
        states: &[NodeState],
    ) -> ProvisionResult<Vec<Node>> {
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Node> = nodes
            .values()
            .filter(|node| states.contains(&node.state))
            .filter(|node| {
                node.allocation
                    .as_ref()
                    .is_some_and(|allocation| allocation.application == *application)
            })
            .cloned()
            .collect();
        // Stable order for deterministic planning.
        matching.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(matching)
    }

    fn ready_nodes(&self, flavor: &str) -> ProvisionResult<Vec<Node>> {
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Node> = nodes
            .values()
            .filter(|node| node.state == NodeState::Ready)
            .filter(|node| node.allocation.is_none())
            .filter(|node| node.flavor == flavor)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(matching)
    }

    fn reserve(&self, reserved: &[Node]) -> ProvisionResult<()> {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        for node in reserved {
            nodes.insert(node.hostname.clone(), node.clone());
        }
        Ok(())
    }
}
