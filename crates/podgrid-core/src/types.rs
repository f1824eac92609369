//! Domain types for the podgrid control plane.
//!
//! These types are the node repository's view of the fleet: which
//! application owns a node, where the node sits within its cluster, and
//! which containers a host should be running. All types serialize to/from
//! JSON for transport and debug snapshots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hostname of a node or container host.
pub type Hostname = String;

/// Node flavor name (hardware/resource profile), e.g. `"d-2-8-50"`.
pub type Flavor = String;

// ── Identifiers ────────────────────────────────────────────────────

/// Identifies an application deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a cluster within an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Node lifecycle ─────────────────────────────────────────────────

/// Lifecycle state of a node in the node repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Active,
    Inactive,
    Reserved,
    Provisioned,
    Failed,
    Parked,
    Dirty,
    Ready,
}

// ── Cluster layout ─────────────────────────────────────────────────

/// Kind of cluster a node serves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    Container,
    Content,
    Admin,
}

/// A shard of a cluster.
///
/// Carried on the wire as its decimal string form. Generated layouts use
/// contiguous groups starting from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Group(u32);

impl Group {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid group '{0}': expected a non-negative integer")]
pub struct GroupParseError(String);

impl FromStr for Group {
    type Err = GroupParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(Group)
            .map_err(|_| GroupParseError(s.to_string()))
    }
}

impl From<Group> for String {
    fn from(group: Group) -> Self {
        group.to_string()
    }
}

impl TryFrom<String> for Group {
    type Error = GroupParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identity of a cluster, optionally narrowed to one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: ClusterId,
    pub cluster_type: ClusterType,
    pub group: Option<Group>,
}

impl ClusterSpec {
    pub fn new(id: ClusterId, cluster_type: ClusterType) -> Self {
        Self {
            id,
            cluster_type,
            group: None,
        }
    }

    /// The same cluster narrowed to the given group.
    pub fn with_group(&self, group: Group) -> Self {
        Self {
            group: Some(group),
            ..self.clone()
        }
    }
}

/// A node's place within a cluster: the cluster (and group) it belongs
/// to plus its per-cluster ordinal.
///
/// Within one application/cluster the index is unique across all active
/// and failed members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMembership {
    pub cluster: ClusterSpec,
    pub index: u32,
}

// ── Allocation ─────────────────────────────────────────────────────

/// Binding of a node to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub application: ApplicationId,
    pub membership: ClusterMembership,
    /// Whether the node can be removed without retiring it first.
    pub removable: bool,
    /// When the application retired this node, in epoch seconds.
    pub retired_at: Option<u64>,
}

impl Allocation {
    pub fn new(application: ApplicationId, membership: ClusterMembership) -> Self {
        Self {
            application,
            membership,
            removable: false,
            retired_at: None,
        }
    }

    pub fn removable(mut self) -> Self {
        self.removable = true;
        self
    }
}

/// A node as stored in the node repository.
///
/// Node identity is its hostname: equality and hashing compare the
/// hostname only, so updated copies of a node replace the original in
/// set-like collections.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: Hostname,
    pub flavor: Flavor,
    pub state: NodeState,
    pub allocation: Option<Allocation>,
}

impl Node {
    pub fn new(hostname: impl Into<String>, flavor: impl Into<String>, state: NodeState) -> Self {
        Self {
            hostname: hostname.into(),
            flavor: flavor.into(),
            state,
            allocation: None,
        }
    }

    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = Some(allocation);
        self
    }

    /// A copy of this node retired at the given time.
    ///
    /// Unallocated nodes have nothing to retire and are returned as-is.
    pub fn retired(&self, now_epoch_secs: u64) -> Self {
        let mut node = self.clone();
        if let Some(allocation) = node.allocation.as_mut() {
            allocation.retired_at = Some(now_epoch_secs);
        }
        node
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.hostname == other.hostname
    }
}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hostname.hash(state);
    }
}

// ── Container specs ────────────────────────────────────────────────

/// The node repository's description of one container a host should run.
///
/// The host agent only interprets `hostname` and `node_state`; the rest
/// rides along to the node-admin driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub hostname: Hostname,
    pub node_state: NodeState,
    pub wanted_image: Option<String>,
    pub flavor: Option<Flavor>,
}

impl ContainerSpec {
    pub fn new(hostname: impl Into<String>, node_state: NodeState) -> Self {
        Self {
            hostname: hostname.into(),
            node_state,
            wanted_image: None,
            flavor: None,
        }
    }
}
