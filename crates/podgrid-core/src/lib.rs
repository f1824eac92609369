//! podgrid-core — shared domain model and configuration.
//!
//! Everything the podgrid crates agree on lives here: the node
//! repository's node/allocation/cluster model, the container specs a host
//! agent consumes, and agent configuration loading.

pub mod config;
pub mod types;

pub use config::{parse_duration, AgentConfig, DEFAULT_TICK_INTERVAL};
pub use types::{
    Allocation, ApplicationId, ClusterId, ClusterMembership, ClusterSpec, ClusterType,
    ContainerSpec, Flavor, Group, GroupParseError, Hostname, Node, NodeState,
};
