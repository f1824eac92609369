//! Provisioning error types.

use thiserror::Error;

/// Result type alias for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cannot specify both a particular group and request multiple groups")]
    GroupWithMultipleGroups,

    #[error("requested {nodes} nodes in 0 groups")]
    NoGroups { nodes: u32 },

    #[error(
        "requested {nodes} nodes in {groups} groups, \
         which doesn't allow the nodes to be divided evenly into groups"
    )]
    UnevenGroupSizes { nodes: u32, groups: u32 },

    #[error("out of capacity: {missing} more '{flavor}' nodes wanted for {application}")]
    OutOfCapacity {
        application: String,
        flavor: String,
        missing: u32,
    },

    #[error("node {hostname} is allocated without cluster membership")]
    MissingAllocation { hostname: String },

    #[error("node repository error: {0}")]
    Repository(String),
}
