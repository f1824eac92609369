//! Node repository capability set used by provisioning.
//!
//! Provisioning treats the repository as a transactional store; callers
//! hold the repository's per-application lock for the duration of a
//! prepare.

use podgrid_core::{ApplicationId, Node, NodeState};

use crate::error::ProvisionResult;

pub trait ProvisionRepository {
    /// Nodes allocated to the application, filtered to the given states.
    fn nodes_of(
        &self,
        application: &ApplicationId,
        states: &[NodeState],
    ) -> ProvisionResult<Vec<Node>>;

    /// Unallocated `ready` nodes of the given flavor.
    fn ready_nodes(&self, flavor: &str) -> ProvisionResult<Vec<Node>>;

    /// Persist node reservations.
    fn reserve(&self, nodes: &[Node]) -> ProvisionResult<()>;
}
