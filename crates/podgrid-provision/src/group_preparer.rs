//! Repository-backed group preparation.

use podgrid_core::{Allocation, ApplicationId, ClusterMembership, ClusterSpec, Node, NodeState};
use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};
use crate::preparer::GroupPreparer;
use crate::repository::ProvisionRepository;

/// Fills one cluster group from three sources, in order: members the
/// group already has, surplus nodes freed by the re-layout, and fresh
/// reservations from the ready pool.
///
/// Only the fresh reservations are persisted; existing and surplus
/// members are returned as part of the plan and committed by a later
/// activate step.
pub struct RepoGroupPreparer<R> {
    repository: R,
}

impl<R> RepoGroupPreparer<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

impl<R: ProvisionRepository> GroupPreparer for RepoGroupPreparer<R> {
    fn prepare(
        &self,
        application: &ApplicationId,
        cluster: &ClusterSpec,
        node_count: u32,
        flavor: &str,
        surplus: &mut Vec<Node>,
        highest_index: &mut i64,
    ) -> ProvisionResult<Vec<Node>> {
        let target = node_count as usize;

        // Members the group already has stay, lowest index first.
        let mut accepted: Vec<Node> = self
            .repository
            .nodes_of(application, &[NodeState::Active, NodeState::Reserved])?
            .into_iter()
            .filter(|node| in_group(node, cluster))
            .filter(|node| {
                node.allocation
                    .as_ref()
                    .is_some_and(|allocation| allocation.retired_at.is_none())
            })
            .collect();
        accepted.sort_by_key(member_index);
        accepted.truncate(target);
        let kept = accepted.len();

        // Surplus nodes fill the gap, keeping their index.
        while accepted.len() < target {
            let Some(node) = surplus.pop() else {
                break;
            };
            accepted.push(rehome(node, cluster));
        }
        let reused = accepted.len() - kept;

        // The remainder is reserved from the ready pool at fresh indexes.
        if accepted.len() < target {
            let mut ready = self.repository.ready_nodes(flavor)?.into_iter();
            let mut newly_reserved = Vec::new();
            while accepted.len() < target {
                let Some(node) = ready.next() else {
                    return Err(ProvisionError::OutOfCapacity {
                        application: application.to_string(),
                        flavor: flavor.to_string(),
                        missing: (target - accepted.len()) as u32,
                    });
                };
                *highest_index += 1;
                let reserved = reserve(node, application, cluster, *highest_index as u32);
                newly_reserved.push(reserved.clone());
                accepted.push(reserved);
            }
            self.repository.reserve(&newly_reserved)?;
        }

        debug!(
            application = %application,
            cluster = %cluster.id,
            group = ?cluster.group,
            kept,
            reused,
            reserved = accepted.len() - kept - reused,
            "prepared group"
        );
        Ok(accepted)
    }
}

fn in_group(node: &Node, cluster: &ClusterSpec) -> bool {
    node.allocation.as_ref().is_some_and(|allocation| {
        let node_cluster = &allocation.membership.cluster;
        node_cluster.id == cluster.id
            && node_cluster.cluster_type == cluster.cluster_type
            && node_cluster.group == cluster.group
    })
}

fn member_index(node: &Node) -> u32 {
    node.allocation
        .as_ref()
        .map(|allocation| allocation.membership.index)
        .unwrap_or(u32::MAX)
}

/// Move a surplus node into the target group, keeping its index.
fn rehome(mut node: Node, cluster: &ClusterSpec) -> Node {
    if let Some(allocation) = node.allocation.as_mut() {
        allocation.membership.cluster = cluster.clone();
    }
    node
}

/// Allocate a ready node to the application at the given index.
fn reserve(mut node: Node, application: &ApplicationId, cluster: &ClusterSpec, index: u32) -> Node {
    node.state = NodeState::Reserved;
    node.allocation = Some(Allocation::new(
        application.clone(),
        ClusterMembership {
            cluster: cluster.clone(),
            index,
        },
    ));
    node
}
