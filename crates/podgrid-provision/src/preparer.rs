//! Node preparation for an application deployment.
//!
//! `prepare` plans the node set an application cluster will have once
//! activated: it reserves additional nodes, re-homes nodes stranded in
//! groups beyond the wanted count, and retires the leftovers. It may
//! persist changes to the reserved and inactive node sets, but never to
//! the active set — active nodes only change on a later activate step,
//! in lockstep with the active config model.

use podgrid_core::{ApplicationId, ClusterSpec, Group, Node, NodeState};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{ProvisionError, ProvisionResult};
use crate::repository::ProvisionRepository;

/// Prepares one group of a cluster.
///
/// `surplus` and `highest_index` are shared across the groups of one
/// prepare: the implementation consumes surplus nodes it re-uses and
/// advances the index watermark for nodes it allocates fresh.
pub trait GroupPreparer {
    fn prepare(
        &self,
        application: &ApplicationId,
        cluster: &ClusterSpec,
        node_count: u32,
        flavor: &str,
        surplus: &mut Vec<Node>,
        highest_index: &mut i64,
    ) -> ProvisionResult<Vec<Node>>;
}

/// Plans node activation changes for an application cluster.
pub struct Preparer<R, G, C = SystemClock> {
    repository: R,
    group_preparer: G,
    clock: C,
}

impl<R, G> Preparer<R, G, SystemClock> {
    pub fn new(repository: R, group_preparer: G) -> Self {
        Self {
            repository,
            group_preparer,
            clock: SystemClock,
        }
    }
}

impl<R, G, C> Preparer<R, G, C> {
    /// Use the given time source for retirement timestamps.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Preparer<R, G, C2> {
        Preparer {
            repository: self.repository,
            group_preparer: self.group_preparer,
            clock,
        }
    }
}

impl<R, G, C> Preparer<R, G, C>
where
    R: ProvisionRepository,
    G: GroupPreparer,
    C: Clock,
{
    /// Ensure sufficient nodes are reserved or active for the given
    /// application cluster, laid out across `wanted_groups` groups.
    ///
    /// Returns the nodes the cluster will have allocated if this plan is
    /// activated, including retired copies of nodes squeezed out by the
    /// re-layout (they stay active until activation removes them).
    pub fn prepare(
        &self,
        application: &ApplicationId,
        cluster: &ClusterSpec,
        nodes: u32,
        flavor: &str,
        wanted_groups: u32,
    ) -> ProvisionResult<Vec<Node>> {
        if cluster.group.is_some() && wanted_groups > 1 {
            return Err(ProvisionError::GroupWithMultipleGroups);
        }
        if wanted_groups == 0 {
            return Err(ProvisionError::NoGroups { nodes });
        }
        if nodes > 0 && nodes % wanted_groups != 0 {
            return Err(ProvisionError::UnevenGroupSizes {
                nodes,
                groups: wanted_groups,
            });
        }

        // A request without a pinned group covers the entire cluster, so
        // groups past the wanted count are free to be removed.
        let mut surplus = if cluster.group.is_some() {
            Vec::new()
        } else {
            self.nodes_in_removable_groups(application, cluster, wanted_groups)?
        };

        let mut highest_index = self.highest_index(application, cluster)?;
        let mut accepted: Vec<Node> = Vec::new();
        for group in 0..wanted_groups {
            // Generated groups have contiguous indexes starting from 0.
            let cluster_group = match cluster.group {
                Some(_) => cluster.clone(),
                None => cluster.with_group(Group::new(group)),
            };
            let prepared = self.group_preparer.prepare(
                application,
                &cluster_group,
                nodes / wanted_groups,
                flavor,
                &mut surplus,
                &mut highest_index,
            )?;
            replace(&mut accepted, prepared);
        }

        move_to_active_group(&mut surplus, wanted_groups, cluster.group);
        replace(&mut accepted, self.retire(&surplus));

        debug!(
            application = %application,
            cluster = %cluster.id,
            nodes,
            wanted_groups,
            accepted = accepted.len(),
            "prepared node activation plan"
        );
        Ok(accepted)
    }

    /// Active nodes of this cluster whose group index is at or above the
    /// wanted group count.
    fn nodes_in_removable_groups(
        &self,
        application: &ApplicationId,
        requested: &ClusterSpec,
        wanted_groups: u32,
    ) -> ProvisionResult<Vec<Node>> {
        let mut surplus = Vec::new();
        for node in self
            .repository
            .nodes_of(application, &[NodeState::Active])?
        {
            let membership = membership_of(&node)?;
            if membership.cluster.id != requested.id
                || membership.cluster.cluster_type != requested.cluster_type
            {
                continue;
            }
            match membership.cluster.group {
                Some(group) if group.index() >= wanted_groups => surplus.push(node),
                _ => {}
            }
        }
        Ok(surplus)
    }

    /// Highest membership index across the cluster's active and failed
    /// nodes, or -1 if there are none.
    ///
    /// Failed nodes count so that the index of a failed node is never
    /// handed out again.
    fn highest_index(
        &self,
        application: &ApplicationId,
        cluster: &ClusterSpec,
    ) -> ProvisionResult<i64> {
        let mut highest = -1i64;
        for node in self
            .repository
            .nodes_of(application, &[NodeState::Active, NodeState::Failed])?
        {
            let membership = membership_of(&node)?;
            if membership.cluster.id != cluster.id
                || membership.cluster.cluster_type != cluster.cluster_type
            {
                continue;
            }
            highest = highest.max(i64::from(membership.index));
        }
        Ok(highest)
    }

    /// Retired copies of the given nodes, except those already removable.
    fn retire(&self, nodes: &[Node]) -> Vec<Node> {
        let now = self.clock.now_epoch_secs();
        nodes
            .iter()
            .filter(|node| {
                !node
                    .allocation
                    .as_ref()
                    .is_some_and(|allocation| allocation.removable)
            })
            .map(|node| node.retired(now))
            .collect()
    }
}

/// Set-like union where incoming entries win: any existing entry equal
/// to an incoming node is dropped before the incoming ones are appended.
fn replace(accepted: &mut Vec<Node>, incoming: Vec<Node>) {
    accepted.retain(|node| !incoming.contains(node));
    accepted.extend(incoming);
}

/// Re-home surplus nodes out of groups that the new layout no longer
/// has, so retired nodes do not strand whole groups.
fn move_to_active_group(surplus: &mut [Node], wanted_groups: u32, target_group: Option<Group>) {
    for node in surplus.iter_mut() {
        let Some(allocation) = node.allocation.as_mut() else {
            continue;
        };
        let Some(group) = allocation.membership.cluster.group else {
            continue;
        };
        if group.index() < wanted_groups {
            continue;
        }
        let new_group = target_group.unwrap_or(Group::new(0));
        allocation.membership.cluster = allocation.membership.cluster.with_group(new_group);
    }
}

fn membership_of(node: &Node) -> ProvisionResult<&podgrid_core::ClusterMembership> {
    node.allocation
        .as_ref()
        .map(|allocation| &allocation.membership)
        .ok_or_else(|| ProvisionError::MissingAllocation {
            hostname: node.hostname.clone(),
        })
}
