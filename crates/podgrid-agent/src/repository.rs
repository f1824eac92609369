//! Node repository capability set used by the host agent.

use async_trait::async_trait;
use podgrid_core::ContainerSpec;

use crate::error::RepositoryError;

/// The host agent's read-only view of the node repository.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// The containers this host should be running.
    async fn containers_to_run(&self) -> Result<Vec<ContainerSpec>, RepositoryError>;
}
