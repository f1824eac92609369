//! Orchestrator permission seam.
//!
//! The orchestrator is the cluster-wide policy service that decides when
//! a host may be taken out of or returned to service. Both operations
//! can be denied; denials are ordinary back-pressure, not faults.

use async_trait::async_trait;

use crate::error::OrchestratorError;

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Ask permission to put the host back into service.
    async fn resume(&self, hostname: &str) -> Result<(), OrchestratorError>;

    /// Ask permission to suspend the host together with the given
    /// container hostnames running on it.
    async fn suspend(&self, hostname: &str, hostnames: &[String]) -> Result<(), OrchestratorError>;
}
