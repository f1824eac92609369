//! Node-admin driver seam.
//!
//! The driver owns the host-local container subsystem: it freezes and
//! unfreezes container mutation, applies the wanted container set, and
//! stops per-container agent services ahead of a host suspension.

use std::time::Duration;

use async_trait::async_trait;
use podgrid_core::ContainerSpec;

#[async_trait]
pub trait NodeAdminDriver: Send + Sync {
    /// Request the given frozen state. Returns true once the subsystem
    /// has converged to it; until then callers retry.
    async fn set_frozen(&self, frozen: bool) -> bool;

    /// How long the subsystem has been attempting to freeze.
    fn subsystem_freeze_duration(&self) -> Duration;

    /// Apply the wanted container set. Must not be called while frozen.
    async fn refresh_containers_to_run(&self, containers: Vec<ContainerSpec>)
        -> anyhow::Result<()>;

    /// Stop the per-container agent services for the given hostnames.
    async fn stop_services(&self, hostnames: &[String]);

    /// Driver internals for the debug snapshot.
    fn debug_info(&self) -> serde_json::Value;

    /// Release driver resources. Called once, when the supervisor stops.
    async fn shutdown(&self);
}
