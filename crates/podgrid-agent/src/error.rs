//! Agent error types.

use thiserror::Error;

/// Result type alias for supervisor lifecycle operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Lifecycle misuse of the host supervisor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("host supervisor is already started and cannot be restarted")]
    AlreadyStarted,

    #[error("host supervisor is already stopped")]
    AlreadyStopped,
}

/// Failure talking to the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Permission was refused; temporary by design of the orchestrator.
    #[error("orchestrator denied {operation} of {hostname}: {reason}")]
    Denied {
        operation: &'static str,
        hostname: String,
        reason: String,
    },

    #[error("orchestrator request failed: {0}")]
    Unavailable(String),
}

/// I/O failure against the node repository.
#[derive(Debug, Error)]
#[error("node repository request failed: {0}")]
pub struct RepositoryError(pub String);

/// Why a convergence attempt did not reach its target this tick.
///
/// Every variant is absorbed by the tick loop and retried on the next
/// tick; the variants only steer logging and the forced-unfreeze
/// escalation.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    /// The orchestrator did not give permission; retry shortly.
    #[error(transparent)]
    Denied(OrchestratorError),

    /// The node-admin subsystem has not finished freezing or unfreezing.
    #[error("node admin has not yet converged to {0}")]
    NotYetFrozen(&'static str),

    #[error("failed to get nodes from node repository: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<OrchestratorError> for ConvergenceError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::Denied { .. } => ConvergenceError::Denied(error),
            OrchestratorError::Unavailable(_) => ConvergenceError::Other(anyhow::Error::new(error)),
        }
    }
}
