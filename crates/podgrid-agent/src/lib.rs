//! podgrid-agent — host-side convergence between the node repository's
//! wanted state and the node-admin subsystem.
//!
//! ```text
//! HostSupervisor (one worker per host)
//!   ├── NodeRepository    → the containers this host should run
//!   ├── Orchestrator      → permission to suspend / resume the host
//!   └── NodeAdminDriver   → freeze, refresh, stop services, shutdown
//! ```
//!
//! Each tick the worker:
//! 1. waits until work is signalled or the tick interval elapses,
//! 2. converges toward the wanted suspend/resume state, one gated step
//!    at a time,
//! 3. refreshes the wanted container set while the host is resumed.
//!
//! The loop never exits on error: orchestrator denials and incomplete
//! freezes are expected back-pressure, everything else is logged, and
//! all of it is retried on the next tick.

pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod repository;
pub mod supervisor;

pub use driver::NodeAdminDriver;
pub use error::{
    AgentError, AgentResult, ConvergenceError, OrchestratorError, RepositoryError,
};
pub use orchestrator::Orchestrator;
pub use repository::NodeRepository;
pub use supervisor::{DebugView, HostState, HostSupervisor};
