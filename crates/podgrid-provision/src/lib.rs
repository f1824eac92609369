//! podgrid-provision — node reservation and group re-layout.
//!
//! Plans which nodes an application cluster will run on. A prepare pass
//! reserves or retires nodes so the cluster can be re-laid-out across a
//! new group count; a later activate step (outside this crate) commits
//! the plan.
//!
//! ```text
//! Preparer
//!   ├── ProvisionRepository   → read allocated/ready nodes, persist reservations
//!   ├── GroupPreparer         → fill one group (RepoGroupPreparer by default)
//!   └── Clock                 → retirement timestamps
//! ```

pub mod clock;
pub mod error;
pub mod group_preparer;
pub mod memory;
pub mod preparer;
pub mod repository;

pub use clock::{Clock, SystemClock};
pub use error::{ProvisionError, ProvisionResult};
pub use group_preparer::RepoGroupPreparer;
pub use memory::MemoryProvisionRepository;
pub use preparer::{GroupPreparer, Preparer};
pub use repository::ProvisionRepository;
