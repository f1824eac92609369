//! podgrid-balancer — adaptive weighted load balancing.
//!
//! A client-side dispatcher: given the current list of candidate nodes
//! for a cluster, pick one recipient per send and feed completion
//! results back so overloaded nodes receive proportionally less traffic.
//!
//! ```text
//! WeightedBalancer (one per client session)
//!   ├── select(candidates)  → deterministic weighted round-robin pick
//!   └── report(node, busy)  → weight penalty + rescale at the floor
//! ```

pub mod balancer;
pub mod error;

pub use balancer::{NodeMetrics, Pick, WeightedBalancer};
pub use error::{BalancerError, BalancerResult};
