//! Weighted round-robin load balancer.
//!
//! Distributes sends across a set of candidate nodes in proportion to
//! per-node weights, which adapt to busy feedback from the nodes. A
//! deficit cursor (`position`) walks the cumulative weight of the
//! candidate list, so the distribution is deterministic for a fixed
//! candidate order.
//!
//! Instances are single-threaded: callers serialize `select` and
//! `report`.

use crate::error::{BalancerError, BalancerResult};

/// Rescale factor, about 100/99: raising every weight by it keeps the
/// relative ordering intact when a penalized weight is floored at 1.0.
const RESCALE_FACTOR: f64 = 1.0101010101010101;

/// Weight penalty subtracted per busy report.
const BUSY_PENALTY: f64 = 0.01;

/// Statistics tracked for one node, lazily created on first selection.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMetrics {
    /// Selection weight; never drops below 1.0.
    pub weight: f64,
    /// Number of times this node was selected.
    pub sent: u64,
    /// Number of busy reports against this node.
    pub busy: u64,
}

impl NodeMetrics {
    fn new() -> Self {
        Self {
            weight: 1.0,
            sent: 0,
            busy: 0,
        }
    }
}

/// Outcome of a [`WeightedBalancer::select`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    /// Position of the chosen candidate in the caller's slice.
    pub candidate: usize,
    /// Node index parsed from the candidate's name; pass it back to
    /// [`WeightedBalancer::report`].
    pub index: usize,
}

/// Picks a recipient from a dynamic candidate set using adaptive
/// per-node weights.
///
/// Candidates are service names on the form `"{cluster}/x/[y.]number/z"`;
/// the balancer treats them as opaque apart from the number, which keys
/// the node's statistics.
pub struct WeightedBalancer {
    cluster: String,
    /// Deficit cursor; increased by 1.0 on each selection.
    position: f64,
    /// Per-node statistics indexed by node index. Sparse: unseen indices
    /// hold `None`.
    node_weights: Vec<Option<NodeMetrics>>,
}

impl WeightedBalancer {
    /// Create a balancer for recipients of the given cluster.
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            position: 0.0,
            node_weights: Vec::new(),
        }
    }

    /// Choose one candidate from `candidates`, based on previously
    /// gathered node statistics and the running cursor.
    ///
    /// Returns `Ok(None)` only for an empty candidate list. Fails if any
    /// visited candidate name does not parse.
    pub fn select<T: AsRef<str>>(&mut self, candidates: &[T]) -> BalancerResult<Option<Pick>> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut weight_sum = 0.0;
        let mut selected = None;
        for (candidate, name) in candidates.iter().enumerate() {
            let index = self.index_of(name.as_ref())?;
            weight_sum += self.metrics_at(index).weight;
            if weight_sum > self.position {
                selected = Some(Pick { candidate, index });
                break;
            }
        }

        let pick = match selected {
            Some(pick) => pick,
            None => {
                // Cursor beyond the total weight: wrap around to the first
                // candidate, keeping the overshoot remainder.
                self.position -= weight_sum;
                Pick {
                    candidate: 0,
                    index: self.index_of(candidates[0].as_ref())?,
                }
            }
        };

        self.position += 1.0;
        self.metrics_at(pick.index).sent += 1;
        Ok(Some(pick))
    }

    /// Feedback from completing a send to the node at `index`.
    ///
    /// A busy node is penalized by lowering its weight; once the penalty
    /// would push it under the 1.0 floor, every tracked weight is rescaled
    /// upward instead and the node restarts at the floor. `busy = false`
    /// is a no-op.
    pub fn report(&mut self, index: usize, busy: bool) {
        if !busy {
            return;
        }

        let want = self.metrics_at(index).weight - BUSY_PENALTY;
        if want < 1.0 {
            self.increase_weights();
            self.metrics_at(index).weight = 1.0;
        } else {
            self.metrics_at(index).weight = want;
        }
        self.metrics_at(index).busy += 1;
    }

    /// Returns the node index encoded in a recipient name.
    pub fn index_of(&self, name: &str) -> BalancerResult<usize> {
        self.parse_index(name)
            .ok_or_else(|| BalancerError::MalformedName {
                expected: format!("{}/x/[y.]number/z", self.cluster),
                name: name.to_string(),
            })
    }

    /// Statistics for the node at `index`, if it has been seen.
    pub fn node_metrics(&self, index: usize) -> Option<&NodeMetrics> {
        self.node_weights.get(index).and_then(Option::as_ref)
    }

    /// Current cursor value (for diagnostics).
    pub fn position(&self) -> f64 {
        self.position
    }

    fn parse_index(&self, name: &str) -> Option<usize> {
        let rest = name
            .strip_prefix(self.cluster.as_str())?
            .strip_prefix('/')?;
        let mut segments = rest.split('/');
        segments.next()?; // the session segment
        let index_segment = segments.next()?;
        segments.next()?; // the grammar requires a trailing segment
        index_segment.rsplit('.').next()?.parse().ok()
    }

    /// Statistics at `index`, created (and the table grown) on demand.
    fn metrics_at(&mut self, index: usize) -> &mut NodeMetrics {
        if self.node_weights.len() <= index {
            self.node_weights.resize(index + 1, None);
        }
        self.node_weights[index].get_or_insert_with(NodeMetrics::new)
    }

    /// Scale every tracked weight up so ratios are preserved.
    fn increase_weights(&mut self) {
        for metrics in self.node_weights.iter_mut().flatten() {
            let want = metrics.weight * RESCALE_FACTOR;
            metrics.weight = if want >= 1.0 { want } else { 1.0 };
        }
    }
}
