//! Balancer error types.

use thiserror::Error;

/// Result type alias for balancer operations.
pub type BalancerResult<T> = Result<T, BalancerError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalancerError {
    #[error("expected recipient on the form '{expected}', got '{name}'")]
    MalformedName { expected: String, name: String },
}
