//! Unified error type for the partitioner's public APIs.
//!
//! Every fallible entry point returns [`PartitionError`]. The variants map
//! one-to-one onto the failure domains of the pipeline: rejected input,
//! infeasible balance constraints, resource exhaustion during coarsening,
//! and broken internal invariants (which indicate a bug, not a user error).

use thiserror::Error;

/// Unified error type for partitioning operations.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Malformed hypergraph file, a non-graph fed to the graph
    /// specialization, `k < 2`, or a non-positive imbalance tolerance.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No assignment can satisfy the balance constraint, e.g. a single
    /// vertex heavier than the per-block weight limit.
    #[error("infeasible balance constraint: {0}")]
    Infeasible(String),

    /// Allocation failure while building a coarse level. The coarsener
    /// retries once with a smaller contraction step before surfacing this.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// A debug-only consistency check failed. Should not occur.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// Failure at the file boundary (reading a hypergraph, writing a
    /// partition).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PartitionError {
    /// Process exit code mandated for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            PartitionError::InvalidInput(_) | PartitionError::Io(_) => 1,
            PartitionError::Infeasible(_) => 2,
            PartitionError::Resource(_) | PartitionError::InvariantViolation(_) => 3,
        }
    }
}
