//! Refinement engines: localized k-way FM and flow-based refinement on
//! quotient-graph block pairs.
//!
//! Engines implement the small [`Refiner`] capability set and are
//! selected by configuration; the pipeline dispatches through the trait
//! at phase boundaries only, never inside move loops.

pub mod flow;
pub mod fm;

use crate::datastructures::{HypernodeId, PartitionId, PartitionedHypergraph};
use crate::error::PartitionError;
use crate::partition::metrics::Metrics;

/// Capability set shared by all refinement engines.
pub trait Refiner {
    /// One-time setup against a freshly projected partition.
    fn initialize(&mut self, phg: &PartitionedHypergraph<'_>);

    /// Improve the partition, optionally focused on `seeds` (vertices
    /// that changed meaning at this level). Updates `metrics` to the
    /// post-refinement values and reports whether anything improved.
    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<'_>,
        seeds: &[HypernodeId],
        metrics: &mut Metrics,
    ) -> Result<bool, PartitionError>;

    /// Largest number of blocks one search of this engine touches.
    fn max_blocks_per_search(&self) -> PartitionId;

    fn set_num_threads(&mut self, num_threads: usize);

    /// Whether the engine hit its configured problem-size ceiling in
    /// the last call (flow region budget, FM move budget).
    fn is_maximum_problem_size_reached(&self) -> bool;
}

/// Refiner that does nothing; stands in when a phase is disabled.
#[derive(Debug, Default)]
pub struct DoNothingRefiner;

impl Refiner for DoNothingRefiner {
    fn initialize(&mut self, _phg: &PartitionedHypergraph<'_>) {}

    fn refine(
        &mut self,
        _phg: &PartitionedHypergraph<'_>,
        _seeds: &[HypernodeId],
        _metrics: &mut Metrics,
    ) -> Result<bool, PartitionError> {
        Ok(false)
    }

    fn max_blocks_per_search(&self) -> PartitionId {
        0
    }

    fn set_num_threads(&mut self, _num_threads: usize) {}

    fn is_maximum_problem_size_reached(&self) -> bool {
        false
    }
}
