//! Configuration for a partitioning run.
//!
//! The [`Context`] struct tree mirrors the option namespaces of the
//! documented configuration surface (`partition.*`, `shared_memory.*`,
//! `coarsening.*`, `refinement.fm.*`, `refinement.flow.*`). All options
//! carry defaults; [`Context::validate`] rejects values the pipeline
//! cannot honor.

use std::time::Duration;

use crate::error::PartitionError;
use crate::datastructures::PartitionId;

/// Objective function minimized by refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Sum of weights of hyperedges spanning more than one block.
    Cut,
    /// Connectivity metric: Σ (λ(e) − 1) · w(e).
    Km1,
}

/// Which quotient-graph scheduler drives the flow-based refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAlgorithm {
    /// Flow refinement disabled.
    Off,
    /// Greedy maximum matching on block pairs; a block participates in at
    /// most one running refinement.
    Matching,
    /// Optimistic scheduling with per-vertex reservations; a block may
    /// participate in several refinements at once.
    Optimistic,
}

/// `partition.*` options.
#[derive(Debug, Clone)]
pub struct PartitionParams {
    /// Number of blocks.
    pub k: PartitionId,
    /// Imbalance tolerance ε. Each block weight stays at most
    /// ⌈(1+ε)·W/k⌉ up to the documented concurrent-reservation slack.
    pub epsilon: f64,
    pub objective: Objective,
    /// Seed for every seeded RNG in the run.
    pub seed: u64,
}

/// `shared_memory.*` options.
#[derive(Debug, Clone)]
pub struct SharedMemoryParams {
    /// Worker thread count; capped at the detected CPU count.
    pub num_threads: usize,
    /// Shuffle seed vertices within block-local windows instead of
    /// globally, preserving locality between neighboring searches.
    pub use_localized_random_shuffle: bool,
}

/// `coarsening.*` options.
#[derive(Debug, Clone)]
pub struct CoarseningParams {
    /// Stop coarsening once the hypergraph has at most this many nodes.
    pub contraction_limit: u32,
    /// Cap on the weight of a cluster formed during rating. `0` selects
    /// an automatic cap derived from the total weight and the
    /// contraction limit.
    pub max_allowed_node_weight: i64,
}

/// `refinement.fm.*` options.
#[derive(Debug, Clone)]
pub struct FmParams {
    /// Seed fan-out: number of seed vertices per localized search.
    pub num_seeds: usize,
    /// Step budget: maximum number of applied moves per search.
    pub max_moves: usize,
    /// A search stops after this many consecutive moves without
    /// improving its best cumulative gain.
    pub stall_window: usize,
    /// Maximum number of improvement rounds per level.
    pub rounds: usize,
    /// Wall-clock budget for one FM phase; checked between moves.
    pub time_limit: Duration,
}

/// `refinement.flow.*` options.
#[derive(Debug, Clone)]
pub struct FlowParams {
    pub algorithm: FlowAlgorithm,
    /// Region budget `U`: maximum number of hypernodes grown into one
    /// flow problem.
    pub max_region_size: usize,
    /// Wall-clock budget for one flow phase.
    pub time_limit: Duration,
}

#[derive(Debug, Clone)]
pub struct RefinementParams {
    pub fm: FmParams,
    pub flow: FlowParams,
}

/// Full configuration of a partitioning run.
#[derive(Debug, Clone)]
pub struct Context {
    pub partition: PartitionParams,
    pub shared_memory: SharedMemoryParams,
    pub coarsening: CoarseningParams,
    pub refinement: RefinementParams,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            partition: PartitionParams {
                k: 2,
                epsilon: 0.03,
                objective: Objective::Km1,
                seed: 0,
            },
            shared_memory: SharedMemoryParams {
                num_threads: std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
                use_localized_random_shuffle: false,
            },
            coarsening: CoarseningParams {
                contraction_limit: 160,
                max_allowed_node_weight: 0,
            },
            refinement: RefinementParams {
                fm: FmParams {
                    num_seeds: 25,
                    max_moves: 350,
                    stall_window: 100,
                    rounds: 3,
                    time_limit: Duration::from_secs(120),
                },
                flow: FlowParams {
                    algorithm: FlowAlgorithm::Matching,
                    max_region_size: 5_000,
                    time_limit: Duration::from_secs(120),
                },
            },
        }
    }
}

impl Context {
    /// Rejects configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), PartitionError> {
        if self.partition.k < 2 {
            return Err(PartitionError::InvalidInput(format!(
                "k must be at least 2, got {}",
                self.partition.k
            )));
        }
        if !(self.partition.epsilon > 0.0) {
            return Err(PartitionError::InvalidInput(format!(
                "epsilon must be positive, got {}",
                self.partition.epsilon
            )));
        }
        if self.shared_memory.num_threads == 0 {
            return Err(PartitionError::InvalidInput(
                "num_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Worker count actually used: the configured count capped at the
    /// detected CPU count.
    pub fn effective_num_threads(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.shared_memory.num_threads.min(cpus).max(1)
    }

    /// Per-block weight limit ⌈(1+ε)·W/k⌉.
    pub fn max_part_weight(&self, total_weight: i64) -> i64 {
        let k = self.partition.k as f64;
        ((1.0 + self.partition.epsilon) * total_weight as f64 / k).ceil() as i64
    }

    /// Perfectly balanced block weight ⌈W/k⌉.
    pub fn perfect_part_weight(&self, total_weight: i64) -> i64 {
        let k = self.partition.k as i64;
        (total_weight + k - 1) / k
    }

    /// Cluster weight cap used by the rating phase.
    pub fn max_cluster_weight(&self, total_weight: i64) -> i64 {
        if self.coarsening.max_allowed_node_weight > 0 {
            self.coarsening.max_allowed_node_weight
        } else {
            let limit = self.coarsening.contraction_limit.max(1) as i64;
            ((total_weight + limit - 1) / limit).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_is_valid() {
        assert!(Context::default().validate().is_ok());
    }

    #[test]
    fn rejects_k_below_two() {
        let mut ctx = Context::default();
        ctx.partition.k = 1;
        assert!(matches!(
            ctx.validate(),
            Err(PartitionError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_non_positive_epsilon() {
        let mut ctx = Context::default();
        ctx.partition.epsilon = 0.0;
        assert!(ctx.validate().is_err());
        ctx.partition.epsilon = -0.1;
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn part_weight_limits() {
        let mut ctx = Context::default();
        ctx.partition.k = 4;
        ctx.partition.epsilon = 0.25;
        // W = 100, k = 4: perfect 25, limit ceil(1.25 * 25) = 32.
        assert_eq!(ctx.perfect_part_weight(100), 25);
        assert_eq!(ctx.max_part_weight(100), 32);
    }
}
