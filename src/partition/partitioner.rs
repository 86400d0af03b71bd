//! Top-level multilevel partitioner.
//!
//! Validates the configuration, checks feasibility of the balance
//! constraint, installs the seeded worker pool, and drives
//! coarsen → initial partition → uncoarsen-and-refine.

use crate::coarsening::coarsen;
use crate::config::Context;
use crate::datastructures::{PartitionId, PartitionedHypergraph, StaticHypergraph};
use crate::error::PartitionError;
use crate::parallel::install_with_rng_pool;
use crate::partition::initial::{BfsInitialPartitioner, InitialPartitioner};
use crate::partition::metrics::Metrics;
use crate::partition::uncoarsen::uncoarsen_and_refine;

/// Final assignment and its quality.
#[derive(Debug, Clone)]
pub struct PartitionResult {
    /// Block of every vertex, indexed by vertex ID.
    pub parts: Vec<PartitionId>,
    pub metrics: Metrics,
}

/// Partition `hg` into `ctx.partition.k` blocks.
pub fn partition(
    hg: &StaticHypergraph,
    ctx: &Context,
) -> Result<PartitionResult, PartitionError> {
    ctx.validate()?;

    let limit = ctx.max_part_weight(hg.total_weight());
    if let Some(heaviest) = hg.nodes().map(|v| hg.node_weight(v)).max() {
        if heaviest > limit {
            return Err(PartitionError::Infeasible(format!(
                "max vertex weight {heaviest} exceeds the block limit {limit}"
            )));
        }
    }

    install_with_rng_pool(ctx.partition.seed, ctx.effective_num_threads(), || {
        let hierarchy = coarsen(hg, ctx)?;
        let coarse_parts = {
            let coarsest = hierarchy.coarsest().unwrap_or(hg);
            let phg = PartitionedHypergraph::new(ctx.partition.k, coarsest);
            BfsInitialPartitioner.partition(&phg, ctx)?;
            phg.initialize_partition();
            phg.part_ids()
        };
        let (parts, metrics) = uncoarsen_and_refine(hg, hierarchy, coarse_parts, ctx)?;
        log::debug!(
            "final partition: cut {}, km1 {}, imbalance {:.4}",
            metrics.cut,
            metrics.km1,
            metrics.imbalance
        );
        Ok(PartitionResult { parts, metrics })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::HypergraphFactory;

    #[test]
    fn rejects_infeasible_vertex_weight() {
        let hg = HypergraphFactory::from_edge_list(
            3,
            &[vec![0, 1], vec![1, 2]],
            None,
            Some(&[100, 1, 1]),
            false,
        )
        .unwrap();
        let mut ctx = Context::default();
        ctx.partition.k = 2;
        ctx.partition.epsilon = 0.1;
        assert!(matches!(
            partition(&hg, &ctx),
            Err(PartitionError::Infeasible(_))
        ));
    }

    #[test]
    fn rejects_invalid_k() {
        let hg =
            HypergraphFactory::from_edge_list(2, &[vec![0, 1]], None, None, false).unwrap();
        let mut ctx = Context::default();
        ctx.partition.k = 1;
        assert!(matches!(
            partition(&hg, &ctx),
            Err(PartitionError::InvalidInput(_))
        ));
    }
}
