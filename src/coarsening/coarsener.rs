//! Level-stack coarsener.
//!
//! Repeats clustering + contraction until the hypergraph drops below
//! the contraction limit or a pass stops making progress. Levels are
//! owned by an explicit stack; the uncoarsening driver pops and frees
//! them as it walks back up. An allocation failure inside `contract`
//! is retried once with a halved cluster-weight cap.

use crate::config::Context;
use crate::datastructures::{HypernodeId, StaticHypergraph};
use crate::error::PartitionError;

/// One coarsening step: the coarse hypergraph and the fine-to-coarse
/// vertex map that produced it.
#[derive(Debug)]
pub struct Level {
    pub hypergraph: StaticHypergraph,
    pub mapping: Vec<HypernodeId>,
}

/// Stack of coarsening levels, finest first.
#[derive(Debug, Default)]
pub struct CoarseningHierarchy {
    pub levels: Vec<Level>,
}

impl CoarseningHierarchy {
    /// The coarsest hypergraph, or `None` if no contraction happened.
    pub fn coarsest(&self) -> Option<&StaticHypergraph> {
        self.levels.last().map(|l| &l.hypergraph)
    }
}

/// Minimum relative shrink per pass; below this the pass is considered
/// stalled and coarsening stops.
const MIN_SHRINK_FACTOR: f64 = 0.99;

/// Coarsen `hg` down to `ctx.coarsening.contraction_limit` nodes.
pub fn coarsen(
    hg: &StaticHypergraph,
    ctx: &Context,
) -> Result<CoarseningHierarchy, PartitionError> {
    let mut hierarchy = CoarseningHierarchy::default();
    let contraction_limit = ctx.coarsening.contraction_limit;
    let mut max_cluster_weight = ctx.max_cluster_weight(hg.total_weight());

    loop {
        let current = hierarchy.coarsest().unwrap_or(hg);
        let num_nodes = current.initial_num_nodes() - current.num_removed_nodes();
        if num_nodes <= contraction_limit {
            break;
        }

        let clustering = crate::coarsening::heavy_edge_clustering(
            current,
            max_cluster_weight,
            contraction_limit,
        );

        let contracted = match current.contract(&clustering) {
            Ok(result) => result,
            Err(PartitionError::Resource(reason)) => {
                // Retry once with a halved coarsening step.
                log::warn!("contraction ran out of memory ({reason}); halving the step");
                max_cluster_weight = (max_cluster_weight / 2).max(1);
                let retry_clustering = crate::coarsening::heavy_edge_clustering(
                    current,
                    max_cluster_weight,
                    contraction_limit,
                );
                current.contract(&retry_clustering)?
            }
            Err(e) => return Err(e),
        };
        let (coarse, mapping) = contracted;

        let coarse_nodes = coarse.initial_num_nodes();
        if (coarse_nodes as f64) > MIN_SHRINK_FACTOR * num_nodes as f64 {
            log::debug!(
                "coarsening stalled at {coarse_nodes} nodes (from {num_nodes}); stopping"
            );
            break;
        }
        hierarchy.levels.push(Level {
            hypergraph: coarse,
            mapping,
        });
    }

    log::debug!(
        "coarsening finished with {} levels, coarsest has {} nodes",
        hierarchy.levels.len(),
        hierarchy
            .coarsest()
            .map(|c| c.initial_num_nodes())
            .unwrap_or(hg.initial_num_nodes())
    );
    Ok(hierarchy)
}
