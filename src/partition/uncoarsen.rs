//! Uncoarsening driver.
//!
//! Walks the level stack in reverse. At every transition the coarse
//! assignment is projected onto the cluster representatives, and the
//! remaining members are brought in asynchronously: workers pull
//! contraction groups from the pool in DAG order, take the per-node
//! locks, assign the contractees, run localized FM on the group's
//! border vertices while the locks are held, and activate the group's
//! successors. After the async phase the level gets full FM rounds and,
//! if enabled, a flow phase. Levels are freed as the walk proceeds.

use std::time::Instant;

use crate::config::Context;
use crate::coarsening::CoarseningHierarchy;
use crate::datastructures::{
    GroupPool, HypernodeId, NodeLockManager, PartitionId, PartitionedHypergraph,
    StaticHypergraph, INVALID_NODE,
};
use crate::error::PartitionError;
use crate::partition::metrics::Metrics;
use crate::refinement::flow::FlowRefiner;
use crate::refinement::fm::localized::LocalizedKWayFm;
use crate::refinement::fm::shared::FmSharedData;
use crate::refinement::fm::FmRefiner;
use crate::refinement::Refiner;

/// Project the coarse assignment through one level and refine.
fn refine_level(
    finer: &StaticHypergraph,
    mapping: &[HypernodeId],
    coarse_parts: &[PartitionId],
    ctx: &Context,
) -> Result<Vec<PartitionId>, PartitionError> {
    let num_coarse = coarse_parts.len();
    let mut phg = PartitionedHypergraph::new(ctx.partition.k, finer);

    // Cluster representatives (the smallest member) carry the coarse
    // block into the finer level; everybody else arrives through the
    // group pool.
    let mut representative: Vec<HypernodeId> = vec![INVALID_NODE; num_coarse];
    for (v, &c) in mapping.iter().enumerate() {
        if c != INVALID_NODE && representative[c as usize] == INVALID_NODE {
            representative[c as usize] = v as HypernodeId;
        }
    }
    for (v, &c) in mapping.iter().enumerate() {
        if c != INVALID_NODE && representative[c as usize] == v as HypernodeId {
            phg.set_only_node_part(v as HypernodeId, coarse_parts[c as usize]);
        }
    }
    phg.initialize_partition();
    phg.initialize_gain_cache();

    async_uncontraction(&phg, mapping, num_coarse, ctx)?;

    let mut metrics = Metrics::measure(&phg, ctx);
    let mut fm = FmRefiner::new(ctx);
    fm.initialize(&phg);
    fm.refine(&phg, &[], &mut metrics)?;
    let mut flow = FlowRefiner::new(ctx);
    flow.initialize(&phg);
    flow.refine(&phg, &[], &mut metrics)?;

    Ok(phg.part_ids())
}

/// The asynchronous group-pool phase of one level transition.
fn async_uncontraction(
    phg: &PartitionedHypergraph<'_>,
    mapping: &[HypernodeId],
    num_coarse: usize,
    ctx: &Context,
) -> Result<(), PartitionError> {
    let pool = GroupPool::from_mapping(mapping, num_coarse);
    if pool.num_groups() == 0 {
        return Ok(());
    }
    let n = phg.hypergraph().initial_num_nodes() as usize;
    let locks = NodeLockManager::new(n);
    let shared = FmSharedData::new(n);
    let max_part_weight = ctx.max_part_weight(phg.hypergraph().total_weight());
    let deadline = Instant::now() + ctx.refinement.fm.time_limit;
    let num_workers = ctx.effective_num_threads();

    rayon::scope(|scope| {
        for _ in 0..num_workers {
            let pool = &pool;
            let locks = &locks;
            let shared = &shared;
            scope.spawn(move |_| {
                let mut fm = LocalizedKWayFm::new(ctx, max_part_weight);
                let mut seeds: Vec<HypernodeId> = Vec::new();
                while pool.has_active() {
                    let Some(group_id) = pool.pick_any_active() else {
                        std::thread::yield_now();
                        continue;
                    };
                    let group = pool.group(group_id);
                    if !locks.try_acquire_many(group.node_ids(), group_id) {
                        pool.reactivate(group_id);
                        std::thread::yield_now();
                        continue;
                    }

                    // The contractee regains its identity in the block
                    // of its representative; pin counts, connectivity
                    // and gain caches follow atomically.
                    let block = phg.part(group.representative);
                    for memento in group.mementos() {
                        phg.assign_node_part(memento.contracted, block);
                    }

                    // Border vertices seed a localized search under the
                    // still-held locks; the rest release immediately.
                    seeds.clear();
                    for v in group.node_ids() {
                        if phg.is_border_node(v) {
                            seeds.push(v);
                        } else {
                            locks.release(v, group_id);
                        }
                    }
                    if !seeds.is_empty() {
                        fm.find_moves(phg, shared, &seeds, Some(deadline));
                        locks.release_many(seeds.iter().copied(), group_id);
                    }

                    pool.activate_successors(group_id);
                }
            });
        }
    });
    Ok(())
}

/// Walk the hierarchy back up to the finest hypergraph, refining at
/// every level, and return the final assignment with its metrics.
pub fn uncoarsen_and_refine(
    root: &StaticHypergraph,
    hierarchy: CoarseningHierarchy,
    coarse_parts: Vec<PartitionId>,
    ctx: &Context,
) -> Result<(Vec<PartitionId>, Metrics), PartitionError> {
    let mut levels = hierarchy.levels;
    let had_levels = !levels.is_empty();
    let mut parts = coarse_parts;

    while let Some(level) = levels.pop() {
        let finer = levels.last().map(|l| &l.hypergraph).unwrap_or(root);
        parts = refine_level(finer, &level.mapping, &parts, ctx)?;
        // `level` (the coarser hypergraph) is freed here, after the
        // finer level's refinement completed.
    }

    let mut phg = PartitionedHypergraph::new(ctx.partition.k, root);
    for (v, &p) in parts.iter().enumerate() {
        phg.set_only_node_part(v as HypernodeId, p);
    }
    phg.initialize_partition();
    let mut metrics = Metrics::measure(&phg, ctx);
    if !had_levels {
        // Nothing was coarsened; the root still deserves refinement.
        phg.initialize_gain_cache();
        let mut fm = FmRefiner::new(ctx);
        fm.initialize(&phg);
        fm.refine(&phg, &[], &mut metrics)?;
        let mut flow = FlowRefiner::new(ctx);
        flow.initialize(&phg);
        flow.refine(&phg, &[], &mut metrics)?;
        parts = phg.part_ids();
    }
    phg.validate_invariants()?;
    Ok((parts, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coarsening::coarsen;
    use crate::datastructures::HypergraphFactory;
    use crate::parallel::install_with_rng_pool;
    use crate::partition::initial::{BfsInitialPartitioner, InitialPartitioner};

    fn grid(width: u32, height: u32) -> StaticHypergraph {
        let mut edges = Vec::new();
        let id = |x: u32, y: u32| y * width + x;
        for y in 0..height {
            for x in 0..width {
                if x + 1 < width {
                    edges.push(vec![id(x, y), id(x + 1, y)]);
                }
                if y + 1 < height {
                    edges.push(vec![id(x, y), id(x, y + 1)]);
                }
            }
        }
        HypergraphFactory::from_edge_list(width * height, &edges, None, None, true).unwrap()
    }

    #[test]
    fn projects_and_refines_down_to_the_root() {
        let hg = grid(12, 12);
        let mut ctx = Context::default();
        ctx.partition.k = 2;
        ctx.partition.epsilon = 0.25;
        ctx.coarsening.contraction_limit = 24;
        ctx.shared_memory.num_threads = 2;

        install_with_rng_pool(3, 2, || {
            let hierarchy = coarsen(&hg, &ctx).unwrap();
            let coarse_parts = {
                let coarsest = hierarchy.coarsest().unwrap();
                let phg = PartitionedHypergraph::new(2, coarsest);
                BfsInitialPartitioner.partition(&phg, &ctx).unwrap();
                phg.initialize_partition();
                phg.part_ids()
            };
            let (parts, metrics) =
                uncoarsen_and_refine(&hg, hierarchy, coarse_parts, &ctx).unwrap();
            assert_eq!(parts.len(), 144);
            assert!(parts.iter().all(|&p| p < 2));
            // δ tolerance: one max-weight vertex per concurrent search.
            assert!(metrics.imbalance <= ctx.partition.epsilon + 0.05 + 1e-9);
            assert!(metrics.cut > 0, "a 2-way grid split always cuts something");
        });
    }
}
