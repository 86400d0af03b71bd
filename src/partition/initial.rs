//! Initial partitioning of the coarsest hypergraph.
//!
//! The multilevel engine treats the initial partitioner as a black box
//! behind [`InitialPartitioner`]; the provided implementation grows
//! blocks by breadth-first search from random seed vertices until each
//! block reaches its share of the total weight.

use rand::Rng;
use std::collections::VecDeque;

use crate::config::Context;
use crate::datastructures::{HypernodeId, PartitionedHypergraph, INVALID_PART};
use crate::error::PartitionError;
use crate::parallel::with_thread_rng;

/// Contract for the black-box initial partitioner: assign every enabled
/// vertex of `phg` to a block (via `set_only_node_part`); the caller
/// re-initializes the bookkeeping afterwards.
pub trait InitialPartitioner {
    fn partition(
        &mut self,
        phg: &PartitionedHypergraph<'_>,
        ctx: &Context,
    ) -> Result<(), PartitionError>;
}

/// BFS-grown initial partition.
#[derive(Debug, Default)]
pub struct BfsInitialPartitioner;

impl InitialPartitioner for BfsInitialPartitioner {
    fn partition(
        &mut self,
        phg: &PartitionedHypergraph<'_>,
        ctx: &Context,
    ) -> Result<(), PartitionError> {
        let hg = phg.hypergraph();
        let n = hg.initial_num_nodes();
        let k = phg.k();
        let perfect = ctx.perfect_part_weight(hg.total_weight());

        let mut assigned = vec![false; n as usize];
        let mut block_weight = vec![0i64; k as usize];
        let mut unassigned: Vec<HypernodeId> = hg.nodes().collect();

        for b in 0..k {
            let mut queue: VecDeque<HypernodeId> = VecDeque::new();
            while block_weight[b as usize] < perfect {
                let v = match queue.pop_front() {
                    Some(v) => v,
                    None => {
                        // Grab a fresh random start in an untouched
                        // component, if any remains.
                        unassigned.retain(|&u| !assigned[u as usize]);
                        if unassigned.is_empty() {
                            break;
                        }
                        let idx = with_thread_rng(|rng| rng.gen_range(0..unassigned.len()));
                        unassigned.swap_remove(idx)
                    }
                };
                if assigned[v as usize] {
                    continue;
                }
                assigned[v as usize] = true;
                phg.set_only_node_part(v, b);
                block_weight[b as usize] += hg.node_weight(v);
                for &e in hg.incident_edges(v) {
                    for &p in hg.pins(e) {
                        if !assigned[p as usize] {
                            queue.push_back(p);
                        }
                    }
                }
            }
            // The last block sweeps up everything left over.
            if b + 1 == k {
                for v in hg.nodes() {
                    if !assigned[v as usize] {
                        assigned[v as usize] = true;
                        phg.set_only_node_part(v, b);
                        block_weight[b as usize] += hg.node_weight(v);
                    }
                }
            }
        }

        debug_assert!(hg.nodes().all(|v| phg.part(v) != INVALID_PART));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::{HypergraphFactory, PartitionedHypergraph};
    use crate::parallel::install_with_rng_pool;

    #[test]
    fn assigns_every_vertex_within_reasonable_balance() {
        let mut edges = Vec::new();
        for v in 0..63u32 {
            edges.push(vec![v, v + 1]);
        }
        let hg = HypergraphFactory::from_edge_list(64, &edges, None, None, true).unwrap();
        let mut ctx = Context::default();
        ctx.partition.k = 4;
        ctx.partition.epsilon = 0.25;

        install_with_rng_pool(7, 1, || {
            let phg = PartitionedHypergraph::new(4, &hg);
            BfsInitialPartitioner.partition(&phg, &ctx).unwrap();
            phg.initialize_partition();
            for v in 0..64 {
                assert_ne!(phg.part(v), INVALID_PART);
            }
            // BFS growth overshoots a block by at most one vertex on
            // this unit-weight instance.
            let limit = ctx.perfect_part_weight(hg.total_weight()) + 1;
            for b in 0..4 {
                assert!(phg.part_weight(b) <= limit, "block {b} too heavy");
            }
        });
    }
}
