//! Parallel contraction of a hypergraph under a clustering.
//!
//! Four phases:
//! 1. compactify cluster IDs with an inclusive prefix sum;
//! 2. map pin lists through the clustering, deduplicating in a
//!    thread-local scratch bitset, and fingerprint every surviving edge
//!    with the permutation-invariant hash Σ(v+1)²;
//! 3. eliminate parallel nets: sort fingerprints by `(hash, size, id)`
//!    and, inside each equal-hash run, confirm set equality in a scratch
//!    bitset, folding duplicate weights into the surviving edge;
//! 4. fill the coarse CSR with two prefix sums and atomic degree and
//!    weight aggregation.
//!
//! The total vertex weight is conserved, no coarse edge has fewer than
//! two pins, and no two retained coarse edges share a pin set.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use crate::datastructures::hypergraph::{Hyperedge, Hypernode};
use crate::datastructures::{
    FastResetBitset, HypernodeId, StaticHypergraph, INVALID_NODE,
};
use crate::error::PartitionError;
use crate::parallel::inclusive_prefix_sum;

/// Sort key for parallel-net detection.
#[derive(Debug, Clone, Copy)]
struct Fingerprint {
    hash: u64,
    size: u32,
    he: u32,
    valid: bool,
}

const REMOVED_HASH: u64 = u64::MAX;

fn try_alloc<T>(len: usize, fill: impl Fn() -> T, what: &str) -> Result<Vec<T>, PartitionError> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| PartitionError::Resource(format!("allocating {what} ({len} entries)")))?;
    v.extend((0..len).map(|_| fill()));
    Ok(v)
}

impl StaticHypergraph {
    /// Contract all vertices with equal cluster IDs into one coarse
    /// vertex. Returns the coarse hypergraph and the fine-to-coarse
    /// vertex map (`INVALID_NODE` for disabled fine vertices).
    ///
    /// Non-fatal on allocation failure: surfaces `Resource` so the
    /// caller can retry with a smaller coarsening step.
    pub fn contract(
        &self,
        clusters: &[HypernodeId],
    ) -> Result<(StaticHypergraph, Vec<HypernodeId>), PartitionError> {
        let n = self.num_nodes as usize;
        let m = self.num_edges as usize;
        if clusters.len() != n {
            return Err(PartitionError::InvalidInput(format!(
                "clustering has {} entries for {n} nodes",
                clusters.len()
            )));
        }

        // Phase 1: compactify cluster IDs.
        let mark: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        self.do_parallel_for_all_nodes(|u| {
            mark[clusters[u as usize] as usize].store(1, Ordering::Relaxed);
        });
        let mut mapping: Vec<u32> = mark.into_iter().map(AtomicU32::into_inner).collect();
        let num_coarse = inclusive_prefix_sum(&mut mapping) as usize;
        // Inclusive sum, so the dense ID is the prefix value minus one.
        let coarse_of: Vec<HypernodeId> = (0..n)
            .into_par_iter()
            .map(|u| {
                if self.nodes[u].enabled {
                    mapping[clusters[u] as usize] - 1
                } else {
                    INVALID_NODE
                }
            })
            .collect();

        // Phase 2: contract pin lists and fingerprint them.
        let (pin_lists, mut permutation): (Vec<Vec<HypernodeId>>, Vec<Fingerprint>) = (0..m)
            .into_par_iter()
            .map_init(
                || FastResetBitset::new(num_coarse),
                |seen, he| {
                    let removed = Fingerprint {
                        hash: REMOVED_HASH,
                        size: 0,
                        he: he as u32,
                        valid: false,
                    };
                    if !self.edges[he].enabled {
                        return (Vec::new(), removed);
                    }
                    let mut list: Vec<HypernodeId> =
                        Vec::with_capacity(self.edges[he].size as usize / 2 + 1);
                    for &p in self.pins(he as u32) {
                        let c = coarse_of[p as usize];
                        if c != INVALID_NODE && seen.insert(c as usize) {
                            list.push(c);
                        }
                    }
                    seen.reset();
                    if list.len() > 1 {
                        let hash: u64 = list
                            .iter()
                            .map(|&c| {
                                let x = c as u64 + 1;
                                x.wrapping_mul(x)
                            })
                            .fold(0u64, u64::wrapping_add);
                        let fp = Fingerprint {
                            hash,
                            size: list.len() as u32,
                            he: he as u32,
                            valid: true,
                        };
                        (list, fp)
                    } else {
                        // Single-pin nets disappear in the coarse graph.
                        (Vec::new(), removed)
                    }
                },
            )
            .unzip();

        // Phase 3: parallel-net elimination on equal-hash runs.
        permutation.par_sort_unstable_by_key(|f| (f.hash, f.size, f.he));
        let kept: Vec<AtomicBool> = (0..m).map(|_| AtomicBool::new(false)).collect();
        let merged_weights: Vec<AtomicI64> = (0..m).map(|_| AtomicI64::new(0)).collect();

        let runs = {
            let mut slices: Vec<&mut [Fingerprint]> = Vec::new();
            let mut rest = permutation.as_mut_slice();
            while !rest.is_empty() {
                let hash = rest[0].hash;
                let len = rest.iter().take_while(|f| f.hash == hash).count();
                let (run, tail) = std::mem::take(&mut rest).split_at_mut(len);
                slices.push(run);
                rest = tail;
            }
            slices
        };
        runs.into_par_iter().for_each_init(
            || FastResetBitset::new(num_coarse),
            |scratch, run| {
                for i in 0..run.len() {
                    if !run[i].valid {
                        continue;
                    }
                    let rep = run[i];
                    let rep_pins = &pin_lists[rep.he as usize];
                    for &c in rep_pins {
                        scratch.insert(c as usize);
                    }
                    let mut weight = self.edge_weight(rep.he);
                    for cand in run[i + 1..].iter_mut() {
                        if cand.valid
                            && cand.size == rep.size
                            && pin_lists[cand.he as usize]
                                .iter()
                                .all(|&c| scratch.contains(c as usize))
                        {
                            weight += self.edge_weight(cand.he);
                            cand.valid = false;
                        }
                    }
                    scratch.reset();
                    kept[rep.he as usize].store(true, Ordering::Relaxed);
                    merged_weights[rep.he as usize].store(weight, Ordering::Relaxed);
                }
            },
        );

        // Phase 4: fill the coarse CSR.
        let mut edge_id_map: Vec<u32> = kept
            .iter()
            .map(|k| k.load(Ordering::Relaxed) as u32)
            .collect();
        let num_coarse_edges = inclusive_prefix_sum(&mut edge_id_map) as usize;

        let mut pin_offsets: Vec<usize> = (0..m)
            .map(|he| {
                if kept[he].load(Ordering::Relaxed) {
                    pin_lists[he].len()
                } else {
                    0
                }
            })
            .collect();
        let num_coarse_pins = inclusive_prefix_sum(&mut pin_offsets);

        let coarse_edges: Vec<Hyperedge> = (0..m)
            .into_par_iter()
            .filter_map(|he| {
                if !kept[he].load(Ordering::Relaxed) {
                    return None;
                }
                let size = pin_lists[he].len();
                Some(Hyperedge {
                    begin: pin_offsets[he] - size,
                    size: size as u32,
                    weight: merged_weights[he].load(Ordering::Relaxed),
                    enabled: true,
                })
            })
            .collect();
        debug_assert_eq!(coarse_edges.len(), num_coarse_edges);

        let incidence = try_alloc(num_coarse_pins, || AtomicU32::new(0), "coarse incidence array")?;
        let degrees = try_alloc(num_coarse, || AtomicU32::new(0), "coarse degrees")?;
        (0..m).into_par_iter().for_each(|he| {
            if kept[he].load(Ordering::Relaxed) {
                let begin = pin_offsets[he] - pin_lists[he].len();
                for (i, &c) in pin_lists[he].iter().enumerate() {
                    incidence[begin + i].store(c, Ordering::Relaxed);
                    degrees[c as usize].fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        let incidence_array: Vec<HypernodeId> =
            incidence.into_iter().map(AtomicU32::into_inner).collect();

        let coarse_degrees: Vec<u32> = degrees.iter().map(|d| d.load(Ordering::Relaxed)).collect();
        let mut node_offsets: Vec<usize> =
            coarse_degrees.iter().map(|&d| d as usize).collect();
        let total_degree = inclusive_prefix_sum(&mut node_offsets);
        debug_assert_eq!(total_degree, num_coarse_pins);
        let first_net_entry = |c: usize| node_offsets[c] - coarse_degrees[c] as usize;

        let nets = try_alloc(num_coarse_pins, || AtomicU32::new(0), "coarse incident nets")?;
        let cursors: Vec<AtomicU32> = (0..num_coarse).map(|_| AtomicU32::new(0)).collect();
        coarse_edges.par_iter().enumerate().for_each(|(ce, edge)| {
            for i in 0..edge.size as usize {
                let c = incidence_array[edge.begin + i] as usize;
                let slot = first_net_entry(c) + cursors[c].fetch_add(1, Ordering::Relaxed) as usize;
                nets[slot].store(ce as u32, Ordering::Relaxed);
            }
        });
        let mut incident_nets: Vec<u32> = nets.into_iter().map(AtomicU32::into_inner).collect();

        // Deterministic incident-net order regardless of scheduling.
        {
            let mut slices: Vec<&mut [u32]> = Vec::with_capacity(num_coarse);
            let mut rest: &mut [u32] = &mut incident_nets;
            let mut consumed = 0usize;
            for c in 0..num_coarse {
                let (head, tail) =
                    std::mem::take(&mut rest).split_at_mut(node_offsets[c] - consumed);
                slices.push(head);
                consumed = node_offsets[c];
                rest = tail;
            }
            slices.into_par_iter().for_each(|s| s.sort_unstable());
        }

        // Aggregate coarse vertex weights; communities follow the
        // cluster representative.
        let weights: Vec<AtomicI64> = (0..num_coarse).map(|_| AtomicI64::new(0)).collect();
        let communities: Vec<AtomicU32> = (0..num_coarse).map(|_| AtomicU32::new(0)).collect();
        self.do_parallel_for_all_nodes(|u| {
            let c = coarse_of[u as usize] as usize;
            weights[c].fetch_add(self.node_weight(u), Ordering::Relaxed);
            communities[c].store(self.community_id(clusters[u as usize]), Ordering::Relaxed);
        });

        let coarse_nodes: Vec<Hypernode> = (0..num_coarse)
            .into_par_iter()
            .map(|c| Hypernode {
                begin: first_net_entry(c),
                size: coarse_degrees[c],
                weight: weights[c].load(Ordering::Relaxed),
                enabled: true,
            })
            .collect();

        let max_edge_size = coarse_edges.par_iter().map(|e| e.size).max().unwrap_or(0);

        let chg = StaticHypergraph {
            num_nodes: num_coarse as u32,
            num_edges: num_coarse_edges as u32,
            num_pins: num_coarse_pins,
            num_removed_nodes: 0,
            max_edge_size,
            total_weight: self.total_weight,
            nodes: coarse_nodes,
            incident_nets,
            edges: coarse_edges,
            incidence_array,
            community_ids: communities.into_iter().map(AtomicU32::into_inner).collect(),
        };
        log::debug!(
            "contracted {} -> {} nodes, {} -> {} edges",
            self.num_nodes,
            chg.num_nodes,
            self.num_edges,
            chg.num_edges
        );
        Ok((chg, coarse_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::HypergraphFactory;

    fn toy() -> StaticHypergraph {
        HypergraphFactory::from_edge_list(
            7,
            &[vec![0, 2], vec![0, 1, 3, 4], vec![3, 4, 6], vec![2, 5, 6]],
            None,
            None,
            true,
        )
        .unwrap()
    }

    #[test]
    fn identity_clustering_reproduces_input() {
        let hg = toy();
        let clusters: Vec<u32> = (0..7).collect();
        let (coarse, mapping) = hg.contract(&clusters).unwrap();
        assert_eq!(mapping, clusters);
        assert_eq!(coarse.initial_num_nodes(), hg.initial_num_nodes());
        assert_eq!(coarse.initial_num_edges(), hg.initial_num_edges());
        assert_eq!(coarse.initial_num_pins(), hg.initial_num_pins());
        assert_eq!(coarse.total_weight(), hg.total_weight());
        // Canonical pin orders must agree edge by edge.
        for e in hg.edges() {
            let mut fine: Vec<u32> = hg.pins(e).to_vec();
            let mut coarse_pins: Vec<u32> = coarse.pins(e).to_vec();
            fine.sort_unstable();
            coarse_pins.sort_unstable();
            assert_eq!(fine, coarse_pins);
        }
    }

    #[test]
    fn merges_parallel_nets_and_sums_weights() {
        // Two edges over the same pins with weights 3 and 5 collapse
        // into one edge of weight 8.
        let hg = HypergraphFactory::from_edge_list(
            4,
            &[vec![0, 1, 2], vec![2, 1, 0], vec![2, 3]],
            Some(&[3, 5, 1]),
            None,
            true,
        )
        .unwrap();
        let clusters: Vec<u32> = (0..4).collect();
        let (coarse, _) = hg.contract(&clusters).unwrap();
        assert_eq!(coarse.initial_num_edges(), 2);
        let mut weights: Vec<i64> = coarse.edges().map(|e| coarse.edge_weight(e)).collect();
        weights.sort_unstable();
        assert_eq!(weights, vec![1, 8]);
    }

    #[test]
    fn weight_conserved_and_sizes_at_least_two() {
        let hg = toy();
        // Merge {0,1}, {3,4}, keep the rest.
        let clusters = vec![0, 0, 2, 3, 3, 5, 6];
        let (coarse, mapping) = hg.contract(&clusters).unwrap();
        assert_eq!(coarse.total_weight(), hg.total_weight());
        let coarse_weight_sum: i64 = coarse.nodes().map(|v| coarse.node_weight(v)).sum();
        assert_eq!(coarse_weight_sum, hg.total_weight());
        for e in coarse.edges() {
            assert!(coarse.edge_size(e) >= 2);
        }
        // Pin sets are unique.
        let mut sets: Vec<Vec<u32>> = coarse
            .edges()
            .map(|e| {
                let mut p = coarse.pins(e).to_vec();
                p.sort_unstable();
                p
            })
            .collect();
        sets.sort();
        let before = sets.len();
        sets.dedup();
        assert_eq!(before, sets.len());
        // Mapping is dense.
        let max = *mapping.iter().max().unwrap();
        assert_eq!(max + 1, coarse.initial_num_nodes());
    }

    #[test]
    fn single_pin_edges_disappear() {
        let hg = toy();
        // Collapse {3,4,6} into one vertex; edge 2 becomes single-pin.
        let clusters = vec![0, 1, 2, 3, 3, 5, 3];
        let (coarse, _) = hg.contract(&clusters).unwrap();
        for e in coarse.edges() {
            assert!(coarse.edge_size(e) >= 2);
        }
        assert_eq!(coarse.total_weight(), hg.total_weight());
    }

    #[test]
    fn communities_inherit_from_representative() {
        let mut hg = toy();
        for v in 0..7 {
            hg.set_community_id(v, v + 10);
        }
        let clusters = vec![0, 0, 2, 3, 3, 5, 6];
        let (coarse, mapping) = hg.contract(&clusters).unwrap();
        assert_eq!(coarse.community_id(mapping[0]), 10);
        assert_eq!(coarse.community_id(mapping[3]), 13);
        assert_eq!(coarse.community_id(mapping[5]), 15);
    }
}
