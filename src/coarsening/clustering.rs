//! Heavy-edge clustering.
//!
//! Each pass visits the vertices in a seeded random order and matches
//! every still-unmatched vertex with the neighbor of highest rating
//! `Σ w(e) / (|e| − 1)` over shared edges, subject to the cluster
//! weight cap. Pair commits take both per-vertex locks in ID order, so
//! concurrent proposals never form chains or cycles; losers simply
//! retry in a later pass.

use hashbrown::HashMap;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use crate::datastructures::{
    HypernodeId, NodeLockManager, NodeWeight, StaticHypergraph,
};
use crate::parallel::with_thread_rng;

/// Edges larger than this contribute too little signal per pin to be
/// worth rating.
const MAX_RATED_EDGE_SIZE: u32 = 1000;

/// Compute a clustering `c: V → V`; vertices sharing a cluster value
/// are merged by the subsequent contraction. Cluster centers are their
/// own value, so `c(c(u)) = c(u)` for all enabled `u`.
pub fn heavy_edge_clustering(
    hg: &StaticHypergraph,
    max_cluster_weight: NodeWeight,
    target_num_nodes: u32,
) -> Vec<HypernodeId> {
    let n = hg.initial_num_nodes() as usize;
    let clusters: Vec<AtomicU32> = (0..n).map(|v| AtomicU32::new(v as u32)).collect();
    let cluster_weights: Vec<AtomicI64> = (0..n)
        .map(|v| AtomicI64::new(hg.node_weight(v as u32)))
        .collect();
    let locks = NodeLockManager::new(n);
    let remaining = AtomicU32::new(hg.initial_num_nodes() - hg.num_removed_nodes());

    let mut vertices: Vec<HypernodeId> = hg.nodes().collect();
    const PASSES: usize = 2;
    for _ in 0..PASSES {
        if remaining.load(Ordering::Relaxed) <= target_num_nodes {
            break;
        }
        with_thread_rng(|rng| vertices.shuffle(rng));

        vertices.par_iter().for_each_init(
            HashMap::<HypernodeId, f64>::new,
            |ratings, &u| {
                if remaining.load(Ordering::Relaxed) <= target_num_nodes {
                    return;
                }
                if clusters[u as usize].load(Ordering::Relaxed) != u {
                    return;
                }
                let u_weight = cluster_weights[u as usize].load(Ordering::Relaxed);

                ratings.clear();
                for &e in hg.incident_edges(u) {
                    let size = hg.edge_size(e);
                    if size < 2 || size > MAX_RATED_EDGE_SIZE {
                        continue;
                    }
                    let score = hg.edge_weight(e) as f64 / (size - 1) as f64;
                    for &p in hg.pins(e) {
                        if p != u {
                            *ratings.entry(p).or_insert(0.0) += score;
                        }
                    }
                }

                // Ratings target the neighbor's cluster center.
                let mut best: Option<(f64, HypernodeId)> = None;
                for (&p, &score) in ratings.iter() {
                    let center = clusters[p as usize].load(Ordering::Relaxed);
                    if center == u {
                        continue;
                    }
                    let combined = u_weight + cluster_weights[center as usize].load(Ordering::Relaxed);
                    if combined > max_cluster_weight {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some((bs, bc)) => score > bs || (score == bs && center < bc),
                    };
                    if better {
                        best = Some((score, center));
                    }
                }
                let Some((_, target)) = best else { return };

                // Commit under both locks, smaller ID first.
                let (lo, hi) = if u < target { (u, target) } else { (target, u) };
                let owner = u + 1;
                if !locks.try_acquire(lo, owner) {
                    return;
                }
                if !locks.try_acquire(hi, owner) {
                    locks.release(lo, owner);
                    return;
                }
                // Re-check both are still cluster centers and the cap
                // still holds; a concurrent commit may have beaten us.
                let still_centers = clusters[u as usize].load(Ordering::Relaxed) == u
                    && clusters[target as usize].load(Ordering::Relaxed) == target;
                let combined = cluster_weights[u as usize].load(Ordering::Relaxed)
                    + cluster_weights[target as usize].load(Ordering::Relaxed);
                if still_centers && combined <= max_cluster_weight {
                    let (center, absorbed) = (lo, hi);
                    clusters[absorbed as usize].store(center, Ordering::Relaxed);
                    cluster_weights[center as usize].store(combined, Ordering::Relaxed);
                    remaining.fetch_sub(1, Ordering::Relaxed);
                }
                locks.release(hi, owner);
                locks.release(lo, owner);
            },
        );
    }

    // Flatten one indirection: members joined to an absorbed center
    // follow it to the final center.
    let flat: Vec<HypernodeId> = (0..n)
        .into_par_iter()
        .map(|v| {
            let mut c = clusters[v].load(Ordering::Relaxed);
            loop {
                let cc = clusters[c as usize].load(Ordering::Relaxed);
                if cc == c {
                    break;
                }
                c = cc;
            }
            c
        })
        .collect();
    flat
}
