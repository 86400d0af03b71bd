//! Quotient graph over the blocks, with lazily compacted cut-edge bags
//! and the block-weight reservation table.
//!
//! Each unordered block pair `(b0, b1)` with `b0 < b1` carries the bag
//! of hyperedges cut between the two blocks. Bags are refreshed lazily:
//! entries whose edge no longer touches both blocks are swap-popped on
//! demand, and an entry missed because of a concurrent move is tolerated
//! and picked up on the next visit.

use parking_lot::{Mutex, RwLock};

use crate::datastructures::{
    FastResetBitset, HyperedgeId, NodeWeight, PartitionId, PartitionedHypergraph,
};

/// Unordered block pair with `b0 < b1`.
pub type BlockPair = (PartitionId, PartitionId);

/// Cut-edge bags per block pair.
pub struct QuotientGraph {
    k: PartitionId,
    /// Flattened upper triangle, indexed `b0 * k + b1`.
    pair_cut_edges: Vec<Mutex<Vec<HyperedgeId>>>,
}

impl QuotientGraph {
    #[inline]
    fn pair_index(&self, b0: PartitionId, b1: PartitionId) -> usize {
        debug_assert!(b0 < b1);
        b0 as usize * self.k as usize + b1 as usize
    }

    /// Build the quotient graph from the current connectivity sets.
    pub fn build(phg: &PartitionedHypergraph<'_>) -> Self {
        let k = phg.k();
        let qg = QuotientGraph {
            k,
            pair_cut_edges: (0..k as usize * k as usize)
                .map(|_| Mutex::new(Vec::new()))
                .collect(),
        };
        phg.hypergraph().do_parallel_for_all_edges(|e| {
            if phg.connectivity(e) > 1 {
                let blocks: Vec<PartitionId> = phg.connectivity_set(e).collect();
                for (i, &b0) in blocks.iter().enumerate() {
                    for &b1 in &blocks[i + 1..] {
                        qg.pair_cut_edges[qg.pair_index(b0, b1)].lock().push(e);
                    }
                }
            }
        });
        qg
    }

    /// Every pair that currently carries at least one (possibly stale)
    /// cut edge.
    pub fn block_pairs(&self) -> Vec<BlockPair> {
        let mut pairs = Vec::new();
        for b0 in 0..self.k {
            for b1 in b0 + 1..self.k {
                if !self.pair_cut_edges[self.pair_index(b0, b1)].lock().is_empty() {
                    pairs.push((b0, b1));
                }
            }
        }
        pairs
    }

    /// Snapshot of the pair's cut edges after compaction: stale and
    /// duplicate entries are swap-popped under the bag's lock.
    pub fn block_pair_cut_hyperedges(
        &self,
        phg: &PartitionedHypergraph<'_>,
        b0: PartitionId,
        b1: PartitionId,
    ) -> Vec<HyperedgeId> {
        let mut bag = self.pair_cut_edges[self.pair_index(b0, b1)].lock();
        let mut seen = FastResetBitset::new(phg.hypergraph().initial_num_edges() as usize);
        let mut i = 0;
        while i < bag.len() {
            let e = bag[i];
            let stale = phg.pin_count_in_part(e, b0) == 0
                || phg.pin_count_in_part(e, b1) == 0
                || seen.contains(e as usize);
            if stale {
                bag.swap_remove(i);
            } else {
                seen.insert(e as usize);
                i += 1;
            }
        }
        bag.clone()
    }

    /// Move a vertex through the partitioned hypergraph and register
    /// newly cut hyperedges with the affected pairs. A registration
    /// missed under concurrency is tolerated; the bag catches the edge
    /// on a later rebuild.
    pub fn change_node_part(
        &self,
        phg: &PartitionedHypergraph<'_>,
        v: crate::datastructures::HypernodeId,
        from: PartitionId,
        to: PartitionId,
        max_weight_to: NodeWeight,
    ) -> bool {
        if !phg.change_node_part(v, from, to, max_weight_to, |_, _, _, _, _| {}) {
            return false;
        }
        for &e in phg.hypergraph().incident_edges(v) {
            if phg.pin_count_in_part(e, to) == 1 {
                for other in phg.connectivity_set(e) {
                    if other != to {
                        let (lo, hi) = if to < other { (to, other) } else { (other, to) };
                        self.pair_cut_edges[self.pair_index(lo, hi)].lock().push(e);
                    }
                }
            }
        }
        true
    }
}

/// Block-weight reservation table.
///
/// A flow search acquires the weight of the vertices it holds from both
/// of its blocks so concurrent searches on other pairs reason about
/// balance without seeing the held weight twice. Row `b` is guarded by
/// a per-block reader/writer lock; `row[b]` is the block's unreserved
/// weight and `row[other]` the slice booked against `other`.
pub struct BlockWeightTable {
    rows: Vec<RwLock<Vec<NodeWeight>>>,
}

impl BlockWeightTable {
    pub fn new(phg: &PartitionedHypergraph<'_>) -> Self {
        let k = phg.k() as usize;
        Self {
            rows: (0..k)
                .map(|b| {
                    let mut row = vec![0; k];
                    row[b] = phg.part_weight(b as PartitionId);
                    RwLock::new(row)
                })
                .collect(),
        }
    }

    /// Book `amount` of `target`'s weight against `other`.
    pub fn acquire(&self, target: PartitionId, other: PartitionId, amount: NodeWeight) {
        let mut row = self.rows[target as usize].write();
        row[other as usize] += amount;
        row[target as usize] -= amount;
    }

    /// Return a previously booked slice.
    pub fn release(&self, target: PartitionId, other: PartitionId, amount: NodeWeight) {
        let mut row = self.rows[target as usize].write();
        row[other as usize] -= amount;
        row[target as usize] += amount;
    }

    /// Weight of `block` visible to a search paired with `other`: all
    /// slices except the one booked against `other`.
    pub fn get_not_acquired_weight(&self, block: PartitionId, other: PartitionId) -> NodeWeight {
        let row = self.rows[block as usize].read();
        row.iter()
            .enumerate()
            .filter(|&(i, _)| i != other as usize)
            .map(|(_, &w)| w)
            .sum()
    }

    /// Transfer `amount` between the unreserved weights of two blocks
    /// after a search committed its moves.
    pub fn commit_transfer(&self, from: PartitionId, to: PartitionId, amount: NodeWeight) {
        if amount == 0 {
            return;
        }
        self.rows[from as usize].write()[from as usize] -= amount;
        self.rows[to as usize].write()[to as usize] += amount;
    }
}
