//! Partitioned hypergraph: a block assignment layered over the immutable
//! CSR store.
//!
//! Maintains, under concurrent mutation:
//! * the block of every vertex (atomic; `INVALID_PART` = unassigned),
//! * per-block total weights,
//! * per-edge per-block pin counts,
//! * per-edge connectivity bitmaps (one bit per block with pins).
//!
//! All mutation funnels through [`PartitionedHypergraph::change_node_part`]
//! (linearizable per vertex: when two threads race on the same vertex,
//! exactly one CAS wins) and
//! [`PartitionedHypergraph::assign_node_part`], which brings a previously
//! unassigned vertex into a block during uncontraction. Both keep the
//! gain cache current through the same delta rules.

use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::config::Objective;
use crate::datastructures::gain_cache::GainCache;
use crate::datastructures::{
    EdgeWeight, Gain, HyperedgeId, HypernodeId, NodeWeight, PartitionId, StaticHypergraph,
    INVALID_PART,
};

/// Block assignment plus incidence bookkeeping over a hypergraph.
pub struct PartitionedHypergraph<'a> {
    hg: &'a StaticHypergraph,
    k: PartitionId,
    parts: Vec<AtomicU32>,
    part_weights: Vec<AtomicI64>,
    /// Flattened `e * k + b`.
    pin_counts: Vec<AtomicU32>,
    /// Flattened `e * words_per_edge + w`; bit `b` set iff block `b`
    /// has pins in the edge.
    connectivity_bits: Vec<AtomicU64>,
    words_per_edge: usize,
    gain: GainCache,
}

impl<'a> PartitionedHypergraph<'a> {
    pub fn new(k: PartitionId, hg: &'a StaticHypergraph) -> Self {
        let n = hg.initial_num_nodes() as usize;
        let m = hg.initial_num_edges() as usize;
        let words_per_edge = (k as usize).div_ceil(64);
        Self {
            hg,
            k,
            parts: (0..n).map(|_| AtomicU32::new(INVALID_PART)).collect(),
            part_weights: (0..k as usize).map(|_| AtomicI64::new(0)).collect(),
            pin_counts: (0..m * k as usize).map(|_| AtomicU32::new(0)).collect(),
            connectivity_bits: (0..m * words_per_edge).map(|_| AtomicU64::new(0)).collect(),
            words_per_edge,
            gain: GainCache::new(),
        }
    }

    #[inline]
    pub fn k(&self) -> PartitionId {
        self.k
    }

    #[inline]
    pub fn hypergraph(&self) -> &StaticHypergraph {
        self.hg
    }

    #[inline]
    pub fn part(&self, v: HypernodeId) -> PartitionId {
        self.parts[v as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn part_weight(&self, b: PartitionId) -> NodeWeight {
        self.part_weights[b as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pin_count_in_part(&self, e: HyperedgeId, b: PartitionId) -> u32 {
        self.pin_counts[e as usize * self.k as usize + b as usize].load(Ordering::Relaxed)
    }

    /// Number of distinct blocks with pins in `e`.
    pub fn connectivity(&self, e: HyperedgeId) -> u32 {
        let base = e as usize * self.words_per_edge;
        self.connectivity_bits[base..base + self.words_per_edge]
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones())
            .sum()
    }

    /// Blocks with pins in `e`, ascending.
    pub fn connectivity_set(&self, e: HyperedgeId) -> impl Iterator<Item = PartitionId> + '_ {
        let base = e as usize * self.words_per_edge;
        let words = self.words_per_edge;
        (0..words).flat_map(move |wi| {
            let mut word = self.connectivity_bits[base + wi].load(Ordering::Relaxed);
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros();
                word &= word - 1;
                Some((wi * 64) as PartitionId + bit)
            })
        })
    }

    /// A vertex is a border node if it touches a cut edge.
    pub fn is_border_node(&self, v: HypernodeId) -> bool {
        self.hg
            .incident_edges(v)
            .iter()
            .any(|&e| self.connectivity(e) > 1)
    }

    /// Set the block without any bookkeeping. Used to seed an
    /// assignment before [`Self::initialize_partition`].
    pub fn set_only_node_part(&self, v: HypernodeId, b: PartitionId) {
        self.parts[v as usize].store(b, Ordering::Relaxed);
    }

    /// Recompute part weights, pin counts and connectivity bitmaps from
    /// the current assignment. Unassigned vertices contribute nothing.
    pub fn initialize_partition(&self) {
        self.pin_counts
            .par_iter()
            .for_each(|c| c.store(0, Ordering::Relaxed));
        self.connectivity_bits
            .par_iter()
            .for_each(|w| w.store(0, Ordering::Relaxed));
        self.part_weights
            .iter()
            .for_each(|w| w.store(0, Ordering::Relaxed));

        self.hg.do_parallel_for_all_nodes(|v| {
            let p = self.part(v);
            if p != INVALID_PART {
                self.part_weights[p as usize].fetch_add(self.hg.node_weight(v), Ordering::Relaxed);
            }
        });
        self.hg.do_parallel_for_all_edges(|e| {
            let base = e as usize * self.k as usize;
            for &pin in self.hg.pins(e) {
                let p = self.part(pin);
                if p != INVALID_PART {
                    self.pin_counts[base + p as usize].fetch_add(1, Ordering::Relaxed);
                }
            }
            let word_base = e as usize * self.words_per_edge;
            for b in 0..self.k {
                if self.pin_counts[base + b as usize].load(Ordering::Relaxed) > 0 {
                    self.connectivity_bits[word_base + b as usize / 64]
                        .fetch_or(1u64 << (b % 64), Ordering::Relaxed);
                }
            }
        });
    }

    /// Size the gain cache and fill it from the current pin counts.
    pub fn initialize_gain_cache(&mut self) {
        let n = self.hg.initial_num_nodes() as usize;
        let k = self.k as usize;
        self.gain.allocate(n, k);
        let this: &Self = self;
        this.hg.do_parallel_for_all_nodes(|v| {
            if this.part(v) != INVALID_PART {
                this.recompute_gain_cache_entry(v);
            }
        });
    }

    #[inline]
    pub fn gain_cache_active(&self) -> bool {
        self.gain.is_active()
    }

    /// Cached km1 gain of moving `v` to `to`; falls back to a live
    /// recomputation when the cache is inactive.
    pub fn km1_gain(&self, v: HypernodeId, to: PartitionId) -> Gain {
        if self.gain.is_active() {
            self.gain.gain(v, to)
        } else {
            self.move_gain(v, to, Objective::Km1)
        }
    }

    /// Live gain recomputation from pin counts.
    pub fn move_gain(&self, v: HypernodeId, to: PartitionId, objective: Objective) -> Gain {
        let from = self.part(v);
        debug_assert_ne!(from, INVALID_PART);
        let mut g: Gain = 0;
        for &e in self.hg.incident_edges(v) {
            let w = self.hg.edge_weight(e);
            let pcf = self.pin_count_in_part(e, from);
            let pct = self.pin_count_in_part(e, to);
            match objective {
                Objective::Km1 => {
                    g += w * ((pcf == 1) as Gain - (pct == 0) as Gain);
                }
                Objective::Cut => {
                    let lambda = self.connectivity(e);
                    let lambda_after = lambda - (pcf == 1) as u32 + (pct == 0) as u32;
                    g += w * ((lambda > 1) as Gain - (lambda_after > 1) as Gain);
                }
            }
        }
        g
    }

    /// Atomically move `v` from `from` to `to` if the target block's
    /// weight stays within `max_weight_to`.
    ///
    /// Returns `false` without side effects when the balance would be
    /// violated or another thread won the race on `v`. On success the
    /// pin counts, connectivity bitmaps and gain cache are updated and
    /// `delta` is invoked once per incident edge with
    /// `(edge, edge_weight, edge_size, pins_in_from_after,
    /// pins_in_to_after)`.
    pub fn change_node_part<F>(
        &self,
        v: HypernodeId,
        from: PartitionId,
        to: PartitionId,
        max_weight_to: NodeWeight,
        mut delta: F,
    ) -> bool
    where
        F: FnMut(HyperedgeId, EdgeWeight, u32, u32, u32),
    {
        debug_assert_ne!(from, to);
        let nw = self.hg.node_weight(v);

        // Reserve the weight first so a winning CAS never overfills.
        let to_weights = &self.part_weights[to as usize];
        let mut current = to_weights.load(Ordering::Relaxed);
        loop {
            if current + nw > max_weight_to {
                return false;
            }
            match to_weights.compare_exchange_weak(
                current,
                current + nw,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if self.parts[v as usize]
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            to_weights.fetch_sub(nw, Ordering::Relaxed);
            return false;
        }
        self.part_weights[from as usize].fetch_sub(nw, Ordering::Relaxed);

        for &e in self.hg.incident_edges(v) {
            let base = e as usize * self.k as usize;
            let pcf = self.pin_counts[base + from as usize].fetch_sub(1, Ordering::AcqRel) - 1;
            let pct = self.pin_counts[base + to as usize].fetch_add(1, Ordering::AcqRel) + 1;
            let word_base = e as usize * self.words_per_edge;
            if pcf == 0 {
                // This thread performed the decrement to zero, so it is
                // the single writer clearing the bit.
                self.connectivity_bits[word_base + from as usize / 64]
                    .fetch_and(!(1u64 << (from % 64)), Ordering::AcqRel);
            }
            if pct == 1 {
                self.connectivity_bits[word_base + to as usize / 64]
                    .fetch_or(1u64 << (to % 64), Ordering::AcqRel);
            }
            if self.gain.is_active() {
                self.update_gain_cache_for_edge(e, v, from, to, pcf, pct);
            }
            delta(e, self.hg.edge_weight(e), self.hg.edge_size(e), pcf, pct);
        }
        if self.gain.is_active() {
            self.recompute_benefit(v);
        }
        true
    }

    /// Bring an unassigned vertex into block `to` during uncontraction.
    /// Pin counts, connectivity and the gain cache are updated; the
    /// vertex's own cache rows are recomputed from scratch.
    pub fn assign_node_part(&self, v: HypernodeId, to: PartitionId) {
        let prev = self.parts[v as usize].swap(to, Ordering::AcqRel);
        debug_assert_eq!(prev, INVALID_PART, "assign_node_part on an assigned vertex");
        self.part_weights[to as usize].fetch_add(self.hg.node_weight(v), Ordering::Relaxed);
        for &e in self.hg.incident_edges(v) {
            let base = e as usize * self.k as usize;
            let pct = self.pin_counts[base + to as usize].fetch_add(1, Ordering::AcqRel) + 1;
            if pct == 1 {
                self.connectivity_bits[e as usize * self.words_per_edge + to as usize / 64]
                    .fetch_or(1u64 << (to % 64), Ordering::AcqRel);
            }
            if self.gain.is_active() {
                let w = self.hg.edge_weight(e);
                if pct == 1 {
                    for &p in self.hg.pins(e) {
                        if p != v && self.part(p) != INVALID_PART {
                            self.gain.add_penalty(p, to, -w);
                        }
                    }
                } else if pct == 2 {
                    for &p in self.hg.pins(e) {
                        if p != v && self.part(p) == to {
                            self.gain.add_benefit(p, -w);
                            break;
                        }
                    }
                }
            }
        }
        if self.gain.is_active() {
            self.recompute_gain_cache_entry(v);
        }
    }

    /// km1 delta rules for one edge after the counts were updated.
    fn update_gain_cache_for_edge(
        &self,
        e: HyperedgeId,
        mover: HypernodeId,
        from: PartitionId,
        to: PartitionId,
        pins_in_from_after: u32,
        pins_in_to_after: u32,
    ) {
        let w = self.hg.edge_weight(e);
        if pins_in_from_after == 1 {
            // The remaining pin in `from` now leaves it for free.
            for &p in self.hg.pins(e) {
                if p != mover && self.part(p) == from {
                    self.gain.add_benefit(p, w);
                    break;
                }
            }
        }
        if pins_in_from_after == 0 {
            // `from` dropped out of the edge: entering it costs again.
            for &p in self.hg.pins(e) {
                if self.part(p) != INVALID_PART {
                    self.gain.add_penalty(p, from, w);
                }
            }
        }
        if pins_in_to_after == 1 {
            // `to` joined the edge: entering it is now free.
            for &p in self.hg.pins(e) {
                if self.part(p) != INVALID_PART {
                    self.gain.add_penalty(p, to, -w);
                }
            }
        }
        if pins_in_to_after == 2 {
            for &p in self.hg.pins(e) {
                if p != mover && self.part(p) == to {
                    self.gain.add_benefit(p, -w);
                    break;
                }
            }
        }
    }

    /// Recompute `benefit(v)` from live pin counts.
    fn recompute_benefit(&self, v: HypernodeId) {
        let p = self.part(v);
        if p == INVALID_PART {
            return;
        }
        let mut benefit: Gain = 0;
        for &e in self.hg.incident_edges(v) {
            if self.pin_count_in_part(e, p) == 1 {
                benefit += self.hg.edge_weight(e);
            }
        }
        self.gain.set_benefit(v, benefit);
    }

    /// Recompute all cache rows of `v` from live pin counts.
    fn recompute_gain_cache_entry(&self, v: HypernodeId) {
        self.recompute_benefit(v);
        for b in 0..self.k {
            let mut penalty: Gain = 0;
            for &e in self.hg.incident_edges(v) {
                if self.pin_count_in_part(e, b) == 0 {
                    penalty += self.hg.edge_weight(e);
                }
            }
            self.gain.set_penalty(v, b, penalty);
        }
    }

    /// Extract the assignment as a plain vector.
    pub fn part_ids(&self) -> Vec<PartitionId> {
        self.parts
            .iter()
            .map(|p| p.load(Ordering::Relaxed))
            .collect()
    }

    /// Debug validation of the §8 counting invariants.
    pub fn validate_invariants(&self) -> Result<(), crate::error::PartitionError> {
        for e in self.hg.edges() {
            let assigned = self
                .hg
                .pins(e)
                .iter()
                .filter(|&&p| self.part(p) != INVALID_PART)
                .count() as u32;
            let sum: u32 = (0..self.k).map(|b| self.pin_count_in_part(e, b)).sum();
            if sum != assigned {
                return Err(crate::error::PartitionError::InvariantViolation(format!(
                    "edge {e}: pin counts sum to {sum}, expected {assigned}"
                )));
            }
            let lambda = (0..self.k).filter(|&b| self.pin_count_in_part(e, b) > 0).count() as u32;
            if lambda != self.connectivity(e) {
                return Err(crate::error::PartitionError::InvariantViolation(format!(
                    "edge {e}: connectivity bitmap {} vs pin counts {lambda}",
                    self.connectivity(e)
                )));
            }
        }
        Ok(())
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

    fn bisected(hg: &StaticHypergraph) -> PartitionedHypergraph<'_> {
        let phg = PartitionedHypergraph::new(2, hg);
        for v in 0..7 {
            phg.set_only_node_part(v, if v < 4 { 0 } else { 1 });
        }
        phg.initialize_partition();
        phg
    }

    #[test]
    fn pin_counts_and_connectivity() {
        let hg = toy();
        let phg = bisected(&hg);
        // Edge 1 = {0,1,3,4}: three pins in block 0, one in block 1.
        assert_eq!(phg.pin_count_in_part(1, 0), 3);
        assert_eq!(phg.pin_count_in_part(1, 1), 1);
        assert_eq!(phg.connectivity(1), 2);
        assert_eq!(phg.connectivity_set(1).collect::<Vec<_>>(), vec![0, 1]);
        // Edge 0 = {0,2} entirely in block 0.
        assert_eq!(phg.connectivity(0), 1);
        assert_eq!(phg.part_weight(0), 4);
        assert_eq!(phg.part_weight(1), 3);
        phg.validate_invariants().unwrap();
    }

    #[test]
    fn change_node_part_moves_bookkeeping() {
        let hg = toy();
        let phg = bisected(&hg);
        assert!(phg.change_node_part(3, 0, 1, i64::MAX, |_, _, _, _, _| {}));
        assert_eq!(phg.part(3), 1);
        assert_eq!(phg.part_weight(0), 3);
        assert_eq!(phg.part_weight(1), 4);
        assert_eq!(phg.pin_count_in_part(1, 0), 2);
        assert_eq!(phg.pin_count_in_part(1, 1), 2);
        // Edge 2 = {3,4,6} is now entirely in block 1.
        assert_eq!(phg.connectivity(2), 1);
        phg.validate_invariants().unwrap();
    }

    #[test]
    fn change_node_part_respects_weight_limit() {
        let hg = toy();
        let phg = bisected(&hg);
        // Block 1 holds weight 3; a limit of 3 forbids any move into it.
        assert!(!phg.change_node_part(3, 0, 1, 3, |_, _, _, _, _| {}));
        assert_eq!(phg.part(3), 0);
        assert_eq!(phg.part_weight(1), 3);
        phg.validate_invariants().unwrap();
    }

    #[test]
    fn change_node_part_single_winner() {
        let hg = toy();
        let phg = bisected(&hg);
        // Second attempt with a stale `from` loses the race.
        assert!(phg.change_node_part(3, 0, 1, i64::MAX, |_, _, _, _, _| {}));
        assert!(!phg.change_node_part(3, 0, 1, i64::MAX, |_, _, _, _, _| {}));
    }

    #[test]
    fn gain_cache_matches_recompute_after_moves() {
        let hg = toy();
        let mut phg = bisected(&hg);
        phg.initialize_gain_cache();
        for v in 0..7u32 {
            for b in 0..2u32 {
                if b != phg.part(v) {
                    assert_eq!(
                        phg.km1_gain(v, b),
                        phg.move_gain(v, b, Objective::Km1),
                        "initial cache wrong for v={v} b={b}"
                    );
                }
            }
        }
        assert!(phg.change_node_part(3, 0, 1, i64::MAX, |_, _, _, _, _| {}));
        assert!(phg.change_node_part(6, 1, 0, i64::MAX, |_, _, _, _, _| {}));
        for v in 0..7u32 {
            for b in 0..2u32 {
                if b != phg.part(v) {
                    assert_eq!(
                        phg.km1_gain(v, b),
                        phg.move_gain(v, b, Objective::Km1),
                        "cache drifted for v={v} b={b}"
                    );
                }
            }
        }
    }

    #[test]
    fn assign_node_part_completes_partial_assignment() {
        let hg = toy();
        let phg = PartitionedHypergraph::new(2, &hg);
        for v in [0u32, 1, 2, 3] {
            phg.set_only_node_part(v, 0);
        }
        phg.initialize_partition();
        assert_eq!(phg.pin_count_in_part(2, 1), 0);
        phg.assign_node_part(4, 1);
        phg.assign_node_part(5, 1);
        phg.assign_node_part(6, 1);
        assert_eq!(phg.part_weight(1), 3);
        assert_eq!(phg.pin_count_in_part(2, 1), 2);
        phg.validate_invariants().unwrap();
    }

    #[test]
    fn cut_gain_recompute() {
        let hg = toy();
        let phg = bisected(&hg);
        // Moving 6 to block 0 makes edge {3,4,6} cut both ways; compute
        // by definition and compare.
        let before: i64 = hg
            .edges()
            .filter(|&e| phg.connectivity(e) > 1)
            .map(|e| hg.edge_weight(e))
            .sum();
        let g = phg.move_gain(6, 0, Objective::Cut);
        assert!(phg.change_node_part(6, 1, 0, i64::MAX, |_, _, _, _, _| {}));
        let after: i64 = hg
            .edges()
            .filter(|&e| phg.connectivity(e) > 1)
            .map(|e| hg.edge_weight(e))
            .sum();
        assert_eq!(before - after, g);
    }
}
