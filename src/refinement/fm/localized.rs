//! One localized k-way FM search.
//!
//! A search claims its seed vertices, grows a frontier through the
//! addressable PQ, and applies moves through the shared partitioned
//! hypergraph. Cached gains are re-validated at pop time; a move that
//! would overfill the target block or races with a concurrent winner is
//! simply skipped. The journal is rolled back to the prefix with the
//! best cumulative gain, and every rolled-back move is invalidated in
//! the shared move log.

use std::time::Instant;

use crate::config::{Context, Objective};
use crate::datastructures::{Gain, HypernodeId, PartitionId, PartitionedHypergraph, INVALID_PART};
use crate::refinement::fm::pq::AddressablePq;
use crate::refinement::fm::shared::{FmSharedData, Move};

/// Edges above this size are not expanded over; their pin lists are too
/// unspecific to seed useful moves.
const MAX_EXPANDED_EDGE_SIZE: u32 = 1000;

/// Outcome of one search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchResult {
    /// Gain of the retained prefix (never negative).
    pub improvement: Gain,
    /// Whether the search stopped because it hit the step budget.
    pub hit_move_budget: bool,
}

/// Reusable search state; one instance per worker thread.
pub struct LocalizedKWayFm {
    objective: Objective,
    max_moves: usize,
    stall_window: usize,
    max_part_weight: i64,
    pq: AddressablePq,
    journal: Vec<(Option<u32>, Move)>,
    claimed: Vec<HypernodeId>,
    search_id: u32,
}

impl LocalizedKWayFm {
    pub fn new(ctx: &Context, max_part_weight: i64) -> Self {
        Self {
            objective: ctx.partition.objective,
            max_moves: ctx.refinement.fm.max_moves,
            stall_window: ctx.refinement.fm.stall_window,
            max_part_weight,
            pq: AddressablePq::new(),
            journal: Vec::new(),
            claimed: Vec::new(),
            search_id: 0,
        }
    }

    /// Best target block and gain for `v`, or `None` when `v` is
    /// unassigned. Blocks that are already over the limit are skipped.
    fn best_move(
        &self,
        phg: &PartitionedHypergraph<'_>,
        v: HypernodeId,
    ) -> Option<(PartitionId, Gain)> {
        let from = phg.part(v);
        if from == INVALID_PART {
            return None;
        }
        let weight = phg.hypergraph().node_weight(v);
        let mut best: Option<(PartitionId, Gain)> = None;
        for to in 0..phg.k() {
            if to == from || phg.part_weight(to) + weight > self.max_part_weight {
                continue;
            }
            let gain = match self.objective {
                Objective::Km1 => phg.km1_gain(v, to),
                Objective::Cut => phg.move_gain(v, to, Objective::Cut),
            };
            let better = match best {
                None => true,
                Some((bt, bg)) => {
                    gain > bg || (gain == bg && phg.part_weight(to) < phg.part_weight(bt))
                }
            };
            if better {
                best = Some((to, gain));
            }
        }
        best
    }

    fn try_queue(&mut self, phg: &PartitionedHypergraph<'_>, shared: &FmSharedData, v: HypernodeId) {
        if self.pq.contains(v) {
            // Already on this search's frontier; the move that led us
            // back here changed its gains, so re-key it in place.
            if let Some((to, gain)) = self.best_move(phg, v) {
                self.pq.adjust(v, to, gain);
            }
            return;
        }
        if !shared.vertex_claims.try_claim(v, self.search_id) {
            return;
        }
        match self.best_move(phg, v) {
            Some((to, gain)) => {
                self.claimed.push(v);
                self.pq.insert(v, to, gain);
            }
            None => shared.vertex_claims.release(v, self.search_id),
        }
    }

    /// Run one localized search from `seeds`. Conflicting or stale
    /// moves are tolerated; the returned improvement is exact for the
    /// moves this search kept.
    pub fn find_moves(
        &mut self,
        phg: &PartitionedHypergraph<'_>,
        shared: &FmSharedData,
        seeds: &[HypernodeId],
        deadline: Option<Instant>,
    ) -> SearchResult {
        self.search_id = shared.next_search_id();
        self.pq.clear();
        self.journal.clear();
        self.claimed.clear();
        let mut result = SearchResult::default();

        for &s in seeds {
            self.try_queue(phg, shared, s);
        }

        let expansion_limit = 4 * self.max_moves.max(16);
        let mut cumulative: Gain = 0;
        let mut best_gain: Gain = 0;
        let mut best_len: usize = 0;
        let mut moves_since_best: usize = 0;

        while let Some((v, to, cached_gain)) = self.pq.pop() {
            if self.journal.len() >= self.max_moves {
                result.hit_move_budget = true;
                break;
            }
            if moves_since_best >= self.stall_window {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }

            // Re-validate against live pin counts; concurrent searches
            // may have invalidated the cached key.
            let Some((fresh_to, fresh_gain)) = self.best_move(phg, v) else {
                continue;
            };
            if fresh_gain < cached_gain || fresh_to != to {
                self.pq.insert(v, fresh_to, fresh_gain);
                continue;
            }

            let from = phg.part(v);
            if !phg.change_node_part(v, from, to, self.max_part_weight, |_, _, _, _, _| {}) {
                // Lost a race or the block filled up; skip this vertex
                // for now, it may come back through a neighbor.
                continue;
            }
            let mv = Move { node: v, from, to, gain: fresh_gain };
            let move_id = shared.move_tracker.append(mv);
            self.journal.push((move_id, mv));
            cumulative += fresh_gain;
            if cumulative > best_gain {
                best_gain = cumulative;
                best_len = self.journal.len();
                moves_since_best = 0;
            } else {
                moves_since_best += 1;
            }
            if move_id.is_none() {
                // Shared log exhausted; stop expanding this search.
                break;
            }

            if self.pq.len() < expansion_limit {
                for &e in phg.hypergraph().incident_edges(v) {
                    if phg.hypergraph().edge_size(e) > MAX_EXPANDED_EDGE_SIZE {
                        continue;
                    }
                    for &p in phg.hypergraph().pins(e) {
                        if p != v {
                            self.try_queue(phg, shared, p);
                        }
                    }
                }
            }
        }

        // Roll back to the best prefix; a non-positive best gain
        // reverts the whole journal.
        for (move_id, mv) in self.journal.drain(best_len..).rev() {
            let reverted =
                phg.change_node_part(mv.node, mv.to, mv.from, i64::MAX, |_, _, _, _, _| {});
            debug_assert!(reverted, "rollback moves must not fail");
            if let Some(id) = move_id {
                shared.move_tracker.invalidate(id);
            }
        }

        for &v in &self.claimed {
            shared.vertex_claims.release(v, self.search_id);
        }
        self.claimed.clear();

        result.improvement = best_gain;
        result
    }
}

/// Index after the prefix with maximal cumulative gain, and that gain.
/// Everything past the returned length is rolled back.
pub(crate) fn best_prefix(gains: &[Gain]) -> (usize, Gain) {
    let mut best = (0usize, 0i64);
    let mut cumulative = 0i64;
    for (i, &g) in gains.iter().enumerate() {
        cumulative += g;
        if cumulative > best.1 {
            best = (i + 1, cumulative);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::{HypergraphFactory, StaticHypergraph};

    #[test]
    fn best_prefix_of_documented_sequence() {
        // Partial sums +3, +4, 0, +2: the best prefix ends after the
        // second move with cumulative gain 4.
        let (len, gain) = best_prefix(&[3, 1, -4, 2]);
        assert_eq!(len, 2);
        assert_eq!(gain, 4);
    }

    #[test]
    fn best_prefix_of_all_negative_sequence_is_empty() {
        let (len, gain) = best_prefix(&[-1, -2, -3]);
        assert_eq!(len, 0);
        assert_eq!(gain, 0);
    }

    fn two_cluster_graph() -> StaticHypergraph {
        // Two dense clusters {0..3} and {4..7} joined by one edge; the
        // initial partition cuts both clusters in half.
        HypergraphFactory::from_edge_list(
            8,
            &[
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3],
                vec![4, 5],
                vec![4, 6],
                vec![4, 7],
                vec![5, 6],
                vec![5, 7],
                vec![6, 7],
                vec![3, 4],
            ],
            None,
            None,
            true,
        )
        .unwrap()
    }

    #[test]
    fn search_improves_a_bad_bisection() {
        let hg = two_cluster_graph();
        let mut phg = PartitionedHypergraph::new(2, &hg);
        // Worst-case split: odd vertices left, even vertices right.
        for v in 0..8 {
            phg.set_only_node_part(v, v % 2);
        }
        phg.initialize_partition();
        phg.initialize_gain_cache();

        let mut ctx = Context::default();
        ctx.partition.k = 2;
        ctx.partition.epsilon = 0.1;
        let shared = FmSharedData::new(8);
        let before = crate::partition::metrics::km1(&phg);

        let mut fm = LocalizedKWayFm::new(&ctx, ctx.max_part_weight(hg.total_weight()));
        let seeds: Vec<u32> = (0..8).collect();
        let result = fm.find_moves(&phg, &shared, &seeds, None);

        let after = crate::partition::metrics::km1(&phg);
        assert_eq!(before - after, result.improvement);
        assert!(after < before, "search must improve km1 ({before} -> {after})");
        phg.validate_invariants().unwrap();
    }

    #[test]
    fn logged_gains_match_objective_delta() {
        let hg = two_cluster_graph();
        let mut phg = PartitionedHypergraph::new(2, &hg);
        for v in 0..8 {
            phg.set_only_node_part(v, v % 2);
        }
        phg.initialize_partition();
        phg.initialize_gain_cache();

        let mut ctx = Context::default();
        ctx.partition.k = 2;
        let shared = FmSharedData::new(8);
        let before = crate::partition::metrics::km1(&phg);
        let mut fm = LocalizedKWayFm::new(&ctx, ctx.max_part_weight(hg.total_weight()));
        fm.find_moves(&phg, &shared, &(0..8).collect::<Vec<_>>(), None);

        // Valid log entries (skipping rolled-back moves) sum to the
        // observed objective delta.
        let mut accumulated = 0i64;
        for id in 0..shared.move_tracker.num_performed_moves() {
            if shared.move_tracker.is_valid(id) {
                accumulated += shared.move_tracker.get(id).gain;
            }
        }
        let after = crate::partition::metrics::km1(&phg);
        assert_eq!(after, before - accumulated);
    }

    #[test]
    fn all_claims_released_after_search() {
        let hg = two_cluster_graph();
        let mut phg = PartitionedHypergraph::new(2, &hg);
        for v in 0..8 {
            phg.set_only_node_part(v, v % 2);
        }
        phg.initialize_partition();
        phg.initialize_gain_cache();
        let ctx = Context::default();
        let shared = FmSharedData::new(8);
        let mut fm = LocalizedKWayFm::new(&ctx, ctx.max_part_weight(hg.total_weight()));
        fm.find_moves(&phg, &shared, &[0, 1, 2], None);
        // Every vertex must be claimable again by a fresh search.
        for v in 0..8 {
            assert!(shared.vertex_claims.try_claim(v, 99));
        }
    }
}
