//! Block-pair schedulers for the flow phase.
//!
//! The matching scheduler greedily matches pairs on unlocked blocks; a
//! block participates in at most one running refinement at a time, and
//! a finishing task feeds the next eligible pair under the scheduler
//! mutex. The optimistic scheduler lets a block participate in several
//! refinements at once: it tracks `tasks_on_block` counters, always
//! hands out the round edge minimizing the larger counter, and prevents
//! two overlapping searches from touching the same vertex with a
//! per-vertex CAS reservation slot storing `b0·k + b1`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::FlowAlgorithm;
use crate::datastructures::{HypernodeId, PartitionId};
use crate::refinement::flow::quotient::BlockPair;

const FREE_SLOT: u32 = 0;

struct ScheduleState {
    round_edges: Vec<BlockPair>,
    locked_blocks: Vec<bool>,
    tasks_on_block: Vec<u32>,
}

/// Hands out block pairs for one flow round.
pub struct FlowScheduler {
    kind: FlowAlgorithm,
    k: PartitionId,
    num_threads: usize,
    state: Mutex<ScheduleState>,
    active_blocks: Vec<AtomicBool>,
    /// Optimistic per-vertex reservation slots; 0 when free, otherwise
    /// `b0 · k + b1` of the holding search (always nonzero for b0 < b1).
    node_slots: Vec<AtomicU32>,
}

impl FlowScheduler {
    pub fn new(kind: FlowAlgorithm, k: PartitionId, num_nodes: usize, num_threads: usize) -> Self {
        Self {
            kind,
            k,
            num_threads: num_threads.max(1),
            state: Mutex::new(ScheduleState {
                round_edges: Vec::new(),
                locked_blocks: vec![false; k as usize],
                tasks_on_block: vec![0; k as usize],
            }),
            // All blocks are active before the first round.
            active_blocks: (0..k).map(|_| AtomicBool::new(true)).collect(),
            node_slots: (0..num_nodes).map(|_| AtomicU32::new(FREE_SLOT)).collect(),
        }
    }

    #[inline]
    fn slot_value(&self, pair: BlockPair) -> u32 {
        pair.0 * self.k + pair.1
    }

    /// Whether an improvement touched `b` in the current round.
    pub fn is_block_active(&self, b: PartitionId) -> bool {
        self.active_blocks[b as usize].load(Ordering::Relaxed)
    }

    pub fn set_block_active(&self, b: PartitionId) {
        self.active_blocks[b as usize].store(true, Ordering::Relaxed);
    }

    pub fn num_active_blocks(&self) -> usize {
        self.active_blocks
            .iter()
            .filter(|a| a.load(Ordering::Relaxed))
            .count()
    }

    /// Start a round over `pairs` (already filtered to active blocks)
    /// and return the initial batch of parallel tasks. Active flags
    /// reset so the next round only sees fresh improvements.
    pub fn start_round(&self, pairs: Vec<BlockPair>) -> Vec<BlockPair> {
        for flag in &self.active_blocks {
            flag.store(false, Ordering::Relaxed);
        }
        let mut state = self.state.lock();
        state.round_edges = pairs;
        state.locked_blocks.iter_mut().for_each(|l| *l = false);
        state.tasks_on_block.iter_mut().for_each(|t| *t = 0);

        match self.kind {
            FlowAlgorithm::Off => Vec::new(),
            FlowAlgorithm::Matching => Self::take_matching(&mut state),
            FlowAlgorithm::Optimistic => {
                let mut initial = Vec::new();
                for _ in 0..self.num_threads {
                    match Self::take_most_independent(&mut state) {
                        Some(pair) => initial.push(pair),
                        None => break,
                    }
                }
                initial
            }
        }
    }

    /// A finished task releases its blocks and receives the follow-up
    /// pairs to feed, all under the scheduler mutex.
    pub fn finish_pair(&self, pair: BlockPair) -> Vec<BlockPair> {
        let mut state = self.state.lock();
        match self.kind {
            FlowAlgorithm::Off => Vec::new(),
            FlowAlgorithm::Matching => {
                state.locked_blocks[pair.0 as usize] = false;
                state.locked_blocks[pair.1 as usize] = false;
                Self::take_matching(&mut state)
            }
            FlowAlgorithm::Optimistic => {
                state.tasks_on_block[pair.0 as usize] -= 1;
                state.tasks_on_block[pair.1 as usize] -= 1;
                Self::take_most_independent(&mut state).into_iter().collect()
            }
        }
    }

    /// Greedy matching: every startable pair locks its two blocks.
    fn take_matching(state: &mut ScheduleState) -> Vec<BlockPair> {
        let mut started = Vec::new();
        let mut i = 0;
        while i < state.round_edges.len() {
            let (b0, b1) = state.round_edges[i];
            if !state.locked_blocks[b0 as usize] && !state.locked_blocks[b1 as usize] {
                state.locked_blocks[b0 as usize] = true;
                state.locked_blocks[b1 as usize] = true;
                state.round_edges.swap_remove(i);
                started.push((b0, b1));
            } else {
                i += 1;
            }
        }
        started
    }

    /// The round edge minimizing `max(tasks_on_block)` of its blocks.
    fn take_most_independent(state: &mut ScheduleState) -> Option<BlockPair> {
        let mut best: Option<(usize, u32)> = None;
        for (i, &(b0, b1)) in state.round_edges.iter().enumerate() {
            let contention =
                state.tasks_on_block[b0 as usize].max(state.tasks_on_block[b1 as usize]);
            if best.map_or(true, |(_, c)| contention < c) {
                best = Some((i, contention));
            }
        }
        let (idx, _) = best?;
        let pair = state.round_edges.swap_remove(idx);
        state.tasks_on_block[pair.0 as usize] += 1;
        state.tasks_on_block[pair.1 as usize] += 1;
        Some(pair)
    }

    /// Reserve a vertex for a search on `pair`. The matching scheduler
    /// never conflicts (blocks are exclusive), so it always grants.
    pub fn try_acquire_node(&self, v: HypernodeId, pair: BlockPair) -> bool {
        match self.kind {
            FlowAlgorithm::Matching | FlowAlgorithm::Off => true,
            FlowAlgorithm::Optimistic => self.node_slots[v as usize]
                .compare_exchange(
                    FREE_SLOT,
                    self.slot_value(pair),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok(),
        }
    }

    pub fn is_node_acquired(&self, v: HypernodeId) -> bool {
        self.node_slots[v as usize].load(Ordering::Relaxed) != FREE_SLOT
    }

    pub fn release_node(&self, v: HypernodeId, pair: BlockPair) {
        if matches!(self.kind, FlowAlgorithm::Optimistic) {
            let _ = self.node_slots[v as usize].compare_exchange(
                self.slot_value(pair),
                FREE_SLOT,
                Ordering::Release,
                Ordering::Relaxed,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_locks_blocks_exclusively() {
        let s = FlowScheduler::new(FlowAlgorithm::Matching, 4, 16, 4);
        let initial = s.start_round(vec![(0, 1), (0, 2), (2, 3)]);
        // (0,1) and (2,3) are block-disjoint; (0,2) must wait.
        assert_eq!(initial, vec![(0, 1), (2, 3)]);
        let next = s.finish_pair((0, 1));
        assert!(next.is_empty(), "(0,2) still blocked by the running (2,3)");
        let next = s.finish_pair((2, 3));
        assert_eq!(next, vec![(0, 2)]);
    }

    #[test]
    fn optimistic_prefers_least_loaded_blocks() {
        let s = FlowScheduler::new(FlowAlgorithm::Optimistic, 4, 16, 2);
        let initial = s.start_round(vec![(0, 1), (0, 2), (2, 3)]);
        assert_eq!(initial.len(), 2);
        // First pick has zero contention everywhere; the second must
        // avoid the blocks of the first.
        assert_eq!(initial[0], (0, 1));
        assert_eq!(initial[1], (2, 3));
    }

    #[test]
    fn optimistic_node_reservation_is_exclusive() {
        let s = FlowScheduler::new(FlowAlgorithm::Optimistic, 4, 8, 2);
        assert!(s.try_acquire_node(3, (0, 1)));
        assert!(!s.try_acquire_node(3, (2, 3)));
        assert!(s.is_node_acquired(3));
        // Release with the wrong pair is a no-op.
        s.release_node(3, (2, 3));
        assert!(s.is_node_acquired(3));
        s.release_node(3, (0, 1));
        assert!(!s.is_node_acquired(3));
        assert!(s.try_acquire_node(3, (2, 3)));
    }

    #[test]
    fn active_flags_reset_per_round() {
        let s = FlowScheduler::new(FlowAlgorithm::Matching, 3, 8, 2);
        assert_eq!(s.num_active_blocks(), 3);
        s.start_round(vec![(0, 1)]);
        assert_eq!(s.num_active_blocks(), 0);
        s.set_block_active(1);
        assert!(s.is_block_active(1));
        assert_eq!(s.num_active_blocks(), 1);
    }
}
