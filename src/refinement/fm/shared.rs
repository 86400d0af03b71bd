//! State shared by all concurrent FM searches.
//!
//! The move tracker is an append-only log with monotonic IDs so every
//! search can publish its moves and conflicts can be attributed to a
//! concrete earlier move. The vertex claim table gives each vertex a
//! single cross-search slot: a vertex sits in at most one search's
//! priority queue at a time.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};

use crate::datastructures::{Gain, HypernodeId, MoveId, PartitionId, INVALID_GAIN, INVALID_PART};

/// One applied move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub node: HypernodeId,
    pub from: PartitionId,
    pub to: PartitionId,
    pub gain: Gain,
}

/// Lock-free append-only move log with monotonic IDs.
pub struct MoveTracker {
    next: AtomicU32,
    node: Vec<AtomicU32>,
    from: Vec<AtomicU32>,
    to: Vec<AtomicU32>,
    gain: Vec<AtomicI64>,
}

impl MoveTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            next: AtomicU32::new(0),
            node: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            from: (0..capacity).map(|_| AtomicU32::new(INVALID_PART)).collect(),
            to: (0..capacity).map(|_| AtomicU32::new(INVALID_PART)).collect(),
            gain: (0..capacity).map(|_| AtomicI64::new(INVALID_GAIN)).collect(),
        }
    }

    /// Publish a move; returns its ID, or `None` when the log is full
    /// (searches treat that as a stop signal).
    pub fn append(&self, m: Move) -> Option<MoveId> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if id as usize >= self.node.len() {
            return None;
        }
        let slot = id as usize;
        self.node[slot].store(m.node, Ordering::Relaxed);
        self.from[slot].store(m.from, Ordering::Relaxed);
        self.to[slot].store(m.to, Ordering::Relaxed);
        // The gain write releases the slot to readers.
        self.gain[slot].store(m.gain, Ordering::Release);
        Some(id)
    }

    pub fn num_performed_moves(&self) -> u32 {
        self.next.load(Ordering::Relaxed).min(self.node.len() as u32)
    }

    pub fn get(&self, id: MoveId) -> Move {
        let slot = id as usize;
        Move {
            node: self.node[slot].load(Ordering::Relaxed),
            from: self.from[slot].load(Ordering::Relaxed),
            to: self.to[slot].load(Ordering::Relaxed),
            gain: self.gain[slot].load(Ordering::Acquire),
        }
    }

    /// Mark a rolled-back move so log consumers skip it.
    pub fn invalidate(&self, id: MoveId) {
        self.gain[id as usize].store(INVALID_GAIN, Ordering::Release);
    }

    pub fn is_valid(&self, id: MoveId) -> bool {
        self.gain[id as usize].load(Ordering::Acquire) != INVALID_GAIN
    }

    /// Reset between rounds; not safe while searches are running.
    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
        for g in &self.gain {
            g.store(INVALID_GAIN, Ordering::Relaxed);
        }
    }
}

/// Single cross-search claim slot per vertex: 0 when free, otherwise
/// the claiming search's nonzero ID.
pub struct VertexClaims {
    owner: Vec<AtomicU32>,
}

impl VertexClaims {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            owner: (0..num_nodes).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Claim `v` for `search`; fails if any search holds it.
    #[inline]
    pub fn try_claim(&self, v: HypernodeId, search: u32) -> bool {
        debug_assert_ne!(search, 0);
        self.owner[v as usize]
            .compare_exchange(0, search, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn release(&self, v: HypernodeId, search: u32) {
        let _ = self.owner[v as usize].compare_exchange(
            search,
            0,
            Ordering::Release,
            Ordering::Relaxed,
        );
    }

    pub fn reset(&self) {
        for slot in &self.owner {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

/// Everything FM searches share: the move log, the vertex claim table,
/// and the search-ID dispenser.
pub struct FmSharedData {
    pub move_tracker: MoveTracker,
    pub vertex_claims: VertexClaims,
    next_search_id: AtomicU32,
    pub finished_tasks: AtomicUsize,
}

impl FmSharedData {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            // Rollbacks can re-log vertices, so leave generous headroom.
            move_tracker: MoveTracker::new(2 * num_nodes + 1024),
            vertex_claims: VertexClaims::new(num_nodes),
            next_search_id: AtomicU32::new(1),
            finished_tasks: AtomicUsize::new(0),
        }
    }

    pub fn next_search_id(&self) -> u32 {
        self.next_search_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.move_tracker.reset();
        self.vertex_claims.reset();
        self.next_search_id.store(1, Ordering::Relaxed);
        self.finished_tasks.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_ids_are_monotonic_and_unique() {
        let tracker = MoveTracker::new(1000);
        let ids: Vec<u32> = rayon::scope(|_| {
            use rayon::prelude::*;
            (0..500u32)
                .into_par_iter()
                .map(|i| {
                    tracker
                        .append(Move { node: i, from: 0, to: 1, gain: 0 })
                        .unwrap()
                })
                .collect()
        });
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 500);
        assert_eq!(tracker.num_performed_moves(), 500);
    }

    #[test]
    fn full_log_rejects_appends() {
        let tracker = MoveTracker::new(2);
        let m = Move { node: 0, from: 0, to: 1, gain: 3 };
        assert!(tracker.append(m).is_some());
        assert!(tracker.append(m).is_some());
        assert!(tracker.append(m).is_none());
    }

    #[test]
    fn invalidated_moves_are_skipped() {
        let tracker = MoveTracker::new(8);
        let id = tracker
            .append(Move { node: 4, from: 0, to: 1, gain: 2 })
            .unwrap();
        assert!(tracker.is_valid(id));
        tracker.invalidate(id);
        assert!(!tracker.is_valid(id));
    }

    #[test]
    fn vertex_claims_are_exclusive() {
        let claims = VertexClaims::new(4);
        assert!(claims.try_claim(2, 1));
        assert!(!claims.try_claim(2, 2));
        claims.release(2, 1);
        assert!(claims.try_claim(2, 2));
        // Releasing with the wrong owner is a no-op.
        claims.release(2, 9);
        assert!(!claims.try_claim(2, 3));
    }
}
