//! Per-vertex locks for asynchronous uncontraction.
//!
//! A dense array of atomic slots, one per vertex. A free slot holds 0;
//! an acquired slot holds the owning group's nonzero ID. Acquisition is
//! a single CAS; multi-lock acquisition aborts on the first failure and
//! rolls back everything already taken, so two groups with overlapping
//! node sets never deadlock.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::datastructures::{GroupId, HypernodeId};

const FREE: u32 = 0;

/// Dense array of atomic owner slots.
pub struct NodeLockManager {
    slots: Vec<AtomicU32>,
}

impl NodeLockManager {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            slots: (0..num_nodes).map(|_| AtomicU32::new(FREE)).collect(),
        }
    }

    /// CAS from free to `owner`. `owner` must be nonzero.
    #[inline]
    pub fn try_acquire(&self, node: HypernodeId, owner: GroupId) -> bool {
        debug_assert_ne!(owner, FREE);
        self.slots[node as usize]
            .compare_exchange(FREE, owner, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn is_held_by(&self, node: HypernodeId, owner: GroupId) -> bool {
        self.slots[node as usize].load(Ordering::Relaxed) == owner
    }

    #[inline]
    pub fn is_held(&self, node: HypernodeId) -> bool {
        self.slots[node as usize].load(Ordering::Relaxed) != FREE
    }

    /// Release a slot held by `owner`.
    #[inline]
    pub fn release(&self, node: HypernodeId, owner: GroupId) {
        debug_assert!(self.is_held_by(node, owner), "releasing a lock not held");
        self.slots[node as usize].store(FREE, Ordering::Release);
    }

    /// Acquire every node or none: on the first failure all previously
    /// acquired locks are released and `false` is returned.
    pub fn try_acquire_many<I>(&self, nodes: I, owner: GroupId) -> bool
    where
        I: IntoIterator<Item = HypernodeId> + Clone,
    {
        let mut taken = 0usize;
        for node in nodes.clone() {
            if !self.try_acquire(node, owner) {
                for rollback in nodes.into_iter().take(taken) {
                    self.release(rollback, owner);
                }
                return false;
            }
            taken += 1;
        }
        true
    }

    pub fn release_many<I>(&self, nodes: I, owner: GroupId)
    where
        I: IntoIterator<Item = HypernodeId>,
    {
        for node in nodes {
            self.release(node, owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_cycle() {
        let locks = NodeLockManager::new(4);
        assert!(locks.try_acquire(2, 7));
        assert!(locks.is_held_by(2, 7));
        assert!(!locks.try_acquire(2, 9));
        locks.release(2, 7);
        assert!(locks.try_acquire(2, 9));
    }

    #[test]
    fn multi_lock_rolls_back_on_conflict() {
        let locks = NodeLockManager::new(5);
        assert!(locks.try_acquire(3, 1));
        // 0 and 1 get taken, 3 fails, everything rolls back.
        assert!(!locks.try_acquire_many(vec![0, 1, 3, 4], 2));
        assert!(!locks.is_held(0));
        assert!(!locks.is_held(1));
        assert!(!locks.is_held(4));
        assert!(locks.is_held_by(3, 1));
        // Without the conflict the whole set is taken.
        locks.release(3, 1);
        assert!(locks.try_acquire_many(vec![0, 1, 3, 4], 2));
        for v in [0, 1, 3, 4] {
            assert!(locks.is_held_by(v, 2));
        }
    }

    #[test]
    fn disjoint_sets_acquired_concurrently() {
        let locks = NodeLockManager::new(1024);
        rayon::scope(|s| {
            for g in 0..8u32 {
                let locks = &locks;
                s.spawn(move |_| {
                    let nodes: Vec<u32> = (0..128).map(|i| g * 128 + i).collect();
                    assert!(locks.try_acquire_many(nodes.iter().copied(), g + 1));
                    locks.release_many(nodes.iter().copied(), g + 1);
                });
            }
        });
    }
}
