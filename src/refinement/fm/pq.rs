//! Addressable max-priority queue for FM frontiers.
//!
//! A binary heap over `(gain, vertex, target block)` entries plus a
//! position map, so a vertex's key can be adjusted in place when its
//! cached gain changes. One instance lives per search and is reused
//! across searches on the same thread.

use hashbrown::HashMap;

use crate::datastructures::{Gain, HypernodeId, PartitionId};

#[derive(Debug, Clone, Copy)]
struct Entry {
    gain: Gain,
    node: HypernodeId,
    to: PartitionId,
}

/// Max-heap keyed by gain with per-vertex handles.
#[derive(Debug, Default)]
pub struct AddressablePq {
    heap: Vec<Entry>,
    position: HashMap<HypernodeId, usize>,
}

impl AddressablePq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, node: HypernodeId) -> bool {
        self.position.contains_key(&node)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.position.clear();
    }

    /// Insert a vertex with its best outgoing gain. The vertex must not
    /// already be queued.
    pub fn insert(&mut self, node: HypernodeId, to: PartitionId, gain: Gain) {
        debug_assert!(!self.contains(node));
        let idx = self.heap.len();
        self.heap.push(Entry { gain, node, to });
        self.position.insert(node, idx);
        self.sift_up(idx);
    }

    /// Re-key a queued vertex.
    pub fn adjust(&mut self, node: HypernodeId, to: PartitionId, gain: Gain) {
        let idx = self.position[&node];
        let old = self.heap[idx].gain;
        self.heap[idx].gain = gain;
        self.heap[idx].to = to;
        if gain > old {
            self.sift_up(idx);
        } else {
            self.sift_down(idx);
        }
    }

    /// Pop the highest-gain vertex.
    pub fn pop(&mut self) -> Option<(HypernodeId, PartitionId, Gain)> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        self.position.remove(&top.node);
        if !self.heap.is_empty() {
            self.position.insert(self.heap[0].node, 0);
            self.sift_down(0);
        }
        Some((top.node, top.to, top.gain))
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.heap[idx].gain <= self.heap[parent].gain {
                break;
            }
            self.swap_entries(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            if left >= self.heap.len() {
                break;
            }
            let right = left + 1;
            let mut largest = idx;
            if self.heap[left].gain > self.heap[largest].gain {
                largest = left;
            }
            if right < self.heap.len() && self.heap[right].gain > self.heap[largest].gain {
                largest = right;
            }
            if largest == idx {
                break;
            }
            self.swap_entries(idx, largest);
            idx = largest;
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.position.insert(self.heap[a].node, a);
        self.position.insert(self.heap[b].node, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_gain_order() {
        let mut pq = AddressablePq::new();
        pq.insert(10, 0, 5);
        pq.insert(11, 1, -2);
        pq.insert(12, 0, 9);
        pq.insert(13, 1, 0);
        let order: Vec<Gain> = std::iter::from_fn(|| pq.pop()).map(|(_, _, g)| g).collect();
        assert_eq!(order, vec![9, 5, 0, -2]);
    }

    #[test]
    fn adjust_moves_entry_both_directions() {
        let mut pq = AddressablePq::new();
        pq.insert(1, 0, 1);
        pq.insert(2, 0, 2);
        pq.insert(3, 0, 3);
        pq.adjust(1, 1, 10);
        let (node, to, gain) = pq.pop().unwrap();
        assert_eq!((node, to, gain), (1, 1, 10));
        pq.adjust(3, 0, -1);
        assert_eq!(pq.pop().unwrap().0, 2);
        assert_eq!(pq.pop().unwrap().0, 3);
        assert!(pq.pop().is_none());
    }

    #[test]
    fn contains_tracks_membership() {
        let mut pq = AddressablePq::new();
        assert!(!pq.contains(5));
        pq.insert(5, 0, 0);
        assert!(pq.contains(5));
        pq.pop();
        assert!(!pq.contains(5));
    }

    #[test]
    fn random_operations_stay_heap_ordered() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};
        let mut rng = SmallRng::seed_from_u64(42);
        let mut pq = AddressablePq::new();
        for node in 0..200u32 {
            pq.insert(node, 0, rng.gen_range(-100..100));
        }
        for node in (0..200u32).step_by(3) {
            pq.adjust(node, 1, rng.gen_range(-100..100));
        }
        let mut last = Gain::MAX;
        while let Some((_, _, g)) = pq.pop() {
            assert!(g <= last);
            last = g;
        }
    }
}
