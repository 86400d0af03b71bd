//! Contraction groups and the pool that hands them out for
//! asynchronous uncontraction.
//!
//! Every recorded merge (representative `u`, contractee `v`) is a
//! [`Memento`]. Mergers sharing a representative are batched into
//! [`ContractionGroup`]s; the groups of one cluster form a chain in
//! reverse merge order, since a merge can only be undone after all
//! merges performed after it. The pool keeps an atomic predecessor
//! counter per group and a ready bag; a group becomes active once its
//! counter drops to zero. Groups whose node sets are disjoint run in
//! parallel.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::datastructures::{HypernodeId, INVALID_NODE};

/// One recorded merge: `contracted` was collapsed into `representative`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memento {
    pub representative: HypernodeId,
    pub contracted: HypernodeId,
}

/// A batch of mementos sharing one representative.
#[derive(Debug, Clone)]
pub struct ContractionGroup {
    pub representative: HypernodeId,
    pub contractees: Vec<HypernodeId>,
}

impl ContractionGroup {
    /// Representative first, then the contractees.
    pub fn node_ids(&self) -> impl Iterator<Item = HypernodeId> + Clone + '_ {
        std::iter::once(self.representative).chain(self.contractees.iter().copied())
    }

    pub fn mementos(&self) -> impl Iterator<Item = Memento> + '_ {
        self.contractees.iter().map(move |&v| Memento {
            representative: self.representative,
            contracted: v,
        })
    }
}

/// Nonzero group identifier; 0 is reserved as the free-lock marker.
pub type GroupId = u32;
pub const INVALID_GROUP: GroupId = 0;

/// Pool presenting groups in the partial order of the uncontraction DAG.
pub struct GroupPool {
    /// Indexed by `group_id - 1`.
    groups: Vec<ContractionGroup>,
    successors: Vec<Vec<GroupId>>,
    pred_count: Vec<AtomicU32>,
    ready: Mutex<Vec<GroupId>>,
    outstanding: AtomicUsize,
}

/// Bound on mementos per group; longer merge chains are split so the
/// predecessor-counter protocol sees real dependencies.
const MAX_GROUP_SIZE: usize = 8;

impl GroupPool {
    /// Build the pool from a fine-to-coarse vertex map. Cluster members
    /// are recovered per coarse vertex; the smallest member becomes the
    /// representative, and its mergers are chained into groups of at
    /// most [`MAX_GROUP_SIZE`] in reverse merge order.
    pub fn from_mapping(mapping: &[HypernodeId], num_coarse: usize) -> Self {
        let mut members: Vec<Vec<HypernodeId>> = vec![Vec::new(); num_coarse];
        for (fine, &coarse) in mapping.iter().enumerate() {
            if coarse != INVALID_NODE {
                members[coarse as usize].push(fine as HypernodeId);
            }
        }

        let mut groups: Vec<ContractionGroup> = Vec::new();
        let mut successors: Vec<Vec<GroupId>> = Vec::new();
        let mut pred_count_init: Vec<u32> = Vec::new();
        let mut initially_ready: Vec<GroupId> = Vec::new();

        for cluster in members {
            if cluster.len() < 2 {
                continue;
            }
            let representative = cluster[0];
            let contractees = &cluster[1..];
            // Chain in reverse merge order: the last batch of merges is
            // undone first, so it enters the ready bag; every earlier
            // batch waits on its successor-in-merge-order.
            let chunks: Vec<&[HypernodeId]> = contractees.chunks(MAX_GROUP_SIZE).collect();
            let mut previous: Option<GroupId> = None;
            for chunk in chunks.into_iter().rev() {
                groups.push(ContractionGroup {
                    representative,
                    contractees: chunk.to_vec(),
                });
                successors.push(Vec::new());
                let id = groups.len() as GroupId;
                match previous {
                    None => {
                        pred_count_init.push(0);
                        initially_ready.push(id);
                    }
                    Some(prev) => {
                        pred_count_init.push(1);
                        successors[prev as usize - 1].push(id);
                    }
                }
                previous = Some(id);
            }
        }

        let outstanding = groups.len();
        GroupPool {
            groups,
            successors,
            pred_count: pred_count_init.into_iter().map(AtomicU32::new).collect(),
            ready: Mutex::new(initially_ready),
            outstanding: AtomicUsize::new(outstanding),
        }
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Whether any group is still unfinished (ready, running, or
    /// waiting on predecessors).
    pub fn has_active(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) > 0
    }

    /// Pop some ready group, or `None` if the bag is momentarily empty.
    pub fn pick_any_active(&self) -> Option<GroupId> {
        self.ready.lock().pop()
    }

    /// Return a group whose locks could not be taken to the ready bag.
    pub fn reactivate(&self, id: GroupId) {
        self.ready.lock().push(id);
    }

    pub fn group(&self, id: GroupId) -> &ContractionGroup {
        &self.groups[id as usize - 1]
    }

    /// Mark a group finished and activate successors whose predecessor
    /// counters drop to zero.
    pub fn activate_successors(&self, id: GroupId) {
        for &succ in &self.successors[id as usize - 1] {
            if self.pred_count[succ as usize - 1].fetch_sub(1, Ordering::AcqRel) == 1 {
                self.ready.lock().push(succ);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}
