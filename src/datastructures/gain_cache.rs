//! Cached move gains for the connectivity objective.
//!
//! For every vertex `v` the cache stores the *benefit* of leaving its
//! current block (weight of incident edges where `v` is the last pin in
//! that block) and, per target block `b`, the *penalty* of entering `b`
//! (weight of incident edges with no pin in `b`). The km1 gain of moving
//! `v` to `b` is `benefit(v) − penalty(v, b)`.
//!
//! The cache is written by the `change_node_part` delta hook of the
//! partitioned hypergraph; entries may be momentarily stale under
//! concurrent moves, which searches tolerate by re-validating gains
//! before applying a move.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::datastructures::{Gain, HypernodeId, PartitionId};

/// Per-vertex, per-target-block gain aggregates for km1.
#[derive(Debug, Default)]
pub struct GainCache {
    k: usize,
    benefit: Vec<AtomicI64>,
    /// Flattened `v * k + b`.
    penalty: Vec<AtomicI64>,
}

impl GainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cache has been sized for a hypergraph.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.benefit.is_empty()
    }

    pub(crate) fn allocate(&mut self, num_nodes: usize, k: usize) {
        self.k = k;
        self.benefit = (0..num_nodes).map(|_| AtomicI64::new(0)).collect();
        self.penalty = (0..num_nodes * k).map(|_| AtomicI64::new(0)).collect();
    }

    /// Cached gain of moving `v` from its current block to `to`.
    #[inline]
    pub fn gain(&self, v: HypernodeId, to: PartitionId) -> Gain {
        self.benefit(v) - self.penalty(v, to)
    }

    #[inline]
    pub fn benefit(&self, v: HypernodeId) -> Gain {
        self.benefit[v as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn penalty(&self, v: HypernodeId, b: PartitionId) -> Gain {
        self.penalty[v as usize * self.k + b as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn add_benefit(&self, v: HypernodeId, delta: Gain) {
        self.benefit[v as usize].fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_penalty(&self, v: HypernodeId, b: PartitionId, delta: Gain) {
        self.penalty[v as usize * self.k + b as usize].fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_benefit(&self, v: HypernodeId, value: Gain) {
        self.benefit[v as usize].store(value, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_penalty(&self, v: HypernodeId, b: PartitionId, value: Gain) {
        self.penalty[v as usize * self.k + b as usize].store(value, Ordering::Relaxed);
    }
}
