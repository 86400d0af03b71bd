//! Partition quality metrics.
//!
//! All metrics are computed over enabled hyperedges of the partitioned
//! hypergraph. Intended for phase boundaries and tests; refinement
//! tracks its own deltas and only re-synchronizes through these.

use crate::config::{Context, Objective};
use crate::datastructures::{EdgeWeight, PartitionedHypergraph};

/// Snapshot of the three reported quality numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub cut: EdgeWeight,
    pub km1: EdgeWeight,
    pub imbalance: f64,
}

impl Metrics {
    pub fn measure(phg: &PartitionedHypergraph<'_>, ctx: &Context) -> Self {
        Metrics {
            cut: cut(phg),
            km1: km1(phg),
            imbalance: imbalance(phg, ctx),
        }
    }

    pub fn objective(&self, objective: Objective) -> EdgeWeight {
        match objective {
            Objective::Cut => self.cut,
            Objective::Km1 => self.km1,
        }
    }
}

/// Sum of weights of edges spanning more than one block.
pub fn cut(phg: &PartitionedHypergraph<'_>) -> EdgeWeight {
    let hg = phg.hypergraph();
    hg.edges()
        .filter(|&e| phg.connectivity(e) > 1)
        .map(|e| hg.edge_weight(e))
        .sum()
}

/// Connectivity metric Σ (λ(e) − 1) · w(e).
pub fn km1(phg: &PartitionedHypergraph<'_>) -> EdgeWeight {
    let hg = phg.hypergraph();
    hg.edges()
        .map(|e| (phg.connectivity(e).saturating_sub(1)) as EdgeWeight * hg.edge_weight(e))
        .sum()
}

/// Sum-of-external-degrees: Σ λ(e) · w(e) over cut edges.
pub fn soed(phg: &PartitionedHypergraph<'_>) -> EdgeWeight {
    let hg = phg.hypergraph();
    hg.edges()
        .filter(|&e| phg.connectivity(e) > 1)
        .map(|e| phg.connectivity(e) as EdgeWeight * hg.edge_weight(e))
        .sum()
}

/// Objective selected by the context.
pub fn objective(phg: &PartitionedHypergraph<'_>, obj: Objective) -> EdgeWeight {
    match obj {
        Objective::Cut => cut(phg),
        Objective::Km1 => km1(phg),
    }
}

/// Maximum relative overload: `max_b weight(b) / ⌈W/k⌉ − 1`.
pub fn imbalance(phg: &PartitionedHypergraph<'_>, ctx: &Context) -> f64 {
    let perfect = ctx.perfect_part_weight(phg.hypergraph().total_weight()) as f64;
    let mut max_balance = 0.0f64;
    for b in 0..phg.k() {
        max_balance = max_balance.max(phg.part_weight(b) as f64 / perfect);
    }
    max_balance - 1.0
}
