//! Flow problem construction for a block pair.
//!
//! Starting from the pair's cut hyperedges, a BFS grows a *core* region
//! into both blocks, bounded by the configured region budget `U`. The
//! directed network models each hyperedge as an `in → out` arc pair of
//! capacity `w(e)`; region pins attach with infinite capacity in both
//! directions. Pins of the pair that fall outside the region anchor the
//! edge to the super source (block 0 side) or super target (block 1
//! side); pins in other blocks are not part of the two-block problem
//! and are ignored.

use hashbrown::HashMap;

use crate::datastructures::{
    EdgeWeight, FastResetBitset, HyperedgeId, HypernodeId, NodeWeight, PartitionId,
    PartitionedHypergraph,
};
use crate::refinement::flow::dinic::{Dinic, INF_CAPACITY};

/// Hyperedges above this size blow up the network for little gain and
/// are treated as uncuttable.
const MAX_MODELED_EDGE_SIZE: u32 = 1000;

const SOURCE: u32 = 0;
const TARGET: u32 = 1;

/// A solvable two-block flow instance.
pub struct FlowProblem {
    pub b0: PartitionId,
    pub b1: PartitionId,
    /// Region vertices, with their pre-solve block.
    pub region: Vec<HypernodeId>,
    /// Region weight currently in each of the two blocks.
    pub region_weight: (NodeWeight, NodeWeight),
    /// Cut weight between the pair over the modeled hyperedges.
    pub current_cut: EdgeWeight,
    node_of: HashMap<HypernodeId, u32>,
    dinic: Dinic,
}

/// Min-cut result: the vertices whose block changes.
pub struct FlowSolution {
    pub flow_value: EdgeWeight,
    /// `(vertex, new_block)` for every region vertex.
    pub assignment: Vec<(HypernodeId, PartitionId)>,
    /// Region weight per block after applying the assignment.
    pub new_region_weight: (NodeWeight, NodeWeight),
}

impl FlowProblem {
    /// Grow the region and build the network. `try_acquire` gates
    /// region membership (the optimistic scheduler reserves vertices
    /// here); returns `None` when no useful problem exists.
    pub fn build(
        phg: &PartitionedHypergraph<'_>,
        b0: PartitionId,
        b1: PartitionId,
        cut_edges: &[HyperedgeId],
        max_region_size: usize,
        mut try_acquire: impl FnMut(HypernodeId) -> bool,
    ) -> Option<FlowProblem> {
        if cut_edges.is_empty() {
            return None;
        }
        let hg = phg.hypergraph();
        let mut visited = FastResetBitset::new(hg.initial_num_nodes() as usize);
        let mut region: Vec<HypernodeId> = Vec::new();
        let mut frontier: Vec<HypernodeId> = Vec::new();

        // Seed with the cut-edge pins of both blocks.
        for &e in cut_edges {
            for &p in hg.pins(e) {
                let part = phg.part(p);
                if (part == b0 || part == b1)
                    && !visited.contains(p as usize)
                    && region.len() < max_region_size
                    && try_acquire(p)
                {
                    visited.insert(p as usize);
                    region.push(p);
                    frontier.push(p);
                }
            }
        }
        // BFS expansion up to the budget.
        let mut next: Vec<HypernodeId> = Vec::new();
        while !frontier.is_empty() && region.len() < max_region_size {
            for &v in &frontier {
                for &e in hg.incident_edges(v) {
                    if hg.edge_size(e) > MAX_MODELED_EDGE_SIZE {
                        continue;
                    }
                    for &p in hg.pins(e) {
                        let part = phg.part(p);
                        if (part == b0 || part == b1)
                            && !visited.contains(p as usize)
                            && region.len() < max_region_size
                            && try_acquire(p)
                        {
                            visited.insert(p as usize);
                            region.push(p);
                            next.push(p);
                        }
                    }
                }
            }
            frontier.clear();
            std::mem::swap(&mut frontier, &mut next);
        }
        visited.reset();
        if region.is_empty() {
            return None;
        }

        // Collect the hyperedges touching the region.
        let mut edge_seen = FastResetBitset::new(hg.initial_num_edges() as usize);
        let mut modeled: Vec<HyperedgeId> = Vec::new();
        for &v in &region {
            for &e in hg.incident_edges(v) {
                if hg.edge_size(e) <= MAX_MODELED_EDGE_SIZE && edge_seen.insert(e as usize) {
                    modeled.push(e);
                }
            }
        }
        edge_seen.reset();

        let mut node_of: HashMap<HypernodeId, u32> = HashMap::with_capacity(region.len());
        for (i, &v) in region.iter().enumerate() {
            node_of.insert(v, 2 + i as u32);
        }
        let num_nodes = 2 + region.len() + 2 * modeled.len();
        let mut dinic = Dinic::new(num_nodes);

        let mut current_cut: EdgeWeight = 0;
        let mut has_source_anchor = false;
        let mut has_target_anchor = false;
        let edge_base = 2 + region.len() as u32;
        for (i, &e) in modeled.iter().enumerate() {
            let e_in = edge_base + 2 * i as u32;
            let e_out = e_in + 1;
            let w = hg.edge_weight(e);
            dinic.add_arc(e_in, e_out, w);
            if phg.pin_count_in_part(e, b0) > 0 && phg.pin_count_in_part(e, b1) > 0 {
                current_cut += w;
            }
            let mut source_anchored = false;
            let mut target_anchored = false;
            for &p in hg.pins(e) {
                match node_of.get(&p) {
                    Some(&node) => {
                        dinic.add_arc(node, e_in, INF_CAPACITY);
                        dinic.add_arc(e_out, node, INF_CAPACITY);
                    }
                    None => {
                        let part = phg.part(p);
                        if part == b0 && !source_anchored {
                            dinic.add_arc(SOURCE, e_in, INF_CAPACITY);
                            source_anchored = true;
                            has_source_anchor = true;
                        } else if part == b1 && !target_anchored {
                            dinic.add_arc(e_out, TARGET, INF_CAPACITY);
                            target_anchored = true;
                            has_target_anchor = true;
                        }
                    }
                }
            }
        }
        if current_cut == 0 {
            return None;
        }
        // A block that fits entirely inside the region has no outside
        // pins to anchor it; pin its deepest region vertex (the last
        // one the BFS added) to the terminal so the cut cannot drain
        // the block empty.
        if !has_source_anchor {
            let deepest = region.iter().rev().find(|&&v| phg.part(v) == b0)?;
            dinic.add_arc(SOURCE, node_of[deepest], INF_CAPACITY);
        }
        if !has_target_anchor {
            let deepest = region.iter().rev().find(|&&v| phg.part(v) == b1)?;
            dinic.add_arc(node_of[deepest], TARGET, INF_CAPACITY);
        }

        let mut w0 = 0;
        let mut w1 = 0;
        for &v in &region {
            if phg.part(v) == b0 {
                w0 += hg.node_weight(v);
            } else {
                w1 += hg.node_weight(v);
            }
        }

        Some(FlowProblem {
            b0,
            b1,
            region,
            region_weight: (w0, w1),
            current_cut,
            node_of,
            dinic,
        })
    }

    /// Solve the instance. Returns `None` unless the min cut is
    /// strictly cheaper than the modeled pair cut.
    pub fn solve(mut self, phg: &PartitionedHypergraph<'_>) -> Option<FlowSolution> {
        let flow_value = self.dinic.max_flow(SOURCE, TARGET);
        if flow_value >= self.current_cut {
            return None;
        }
        let reachable = self.dinic.source_side(SOURCE);
        let hg = phg.hypergraph();
        let mut assignment = Vec::with_capacity(self.region.len());
        let mut new_w0 = 0;
        let mut new_w1 = 0;
        for &v in &self.region {
            let node = self.node_of[&v] as usize;
            let block = if reachable[node] { self.b0 } else { self.b1 };
            if block == self.b0 {
                new_w0 += hg.node_weight(v);
            } else {
                new_w1 += hg.node_weight(v);
            }
            assignment.push((v, block));
        }
        Some(FlowSolution {
            flow_value,
            assignment,
            new_region_weight: (new_w0, new_w1),
        })
    }
}
