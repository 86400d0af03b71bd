//! Graph specialization of the CSR store.
//!
//! Every edge has exactly two pins. The incidence is stored as directed
//! half-edges grouped by source vertex; each half-edge carries the index
//! of its reverse so the opposite endpoint's record is one lookup away.
//! Construction runs the same scheme as the hypergraph factory: thread-
//! local degree counting, a prefix sum, and atomic write cursors, with
//! an optional stable pass that sorts each vertex's half-edges by target
//! and re-links the reverse indices.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::datastructures::{EdgeWeight, HyperedgeId, HypernodeId, NodeWeight};
use crate::error::PartitionError;
use crate::parallel::inclusive_prefix_sum;

/// Directed half of an undirected edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfEdge {
    pub target: HypernodeId,
    /// Index of the reverse half-edge in the half-edge array.
    pub reverse: u32,
    pub weight: EdgeWeight,
}

#[derive(Debug, Clone, Copy)]
struct GraphNode {
    begin: usize,
    degree: u32,
    weight: NodeWeight,
    enabled: bool,
}

/// CSR graph with two-pin edges and reverse half-edge links.
#[derive(Debug, Clone)]
pub struct StaticGraph {
    num_nodes: u32,
    /// Number of undirected edges; the half-edge array holds twice this.
    num_edges: u32,
    num_removed_nodes: u32,
    total_weight: NodeWeight,
    nodes: Vec<GraphNode>,
    half_edges: Vec<HalfEdge>,
}

impl StaticGraph {
    /// Build from a list of two-element pin arrays.
    ///
    /// Fails with `InvalidInput` if any pin list does not have exactly
    /// two entries or references a vertex out of range.
    pub fn construct(
        num_nodes: u32,
        edge_vector: &[Vec<HypernodeId>],
        edge_weights: Option<&[EdgeWeight]>,
        node_weights: Option<&[NodeWeight]>,
        stable_construction: bool,
    ) -> Result<StaticGraph, PartitionError> {
        let n = num_nodes as usize;
        let m = edge_vector.len();

        // Thread-local degree counting; rejects non-graph input.
        let degrees: Vec<u32> = edge_vector
            .par_iter()
            .try_fold(
                || vec![0u32; n],
                |mut counter, pins| {
                    if pins.len() != 2 {
                        return Err(PartitionError::InvalidInput(format!(
                            "graph edge with {} pins; the graph store requires exactly 2",
                            pins.len()
                        )));
                    }
                    for &p in pins {
                        if p >= num_nodes {
                            return Err(PartitionError::InvalidInput(format!(
                                "pin {p} out of range for {num_nodes} nodes"
                            )));
                        }
                        counter[p as usize] += 1;
                    }
                    Ok(counter)
                },
            )
            .try_reduce(
                || vec![0u32; n],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    Ok(a)
                },
            )?;

        let mut offsets: Vec<usize> = degrees.iter().map(|&d| d as usize).collect();
        let total = inclusive_prefix_sum(&mut offsets);
        debug_assert_eq!(total, 2 * m);
        let first_entry = |v: usize| offsets[v] - degrees[v] as usize;

        // Half-edge writes through atomic cursors; each endpoint reserves
        // its slot, then the two slots cross-reference each other.
        let cursors: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        let targets: Vec<AtomicU32> = (0..2 * m).map(|_| AtomicU32::new(0)).collect();
        let reverses: Vec<AtomicU32> = (0..2 * m).map(|_| AtomicU32::new(0)).collect();
        let weight_of = |e: usize| edge_weights.map_or(1, |w| w[e]);
        let slot_weights: Vec<std::sync::atomic::AtomicI64> =
            (0..2 * m).map(|_| std::sync::atomic::AtomicI64::new(1)).collect();

        edge_vector.par_iter().enumerate().for_each(|(e, pins)| {
            let (u, v) = (pins[0] as usize, pins[1] as usize);
            let pos_u = first_entry(u) + cursors[u].fetch_add(1, Ordering::Relaxed) as usize;
            let pos_v = first_entry(v) + cursors[v].fetch_add(1, Ordering::Relaxed) as usize;
            targets[pos_u].store(v as u32, Ordering::Relaxed);
            targets[pos_v].store(u as u32, Ordering::Relaxed);
            reverses[pos_u].store(pos_v as u32, Ordering::Relaxed);
            reverses[pos_v].store(pos_u as u32, Ordering::Relaxed);
            slot_weights[pos_u].store(weight_of(e), Ordering::Relaxed);
            slot_weights[pos_v].store(weight_of(e), Ordering::Relaxed);
        });

        let mut half_edges: Vec<HalfEdge> = (0..2 * m)
            .map(|i| HalfEdge {
                target: targets[i].load(Ordering::Relaxed),
                reverse: reverses[i].load(Ordering::Relaxed),
                weight: slot_weights[i].load(Ordering::Relaxed),
            })
            .collect();

        if stable_construction {
            Self::sort_and_relink(&mut half_edges, &offsets, &degrees);
        }

        let nodes: Vec<GraphNode> = (0..n)
            .map(|v| GraphNode {
                begin: first_entry(v),
                degree: degrees[v],
                weight: node_weights.map_or(1, |w| w[v]),
                enabled: true,
            })
            .collect();
        let total_weight = nodes.iter().map(|nd| nd.weight).sum();

        Ok(StaticGraph {
            num_nodes,
            num_edges: m as u32,
            num_removed_nodes: 0,
            total_weight,
            nodes,
            half_edges,
        })
    }

    /// Sort each vertex's half-edges by target, then rebuild the reverse
    /// indices through the old-to-new position permutation.
    fn sort_and_relink(half_edges: &mut [HalfEdge], offsets: &[usize], degrees: &[u32]) {
        let n = degrees.len();
        let mut order: Vec<u32> = (0..half_edges.len() as u32).collect();
        for v in 0..n {
            let begin = offsets[v] - degrees[v] as usize;
            let end = offsets[v];
            order[begin..end].sort_unstable_by_key(|&i| half_edges[i as usize].target);
        }
        let mut new_of_old = vec![0u32; half_edges.len()];
        for (new_pos, &old_pos) in order.iter().enumerate() {
            new_of_old[old_pos as usize] = new_pos as u32;
        }
        let reordered: Vec<HalfEdge> = order
            .iter()
            .map(|&old| {
                let mut he = half_edges[old as usize];
                he.reverse = new_of_old[he.reverse as usize];
                he
            })
            .collect();
        half_edges.copy_from_slice(&reordered);
    }

    pub fn initial_num_nodes(&self) -> u32 {
        self.num_nodes
    }

    pub fn initial_num_edges(&self) -> u32 {
        self.num_edges
    }

    /// Total number of pins (twice the edge count for a graph).
    pub fn initial_num_pins(&self) -> usize {
        self.half_edges.len()
    }

    pub fn total_weight(&self) -> NodeWeight {
        self.total_weight
    }

    pub fn num_removed_nodes(&self) -> u32 {
        self.num_removed_nodes
    }

    /// Every edge of a graph has exactly two pins.
    pub fn max_edge_size(&self) -> u32 {
        if self.num_edges > 0 {
            2
        } else {
            0
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = HypernodeId> + '_ {
        (0..self.num_nodes).filter(move |&v| self.nodes[v as usize].enabled)
    }

    pub fn node_weight(&self, v: HypernodeId) -> NodeWeight {
        self.nodes[v as usize].weight
    }

    pub fn node_degree(&self, v: HypernodeId) -> u32 {
        self.nodes[v as usize].degree
    }

    pub fn node_is_enabled(&self, v: HypernodeId) -> bool {
        self.nodes[v as usize].enabled
    }

    /// Outgoing half-edges of `v`.
    pub fn incident_half_edges(&self, v: HypernodeId) -> &[HalfEdge] {
        let node = &self.nodes[v as usize];
        &self.half_edges[node.begin..node.begin + node.degree as usize]
    }

    /// Global half-edge by index.
    pub fn half_edge(&self, idx: u32) -> &HalfEdge {
        &self.half_edges[idx as usize]
    }

    /// First half-edge index of `v`.
    pub fn first_half_edge(&self, v: HypernodeId) -> u32 {
        self.nodes[v as usize].begin as u32
    }

    pub fn remove_degree_zero_node(&mut self, v: HypernodeId) -> Result<(), PartitionError> {
        if self.node_degree(v) != 0 {
            return Err(PartitionError::InvalidInput(format!(
                "node {v} is not degree-zero"
            )));
        }
        let node = &mut self.nodes[v as usize];
        if node.enabled {
            node.enabled = false;
            self.total_weight -= node.weight;
            self.num_removed_nodes += 1;
        }
        Ok(())
    }

    /// Lower the graph into the general hypergraph store, one two-pin
    /// hyperedge per undirected edge.
    pub fn to_hypergraph(&self) -> crate::datastructures::StaticHypergraph {
        let mut edge_vector: Vec<Vec<HypernodeId>> = Vec::with_capacity(self.num_edges as usize);
        let mut edge_weights: Vec<EdgeWeight> = Vec::with_capacity(self.num_edges as usize);
        for v in 0..self.num_nodes {
            let begin = self.first_half_edge(v);
            for (i, he) in self.incident_half_edges(v).iter().enumerate() {
                let idx = begin + i as u32;
                // Emit each undirected edge once, from its smaller side.
                if idx < he.reverse {
                    edge_vector.push(vec![v, he.target]);
                    edge_weights.push(he.weight);
                }
            }
        }
        let node_weights: Vec<NodeWeight> =
            (0..self.num_nodes).map(|v| self.node_weight(v)).collect();
        crate::datastructures::HypergraphFactory::from_edge_list(
            self.num_nodes,
            &edge_vector,
            Some(&edge_weights),
            Some(&node_weights),
            true,
        )
        .expect("a valid graph always lowers to a valid hypergraph")
    }
}

/// Convenience alias so call sites can speak of edge IDs even though the
/// storage is half-edge based.
pub type HalfEdgeId = HyperedgeId;
