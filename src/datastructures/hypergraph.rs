//! Immutable CSR hypergraph.
//!
//! Two parallel arrays per direction: vertex records pointing into
//! `incident_nets` (the hyperedges of each vertex) and hyperedge records
//! pointing into `incidence_array` (the pins of each hyperedge).
//! Vertices and hyperedges can be tombstoned; iteration skips them.
//!
//! Construction counts degrees into thread-local counters, turns them
//! into first-entry offsets with a prefix sum, and writes entries through
//! per-vertex atomic cursors. With `stable_construction` every vertex's
//! incident-net slice is sorted afterwards so the layout is independent
//! of scheduling.

use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::datastructures::{
    CommunityId, EdgeWeight, HyperedgeId, HypernodeId, NodeWeight,
};
use crate::error::PartitionError;
use crate::parallel::inclusive_prefix_sum;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Hypernode {
    pub(crate) begin: usize,
    pub(crate) size: u32,
    pub(crate) weight: NodeWeight,
    pub(crate) enabled: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Hyperedge {
    pub(crate) begin: usize,
    pub(crate) size: u32,
    pub(crate) weight: EdgeWeight,
    pub(crate) enabled: bool,
}

/// Immutable compressed hypergraph.
#[derive(Debug, Default, Clone)]
pub struct StaticHypergraph {
    pub(crate) num_nodes: u32,
    pub(crate) num_edges: u32,
    pub(crate) num_pins: usize,
    pub(crate) num_removed_nodes: u32,
    pub(crate) max_edge_size: u32,
    pub(crate) total_weight: NodeWeight,
    pub(crate) nodes: Vec<Hypernode>,
    pub(crate) incident_nets: Vec<HyperedgeId>,
    pub(crate) edges: Vec<Hyperedge>,
    pub(crate) incidence_array: Vec<HypernodeId>,
    pub(crate) community_ids: Vec<CommunityId>,
}

impl Default for Hypernode {
    fn default() -> Self {
        Self { begin: 0, size: 0, weight: 1, enabled: true }
    }
}

impl Default for Hyperedge {
    fn default() -> Self {
        Self { begin: 0, size: 0, weight: 1, enabled: true }
    }
}

impl StaticHypergraph {
    pub fn initial_num_nodes(&self) -> u32 {
        self.num_nodes
    }

    pub fn initial_num_edges(&self) -> u32 {
        self.num_edges
    }

    pub fn initial_num_pins(&self) -> usize {
        self.num_pins
    }

    pub fn num_removed_nodes(&self) -> u32 {
        self.num_removed_nodes
    }

    pub fn total_weight(&self) -> NodeWeight {
        self.total_weight
    }

    pub fn max_edge_size(&self) -> u32 {
        self.max_edge_size
    }

    /// Enabled vertices in increasing ID order.
    pub fn nodes(&self) -> impl Iterator<Item = HypernodeId> + '_ {
        (0..self.num_nodes).filter(move |&v| self.nodes[v as usize].enabled)
    }

    /// Enabled hyperedges in increasing ID order.
    pub fn edges(&self) -> impl Iterator<Item = HyperedgeId> + '_ {
        (0..self.num_edges).filter(move |&e| self.edges[e as usize].enabled)
    }

    #[inline]
    pub fn pins(&self, e: HyperedgeId) -> &[HypernodeId] {
        let he = &self.edges[e as usize];
        &self.incidence_array[he.begin..he.begin + he.size as usize]
    }

    #[inline]
    pub fn incident_edges(&self, v: HypernodeId) -> &[HyperedgeId] {
        let hn = &self.nodes[v as usize];
        &self.incident_nets[hn.begin..hn.begin + hn.size as usize]
    }

    #[inline]
    pub fn node_weight(&self, v: HypernodeId) -> NodeWeight {
        self.nodes[v as usize].weight
    }

    pub fn set_node_weight(&mut self, v: HypernodeId, weight: NodeWeight) {
        self.nodes[v as usize].weight = weight;
    }

    #[inline]
    pub fn node_degree(&self, v: HypernodeId) -> u32 {
        self.nodes[v as usize].size
    }

    #[inline]
    pub fn node_is_enabled(&self, v: HypernodeId) -> bool {
        self.nodes[v as usize].enabled
    }

    #[inline]
    pub fn edge_weight(&self, e: HyperedgeId) -> EdgeWeight {
        self.edges[e as usize].weight
    }

    pub fn set_edge_weight(&mut self, e: HyperedgeId, weight: EdgeWeight) {
        self.edges[e as usize].weight = weight;
    }

    #[inline]
    pub fn edge_size(&self, e: HyperedgeId) -> u32 {
        self.edges[e as usize].size
    }

    #[inline]
    pub fn edge_is_enabled(&self, e: HyperedgeId) -> bool {
        self.edges[e as usize].enabled
    }

    #[inline]
    pub fn community_id(&self, v: HypernodeId) -> CommunityId {
        self.community_ids[v as usize]
    }

    pub fn set_community_id(&mut self, v: HypernodeId, community: CommunityId) {
        self.community_ids[v as usize] = community;
    }

    /// Tombstone an isolated vertex. Its weight no longer counts toward
    /// `total_weight`.
    pub fn remove_degree_zero_node(&mut self, v: HypernodeId) -> Result<(), PartitionError> {
        if self.node_degree(v) != 0 {
            return Err(PartitionError::InvalidInput(format!(
                "node {v} has degree {} and cannot be removed as degree-zero",
                self.node_degree(v)
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

    /// Parallel loop over enabled vertices.
    pub fn do_parallel_for_all_nodes<F>(&self, f: F)
    where
        F: Fn(HypernodeId) + Send + Sync,
    {
        (0..self.num_nodes)
            .into_par_iter()
            .filter(|&v| self.nodes[v as usize].enabled)
            .for_each(f);
    }

    /// Parallel loop over enabled hyperedges.
    pub fn do_parallel_for_all_edges<F>(&self, f: F)
    where
        F: Fn(HyperedgeId) + Send + Sync,
    {
        (0..self.num_edges)
            .into_par_iter()
            .filter(|&e| self.edges[e as usize].enabled)
            .for_each(f);
    }

    /// Recompute `total_weight` over enabled vertices in parallel.
    pub fn compute_total_weight(&mut self) {
        self.total_weight = (0..self.num_nodes as usize)
            .into_par_iter()
            .filter(|&v| self.nodes[v].enabled)
            .map(|v| self.nodes[v].weight)
            .sum();
    }

    /// Sequential deep copy.
    pub fn copy(&self) -> StaticHypergraph {
        StaticHypergraph {
            num_nodes: self.num_nodes,
            num_edges: self.num_edges,
            num_pins: self.num_pins,
            num_removed_nodes: self.num_removed_nodes,
            max_edge_size: self.max_edge_size,
            total_weight: self.total_weight,
            nodes: self.nodes.clone(),
            incident_nets: self.incident_nets.clone(),
            edges: self.edges.clone(),
            incidence_array: self.incidence_array.clone(),
            community_ids: self.community_ids.clone(),
        }
    }

    /// Parallel deep copy. Produces arrays identical to [`Self::copy`].
    pub fn copy_parallel(&self) -> StaticHypergraph {
        let ((nodes, incident_nets), (edges, (incidence_array, community_ids))) = rayon::join(
            || rayon::join(|| self.nodes.clone(), || self.incident_nets.clone()),
            || {
                rayon::join(
                    || self.edges.clone(),
                    || rayon::join(|| self.incidence_array.clone(), || self.community_ids.clone()),
                )
            },
        );
        StaticHypergraph {
            num_nodes: self.num_nodes,
            num_edges: self.num_edges,
            num_pins: self.num_pins,
            num_removed_nodes: self.num_removed_nodes,
            max_edge_size: self.max_edge_size,
            total_weight: self.total_weight,
            nodes,
            incident_nets,
            edges,
            incidence_array,
            community_ids,
        }
    }

    /// Byte counts of the backing arrays.
    pub fn memory_consumption(&self) -> MemoryReport {
        let children = vec![
            ("hypernodes", self.nodes.len() * std::mem::size_of::<Hypernode>()),
            ("incident nets", self.incident_nets.len() * std::mem::size_of::<HyperedgeId>()),
            ("hyperedges", self.edges.len() * std::mem::size_of::<Hyperedge>()),
            ("incidence array", self.incidence_array.len() * std::mem::size_of::<HypernodeId>()),
            ("communities", self.community_ids.capacity() * std::mem::size_of::<CommunityId>()),
        ];
        MemoryReport { children }
    }
}

/// Named byte counts, one entry per backing array.
#[derive(Debug, Clone)]
pub struct MemoryReport {
    pub children: Vec<(&'static str, usize)>,
}

impl MemoryReport {
    pub fn total_bytes(&self) -> usize {
        self.children.iter().map(|(_, b)| b).sum()
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, bytes) in &self.children {
            writeln!(f, "{name}: {bytes} B")?;
        }
        write!(f, "total: {} B", self.total_bytes())
    }
}

/// Parallel construction of [`StaticHypergraph`] from an edge list.
pub struct HypergraphFactory;

impl HypergraphFactory {
    /// Build a hypergraph from pin lists with optional weights.
    ///
    /// `stable_construction` sorts each vertex's incident-net slice so
    /// the layout does not depend on scheduling.
    pub fn from_edge_list(
        num_nodes: u32,
        edge_vector: &[Vec<HypernodeId>],
        edge_weights: Option<&[EdgeWeight]>,
        node_weights: Option<&[NodeWeight]>,
        stable_construction: bool,
    ) -> Result<StaticHypergraph, PartitionError> {
        let n = num_nodes as usize;
        let m = edge_vector.len();
        if let Some(w) = edge_weights {
            if w.len() != m {
                return Err(PartitionError::InvalidInput(format!(
                    "expected {m} edge weights, got {}",
                    w.len()
                )));
            }
        }
        if let Some(w) = node_weights {
            if w.len() != n {
                return Err(PartitionError::InvalidInput(format!(
                    "expected {n} node weights, got {}",
                    w.len()
                )));
            }
        }
        if let Some(bad) = edge_vector
            .par_iter()
            .flat_map_iter(|pins| pins.iter().copied())
            .find_any(|&p| p >= num_nodes)
        {
            return Err(PartitionError::InvalidInput(format!(
                "pin {bad} out of range for {num_nodes} nodes"
            )));
        }

        // Thread-local degree counting, summed into one shared array.
        let degrees: Vec<u32> = edge_vector
            .par_iter()
            .fold(
                || vec![0u32; n],
                |mut counter, pins| {
                    for &p in pins {
                        counter[p as usize] += 1;
                    }
                    counter
                },
            )
            .reduce(
                || vec![0u32; n],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );

        // Degree prefix sum yields incident-net first entries.
        let mut net_offsets: Vec<usize> = degrees.iter().map(|&d| d as usize).collect();
        let num_pins = inclusive_prefix_sum(&mut net_offsets);
        let first_net_entry =
            |v: usize| -> usize { net_offsets[v] - degrees[v] as usize };

        // Edge size prefix sum yields incidence-array first entries.
        let mut pin_offsets: Vec<usize> = edge_vector.iter().map(|pins| pins.len()).collect();
        let total_pins = inclusive_prefix_sum(&mut pin_offsets);
        debug_assert_eq!(num_pins, total_pins);
        let first_pin_entry =
            |e: usize| -> usize { pin_offsets[e] - edge_vector[e].len() };

        // Parallel pin writes; each edge owns a disjoint slice.
        let incidence: Vec<AtomicU32> = (0..num_pins).map(|_| AtomicU32::new(0)).collect();
        edge_vector.par_iter().enumerate().for_each(|(e, pins)| {
            let begin = first_pin_entry(e);
            for (i, &p) in pins.iter().enumerate() {
                incidence[begin + i].store(p, Ordering::Relaxed);
            }
        });

        // Incident nets through per-vertex atomic write cursors.
        let cursors: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        let nets: Vec<AtomicU32> = (0..num_pins).map(|_| AtomicU32::new(0)).collect();
        edge_vector.par_iter().enumerate().for_each(|(e, pins)| {
            for &p in pins {
                let slot =
                    first_net_entry(p as usize) + cursors[p as usize].fetch_add(1, Ordering::Relaxed) as usize;
                nets[slot].store(e as HyperedgeId, Ordering::Relaxed);
            }
        });

        let incidence_array: Vec<HypernodeId> =
            incidence.into_iter().map(AtomicU32::into_inner).collect();
        let mut incident_nets: Vec<HyperedgeId> =
            nets.into_iter().map(AtomicU32::into_inner).collect();

        if stable_construction {
            // Sort each vertex's slice so the ordering matches a
            // sequential construction.
            let mut slices: Vec<&mut [HyperedgeId]> = Vec::with_capacity(n);
            let mut rest: &mut [HyperedgeId] = &mut incident_nets;
            let mut consumed = 0usize;
            for v in 0..n {
                let end = net_offsets[v];
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(end - consumed);
                slices.push(head);
                consumed = end;
                rest = tail;
            }
            slices.into_par_iter().for_each(|s| s.sort_unstable());
        }

        let nodes: Vec<Hypernode> = (0..n)
            .into_par_iter()
            .map(|v| Hypernode {
                begin: first_net_entry(v),
                size: degrees[v],
                weight: node_weights.map_or(1, |w| w[v]),
                enabled: true,
            })
            .collect();
        let edges: Vec<Hyperedge> = (0..m)
            .into_par_iter()
            .map(|e| Hyperedge {
                begin: first_pin_entry(e),
                size: edge_vector[e].len() as u32,
                weight: edge_weights.map_or(1, |w| w[e]),
                enabled: true,
            })
            .collect();

        let max_edge_size = edge_vector.par_iter().map(|p| p.len() as u32).max().unwrap_or(0);

        let mut hg = StaticHypergraph {
            num_nodes,
            num_edges: m as u32,
            num_pins,
            num_removed_nodes: 0,
            max_edge_size,
            total_weight: 0,
            nodes,
            incident_nets,
            edges,
            incidence_array,
            community_ids: vec![0; n],
        };
        hg.compute_total_weight();
        log::debug!(
            "constructed hypergraph: {} nodes, {} edges, {} pins",
            hg.num_nodes,
            hg.num_edges,
            hg.num_pins
        );
        Ok(hg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> StaticHypergraph {
        // 7 nodes, 4 hyperedges; the fixture shared by the datastructure
        // tests: {0,2}, {0,1,3,4}, {3,4,6}, {2,5,6}.
        HypergraphFactory::from_edge_list(
            7,
            &[vec![0, 2], vec![0, 1, 3, 4], vec![3, 4, 6], vec![2, 5, 6]],
            None,
            None,
            true,
        )
        .unwrap()
    }

    #[test]
    fn stats() {
        let hg = toy();
        assert_eq!(hg.initial_num_nodes(), 7);
        assert_eq!(hg.initial_num_edges(), 4);
        assert_eq!(hg.initial_num_pins(), 12);
        assert_eq!(hg.total_weight(), 7);
        assert_eq!(hg.max_edge_size(), 4);
    }

    #[test]
    fn degree_and_pin_sums_agree() {
        let hg = toy();
        let degree_sum: u32 = hg.nodes().map(|v| hg.node_degree(v)).sum();
        let size_sum: u32 = hg.edges().map(|e| hg.edge_size(e)).sum();
        assert_eq!(degree_sum as usize, hg.initial_num_pins());
        assert_eq!(size_sum as usize, hg.initial_num_pins());
    }

    #[test]
    fn incidence_is_symmetric() {
        let hg = toy();
        for e in hg.edges() {
            for &p in hg.pins(e) {
                assert_eq!(
                    hg.incident_edges(p).iter().filter(|&&x| x == e).count(),
                    1,
                    "edge {e} should appear exactly once at pin {p}"
                );
            }
        }
    }

    #[test]
    fn stable_construction_sorts_incident_nets() {
        let hg = toy();
        for v in hg.nodes() {
            let nets = hg.incident_edges(v);
            assert!(nets.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn rejects_out_of_range_pin() {
        let r = HypergraphFactory::from_edge_list(3, &[vec![0, 3]], None, None, false);
        assert!(matches!(r, Err(PartitionError::InvalidInput(_))));
    }

    #[test]
    fn removes_degree_zero_node() {
        let mut hg = HypergraphFactory::from_edge_list(
            3,
            &[vec![1, 2]],
            None,
            None,
            false,
        )
        .unwrap();
        hg.remove_degree_zero_node(0).unwrap();
        assert_eq!(hg.num_removed_nodes(), 1);
        assert_eq!(hg.total_weight(), 2);
        assert_eq!(hg.nodes().collect::<Vec<_>>(), vec![1, 2]);
        assert!(hg.remove_degree_zero_node(1).is_err());
    }

    #[test]
    fn copy_laws() {
        let hg = toy();
        let seq = hg.copy();
        let par = hg.copy_parallel();
        assert_eq!(seq.incidence_array, par.incidence_array);
        assert_eq!(seq.incident_nets, par.incident_nets);
        assert_eq!(seq.total_weight(), par.total_weight());
        assert_eq!(seq.initial_num_pins(), par.initial_num_pins());
        assert_eq!(seq.max_edge_size(), par.max_edge_size());
    }

    #[test]
    fn memory_report_accounts_all_arrays() {
        let hg = toy();
        let report = hg.memory_consumption();
        assert_eq!(report.children.len(), 5);
        assert!(report.total_bytes() > 0);
    }
}
