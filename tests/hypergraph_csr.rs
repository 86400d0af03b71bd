//! CSR construction tests for the graph specialization and the general
//! hypergraph store.

use hyperpart::prelude::*;

/// 7 nodes, edges {(1,2),(1,4),(2,3),(4,5),(4,6),(5,6)}, unit weights.
fn toy_graph() -> StaticGraph {
    StaticGraph::construct(
        7,
        &[
            vec![1, 2],
            vec![1, 4],
            vec![2, 3],
            vec![4, 5],
            vec![4, 6],
            vec![5, 6],
        ],
        None,
        None,
        true,
    )
    .unwrap()
}

#[test]
fn toy_graph_has_expected_stats() {
    let g = toy_graph();
    assert_eq!(g.initial_num_nodes(), 7);
    assert_eq!(g.initial_num_edges(), 6);
    assert_eq!(g.initial_num_pins(), 12);
    assert_eq!(g.total_weight(), 7);
    assert_eq!(g.max_edge_size(), 2);
}

#[test]
fn toy_graph_has_expected_degrees() {
    let g = toy_graph();
    assert_eq!(g.node_degree(0), 0);
    for v in [1u32, 2, 5, 6] {
        assert_eq!(g.node_degree(v), 2, "node {v}");
    }
    assert_eq!(g.node_degree(3), 1);
    assert_eq!(g.node_degree(4), 3);
}

#[test]
fn graph_store_rejects_hyperedges() {
    let r = StaticGraph::construct(4, &[vec![0, 1, 2]], None, None, false);
    assert!(matches!(r, Err(PartitionError::InvalidInput(_))));
    let r = StaticGraph::construct(4, &[vec![0]], None, None, false);
    assert!(matches!(r, Err(PartitionError::InvalidInput(_))));
}

#[test]
fn csr_round_trip_preserves_edge_multiset() {
    let edge_list: Vec<Vec<u32>> = vec![
        vec![0, 3, 5],
        vec![1, 2],
        vec![0, 1, 2, 6],
        vec![4, 5],
        vec![4, 5],
    ];
    let hg = HypergraphFactory::from_edge_list(7, &edge_list, None, None, true).unwrap();
    let mut expected: Vec<Vec<u32>> = edge_list
        .iter()
        .map(|pins| {
            let mut p = pins.clone();
            p.sort_unstable();
            p
        })
        .collect();
    expected.sort();
    let mut actual: Vec<Vec<u32>> = hg
        .edges()
        .map(|e| {
            let mut p = hg.pins(e).to_vec();
            p.sort_unstable();
            p
        })
        .collect();
    actual.sort();
    assert_eq!(expected, actual);
}

#[test]
fn parallel_and_sequential_copies_are_bitwise_equal() {
    let hg = HypergraphFactory::from_edge_list(
        6,
        &[vec![0, 1, 2], vec![2, 3], vec![3, 4, 5], vec![0, 5]],
        Some(&[2, 1, 3, 1]),
        Some(&[1, 2, 3, 4, 5, 6]),
        true,
    )
    .unwrap();
    let seq = hg.copy();
    let par = hg.copy_parallel();
    assert_eq!(seq.initial_num_nodes(), par.initial_num_nodes());
    assert_eq!(seq.initial_num_edges(), par.initial_num_edges());
    assert_eq!(seq.initial_num_pins(), par.initial_num_pins());
    assert_eq!(seq.total_weight(), par.total_weight());
    assert_eq!(seq.max_edge_size(), par.max_edge_size());
    for e in seq.edges() {
        assert_eq!(seq.pins(e), par.pins(e));
        assert_eq!(seq.edge_weight(e), par.edge_weight(e));
    }
    for v in seq.nodes() {
        assert_eq!(seq.incident_edges(v), par.incident_edges(v));
        assert_eq!(seq.node_weight(v), par.node_weight(v));
        assert_eq!(seq.community_id(v), par.community_id(v));
    }
}

#[test]
fn degree_sum_equals_pin_sum() {
    let hg = HypergraphFactory::from_edge_list(
        9,
        &[vec![0, 1, 2, 3], vec![3, 4], vec![5, 6, 7], vec![7, 8], vec![0, 8]],
        None,
        None,
        false,
    )
    .unwrap();
    let degree_sum: u32 = hg.nodes().map(|v| hg.node_degree(v)).sum();
    let size_sum: u32 = hg.edges().map(|e| hg.edge_size(e)).sum();
    assert_eq!(degree_sum as usize, hg.initial_num_pins());
    assert_eq!(size_sum as usize, hg.initial_num_pins());
    // Each pin's record lists the edge exactly once.
    for e in hg.edges() {
        for &p in hg.pins(e) {
            assert_eq!(hg.incident_edges(p).iter().filter(|&&x| x == e).count(), 1);
        }
    }
}
