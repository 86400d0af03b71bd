//! Full-pipeline tests: coarsen, initial partition, uncoarsen and
//! refine, with the §-invariants checked on the result.

use hyperpart::config::Context;
use hyperpart::datastructures::PartitionedHypergraph;
use hyperpart::partition::metrics;
use hyperpart::prelude::*;

fn grid(width: u32, height: u32) -> StaticHypergraph {
    let mut edges = Vec::new();
    let id = |x: u32, y: u32| y * width + x;
    for y in 0..height {
        for x in 0..width {
            if x + 1 < width {
                edges.push(vec![id(x, y), id(x + 1, y)]);
            }
            if y + 1 < height {
                edges.push(vec![id(x, y), id(x, y + 1)]);
            }
        }
    }
    HypergraphFactory::from_edge_list(width * height, &edges, None, None, true).unwrap()
}

fn check_result(hg: &StaticHypergraph, ctx: &Context, result: &PartitionResult) {
    let k = ctx.partition.k;
    assert_eq!(result.parts.len(), hg.initial_num_nodes() as usize);
    assert!(result.parts.iter().all(|&p| p < k));

    let phg = PartitionedHypergraph::new(k, hg);
    for (v, &p) in result.parts.iter().enumerate() {
        phg.set_only_node_part(v as u32, p);
    }
    phg.initialize_partition();
    phg.validate_invariants().unwrap();

    // Pin-count and connectivity invariants per edge.
    for e in hg.edges() {
        let sum: u32 = (0..k).map(|b| phg.pin_count_in_part(e, b)).sum();
        assert_eq!(sum, hg.edge_size(e));
        let lambda = (0..k).filter(|&b| phg.pin_count_in_part(e, b) > 0).count() as u32;
        assert_eq!(lambda, phg.connectivity(e));
    }

    // Metric sandwich and reported values.
    let cut = metrics::cut(&phg);
    let km1 = metrics::km1(&phg);
    assert!(cut <= km1);
    assert!(km1 <= cut * hg.max_edge_size() as i64);
    assert_eq!(result.metrics.cut, cut);
    assert_eq!(result.metrics.km1, km1);

    // Balance with the documented reservation slack.
    assert!(result.metrics.imbalance <= ctx.partition.epsilon + 0.05 + 1e-9);
}

#[test]
fn bisects_a_grid() {
    let hg = grid(16, 16);
    let mut ctx = Context::default();
    ctx.partition.k = 2;
    ctx.partition.epsilon = 0.1;
    ctx.partition.seed = 42;
    ctx.coarsening.contraction_limit = 40;
    ctx.shared_memory.num_threads = 2;
    let result = partition(&hg, &ctx).unwrap();
    check_result(&hg, &ctx, &result);
    assert!(result.metrics.cut > 0);
}

#[test]
fn four_way_partition_with_flow_off() {
    let hg = grid(12, 12);
    let mut ctx = Context::default();
    ctx.partition.k = 4;
    ctx.partition.epsilon = 0.25;
    ctx.partition.seed = 7;
    ctx.coarsening.contraction_limit = 32;
    ctx.refinement.flow.algorithm = FlowAlgorithm::Off;
    ctx.shared_memory.num_threads = 2;
    let result = partition(&hg, &ctx).unwrap();
    check_result(&hg, &ctx, &result);
}

#[test]
fn cut_objective_pipeline() {
    let hg = grid(10, 10);
    let mut ctx = Context::default();
    ctx.partition.k = 2;
    ctx.partition.epsilon = 0.25;
    ctx.partition.objective = Objective::Cut;
    ctx.coarsening.contraction_limit = 25;
    ctx.shared_memory.num_threads = 2;
    let result = partition(&hg, &ctx).unwrap();
    check_result(&hg, &ctx, &result);
}

#[test]
fn optimistic_flow_pipeline() {
    let hg = grid(12, 12);
    let mut ctx = Context::default();
    ctx.partition.k = 3;
    ctx.partition.epsilon = 0.25;
    ctx.refinement.flow.algorithm = FlowAlgorithm::Optimistic;
    ctx.coarsening.contraction_limit = 30;
    ctx.shared_memory.num_threads = 2;
    let result = partition(&hg, &ctx).unwrap();
    check_result(&hg, &ctx, &result);
}

#[test]
fn tiny_input_skips_coarsening() {
    let hg = grid(3, 3);
    let mut ctx = Context::default();
    ctx.partition.k = 2;
    ctx.partition.epsilon = 0.5;
    ctx.coarsening.contraction_limit = 160;
    let result = partition(&hg, &ctx).unwrap();
    check_result(&hg, &ctx, &result);
}

#[test]
fn weighted_vertices_respect_balance() {
    // Weights 1..=36 on a 6x6 grid.
    let mut edges = Vec::new();
    let id = |x: u32, y: u32| y * 6 + x;
    for y in 0..6u32 {
        for x in 0..6u32 {
            if x + 1 < 6 {
                edges.push(vec![id(x, y), id(x + 1, y)]);
            }
            if y + 1 < 6 {
                edges.push(vec![id(x, y), id(x, y + 1)]);
            }
        }
    }
    let weights: Vec<i64> = (1..=36).collect();
    let hg = HypergraphFactory::from_edge_list(36, &edges, None, Some(&weights), true).unwrap();
    let mut ctx = Context::default();
    ctx.partition.k = 2;
    ctx.partition.epsilon = 0.3;
    ctx.coarsening.contraction_limit = 12;
    let result = partition(&hg, &ctx).unwrap();
    check_result(&hg, &ctx, &result);
}
