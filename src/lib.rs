//! # hyperpart
//!
//! hyperpart is a shared-memory parallel multilevel hypergraph
//! partitioner. Given a hypergraph with vertex and edge weights, a
//! block count `k ≥ 2` and an imbalance tolerance `ε > 0`, it assigns
//! every vertex to one of `k` blocks so that no block exceeds
//! `⌈(1+ε)·W/k⌉` total weight while minimizing either the edge cut or
//! the km1 connectivity metric.
//!
//! ## Features
//! - Compressed immutable CSR hypergraph store with a two-pin graph
//!   specialization, parallel construction and parallel contraction
//!   (including parallel-net elimination by fingerprint hashing)
//! - Asynchronous uncontraction over a DAG of contraction groups,
//!   guarded by per-node locks
//! - Parallel localized k-way FM refinement with gain caches, a shared
//!   move sequence and rollback to the best observed prefix
//! - Flow-based refinement on quotient-graph block pairs with a
//!   block-weight reservation protocol
//! - hMetis-format input and partition-file output
//!
//! ## Usage
//!
//! ```no_run
//! use hyperpart::prelude::*;
//!
//! # fn main() -> Result<(), hyperpart::error::PartitionError> {
//! let hg = read_hypergraph_file("instance.hgr", true)?;
//! let mut ctx = Context::default();
//! ctx.partition.k = 8;
//! ctx.partition.epsilon = 0.03;
//! let result = partition(&hg, &ctx)?;
//! write_partition_file("instance.part.8", &result.parts)?;
//! println!("km1 = {}", result.metrics.km1);
//! # Ok(())
//! # }
//! ```
//!
//! Runs are reproducible for a fixed `partition.seed` and thread
//! count; all parallel phases draw randomness from deterministically
//! seeded worker pools.

pub mod coarsening;
pub mod config;
pub mod datastructures;
pub mod error;
pub mod io;
pub mod parallel;
pub mod partition;
pub mod refinement;

/// The most-used types and entry points in one import.
pub mod prelude {
    pub use crate::config::{Context, FlowAlgorithm, Objective};
    pub use crate::datastructures::{
        HyperedgeId, HypergraphFactory, HypernodeId, PartitionId, PartitionedHypergraph,
        StaticGraph, StaticHypergraph,
    };
    pub use crate::error::PartitionError;
    pub use crate::io::{read_hypergraph_file, write_partition_file};
    pub use crate::partition::{partition, Metrics, PartitionResult};
}
