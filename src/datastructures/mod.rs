//! Core data structures: the immutable CSR hypergraph and its graph
//! specialization, parallel contraction, the partitioned overlay with
//! gain caches, and the control structures for asynchronous
//! uncontraction (per-node locks, contraction-group pool).

pub mod contraction;
pub mod fast_reset_bitset;
pub mod gain_cache;
pub mod graph;
pub mod group_pool;
pub mod hypergraph;
pub mod node_locks;
pub mod partitioned;

pub use fast_reset_bitset::FastResetBitset;
pub use graph::StaticGraph;
pub use group_pool::{ContractionGroup, GroupId, GroupPool, Memento, INVALID_GROUP};
pub use hypergraph::{HypergraphFactory, StaticHypergraph};
pub use node_locks::NodeLockManager;
pub use partitioned::PartitionedHypergraph;

/// Dense vertex identifier.
pub type HypernodeId = u32;
/// Dense hyperedge identifier.
pub type HyperedgeId = u32;
/// Block identifier, `0..k`.
pub type PartitionId = u32;
/// Monotonic identifier of a published move.
pub type MoveId = u32;
/// Community label carried by vertices across contraction.
pub type CommunityId = u32;

/// Vertex and edge weights. Signed so gain arithmetic stays in one type.
pub type NodeWeight = i64;
pub type EdgeWeight = i64;
pub type Gain = i64;

pub const INVALID_NODE: HypernodeId = u32::MAX;
pub const INVALID_EDGE: HyperedgeId = u32::MAX;
pub const INVALID_PART: PartitionId = u32::MAX;
pub const INVALID_GAIN: Gain = i64::MIN;
