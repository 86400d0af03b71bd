//! Multilevel coarsening: heavy-edge clustering and the level-stack
//! coarsener that drives repeated contraction down to the configured
//! contraction limit.

pub mod clustering;
pub mod coarsener;

pub use clustering::heavy_edge_clustering;
pub use coarsener::{coarsen, CoarseningHierarchy, Level};
