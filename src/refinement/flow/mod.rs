//! Flow-based refinement on pairs of adjacent blocks.
//!
//! The quotient graph tracks which block pairs share cut hyperedges; a
//! scheduler hands out pairs under block locks or optimistic vertex
//! reservations; each task builds a bounded flow network around the
//! pair's cut, solves it with Dinic's algorithm, and applies the
//! min-cut bipartition when it strictly improves the objective within
//! the reserved block weights.

pub mod dinic;
pub mod network;
pub mod quotient;
pub mod refiner;
pub mod scheduler;

pub use quotient::{BlockWeightTable, QuotientGraph};
pub use refiner::FlowRefiner;
pub use scheduler::FlowScheduler;
