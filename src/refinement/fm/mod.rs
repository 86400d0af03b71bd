//! Localized k-way FM refinement.
//!
//! Thread-local searches grow a frontier from seed vertices through an
//! addressable priority queue, apply moves through the shared
//! partitioned hypergraph, publish them to a shared move sequence, and
//! roll back to the best observed prefix.

pub mod driver;
pub mod localized;
pub mod pq;
pub mod shared;

pub use driver::FmRefiner;
pub use localized::LocalizedKWayFm;
pub use shared::{FmSharedData, Move, MoveTracker};
