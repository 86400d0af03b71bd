//! Shared-memory parallel plumbing: deterministically seeded thread
//! pools, parallel prefix sums, and a two-phase handoff queue for
//! cross-thread work transfer.

pub mod handoff;
pub mod prefix_sum;
pub mod rng_pool;

pub use handoff::HandoffQueue;
pub use prefix_sum::inclusive_prefix_sum;
pub use rng_pool::{
    build_rng_thread_pool, derive_salt, install_with_rng_pool, with_thread_rng, worker_index,
};
