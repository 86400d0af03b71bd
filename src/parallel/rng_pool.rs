//! Deterministically seeded worker pools.
//!
//! Every parallel phase of the partitioner draws randomness from a
//! thread-local [`SmallRng`] seeded from the run's `partition.seed` and
//! the worker index through a SplitMix64 mixer. Two runs with the same
//! seed and thread count therefore shuffle, sample and tie-break
//! identically.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::cell::{Cell, RefCell};

thread_local! {
    static TLS_RNG: RefCell<Option<SmallRng>> = const { RefCell::new(None) };
    static TLS_WORKER_IDX: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Steele/Vigna SplitMix64 mixer.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn mix_seed(global_seed: u64, worker_index: usize) -> u64 {
    let x = global_seed
        ^ 0xD6E8_FEB8_6659_FD93u64
        ^ (worker_index as u64).wrapping_mul(0x9E37_79B1_85EB_CA87);
    splitmix64(x)
}

/// Derive a phase-specific salt from the global seed, a label naming the
/// phase, and an extra discriminator (e.g. the coarsening level).
pub fn derive_salt(global_seed: u64, label: &str, extra: u64) -> u64 {
    let mut h = global_seed ^ 0xA076_1D64_78BD_642F;
    h = splitmix64(h ^ extra.rotate_left(17));
    for &b in label.as_bytes() {
        h = splitmix64(h ^ b as u64);
    }
    h
}

/// Build a Rayon pool whose workers are seeded deterministically from
/// `global_seed`. Use via [`ThreadPool::install`].
pub fn build_rng_thread_pool(global_seed: u64, num_threads: usize) -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .start_handler(move |idx| {
            let seed = mix_seed(global_seed, idx);
            TLS_RNG.with(|cell| {
                *cell.borrow_mut() = Some(SmallRng::seed_from_u64(seed));
            });
            TLS_WORKER_IDX.with(|c| c.set(Some(idx)));
        })
        .exit_handler(|_| {
            TLS_RNG.with(|cell| *cell.borrow_mut() = None);
            TLS_WORKER_IDX.with(|c| c.set(None));
        })
        .build()
        .expect("failed to build seeded thread pool")
}

/// Install a seeded pool and run `f` inside it; all Rayon parallelism
/// within `f` uses this pool.
pub fn install_with_rng_pool<F, R>(global_seed: u64, num_threads: usize, f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    build_rng_thread_pool(global_seed, num_threads).install(f)
}

/// Borrow the worker's thread-local RNG. Outside a seeded pool a
/// deterministic fallback RNG derived from the thread context is used,
/// so sequential callers (tests, single-threaded runs) keep working.
pub fn with_thread_rng<T>(f: impl FnOnce(&mut SmallRng) -> T) -> T {
    TLS_RNG.with(|cell| {
        let mut opt = cell.borrow_mut();
        let rng = opt.get_or_insert_with(|| SmallRng::seed_from_u64(splitmix64(0)));
        f(rng)
    })
}

/// The current worker index, if inside a seeded pool.
pub fn worker_index() -> Option<usize> {
    TLS_WORKER_IDX.with(|c| c.get())
}
