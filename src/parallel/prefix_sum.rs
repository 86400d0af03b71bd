//! Parallel inclusive prefix sums.
//!
//! The contraction and CSR construction phases turn per-element counts
//! into first-entry offsets with an inclusive scan. The scan runs in
//! three passes: per-chunk sums, a sequential scan over the (few) chunk
//! totals, and a parallel rewrite of each chunk with its base offset.

use rayon::prelude::*;
use std::ops::AddAssign;

const SEQUENTIAL_CUTOFF: usize = 1 << 13;

/// In-place inclusive prefix sum over `values`. Returns the total sum
/// (the last element after the scan, or zero for an empty slice).
pub fn inclusive_prefix_sum<T>(values: &mut [T]) -> T
where
    T: Copy + Default + AddAssign + Send + Sync,
{
    let n = values.len();
    if n == 0 {
        return T::default();
    }
    if n <= SEQUENTIAL_CUTOFF {
        let mut acc = T::default();
        for v in values.iter_mut() {
            acc += *v;
            *v = acc;
        }
        return acc;
    }

    let num_chunks = rayon::current_num_threads().max(1) * 4;
    let chunk_size = n.div_ceil(num_chunks);

    // Pass 1: independent scans inside each chunk.
    values.par_chunks_mut(chunk_size).for_each(|chunk| {
        let mut acc = T::default();
        for v in chunk.iter_mut() {
            acc += *v;
            *v = acc;
        }
    });

    // Pass 2: scan of chunk totals into per-chunk base offsets.
    let mut bases: Vec<T> = Vec::with_capacity(n.div_ceil(chunk_size));
    let mut acc = T::default();
    for chunk in values.chunks(chunk_size) {
        bases.push(acc);
        let mut last = acc;
        last += *chunk.last().expect("chunks are non-empty");
        acc = last;
    }

    // Pass 3: shift every chunk by its base.
    values
        .par_chunks_mut(chunk_size)
        .zip(bases.par_iter())
        .for_each(|(chunk, &base)| {
            for v in chunk.iter_mut() {
                *v += base;
            }
        });

    values[n - 1]
}
