//! FM phase driver.
//!
//! Collects the boundary vertices of a level, splits them into seed
//! groups, and runs localized searches in parallel until a round stops
//! improving, the round budget is exhausted, or the phase deadline
//! passes. Every worker thread reuses one search instance.

use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;

use crate::config::Context;
use crate::datastructures::{HypernodeId, PartitionId, PartitionedHypergraph};
use crate::error::PartitionError;
use crate::parallel::with_thread_rng;
use crate::partition::metrics::Metrics;
use crate::refinement::fm::localized::LocalizedKWayFm;
use crate::refinement::fm::shared::FmSharedData;
use crate::refinement::Refiner;

/// Parallel localized k-way FM as a [`Refiner`].
pub struct FmRefiner {
    ctx: Context,
    num_threads: usize,
    shared: Option<FmSharedData>,
    hit_problem_size: bool,
}

impl FmRefiner {
    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            num_threads: ctx.effective_num_threads(),
            shared: None,
            hit_problem_size: false,
        }
    }

    /// Boundary vertices, shuffled globally or within block-local
    /// windows depending on configuration.
    fn collect_seed_pool(
        &self,
        phg: &PartitionedHypergraph<'_>,
        seeds: &[HypernodeId],
    ) -> Vec<HypernodeId> {
        let mut pool: Vec<HypernodeId> = if seeds.is_empty() {
            phg.hypergraph()
                .nodes()
                .filter(|&v| phg.is_border_node(v))
                .collect()
        } else {
            seeds.to_vec()
        };
        if self.ctx.shared_memory.use_localized_random_shuffle {
            let window = (pool.len() / self.num_threads.max(1)).max(1);
            with_thread_rng(|rng| {
                for chunk in pool.chunks_mut(window) {
                    chunk.shuffle(rng);
                }
            });
        } else {
            with_thread_rng(|rng| pool.shuffle(rng));
        }
        pool
    }
}

impl Refiner for FmRefiner {
    fn initialize(&mut self, phg: &PartitionedHypergraph<'_>) {
        self.shared = Some(FmSharedData::new(
            phg.hypergraph().initial_num_nodes() as usize,
        ));
    }

    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<'_>,
        seeds: &[HypernodeId],
        metrics: &mut Metrics,
    ) -> Result<bool, PartitionError> {
        self.hit_problem_size = false;
        let shared = self
            .shared
            .as_ref()
            .ok_or_else(|| PartitionError::InvariantViolation("FM refiner not initialized".into()))?;
        let max_part_weight = self.ctx.max_part_weight(phg.hypergraph().total_weight());
        let deadline = Instant::now() + self.ctx.refinement.fm.time_limit;
        let num_seeds = self.ctx.refinement.fm.num_seeds.max(1);

        let mut any_budget_hit = false;
        let mut total_improvement: i64 = 0;
        let rounds = if seeds.is_empty() { self.ctx.refinement.fm.rounds } else { 1 };
        for round in 0..rounds {
            shared.reset();
            let pool = self.collect_seed_pool(phg, seeds);
            if pool.is_empty() {
                break;
            }

            let round_improvement = AtomicI64::new(0);
            let budget_hit = AtomicBool::new(false);
            pool.par_chunks(num_seeds).for_each_init(
                || LocalizedKWayFm::new(&self.ctx, max_part_weight),
                |fm, chunk| {
                    if Instant::now() >= deadline {
                        return;
                    }
                    let result = fm.find_moves(phg, shared, chunk, Some(deadline));
                    round_improvement.fetch_add(result.improvement, Ordering::Relaxed);
                    if result.hit_move_budget {
                        budget_hit.store(true, Ordering::Relaxed);
                    }
                },
            );

            let improvement = round_improvement.load(Ordering::Relaxed);
            any_budget_hit |= budget_hit.load(Ordering::Relaxed);
            total_improvement += improvement;
            log::debug!("FM round {round}: improvement {improvement}");
            if improvement == 0 || Instant::now() >= deadline {
                break;
            }
        }
        self.hit_problem_size = any_budget_hit;

        // Concurrent searches may interleave; re-measure instead of
        // trusting the summed deltas.
        *metrics = Metrics::measure(phg, &self.ctx);
        Ok(total_improvement > 0)
    }

    fn max_blocks_per_search(&self) -> PartitionId {
        self.ctx.partition.k
    }

    fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads.max(1);
    }

    fn is_maximum_problem_size_reached(&self) -> bool {
        self.hit_problem_size
    }
}
