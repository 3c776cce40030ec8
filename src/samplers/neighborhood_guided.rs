//! Spatially coherent sampler guided by the grid neighborhood graph.
//!
//! A random center point is drawn uniformly; the rest of the minimal
//! sample comes from the center's cell and its 8-connected neighborhood.
//! When a neighborhood is too small the draw retries with a new center and
//! eventually falls back to a uniform draw, so the sampler never stalls on
//! sparse regions.

use crate::neighborhood::GridNeighborhoodGraph;
use crate::samplers::Sampler;
use crate::utils::UniformRandomGenerator;

const MAX_CENTER_ATTEMPTS: usize = 32;

pub struct NeighborhoodSampler<'a> {
    graph: &'a GridNeighborhoodGraph<'a>,
    rng: UniformRandomGenerator,
    pool_size: usize,
}

impl<'a> NeighborhoodSampler<'a> {
    pub fn new(seed: u64, graph: &'a GridNeighborhoodGraph<'a>) -> Self {
        Self {
            graph,
            rng: UniformRandomGenerator::new(seed),
            pool_size: 0,
        }
    }

    fn try_neighborhood_draw(
        &mut self,
        pool_size: usize,
        sample_size: usize,
        out: &mut [usize],
    ) -> bool {
        self.rng.reset(0, pool_size - 1);
        let center = self.rng.next_value();

        let mut neighbors = self.graph.neighbors_with_adjacent(center);
        neighbors.retain(|&idx| idx != center && idx < pool_size);
        if neighbors.len() < sample_size - 1 {
            return false;
        }

        out[0] = center;
        if neighbors.len() == sample_size - 1 {
            out[1..sample_size].copy_from_slice(&neighbors);
            return true;
        }

        let mut picks = vec![0usize; sample_size - 1];
        self.rng.reset(0, neighbors.len() - 1);
        self.rng.fill_unique(&mut picks);
        for (dst, &pick) in out[1..sample_size].iter_mut().zip(picks.iter()) {
            *dst = neighbors[pick];
        }
        true
    }
}

impl Sampler for NeighborhoodSampler<'_> {
    fn initialize(&mut self, pool_size: usize) {
        self.pool_size = pool_size;
        if pool_size > 0 {
            self.rng.reset(0, pool_size - 1);
        }
    }

    fn sample(&mut self, pool_size: usize, sample_size: usize, out: &mut [usize]) -> bool {
        if sample_size == 0
            || pool_size == 0
            || sample_size > pool_size
            || out.len() < sample_size
        {
            return false;
        }

        if sample_size == 1 {
            self.rng.reset(0, pool_size - 1);
            out[0] = self.rng.next_value();
            return true;
        }

        for _ in 0..MAX_CENTER_ATTEMPTS {
            if self.try_neighborhood_draw(pool_size, sample_size, out) {
                return true;
            }
        }

        // Sparse neighborhoods everywhere; fall back to a uniform draw.
        self.rng.reset(0, pool_size - 1);
        self.rng.fill_unique(&mut out[..sample_size]);
        true
    }
}
