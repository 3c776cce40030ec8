//! PROSAC sampler: progressively grows the subset of high-priority ranks.
//!
//! The pool is assumed ordered by descending match quality (the main loop
//! maintains that ordering), so early iterations draw from a small
//! high-quality prefix and later ones relax towards uniform sampling over
//! the whole pool.

use crate::samplers::Sampler;
use crate::utils::UniformRandomGenerator;

pub struct ProsacSampler {
    rng: UniformRandomGenerator,
    growth_function: Vec<usize>,
    sample_size: usize,
    pool_size: usize,
    convergence_iterations: usize,
    kth_sample_number: usize,
    subset_size: usize,
}

impl ProsacSampler {
    /// `convergence_iterations` is the draw count after which the sampler
    /// behaves like plain uniform sampling.
    pub fn new(seed: u64, convergence_iterations: usize) -> Self {
        Self {
            rng: UniformRandomGenerator::new(seed),
            growth_function: Vec::new(),
            sample_size: 0,
            pool_size: 0,
            convergence_iterations,
            kth_sample_number: 1,
            subset_size: 0,
        }
    }

    fn build_growth_function(&mut self, pool_size: usize, sample_size: usize) {
        self.pool_size = pool_size;
        self.sample_size = sample_size;
        self.kth_sample_number = 1;
        self.growth_function.clear();
        self.growth_function.resize(pool_size, 0);

        let mut t_n = self.convergence_iterations as f64;
        for i in 0..sample_size {
            t_n *= (sample_size - i) as f64 / (pool_size - i) as f64;
        }

        let mut t_n_prime = 1usize;
        for i in 0..pool_size {
            if i + 1 <= sample_size {
                self.growth_function[i] = t_n_prime;
                continue;
            }
            let t_n_plus1 = (i + 1) as f64 * t_n / (i + 1 - sample_size) as f64;
            self.growth_function[i] = t_n_prime + (t_n_plus1 - t_n).ceil() as usize;
            t_n = t_n_plus1;
            t_n_prime = self.growth_function[i];
        }

        self.subset_size = sample_size;
        if self.subset_size > 0 {
            self.rng.reset(0, self.subset_size - 1);
        }
    }

    fn advance(&mut self) {
        self.kth_sample_number += 1;

        if self.kth_sample_number <= self.convergence_iterations
            && self.subset_size > 0
            && self.kth_sample_number > self.growth_function[self.subset_size - 1]
        {
            self.subset_size = (self.subset_size + 1).min(self.pool_size);
        }
    }
}

impl Sampler for ProsacSampler {
    fn initialize(&mut self, pool_size: usize) {
        self.pool_size = pool_size;
        self.growth_function.clear();
    }

    fn sample(&mut self, pool_size: usize, sample_size: usize, out: &mut [usize]) -> bool {
        if sample_size == 0
            || pool_size == 0
            || sample_size > pool_size
            || out.len() < sample_size
        {
            return false;
        }

        if self.growth_function.len() != pool_size || self.sample_size != sample_size {
            self.build_growth_function(pool_size, sample_size);
        }

        if self.kth_sample_number > self.convergence_iterations {
            self.rng.reset(0, pool_size - 1);
        } else {
            self.rng.reset(0, self.subset_size.saturating_sub(1));
        }
        self.rng.fill_unique(&mut out[..sample_size]);

        self.advance();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_draws_stay_in_quality_prefix() {
        let mut sampler = ProsacSampler::new(3, 100_000);
        sampler.initialize(100);
        let mut out = [0usize; 4];

        // The first draw must come from the minimal prefix of size 4.
        assert!(sampler.sample(100, 4, &mut out));
        assert!(out.iter().all(|&rank| rank < 4));

        // Early subsequent draws stay inside a small prefix.
        for _ in 0..8 {
            assert!(sampler.sample(100, 4, &mut out));
            assert!(out.iter().all(|&rank| rank < 10));
        }
    }

    #[test]
    fn draws_are_distinct_and_deterministic() {
        let mut a = ProsacSampler::new(11, 1000);
        let mut b = ProsacSampler::new(11, 1000);
        let mut out_a = [0usize; 5];
        let mut out_b = [0usize; 5];

        for _ in 0..50 {
            assert!(a.sample(60, 5, &mut out_a));
            assert!(b.sample(60, 5, &mut out_b));
            assert_eq!(out_a, out_b);
            for i in 0..5 {
                for j in (i + 1)..5 {
                    assert_ne!(out_a[i], out_a[j]);
                }
            }
        }
    }

    #[test]
    fn rejects_oversized_samples() {
        let mut sampler = ProsacSampler::new(0, 1000);
        let mut out = [0usize; 8];
        assert!(!sampler.sample(4, 8, &mut out));
    }
}
