//! Sampling strategies for drawing minimal sets from the source pool.
//!
//! Samplers draw indices into a pool of `pool_size` elements; the main loop
//! decides what the pool indexes (source rows directly, or ranks in a
//! quality ordering for PROSAC). All samplers are deterministic under a
//! fixed seed and always emit pairwise distinct indices.

pub mod neighborhood_guided;
pub mod prosac;
pub mod uniform;

pub use neighborhood_guided::NeighborhoodSampler;
pub use prosac::ProsacSampler;
pub use uniform::UniformSampler;

/// Minimal-sample source for the main loop.
pub trait Sampler {
    /// Prepare the sampler for a pool of the given size.
    fn initialize(&mut self, pool_size: usize);

    /// Draw `sample_size` distinct indices from `[0, pool_size)` into
    /// `out`. Returns false when the draw is impossible (for example
    /// `sample_size > pool_size`); the caller may retry or give up.
    fn sample(&mut self, pool_size: usize, sample_size: usize, out: &mut [usize]) -> bool;
}

/// Closed set of samplers selectable through the settings.
pub enum SamplerChoice<'a> {
    Uniform(UniformSampler),
    Prosac(ProsacSampler),
    Neighborhood(NeighborhoodSampler<'a>),
}

impl Sampler for SamplerChoice<'_> {
    fn initialize(&mut self, pool_size: usize) {
        match self {
            SamplerChoice::Uniform(s) => s.initialize(pool_size),
            SamplerChoice::Prosac(s) => s.initialize(pool_size),
            SamplerChoice::Neighborhood(s) => s.initialize(pool_size),
        }
    }

    fn sample(&mut self, pool_size: usize, sample_size: usize, out: &mut [usize]) -> bool {
        match self {
            SamplerChoice::Uniform(s) => s.sample(pool_size, sample_size, out),
            SamplerChoice::Prosac(s) => s.sample(pool_size, sample_size, out),
            SamplerChoice::Neighborhood(s) => s.sample(pool_size, sample_size, out),
        }
    }
}
