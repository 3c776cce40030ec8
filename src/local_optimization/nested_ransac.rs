//! Nested RANSAC: an inner loop re-estimating the model from random
//! non-minimal subsets of the current inliers.

use crate::estimators::Estimator;
use crate::local_optimization::correspondences_from_pairs;
use crate::models::Model;
use crate::samplers::{Sampler, UniformSampler};
use crate::scoring::{MatchContext, Score, ScoringChoice};
use crate::types::MatchPair;

pub struct NestedRansacOptimizer {
    max_iterations: usize,
    sample_size_multiplier: usize,
    seed: u64,
}

impl NestedRansacOptimizer {
    pub fn new(max_iterations: usize, sample_size_multiplier: usize, seed: u64) -> Self {
        Self {
            max_iterations,
            sample_size_multiplier,
            seed,
        }
    }

    pub fn run<E: Estimator + Sync>(
        &self,
        ctx: &MatchContext<'_>,
        estimator: &E,
        scoring: &ScoringChoice,
        pool: Option<&rayon::ThreadPool>,
        model: &Model,
        score: &Score,
        inliers: &[MatchPair],
    ) -> Option<(Model, Score, Vec<MatchPair>)> {
        let non_minimal = estimator.non_minimal_sample_size();
        if inliers.len() <= non_minimal {
            return None;
        }
        let sample_cap = self.sample_size_multiplier * non_minimal;

        // Re-score the incoming model to establish the working inlier pool.
        let mut best_model = model.clone();
        let mut best_inliers = Vec::with_capacity(ctx.source.nrows());
        let mut best_score = scoring.score(ctx, &best_model, estimator, pool, &mut best_inliers);

        let mut sampler = UniformSampler::new(self.seed);
        sampler.initialize(best_inliers.len());

        let mut ranks = vec![0usize; sample_cap];
        let mut models: Vec<Model> = Vec::new();
        let mut current_inliers: Vec<MatchPair> = Vec::with_capacity(ctx.source.nrows());
        let mut subset: Vec<MatchPair> = Vec::with_capacity(sample_cap);

        for _ in 0..self.max_iterations {
            let pool_size = best_inliers.len();
            let sample_size = pool_size.saturating_sub(1).min(sample_cap);
            if sample_size < non_minimal {
                break;
            }

            if !sampler.sample(pool_size, sample_size, &mut ranks[..sample_size]) {
                continue;
            }
            subset.clear();
            subset.extend(ranks[..sample_size].iter().map(|&rank| best_inliers[rank]));

            let correspondences = correspondences_from_pairs(ctx, &subset);
            models.clear();
            if !estimator.estimate_non_minimal(&correspondences, None, &mut models) {
                continue;
            }

            for candidate in &models {
                if !estimator.is_valid_model(candidate) {
                    continue;
                }
                current_inliers.clear();
                let candidate_score =
                    scoring.score(ctx, candidate, estimator, pool, &mut current_inliers);
                if candidate_score > best_score {
                    best_score = candidate_score;
                    best_model = candidate.clone();
                    std::mem::swap(&mut best_inliers, &mut current_inliers);
                    sampler.initialize(best_inliers.len());
                }
            }
        }

        if best_score > *score {
            Some((best_model, best_score, best_inliers))
        } else {
            None
        }
    }
}
