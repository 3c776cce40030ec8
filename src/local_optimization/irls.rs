//! Iteratively reweighted least squares with a Cauchy kernel.

use nalgebra::Vector2;

use crate::estimators::Estimator;
use crate::local_optimization::correspondences_from_pairs;
use crate::models::Model;
use crate::scoring::{MatchContext, Score, ScoringChoice};
use crate::types::MatchPair;

const CONVERGENCE_TOLERANCE: f64 = 1e-6;

pub struct IrlsOptimizer {
    max_iterations: usize,
}

impl IrlsOptimizer {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
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
        if inliers.len() < non_minimal {
            return None;
        }
        let threshold = scoring.threshold();

        let mut working_model = model.clone();
        let mut working_set = inliers.to_vec();
        let mut best: Option<(Model, Score, Vec<MatchPair>)> = None;
        let mut best_score = *score;
        let mut previous_value = score.value;

        let mut models: Vec<Model> = Vec::new();
        let mut rescored: Vec<MatchPair> = Vec::with_capacity(ctx.source.nrows());
        let mut weights: Vec<f64> = Vec::with_capacity(inliers.len());

        for _ in 0..self.max_iterations {
            if working_set.len() < non_minimal {
                break;
            }

            weights.clear();
            for &(src, dst) in &working_set {
                let s = Vector2::new(ctx.source[(src, 0)], ctx.source[(src, 1)]);
                let d = Vector2::new(ctx.destination[(dst, 0)], ctx.destination[(dst, 1)]);
                let residual = estimator.residual(&working_model, &s, &d);
                let normalized = residual / threshold;
                weights.push(1.0 / (1.0 + normalized * normalized));
            }

            let correspondences = correspondences_from_pairs(ctx, &working_set);
            models.clear();
            if !estimator.estimate_non_minimal(&correspondences, Some(&weights), &mut models) {
                break;
            }
            let Some(candidate) = models.iter().find(|m| estimator.is_valid_model(m)) else {
                break;
            };

            rescored.clear();
            let candidate_score = scoring.score(ctx, candidate, estimator, pool, &mut rescored);
            if candidate_score > best_score {
                best_score = candidate_score;
                best = Some((candidate.clone(), candidate_score, rescored.clone()));
                working_set = rescored.clone();
            }
            working_model = candidate.clone();

            let change = (candidate_score.value - previous_value).abs();
            if change <= CONVERGENCE_TOLERANCE * previous_value.abs().max(1.0) {
                break;
            }
            previous_value = candidate_score.value;
        }

        best
    }
}
