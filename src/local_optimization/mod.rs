//! Refinement of a promising model from its inlier set.
//!
//! Both optimizers are monotone under the shared score ordering: they
//! return `Some` only when the refined model strictly beats the incoming
//! score, and `None` (keep the input) otherwise. Inlier sets smaller than
//! the non-minimal floor are left untouched.

pub mod irls;
pub mod nested_ransac;

pub use irls::IrlsOptimizer;
pub use nested_ransac::NestedRansacOptimizer;

use crate::estimators::Estimator;
use crate::models::Model;
use crate::scoring::{MatchContext, Score, ScoringChoice};
use crate::settings::{LocalOptimizationSettings, LocalOptimizationType};
use crate::types::{DataMatrix, MatchPair};

/// Closed set of local optimizers selectable through the settings.
pub enum LocalOptimizerChoice {
    None,
    NestedRansac(NestedRansacOptimizer),
    Irls(IrlsOptimizer),
}

impl LocalOptimizerChoice {
    pub fn from_settings(
        kind: LocalOptimizationType,
        settings: &LocalOptimizationSettings,
        seed: u64,
    ) -> Self {
        match kind {
            LocalOptimizationType::None => LocalOptimizerChoice::None,
            LocalOptimizationType::NestedRansac => LocalOptimizerChoice::NestedRansac(
                NestedRansacOptimizer::new(settings.max_iterations, settings.sample_size_multiplier, seed),
            ),
            LocalOptimizationType::Irls => {
                LocalOptimizerChoice::Irls(IrlsOptimizer::new(settings.max_iterations))
            }
        }
    }

    /// Refine `model` against the full context. Returns the improved
    /// `(model, score, inliers)` or `None` when the input stands.
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
        match self {
            LocalOptimizerChoice::None => None,
            LocalOptimizerChoice::NestedRansac(opt) => {
                opt.run(ctx, estimator, scoring, pool, model, score, inliers)
            }
            LocalOptimizerChoice::Irls(opt) => {
                opt.run(ctx, estimator, scoring, pool, model, score, inliers)
            }
        }
    }
}

/// Assemble the `rows x 4` correspondence matrix for a set of match pairs.
pub(crate) fn correspondences_from_pairs(
    ctx: &MatchContext<'_>,
    pairs: &[MatchPair],
) -> DataMatrix {
    let mut corr = DataMatrix::zeros(pairs.len(), 4);
    for (row, &(src, dst)) in pairs.iter().enumerate() {
        corr[(row, 0)] = ctx.source[(src, 0)];
        corr[(row, 1)] = ctx.source[(src, 1)];
        corr[(row, 2)] = ctx.destination[(dst, 0)];
        corr[(row, 3)] = ctx.destination[(dst, 1)];
    }
    corr
}
