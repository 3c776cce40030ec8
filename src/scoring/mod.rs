//! Model-quality evaluation over multi-match correspondences.
//!
//! For every source row the scorer evaluates the residual of each candidate
//! destination, keeps the single best candidate (ties go to the lower
//! destination index), and accumulates that candidate's gain. A candidate
//! below the inlier threshold also contributes a `(source, destination)`
//! pair to the inlier set, so each source row yields at most one inlier.

pub mod magsac;
pub mod msac;

pub use magsac::MagsacScoring;
pub use msac::MsacScoring;

use nalgebra::Vector2;
use rayon::prelude::*;

use crate::estimators::Estimator;
use crate::models::Model;
use crate::types::{DataMatrix, MatchMatrix, MatchPair};

/// Borrowed view of everything one estimation call scores against.
#[derive(Clone, Copy)]
pub struct MatchContext<'a> {
    pub source: &'a DataMatrix,
    pub destination: &'a DataMatrix,
    pub matches: &'a MatchMatrix,
    pub match_scores: &'a DataMatrix,
}

/// Aggregate model quality. Larger `value` is better; equal values are
/// tie-broken by the inlier count. The invalid sentinel sorts below every
/// valid score.
#[derive(Debug, Clone, Copy)]
pub struct Score {
    pub value: f64,
    pub inlier_count: usize,
    /// Continuous likelihood sum; informational, not part of the ordering.
    pub likelihood: f64,
}

impl Score {
    pub fn invalid() -> Self {
        Self {
            value: f64::NEG_INFINITY,
            inlier_count: 0,
            likelihood: 0.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_finite()
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.inlier_count == other.inlier_count
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match self.value.partial_cmp(&other.value) {
            Some(std::cmp::Ordering::Equal) => {
                self.inlier_count.partial_cmp(&other.inlier_count)
            }
            ordering => ordering,
        }
    }
}

/// Per-residual gain function distinguishing the scoring variants; the
/// candidate walk and the inlier rule are shared.
pub(crate) trait ResidualGain {
    /// Gain contributed by a residual; zero for clear outliers.
    fn gain(&self, residual: f64) -> f64;

    /// Hard inlier threshold used for membership and counting.
    fn inlier_threshold(&self) -> f64;
}

/// Closed set of scoring strategies selectable through the settings.
pub enum ScoringChoice {
    Msac(MsacScoring),
    Magsac(MagsacScoring),
}

impl ScoringChoice {
    pub fn threshold(&self) -> f64 {
        match self {
            ScoringChoice::Msac(s) => s.inlier_threshold(),
            ScoringChoice::Magsac(s) => s.inlier_threshold(),
        }
    }

    /// Score `model` against all matches; best-candidate inlier pairs are
    /// written to `inliers` ordered by source row.
    pub fn score<E: Estimator + Sync>(
        &self,
        ctx: &MatchContext<'_>,
        model: &Model,
        estimator: &E,
        pool: Option<&rayon::ThreadPool>,
        inliers: &mut Vec<MatchPair>,
    ) -> Score {
        match self {
            ScoringChoice::Msac(s) => score_impl(s, ctx, model, estimator, pool, inliers),
            ScoringChoice::Magsac(s) => score_impl(s, ctx, model, estimator, pool, inliers),
        }
    }
}

struct PartialScore {
    value: f64,
    likelihood: f64,
    inliers: Vec<MatchPair>,
}

/// Best destination candidate of one source row: `(dst_idx, residual)`.
fn best_candidate<E: Estimator>(
    ctx: &MatchContext<'_>,
    model: &Model,
    estimator: &E,
    row: usize,
) -> Option<(usize, f64)> {
    let destination_count = ctx.destination.nrows();
    let src = Vector2::new(ctx.source[(row, 0)], ctx.source[(row, 1)]);

    let mut best: Option<(usize, f64)> = None;
    for col in 0..ctx.matches.ncols() {
        let raw = ctx.matches[(row, col)];
        if raw < 0 || raw as usize >= destination_count {
            continue;
        }
        let dst_idx = raw as usize;
        let dst = Vector2::new(ctx.destination[(dst_idx, 0)], ctx.destination[(dst_idx, 1)]);
        let residual = estimator.residual(model, &src, &dst);
        if !residual.is_finite() {
            continue;
        }
        best = match best {
            None => Some((dst_idx, residual)),
            Some((best_idx, best_residual)) => {
                if residual < best_residual
                    || (residual == best_residual && dst_idx < best_idx)
                {
                    Some((dst_idx, residual))
                } else {
                    Some((best_idx, best_residual))
                }
            }
        };
    }
    best
}

fn score_rows<E: Estimator, G: ResidualGain>(
    gain: &G,
    ctx: &MatchContext<'_>,
    model: &Model,
    estimator: &E,
    rows: std::ops::Range<usize>,
) -> PartialScore {
    let threshold = gain.inlier_threshold();
    let mut partial = PartialScore {
        value: 0.0,
        likelihood: 0.0,
        inliers: Vec::new(),
    };

    for row in rows {
        let Some((dst_idx, residual)) = best_candidate(ctx, model, estimator, row) else {
            continue;
        };
        let g = gain.gain(residual);
        partial.value += g;
        partial.likelihood += g;
        if residual <= threshold {
            partial.inliers.push((row, dst_idx));
        }
    }
    partial
}

fn score_impl<E: Estimator + Sync, G: ResidualGain + Sync>(
    gain: &G,
    ctx: &MatchContext<'_>,
    model: &Model,
    estimator: &E,
    pool: Option<&rayon::ThreadPool>,
    inliers: &mut Vec<MatchPair>,
) -> Score {
    inliers.clear();
    let n = ctx.source.nrows();

    let partials: Vec<PartialScore> = match pool {
        Some(pool) if pool.current_num_threads() > 1 && n > 1 => {
            // Fixed contiguous chunks per worker: identical worker counts
            // reduce in the same order, keeping runs reproducible.
            let workers = pool.current_num_threads();
            let chunk = n.div_ceil(workers);
            pool.install(|| {
                (0..workers)
                    .into_par_iter()
                    .map(|w| {
                        let start = w * chunk;
                        let end = ((w + 1) * chunk).min(n);
                        score_rows(gain, ctx, model, estimator, start..end.max(start))
                    })
                    .collect()
            })
        }
        _ => vec![score_rows(gain, ctx, model, estimator, 0..n)],
    };

    let mut score = Score {
        value: 0.0,
        inlier_count: 0,
        likelihood: 0.0,
    };
    for partial in partials {
        score.value += partial.value;
        score.likelihood += partial.likelihood;
        inliers.extend_from_slice(&partial.inliers);
    }
    score.inlier_count = inliers.len();
    score
}
