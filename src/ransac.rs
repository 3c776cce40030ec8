//! The main robust estimation loop.
//!
//! One call owns the whole pipeline: sample, solve, score, keep the best,
//! refine locally, stop when the confidence bound is met. All scratch
//! buffers are sized once up front; the iteration hot path allocates only
//! through the candidate-model vector, whose capacity is pre-reserved.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};

use crate::errors::EstimationError;
use crate::estimators::Estimator;
use crate::models::Model;
use crate::neighborhood::GridNeighborhoodGraph;
use crate::samplers::{NeighborhoodSampler, ProsacSampler, Sampler, SamplerChoice, UniformSampler};
use crate::scoring::{MagsacScoring, MatchContext, MsacScoring, Score, ScoringChoice};
use crate::settings::{
    LocalOptimizationCadence, RansacSettings, SamplerType, ScoringType,
};
use crate::local_optimization::LocalOptimizerChoice;
use crate::termination::TerminationChoice;
use crate::types::{DataMatrix, MatchMatrix, MatchPair};
use crate::utils::UniformRandomGenerator;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The confidence bound was satisfied before the iteration cap.
    Converged,
    /// The hard iteration cap was hit.
    MaxIterations,
    /// The caller's cancellation flag was observed mid-loop.
    Cancelled,
}

/// Output of a successful estimation.
#[derive(Debug, Clone)]
pub struct EstimationResult {
    pub model: Model,
    /// Accepted `(source, destination)` pairs, at most one per source row.
    pub inliers: Vec<MatchPair>,
    pub score: Score,
    pub iterations: usize,
    pub reason: TerminationReason,
}

/// Robust multi-match estimator for one geometry.
pub struct StereoGlue<E: Estimator> {
    estimator: E,
    settings: RansacSettings,
}

/// Consecutive failed draws tolerated before the loop gives up.
const MAX_CONSECUTIVE_DRAW_FAILURES: usize = 100;

impl<E: Estimator + Sync> StereoGlue<E> {
    pub fn new(estimator: E, settings: RansacSettings) -> Self {
        Self {
            estimator,
            settings,
        }
    }

    pub fn settings(&self) -> &RansacSettings {
        &self.settings
    }

    /// Run the loop over multi-match correspondences.
    ///
    /// `cancel`, when given, is polled between iterations; a cancelled run
    /// still returns its partial best if any model was found.
    pub fn run(
        &self,
        source: &DataMatrix,
        destination: &DataMatrix,
        matches: &MatchMatrix,
        match_scores: &DataMatrix,
        cancel: Option<&AtomicBool>,
    ) -> Result<EstimationResult, EstimationError> {
        validate_inputs(source, destination, matches, match_scores)?;

        let point_count = source.nrows();
        let sample_size = self.estimator.sample_size();
        if point_count < sample_size {
            return Err(EstimationError::InsufficientData {
                found: point_count,
                required: sample_size,
            });
        }

        let ctx = MatchContext {
            source,
            destination,
            matches,
            match_scores,
        };

        debug!(
            "estimation start: {} source points, {} destination points, {} candidates/row",
            point_count,
            destination.nrows(),
            matches.ncols()
        );

        let pool = if self.settings.core_number > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.settings.core_number)
                    .build()
                    .map_err(|e| {
                        EstimationError::InvalidInput(format!("worker pool: {e}"))
                    })?,
            )
        } else {
            None
        };
        let pool = pool.as_ref();

        // The neighborhood graph only exists when the sampler needs it; it
        // borrows the source matrix for the rest of the call.
        let graph = match self.settings.sampler {
            SamplerType::Neighborhood => Some(GridNeighborhoodGraph::build(
                source,
                Some(destination),
                self.settings.neighborhood_divisions,
            )?),
            _ => None,
        };

        // PROSAC draws ranks in a quality ordering; the other samplers
        // index source rows directly.
        let quality_order = match self.settings.sampler {
            SamplerType::Prosac => Some(quality_ordering(&ctx)),
            _ => None,
        };

        let mut sampler = match self.settings.sampler {
            SamplerType::Uniform => SamplerChoice::Uniform(UniformSampler::new(self.settings.seed)),
            SamplerType::Prosac => SamplerChoice::Prosac(ProsacSampler::new(
                self.settings.seed,
                self.settings.prosac_convergence_iterations,
            )),
            SamplerType::Neighborhood => SamplerChoice::Neighborhood(NeighborhoodSampler::new(
                self.settings.seed,
                graph.as_ref().expect("graph built for neighborhood sampler"),
            )),
        };
        sampler.initialize(point_count);

        let scoring = match self.settings.scoring {
            ScoringType::Msac => {
                ScoringChoice::Msac(MsacScoring::new(self.settings.inlier_threshold))
            }
            ScoringType::Magsac => {
                ScoringChoice::Magsac(MagsacScoring::new(self.settings.inlier_threshold))
            }
        };

        let termination = TerminationChoice::from_settings(&self.settings);
        let local_optimizer = LocalOptimizerChoice::from_settings(
            self.settings.local_optimization,
            &self.settings.local_optimization_settings,
            self.settings.seed.wrapping_add(1),
        );
        let final_optimizer = LocalOptimizerChoice::from_settings(
            self.settings.final_optimization,
            &self.settings.final_optimization_settings,
            self.settings.seed.wrapping_add(2),
        );

        // Per-call scratch, sized once.
        let mut ranks = vec![0usize; sample_size];
        let mut sample_pairs: Vec<MatchPair> = Vec::with_capacity(sample_size);
        let mut minimal_corr = DataMatrix::zeros(sample_size, 4);
        let mut models: Vec<Model> = Vec::with_capacity(10);
        let mut current_inliers: Vec<MatchPair> = Vec::with_capacity(point_count);
        let mut candidate_rng =
            UniformRandomGenerator::new(self.settings.seed.wrapping_add(3));

        let mut best_model: Option<Model> = None;
        let mut best_score = Score::invalid();
        let mut best_inliers: Vec<MatchPair> = Vec::with_capacity(point_count);

        let mut iteration = 0usize;
        let mut iteration_bound = self.settings.max_iterations;
        let mut consecutive_draw_failures = 0usize;
        let mut cancelled = false;

        while iteration < iteration_bound || iteration < self.settings.min_iterations {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }
            iteration += 1;

            if !sampler.sample(point_count, sample_size, &mut ranks) {
                consecutive_draw_failures += 1;
                if consecutive_draw_failures > MAX_CONSECUTIVE_DRAW_FAILURES {
                    break;
                }
                continue;
            }
            consecutive_draw_failures = 0;

            if !self.assemble_minimal_sample(
                &ctx,
                &ranks,
                quality_order.as_deref(),
                &mut candidate_rng,
                &mut sample_pairs,
                &mut minimal_corr,
            ) {
                continue;
            }

            models.clear();
            if !self.estimator.estimate_minimal(&minimal_corr, &mut models) {
                continue;
            }

            let mut improved = false;
            for model in &models {
                if !self.estimator.is_valid_model(model) {
                    continue;
                }
                current_inliers.clear();
                let score =
                    scoring.score(&ctx, model, &self.estimator, pool, &mut current_inliers);
                if score > best_score {
                    best_score = score;
                    best_model = Some(model.clone());
                    std::mem::swap(&mut best_inliers, &mut current_inliers);
                    improved = true;
                }
            }
            if improved {
                trace!(
                    "iteration {iteration}: best score {} with {} inliers",
                    best_score.value,
                    best_score.inlier_count
                );
            }

            let run_local_optimization = match self.settings.local_optimization_cadence {
                LocalOptimizationCadence::OnImprovement => improved,
                LocalOptimizationCadence::Periodic(period) => {
                    period > 0 && iteration % period == 0 && best_model.is_some()
                }
            };
            let mut refined = false;
            if run_local_optimization {
                if let Some(model) = &best_model {
                    if let Some((new_model, new_score, new_inliers)) = local_optimizer.run(
                        &ctx,
                        &self.estimator,
                        &scoring,
                        pool,
                        model,
                        &best_score,
                        &best_inliers,
                    ) {
                        best_model = Some(new_model);
                        best_score = new_score;
                        best_inliers = new_inliers;
                        refined = true;
                    }
                }
            }

            if improved || refined {
                iteration_bound = termination.required_iterations(
                    best_score.inlier_count,
                    point_count,
                    sample_size,
                );
            }
        }

        let reason = if cancelled {
            TerminationReason::Cancelled
        } else if iteration >= self.settings.max_iterations {
            TerminationReason::MaxIterations
        } else {
            TerminationReason::Converged
        };

        let Some(mut model) = best_model else {
            return Err(if cancelled {
                EstimationError::Cancelled
            } else {
                EstimationError::Degenerate
            });
        };

        if let Some((final_model, final_score, final_inliers)) = final_optimizer.run(
            &ctx,
            &self.estimator,
            &scoring,
            pool,
            &model,
            &best_score,
            &best_inliers,
        ) {
            model = final_model;
            best_score = final_score;
            best_inliers = final_inliers;
        }

        debug!(
            "estimation done after {iteration} iterations ({reason:?}): {} inliers",
            best_inliers.len()
        );

        Ok(EstimationResult {
            model,
            inliers: best_inliers,
            score: best_score,
            iterations: iteration,
            reason,
        })
    }

    /// Turn drawn ranks into `(source, destination)` pairs and the minimal
    /// correspondence matrix. Returns false for unusable samples (a source
    /// row without candidates, or two rows sharing a destination).
    fn assemble_minimal_sample(
        &self,
        ctx: &MatchContext<'_>,
        ranks: &[usize],
        quality_order: Option<&[usize]>,
        candidate_rng: &mut UniformRandomGenerator,
        sample_pairs: &mut Vec<MatchPair>,
        minimal_corr: &mut DataMatrix,
    ) -> bool {
        sample_pairs.clear();
        for &rank in ranks {
            let src_idx = quality_order.map_or(rank, |order| order[rank]);
            let Some(dst_idx) = self.pick_destination(ctx, src_idx, candidate_rng) else {
                return false;
            };
            if sample_pairs.iter().any(|&(_, d)| d == dst_idx) {
                return false;
            }
            sample_pairs.push((src_idx, dst_idx));
        }

        for (row, &(src, dst)) in sample_pairs.iter().enumerate() {
            minimal_corr[(row, 0)] = ctx.source[(src, 0)];
            minimal_corr[(row, 1)] = ctx.source[(src, 1)];
            minimal_corr[(row, 2)] = ctx.destination[(dst, 0)];
            minimal_corr[(row, 3)] = ctx.destination[(dst, 1)];
        }
        true
    }

    /// Candidate-destination policy: the uniform sampler explores the
    /// candidate list uniformly at random; the guided samplers commit to
    /// the best-scored candidate.
    fn pick_destination(
        &self,
        ctx: &MatchContext<'_>,
        src_idx: usize,
        candidate_rng: &mut UniformRandomGenerator,
    ) -> Option<usize> {
        let destination_count = ctx.destination.nrows();
        let is_valid = |col: usize| {
            let raw = ctx.matches[(src_idx, col)];
            (raw >= 0 && (raw as usize) < destination_count).then_some(raw as usize)
        };
        match self.settings.sampler {
            SamplerType::Uniform => {
                let valid_count = (0..ctx.matches.ncols())
                    .filter(|&col| is_valid(col).is_some())
                    .count();
                if valid_count == 0 {
                    return None;
                }
                let pick = if valid_count == 1 {
                    0
                } else {
                    candidate_rng.reset(0, valid_count - 1);
                    candidate_rng.next_value()
                };
                (0..ctx.matches.ncols())
                    .filter_map(is_valid)
                    .nth(pick)
            }
            SamplerType::Prosac | SamplerType::Neighborhood => {
                let mut best: Option<(usize, f64)> = None;
                for col in 0..ctx.matches.ncols() {
                    let Some(dst_idx) = is_valid(col) else {
                        continue;
                    };
                    let score = ctx.match_scores[(src_idx, col)];
                    let better = match best {
                        None => true,
                        Some((_, best_match_score)) => score < best_match_score,
                    };
                    if better {
                        best = Some((dst_idx, score));
                    }
                }
                best.map(|(idx, _)| idx)
            }
        }
    }
}

/// Source rows ordered by their best candidate match score, best first;
/// rows without candidates sort last. Ties keep the lower row index.
fn quality_ordering(ctx: &MatchContext<'_>) -> Vec<usize> {
    let destination_count = ctx.destination.nrows();
    let mut keyed: Vec<(f64, usize)> = (0..ctx.source.nrows())
        .map(|row| {
            let mut best = f64::INFINITY;
            for col in 0..ctx.matches.ncols() {
                let raw = ctx.matches[(row, col)];
                if raw >= 0 && (raw as usize) < destination_count {
                    best = best.min(ctx.match_scores[(row, col)]);
                }
            }
            (best, row)
        })
        .collect();
    keyed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    keyed.into_iter().map(|(_, row)| row).collect()
}

fn validate_inputs(
    source: &DataMatrix,
    destination: &DataMatrix,
    matches: &MatchMatrix,
    match_scores: &DataMatrix,
) -> Result<(), EstimationError> {
    if source.nrows() == 0 || destination.nrows() == 0 {
        return Err(EstimationError::InvalidInput(
            "point clouds must be non-empty".into(),
        ));
    }
    if source.ncols() < 2 || destination.ncols() < 2 {
        return Err(EstimationError::InvalidInput(
            "point clouds need at least x and y columns".into(),
        ));
    }
    if matches.nrows() != source.nrows() || matches.ncols() == 0 {
        return Err(EstimationError::InvalidInput(format!(
            "match table is {}x{} but the source has {} rows",
            matches.nrows(),
            matches.ncols(),
            source.nrows()
        )));
    }
    if match_scores.shape() != matches.shape() {
        return Err(EstimationError::InvalidInput(
            "match scores must mirror the match table shape".into(),
        ));
    }
    if source.iter().any(|v| !v.is_finite()) || destination.iter().any(|v| !v.is_finite()) {
        return Err(EstimationError::InvalidInput(
            "non-finite coordinate in the point clouds".into(),
        ));
    }

    let destination_count = destination.nrows();
    for row in 0..matches.nrows() {
        for col in 0..matches.ncols() {
            let raw = matches[(row, col)];
            if raw < 0 || raw as usize >= destination_count {
                continue;
            }
            let score = match_scores[(row, col)];
            if !score.is_finite() || score < 0.0 {
                return Err(EstimationError::InvalidInput(format!(
                    "invalid match score at ({row}, {col})"
                )));
            }
            for other in (col + 1)..matches.ncols() {
                if matches[(row, other)] == raw {
                    return Err(EstimationError::InvalidInput(format!(
                        "duplicate destination candidate {raw} in match row {row}"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::HomographyEstimator;

    fn tiny_inputs() -> (DataMatrix, DataMatrix, MatchMatrix, DataMatrix) {
        let source = DataMatrix::zeros(6, 2);
        let destination = DataMatrix::zeros(6, 2);
        let matches = MatchMatrix::from_fn(6, 1, |r, _| r as i64);
        let scores = DataMatrix::zeros(6, 1);
        (source, destination, matches, scores)
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let (source, destination, matches, _) = tiny_inputs();
        let bad_scores = DataMatrix::zeros(6, 2);
        assert!(matches!(
            validate_inputs(&source, &destination, &matches, &bad_scores),
            Err(EstimationError::InvalidInput(_))
        ));
    }

    #[test]
    fn duplicate_candidates_in_a_row_are_rejected() {
        let source = DataMatrix::zeros(2, 2);
        let destination = DataMatrix::zeros(4, 2);
        let matches = MatchMatrix::from_row_slice(2, 2, &[1, 1, 0, 2]);
        let scores = DataMatrix::zeros(2, 2);
        assert!(matches!(
            validate_inputs(&source, &destination, &matches, &scores),
            Err(EstimationError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_finite_points_are_rejected() {
        let (mut source, destination, matches, scores) = tiny_inputs();
        source[(3, 1)] = f64::INFINITY;
        assert!(matches!(
            validate_inputs(&source, &destination, &matches, &scores),
            Err(EstimationError::InvalidInput(_))
        ));
    }

    #[test]
    fn too_few_points_report_insufficient_data() {
        let source = DataMatrix::zeros(3, 2);
        let destination = DataMatrix::zeros(3, 2);
        let matches = MatchMatrix::from_fn(3, 1, |r, _| r as i64);
        let scores = DataMatrix::zeros(3, 1);

        let estimator = StereoGlue::new(HomographyEstimator::new(), RansacSettings::default());
        let result = estimator.run(&source, &destination, &matches, &scores, None);
        assert!(matches!(
            result,
            Err(EstimationError::InsufficientData {
                found: 3,
                required: 4
            })
        ));
    }

    #[test]
    fn degenerate_data_yields_a_tagged_error() {
        // All points identical: no homography sample is ever valid.
        let (source, destination, matches, scores) = tiny_inputs();
        let mut settings = RansacSettings::default();
        settings.min_iterations = 10;
        settings.max_iterations = 20;
        settings.core_number = 1;

        let estimator = StereoGlue::new(HomographyEstimator::new(), settings);
        let result = estimator.run(&source, &destination, &matches, &scores, None);
        assert!(matches!(result, Err(EstimationError::Degenerate)));
    }
}
