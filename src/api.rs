//! High-level entry points over the estimation loop.
//!
//! `estimate` dispatches on the problem geometry and owns the input
//! conventions: a missing match table means 1-to-1 correspondences, and
//! essential-matrix estimation normalizes the clouds by the intrinsic
//! matrices before running in calibrated coordinates.

use std::sync::atomic::AtomicBool;

use nalgebra::{Matrix3, Vector3};

use crate::errors::EstimationError;
use crate::estimators::{EssentialEstimator, FundamentalEstimator, HomographyEstimator};
use crate::ransac::{EstimationResult, StereoGlue};
use crate::settings::RansacSettings;
use crate::types::{DataMatrix, MatchMatrix};

/// Geometry to estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemType {
    Homography,
    Fundamental,
    Essential,
}

/// Estimate a two-view model from multi-match correspondences.
///
/// When `matches` is absent, row `i` of the source is matched to row `i`
/// of the destination (the clouds must then be the same length). Essential
/// estimation requires both intrinsic matrices; the returned model lives
/// in normalized camera coordinates.
#[allow(clippy::too_many_arguments)]
pub fn estimate(
    source: &DataMatrix,
    destination: &DataMatrix,
    matches: Option<&MatchMatrix>,
    match_scores: Option<&DataMatrix>,
    problem_type: ProblemType,
    intrinsics: Option<(&Matrix3<f64>, &Matrix3<f64>)>,
    settings: &RansacSettings,
    cancel: Option<&AtomicBool>,
) -> Result<EstimationResult, EstimationError> {
    let matches_storage;
    let scores_storage;
    let (matches, match_scores) = match (matches, match_scores) {
        (Some(matches), Some(scores)) => (matches, scores),
        (Some(matches), None) => {
            scores_storage = DataMatrix::zeros(matches.nrows(), matches.ncols());
            (matches, &scores_storage)
        }
        (None, _) => {
            if source.nrows() != destination.nrows() {
                return Err(EstimationError::InvalidInput(
                    "1-to-1 matching needs equally long point clouds".into(),
                ));
            }
            matches_storage = MatchMatrix::from_fn(source.nrows(), 1, |row, _| row as i64);
            scores_storage = DataMatrix::zeros(source.nrows(), 1);
            (&matches_storage, &scores_storage)
        }
    };

    match problem_type {
        ProblemType::Homography => StereoGlue::new(HomographyEstimator::new(), settings.clone())
            .run(source, destination, matches, match_scores, cancel),
        ProblemType::Fundamental => StereoGlue::new(FundamentalEstimator::new(), settings.clone())
            .run(source, destination, matches, match_scores, cancel),
        ProblemType::Essential => {
            let Some((intrinsics_src, intrinsics_dst)) = intrinsics else {
                return Err(EstimationError::InvalidInput(
                    "essential-matrix estimation requires both intrinsic matrices".into(),
                ));
            };
            let normalized_source = normalize_by_intrinsics(source, intrinsics_src)?;
            let normalized_destination = normalize_by_intrinsics(destination, intrinsics_dst)?;

            // The threshold is given in pixels; calibrated residuals live
            // on the normalized image plane.
            let mean_focal = 0.25
                * (intrinsics_src[(0, 0)]
                    + intrinsics_src[(1, 1)]
                    + intrinsics_dst[(0, 0)]
                    + intrinsics_dst[(1, 1)]);
            if !(mean_focal.is_finite() && mean_focal > 0.0) {
                return Err(EstimationError::InvalidInput(
                    "intrinsic matrices must carry positive focal lengths".into(),
                ));
            }
            let mut adjusted = settings.clone();
            adjusted.inlier_threshold = settings.inlier_threshold / mean_focal;

            StereoGlue::new(EssentialEstimator::new(), adjusted).run(
                &normalized_source,
                &normalized_destination,
                matches,
                match_scores,
                cancel,
            )
        }
    }
}

/// Estimate a homography from pixel correspondences.
pub fn estimate_homography(
    source: &DataMatrix,
    destination: &DataMatrix,
    matches: Option<&MatchMatrix>,
    match_scores: Option<&DataMatrix>,
    settings: &RansacSettings,
) -> Result<EstimationResult, EstimationError> {
    estimate(
        source,
        destination,
        matches,
        match_scores,
        ProblemType::Homography,
        None,
        settings,
        None,
    )
}

/// Estimate a fundamental matrix from pixel correspondences.
pub fn estimate_fundamental_matrix(
    source: &DataMatrix,
    destination: &DataMatrix,
    matches: Option<&MatchMatrix>,
    match_scores: Option<&DataMatrix>,
    settings: &RansacSettings,
) -> Result<EstimationResult, EstimationError> {
    estimate(
        source,
        destination,
        matches,
        match_scores,
        ProblemType::Fundamental,
        None,
        settings,
        None,
    )
}

/// Estimate an essential matrix; `intrinsics_src`/`intrinsics_dst` are the
/// calibration matrices of the two views.
pub fn estimate_essential_matrix(
    source: &DataMatrix,
    destination: &DataMatrix,
    matches: Option<&MatchMatrix>,
    match_scores: Option<&DataMatrix>,
    intrinsics_src: &Matrix3<f64>,
    intrinsics_dst: &Matrix3<f64>,
    settings: &RansacSettings,
) -> Result<EstimationResult, EstimationError> {
    estimate(
        source,
        destination,
        matches,
        match_scores,
        ProblemType::Essential,
        Some((intrinsics_src, intrinsics_dst)),
        settings,
        None,
    )
}

fn normalize_by_intrinsics(
    points: &DataMatrix,
    intrinsics: &Matrix3<f64>,
) -> Result<DataMatrix, EstimationError> {
    let Some(inverse) = intrinsics.try_inverse() else {
        return Err(EstimationError::InvalidInput(
            "intrinsic matrix is singular".into(),
        ));
    };
    if points.ncols() < 2 {
        return Err(EstimationError::InvalidInput(
            "point clouds need at least x and y columns".into(),
        ));
    }

    let mut normalized = DataMatrix::zeros(points.nrows(), 2);
    for row in 0..points.nrows() {
        let p = inverse * Vector3::new(points[(row, 0)], points[(row, 1)], 1.0);
        if p.z.abs() < 1e-12 {
            return Err(EstimationError::InvalidInput(
                "point maps to infinity under the inverse intrinsics".into(),
            ));
        }
        normalized[(row, 0)] = p.x / p.z;
        normalized[(row, 1)] = p.y / p.z;
    }
    Ok(normalized)
}
