//! Minimal and non-minimal solvers for the supported two-view geometries.
//!
//! Estimators operate on correspondence matrices assembled by the caller:
//! each row is `[x1, y1, x2, y2]` for one `(source, destination)` pair.
//! The solvers report failure by returning false or producing no models;
//! numerical breakdowns never panic.

pub mod essential;
pub mod fundamental;
pub mod homography;

pub use essential::EssentialEstimator;
pub use fundamental::FundamentalEstimator;
pub use homography::HomographyEstimator;

use nalgebra::Vector2;

use crate::models::Model;
use crate::types::DataMatrix;

/// Solver family for one geometry.
pub trait Estimator {
    /// Size of a minimal sample (4 / 7 / 5).
    fn sample_size(&self) -> usize;

    /// Smallest sample accepted by the non-minimal solver.
    fn non_minimal_sample_size(&self) -> usize;

    /// Estimate candidate models from a minimal correspondence matrix.
    /// Appends 0..M candidates to `models`; returns false when the solve
    /// failed outright.
    fn estimate_minimal(&self, correspondences: &DataMatrix, models: &mut Vec<Model>) -> bool;

    /// Weighted least-squares refit over all rows of `correspondences`.
    /// `weights`, when given, holds one weight per row.
    fn estimate_non_minimal(
        &self,
        correspondences: &DataMatrix,
        weights: Option<&[f64]>,
        models: &mut Vec<Model>,
    ) -> bool;

    /// Geometric error of one correspondence under the model, in the input
    /// coordinate units.
    fn residual(&self, model: &Model, src: &Vector2<f64>, dst: &Vector2<f64>) -> f64;

    /// Cheap sanity check rejecting degenerate parameter blocks before
    /// scoring.
    fn is_valid_model(&self, model: &Model) -> bool;
}
