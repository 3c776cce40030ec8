//! Essential-matrix estimation in normalized (calibrated) coordinates.
//!
//! The minimal path alternates projections between the null space of the
//! 5-point epipolar system and the essential manifold (two equal singular
//! values, third zero), emitting up to four candidates; the non-minimal
//! path reuses the 8-point refit of the fundamental estimator followed by
//! the same manifold projection. Hypotheses are polished by the
//! non-minimal refit during local optimization.

use nalgebra::{DMatrix, Matrix3, Vector2, Vector3, SVD};

use crate::estimators::fundamental::{
    eight_point, epipolar_model_is_valid, sampson_distance,
};
use crate::estimators::Estimator;
use crate::models::Model;
use crate::types::DataMatrix;

/// Alternating-projection rounds used by the minimal solver.
const ALTERNATING_PROJECTION_ROUNDS: usize = 20;

pub struct EssentialEstimator;

impl Default for EssentialEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl EssentialEstimator {
    pub fn new() -> Self {
        Self
    }
}

/// Project a 3x3 matrix onto the essential manifold: equal leading singular
/// values, vanishing third.
fn enforce_essential_constraints(f: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = SVD::new(*f, true, true);
    let u = svd.u?;
    let vt = svd.v_t?;
    let s = svd.singular_values;

    let avg = 0.5 * (s[0] + s[1]);
    if avg < 1e-12 {
        return None;
    }
    let diag = Matrix3::from_diagonal(&Vector3::new(avg, avg, 0.0));
    let e = u * diag * vt;
    if e.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(e / e.norm())
}

impl Estimator for EssentialEstimator {
    fn sample_size(&self) -> usize {
        5
    }

    fn non_minimal_sample_size(&self) -> usize {
        8
    }

    fn estimate_minimal(&self, correspondences: &DataMatrix, models: &mut Vec<Model>) -> bool {
        let n = correspondences.nrows();
        if n < self.sample_size() {
            return false;
        }

        let mut a = DMatrix::<f64>::zeros(n, 9);
        for i in 0..n {
            let x1 = correspondences[(i, 0)];
            let y1 = correspondences[(i, 1)];
            let x2 = correspondences[(i, 2)];
            let y2 = correspondences[(i, 3)];

            a[(i, 0)] = x2 * x1;
            a[(i, 1)] = x2 * y1;
            a[(i, 2)] = x2;
            a[(i, 3)] = y2 * x1;
            a[(i, 4)] = y2 * y1;
            a[(i, 5)] = y2;
            a[(i, 6)] = x1;
            a[(i, 7)] = y1;
            a[(i, 8)] = 1.0;
        }

        let ata = a.transpose() * &a;
        let svd = SVD::new(ata, false, true);
        let Some(vt) = svd.v_t else {
            return false;
        };

        // Five constraints leave a four-dimensional null space. Starting
        // from each (orthonormal) basis vector, alternate between the
        // essential manifold and the null space; iterates that settle near
        // the intersection satisfy both the epipolar constraints and the
        // essential structure.
        let basis: Vec<Matrix3<f64>> = (5..9)
            .map(|row| {
                let v = vt.row(row);
                Matrix3::new(
                    v[0], v[1], v[2], //
                    v[3], v[4], v[5], //
                    v[6], v[7], v[8],
                )
            })
            .collect();

        let before = models.len();
        for start in &basis {
            let mut candidate = *start;
            let mut projected = None;
            for _ in 0..ALTERNATING_PROJECTION_ROUNDS {
                let Some(on_manifold) = enforce_essential_constraints(&candidate) else {
                    break;
                };
                projected = Some(on_manifold);
                let mut in_span = Matrix3::zeros();
                for b in &basis {
                    in_span += b.scale(on_manifold.dot(b));
                }
                if in_span.norm() < 1e-12 {
                    break;
                }
                candidate = in_span;
            }
            if let Some(e) = projected {
                models.push(Model::essential(e));
            }
        }
        models.len() > before
    }

    fn estimate_non_minimal(
        &self,
        correspondences: &DataMatrix,
        weights: Option<&[f64]>,
        models: &mut Vec<Model>,
    ) -> bool {
        let Some(f) = eight_point(correspondences, weights) else {
            return false;
        };
        match enforce_essential_constraints(&f) {
            Some(e) => {
                models.push(Model::essential(e));
                true
            }
            None => false,
        }
    }

    fn residual(&self, model: &Model, src: &Vector2<f64>, dst: &Vector2<f64>) -> f64 {
        sampson_distance(&model.matrix, src, dst)
    }

    fn is_valid_model(&self, model: &Model) -> bool {
        epipolar_model_is_valid(&model.matrix)
    }
}
