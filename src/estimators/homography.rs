//! Homography estimation: 4-point minimal solver and weighted
//! least-squares refit, both fixing `h33 = 1`.

use nalgebra::{DMatrix, DVector, Matrix3, Vector2, Vector3};

use crate::estimators::Estimator;
use crate::models::Model;
use crate::types::DataMatrix;
use crate::utils::gauss_elimination;

pub struct HomographyEstimator;

impl Default for HomographyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl HomographyEstimator {
    pub fn new() -> Self {
        Self
    }
}

fn reshape_h(h: &DVector<f64>) -> Option<Matrix3<f64>> {
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

impl Estimator for HomographyEstimator {
    fn sample_size(&self) -> usize {
        4
    }

    fn non_minimal_sample_size(&self) -> usize {
        6
    }

    fn estimate_minimal(&self, correspondences: &DataMatrix, models: &mut Vec<Model>) -> bool {
        if correspondences.nrows() < self.sample_size() {
            return false;
        }

        // Inhomogeneous DLT with h33 fixed to one: eight equations in the
        // remaining eight unknowns.
        let mut augmented = DMatrix::<f64>::zeros(8, 9);
        for i in 0..4 {
            let x1 = correspondences[(i, 0)];
            let y1 = correspondences[(i, 1)];
            let x2 = correspondences[(i, 2)];
            let y2 = correspondences[(i, 3)];

            augmented[(2 * i, 0)] = -x1;
            augmented[(2 * i, 1)] = -y1;
            augmented[(2 * i, 2)] = -1.0;
            augmented[(2 * i, 6)] = x2 * x1;
            augmented[(2 * i, 7)] = x2 * y1;
            augmented[(2 * i, 8)] = -x2;

            augmented[(2 * i + 1, 3)] = -x1;
            augmented[(2 * i + 1, 4)] = -y1;
            augmented[(2 * i + 1, 5)] = -1.0;
            augmented[(2 * i + 1, 6)] = y2 * x1;
            augmented[(2 * i + 1, 7)] = y2 * y1;
            augmented[(2 * i + 1, 8)] = -y2;
        }

        let mut h = DVector::<f64>::zeros(8);
        if !gauss_elimination(&mut augmented, &mut h) {
            return false;
        }

        match reshape_h(&h) {
            Some(matrix) => {
                models.push(Model::homography(matrix));
                true
            }
            None => false,
        }
    }

    fn estimate_non_minimal(
        &self,
        correspondences: &DataMatrix,
        weights: Option<&[f64]>,
        models: &mut Vec<Model>,
    ) -> bool {
        let n = correspondences.nrows();
        if n < self.sample_size() {
            return false;
        }

        let mut coefficients = DMatrix::<f64>::zeros(2 * n, 8);
        let mut inhomogeneous = DVector::<f64>::zeros(2 * n);

        for i in 0..n {
            let x1 = correspondences[(i, 0)];
            let y1 = correspondences[(i, 1)];
            let x2 = correspondences[(i, 2)];
            let y2 = correspondences[(i, 3)];

            let weight = weights.map_or(1.0, |w| w[i]);
            let minus_wx1 = -weight * x1;
            let minus_wy1 = -weight * y1;
            let wx2 = weight * x2;
            let wy2 = weight * y2;

            coefficients[(2 * i, 0)] = minus_wx1;
            coefficients[(2 * i, 1)] = minus_wy1;
            coefficients[(2 * i, 2)] = -weight;
            coefficients[(2 * i, 6)] = wx2 * x1;
            coefficients[(2 * i, 7)] = wx2 * y1;
            inhomogeneous[2 * i] = -wx2;

            coefficients[(2 * i + 1, 3)] = minus_wx1;
            coefficients[(2 * i + 1, 4)] = minus_wy1;
            coefficients[(2 * i + 1, 5)] = -weight;
            coefficients[(2 * i + 1, 6)] = wy2 * x1;
            coefficients[(2 * i + 1, 7)] = wy2 * y1;
            inhomogeneous[2 * i + 1] = -wy2;
        }

        let qr = coefficients.col_piv_qr();
        let h = match qr.solve(&inhomogeneous) {
            Some(h) => h,
            None => return false,
        };

        match reshape_h(&h) {
            Some(matrix) => {
                models.push(Model::homography(matrix));
                true
            }
            None => false,
        }
    }

    fn residual(&self, model: &Model, src: &Vector2<f64>, dst: &Vector2<f64>) -> f64 {
        let h = &model.matrix;
        let forward = h * Vector3::new(src.x, src.y, 1.0);
        if forward.z.abs() < 1e-12 {
            return f64::INFINITY;
        }
        let forward_err =
            (dst - Vector2::new(forward.x / forward.z, forward.y / forward.z)).norm();

        let Some(h_inv) = h.try_inverse() else {
            return f64::INFINITY;
        };
        let backward = h_inv * Vector3::new(dst.x, dst.y, 1.0);
        if backward.z.abs() < 1e-12 {
            return f64::INFINITY;
        }
        let backward_err =
            (src - Vector2::new(backward.x / backward.z, backward.y / backward.z)).norm();

        0.5 * (forward_err + backward_err)
    }

    fn is_valid_model(&self, model: &Model) -> bool {
        if !model.is_finite() {
            return false;
        }
        let det = model.matrix.determinant().abs();
        det > 1e-4 && det < 1e4
    }
}
