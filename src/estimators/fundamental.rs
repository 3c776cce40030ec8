//! Fundamental-matrix estimation: 7-point minimal solver and
//! Hartley-normalized 8-point weighted refit.

use nalgebra::{DMatrix, Matrix3, Vector2, Vector3, SVD};

use crate::estimators::Estimator;
use crate::models::Model;
use crate::types::DataMatrix;
use crate::utils::solve_cubic_real;

pub struct FundamentalEstimator;

impl Default for FundamentalEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl FundamentalEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Seven-point solver: the epipolar system has a two-dimensional null
    /// space, and `det(lambda F1 + F2) = 0` picks out up to three valid
    /// combinations.
    fn estimate_seven_point(&self, correspondences: &DataMatrix) -> Vec<Matrix3<f64>> {
        let Some((normalized, t1, t2)) = hartley_normalize(correspondences) else {
            return Vec::new();
        };

        let mut coefficients = DMatrix::<f64>::zeros(7, 9);
        for i in 0..7 {
            fill_epipolar_row(&mut coefficients, i, &normalized, i, 1.0);
        }

        // Null-space basis from the two smallest right singular vectors of
        // the normal matrix.
        let ata = coefficients.transpose() * &coefficients;
        let svd = SVD::new(ata, false, true);
        let Some(vt) = svd.v_t else {
            return Vec::new();
        };
        let f1 = epipolar_vector_to_matrix(&vt, 7);
        let f2 = epipolar_vector_to_matrix(&vt, 8);

        // det(lambda F1 + F2) is a cubic in lambda; recover its
        // coefficients by interpolation at lambda in {0, 1, -1, 2}.
        let det_at = |lambda: f64| (f1 * lambda + f2).determinant();
        let d0 = det_at(0.0);
        let d1 = det_at(1.0);
        let d_neg1 = det_at(-1.0);
        let d2 = det_at(2.0);

        let odd = 0.5 * (d1 - d_neg1);
        let c2 = 0.5 * (d1 + d_neg1) - d0;
        let c3 = (d2 - d0 - 4.0 * c2 - 2.0 * odd) / 6.0;
        let c1 = odd - c3;
        let c0 = d0;

        if c3.abs() < 1e-12 {
            return Vec::new();
        }
        let inv_c3 = 1.0 / c3;
        let mut roots = [0.0f64; 3];
        let n_roots = solve_cubic_real(c2 * inv_c3, c1 * inv_c3, c0 * inv_c3, &mut roots);

        let mut models = Vec::with_capacity(n_roots);
        for &lambda in roots.iter().take(n_roots) {
            if !lambda.is_finite() {
                continue;
            }
            let f = t2.transpose() * (f1 * lambda + f2) * t1;
            let norm = f.norm();
            if norm < 1e-10 || f.iter().any(|v| !v.is_finite()) {
                continue;
            }
            models.push(f / norm);
        }
        models
    }
}

impl Estimator for FundamentalEstimator {
    fn sample_size(&self) -> usize {
        7
    }

    fn non_minimal_sample_size(&self) -> usize {
        8
    }

    fn estimate_minimal(&self, correspondences: &DataMatrix, models: &mut Vec<Model>) -> bool {
        if correspondences.nrows() < self.sample_size() {
            return false;
        }
        let candidates = self.estimate_seven_point(correspondences);
        if candidates.is_empty() {
            return false;
        }
        models.extend(candidates.into_iter().map(Model::fundamental));
        true
    }

    fn estimate_non_minimal(
        &self,
        correspondences: &DataMatrix,
        weights: Option<&[f64]>,
        models: &mut Vec<Model>,
    ) -> bool {
        match eight_point(correspondences, weights) {
            Some(f) => {
                models.push(Model::fundamental(f));
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

/// Hartley-normalized 8-point solver shared with the essential estimator.
/// Enforces the rank-2 constraint before denormalizing.
pub(crate) fn eight_point(
    correspondences: &DataMatrix,
    weights: Option<&[f64]>,
) -> Option<Matrix3<f64>> {
    let n = correspondences.nrows();
    if n < 8 {
        return None;
    }

    let (normalized, t1, t2) = hartley_normalize(correspondences)?;

    let mut a = DMatrix::<f64>::zeros(n, 9);
    for i in 0..n {
        let weight = weights.map_or(1.0, |w| w[i]);
        fill_epipolar_row(&mut a, i, &normalized, i, weight);
    }

    let ata = a.transpose() * &a;
    let svd = SVD::new(ata, false, true);
    let vt = svd.v_t?;
    let f_norm = epipolar_vector_to_matrix(&vt, 8);
    if f_norm.iter().any(|v| !v.is_finite()) {
        return None;
    }

    // Project onto rank two.
    let svd_f = SVD::new(f_norm, true, true);
    let u = svd_f.u?;
    let vt_f = svd_f.v_t?;
    let s = svd_f.singular_values;
    let rank2 = Matrix3::from_diagonal(&Vector3::new(s[0], s[1], 0.0));
    let f_rank2 = u * rank2 * vt_f;

    let f = t2.transpose() * f_rank2 * t1;
    let norm = f.norm();
    if norm < 1e-12 || f.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(f / norm)
}

/// Sampson first-order approximation of the epipolar distance.
pub(crate) fn sampson_distance(f: &Matrix3<f64>, src: &Vector2<f64>, dst: &Vector2<f64>) -> f64 {
    let x1 = Vector3::new(src.x, src.y, 1.0);
    let x2 = Vector3::new(dst.x, dst.y, 1.0);

    let epipolar = (x2.transpose() * f * x1)[0];
    let ft_x2 = f.transpose() * x2;
    let f_x1 = f * x1;

    let grad_sq = ft_x2.x * ft_x2.x + ft_x2.y * ft_x2.y + f_x1.x * f_x1.x + f_x1.y * f_x1.y;
    if grad_sq < 1e-20 {
        return 0.0;
    }
    (epipolar / grad_sq.sqrt()).abs()
}

/// Finite entries, non-vanishing norm, and the rank-2 constraint on the
/// scale-normalized matrix.
pub(crate) fn epipolar_model_is_valid(f: &Matrix3<f64>) -> bool {
    if f.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let norm = f.norm();
    if norm < 1e-12 {
        return false;
    }
    ((f / norm).determinant()).abs() < 1e-5
}

fn fill_epipolar_row(
    a: &mut DMatrix<f64>,
    row: usize,
    correspondences: &DataMatrix,
    corr_row: usize,
    weight: f64,
) {
    let x1 = correspondences[(corr_row, 0)];
    let y1 = correspondences[(corr_row, 1)];
    let x2 = correspondences[(corr_row, 2)];
    let y2 = correspondences[(corr_row, 3)];

    a[(row, 0)] = weight * x2 * x1;
    a[(row, 1)] = weight * x2 * y1;
    a[(row, 2)] = weight * x2;
    a[(row, 3)] = weight * y2 * x1;
    a[(row, 4)] = weight * y2 * y1;
    a[(row, 5)] = weight * y2;
    a[(row, 6)] = weight * x1;
    a[(row, 7)] = weight * y1;
    a[(row, 8)] = weight;
}

/// Reshape one right singular vector (row `index` of `V^T`) into the 3x3
/// matrix it parameterizes, row-major.
fn epipolar_vector_to_matrix(vt: &DMatrix<f64>, index: usize) -> Matrix3<f64> {
    let v = vt.row(index);
    Matrix3::new(
        v[0], v[1], v[2], //
        v[3], v[4], v[5], //
        v[6], v[7], v[8],
    )
}

/// Translate and scale both point sets so their centroids sit at the origin
/// with mean distance sqrt(2).
fn hartley_normalize(
    correspondences: &DataMatrix,
) -> Option<(DataMatrix, Matrix3<f64>, Matrix3<f64>)> {
    let n = correspondences.nrows();
    let inv_n = 1.0 / n as f64;

    let mut centroid = [0.0f64; 4];
    for i in 0..n {
        for (axis, c) in centroid.iter_mut().enumerate() {
            *c += correspondences[(i, axis)];
        }
    }
    for c in centroid.iter_mut() {
        *c *= inv_n;
    }

    let mut mean_dist = [0.0f64; 2];
    for i in 0..n {
        for side in 0..2 {
            let dx = correspondences[(i, 2 * side)] - centroid[2 * side];
            let dy = correspondences[(i, 2 * side + 1)] - centroid[2 * side + 1];
            mean_dist[side] += (dx * dx + dy * dy).sqrt();
        }
    }
    mean_dist[0] *= inv_n;
    mean_dist[1] *= inv_n;
    if mean_dist[0] < 1e-10 || mean_dist[1] < 1e-10 {
        return None;
    }

    let s1 = std::f64::consts::SQRT_2 / mean_dist[0];
    let s2 = std::f64::consts::SQRT_2 / mean_dist[1];

    let t1 = Matrix3::new(
        s1,
        0.0,
        -s1 * centroid[0],
        0.0,
        s1,
        -s1 * centroid[1],
        0.0,
        0.0,
        1.0,
    );
    let t2 = Matrix3::new(
        s2,
        0.0,
        -s2 * centroid[2],
        0.0,
        s2,
        -s2 * centroid[3],
        0.0,
        0.0,
        1.0,
    );

    let mut normalized = DataMatrix::zeros(n, 4);
    for i in 0..n {
        normalized[(i, 0)] = (correspondences[(i, 0)] - centroid[0]) * s1;
        normalized[(i, 1)] = (correspondences[(i, 1)] - centroid[1]) * s1;
        normalized[(i, 2)] = (correspondences[(i, 2)] - centroid[2]) * s2;
        normalized[(i, 3)] = (correspondences[(i, 3)] - centroid[3]) * s2;
    }

    Some((normalized, t1, t2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    /// Project a simple stereo scene into both views and return the pixel
    /// correspondences plus the ground-truth fundamental matrix.
    fn synthetic_scene(n: usize) -> (DataMatrix, Matrix3<f64>) {
        let rotation = Rotation3::from_euler_angles(0.05, -0.1, 0.02);
        let translation = Vector3::new(0.4, -0.1, 0.15);

        let focal = 600.0;
        let k = Matrix3::new(focal, 0.0, 320.0, 0.0, focal, 240.0, 0.0, 0.0, 1.0);
        let k_inv = k.try_inverse().unwrap();

        let t_cross = Matrix3::new(
            0.0,
            -translation.z,
            translation.y,
            translation.z,
            0.0,
            -translation.x,
            -translation.y,
            translation.x,
            0.0,
        );
        let essential = t_cross * rotation.matrix();
        let mut fundamental = k_inv.transpose() * essential * k_inv;
        fundamental /= fundamental.norm();

        let mut corr = DataMatrix::zeros(n, 4);
        for i in 0..n {
            // A deterministic spread of depths and lateral positions.
            let s = i as f64;
            let world = Vector3::new(
                0.8 * (s * 0.37).sin(),
                0.6 * (s * 0.53).cos(),
                3.0 + 0.2 * (s * 0.11).sin() + 0.05 * s,
            );
            let p1 = k * world;
            let cam2 = rotation * world + translation;
            let p2 = k * cam2;
            corr[(i, 0)] = p1.x / p1.z;
            corr[(i, 1)] = p1.y / p1.z;
            corr[(i, 2)] = p2.x / p2.z;
            corr[(i, 3)] = p2.y / p2.z;
        }
        (corr, fundamental)
    }

    fn epipolar_residual_sum(f: &Matrix3<f64>, corr: &DataMatrix) -> f64 {
        (0..corr.nrows())
            .map(|i| {
                sampson_distance(
                    f,
                    &Vector2::new(corr[(i, 0)], corr[(i, 1)]),
                    &Vector2::new(corr[(i, 2)], corr[(i, 3)]),
                )
            })
            .sum()
    }

    #[test]
    fn seven_point_yields_a_consistent_model() {
        let (corr, _) = synthetic_scene(7);
        let estimator = FundamentalEstimator::new();
        let mut models = Vec::new();
        assert!(estimator.estimate_minimal(&corr, &mut models));
        assert!(!models.is_empty() && models.len() <= 3);

        let best = models
            .iter()
            .map(|m| epipolar_residual_sum(&m.matrix, &corr))
            .fold(f64::INFINITY, f64::min);
        assert!(best < 1e-6, "best 7-point residual too large: {best}");
    }

    #[test]
    fn eight_point_recovers_the_scene_geometry() {
        let (corr, truth) = synthetic_scene(30);
        let estimator = FundamentalEstimator::new();
        let mut models = Vec::new();
        assert!(estimator.estimate_non_minimal(&corr, None, &mut models));

        let f = &models[0].matrix;
        assert!(estimator.is_valid_model(&models[0]));
        assert!(epipolar_residual_sum(f, &corr) < 1e-6);

        // Same matrix up to sign and scale.
        let aligned = if (f.dot(&truth)) < 0.0 { -f } else { *f };
        assert!((aligned - truth).norm() < 1e-6);
    }

    #[test]
    fn sampson_distance_vanishes_on_the_epipolar_line() {
        let (corr, truth) = synthetic_scene(12);
        for i in 0..corr.nrows() {
            let d = sampson_distance(
                &truth,
                &Vector2::new(corr[(i, 0)], corr[(i, 1)]),
                &Vector2::new(corr[(i, 2)], corr[(i, 3)]),
            );
            assert!(d < 1e-9, "residual {d} at row {i}");
        }
    }
}
