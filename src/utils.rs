//! Small numeric helpers shared across the crate: a seeded uniform integer
//! generator for the samplers, Gaussian elimination for the minimal
//! homography solver, and a real-cubic solver for the seven-point
//! fundamental-matrix solver.

use nalgebra::{DMatrix, DVector};
use rand::distributions::Uniform;
use rand::prelude::*;

/// Uniform integer generator over a resettable inclusive range.
///
/// Construction takes an explicit seed; the same seed yields the same draw
/// sequence, which is what makes whole estimation runs reproducible.
pub struct UniformRandomGenerator {
    rng: StdRng,
    dist: Option<Uniform<usize>>,
}

impl UniformRandomGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            dist: None,
        }
    }

    /// Reset the distribution to the inclusive range `[min, max]`.
    pub fn reset(&mut self, min: usize, max: usize) {
        self.dist = Some(Uniform::new_inclusive(min, max));
    }

    /// Draw a single value from the current range.
    pub fn next_value(&mut self) -> usize {
        let dist = self
            .dist
            .as_ref()
            .expect("UniformRandomGenerator: range not initialized");
        self.rng.sample(dist)
    }

    /// Fill `out` with pairwise distinct draws from the current range.
    ///
    /// Rejection sampling; suitable for the small sample sizes of minimal
    /// and non-minimal solvers.
    pub fn fill_unique(&mut self, out: &mut [usize]) {
        for i in 0..out.len() {
            loop {
                let candidate = self.next_value();
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }
}

/// Gaussian elimination with partial pivoting solving `A x = b` where
/// `augmented` is `[A | b]` with `A` square. Returns false when the system
/// is singular.
pub fn gauss_elimination(augmented: &mut DMatrix<f64>, result: &mut DVector<f64>) -> bool {
    let n = augmented.nrows();
    if n + 1 != augmented.ncols() || n != result.len() {
        return false;
    }

    for i in 0..n {
        let mut max_row = i;
        let mut max_val = augmented[(i, i)].abs();
        for k in (i + 1)..n {
            let val = augmented[(k, i)].abs();
            if val > max_val {
                max_val = val;
                max_row = k;
            }
        }

        if max_row != i {
            augmented.swap_rows(i, max_row);
        }

        if augmented[(i, i)].abs() < 1e-10 {
            return false;
        }

        for k in (i + 1)..n {
            let factor = augmented[(k, i)] / augmented[(i, i)];
            for j in i..augmented.ncols() {
                augmented[(k, j)] -= factor * augmented[(i, j)];
            }
        }
    }

    for i in (0..n).rev() {
        result[i] = augmented[(i, n)];
        for j in (i + 1)..n {
            result[i] -= augmented[(i, j)] * result[j];
        }
        result[i] /= augmented[(i, i)];
    }

    true
}

/// Solve `x^3 + c2 x^2 + c1 x + c0 = 0` over the reals. Returns the number
/// of real roots (1 or 3) written to `roots`, each polished by one Newton
/// step.
pub fn solve_cubic_real(c2: f64, c1: f64, c0: f64, roots: &mut [f64; 3]) -> usize {
    let a = c1 - c2 * c2 / 3.0;
    let b = (2.0 * c2 * c2 * c2 - 9.0 * c2 * c1) / 27.0 + c0;
    let mut c = b * b / 4.0 + a * a * a / 27.0;

    let n_roots = if c > 0.0 {
        c = c.sqrt();
        let b_neg = -0.5 * b;
        roots[0] = (b_neg + c).cbrt() + (b_neg - c).cbrt() - c2 / 3.0;
        1
    } else {
        c = 3.0 * b / (2.0 * a) * (-3.0 / a).sqrt();
        let d = 2.0 * (-a / 3.0).sqrt();
        let acos_c = c.acos();
        const TWO_PI_3: f64 = 2.094_395_102_393_195_3;
        const FOUR_PI_3: f64 = 4.188_790_204_786_390_5;
        roots[0] = d * (acos_c / 3.0).cos() - c2 / 3.0;
        roots[1] = d * (acos_c / 3.0 - TWO_PI_3).cos() - c2 / 3.0;
        roots[2] = d * (acos_c / 3.0 - FOUR_PI_3).cos() - c2 / 3.0;
        3
    };

    for root in roots.iter_mut().take(n_roots) {
        let x = *root;
        let x2 = x * x;
        let denom = 3.0 * x2 + 2.0 * c2 * x + c1;
        if denom.abs() > 1e-12 {
            *root -= (x * x2 + c2 * x2 + c1 * x + c0) / denom;
        }
    }

    n_roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_draws_stay_in_range_and_distinct() {
        let mut rng = UniformRandomGenerator::new(1234);
        rng.reset(0, 10);
        let mut buf = [0usize; 5];
        rng.fill_unique(&mut buf);

        assert!(buf.iter().all(|&v| v <= 10));
        for i in 0..buf.len() {
            for j in (i + 1)..buf.len() {
                assert_ne!(buf[i], buf[j]);
            }
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = UniformRandomGenerator::new(42);
        let mut b = UniformRandomGenerator::new(42);
        a.reset(0, 100);
        b.reset(0, 100);

        let xs: Vec<usize> = (0..10).map(|_| a.next_value()).collect();
        let ys: Vec<usize> = (0..10).map(|_| b.next_value()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn gauss_elimination_solves_identity_system() {
        let mut augmented = DMatrix::from_row_slice(
            3,
            4,
            &[2.0, 0.0, 0.0, 4.0, 0.0, 3.0, 0.0, 9.0, 0.0, 0.0, 4.0, 8.0],
        );
        let mut x = DVector::zeros(3);
        assert!(gauss_elimination(&mut augmented, &mut x));
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
        assert!((x[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cubic_with_three_known_roots() {
        // (x - 1)(x - 2)(x - 3) = x^3 - 6x^2 + 11x - 6
        let mut roots = [0.0; 3];
        let n = solve_cubic_real(-6.0, 11.0, -6.0, &mut roots);
        assert_eq!(n, 3);
        let mut sorted = roots;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((sorted[0] - 1.0).abs() < 1e-9);
        assert!((sorted[1] - 2.0).abs() < 1e-9);
        assert!((sorted[2] - 3.0).abs() < 1e-9);
    }
}
