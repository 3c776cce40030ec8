//! MAGSAC-style scoring: marginalization over a noise-scale distribution.
//!
//! Instead of a hard inlier/outlier boundary, each residual contributes the
//! marginal likelihood of being an inlier under noise scales up to
//! `sigma_max`. For scalar point residuals (two degrees of freedom) the
//! lower incomplete gamma function has the closed form
//! `gamma(1, x) = 1 - exp(-x)`, so no lookup table is needed.

use crate::scoring::ResidualGain;

/// Chi-square 99% quantile for two degrees of freedom; residuals beyond
/// `sqrt(quantile) * sigma_max` are saturated outliers.
const CHI_QUANTILE_SQ: f64 = 9.21;

pub struct MagsacScoring {
    /// The caller's inlier threshold, reused as the maximum noise scale.
    sigma_max: f64,
    sigma_max_sq: f64,
    saturation_sq: f64,
    outlier_loss: f64,
}

impl MagsacScoring {
    pub fn new(threshold: f64) -> Self {
        let sigma_max_sq = threshold * threshold;
        Self {
            sigma_max: threshold,
            sigma_max_sq,
            saturation_sq: CHI_QUANTILE_SQ * sigma_max_sq,
            outlier_loss: sigma_max_sq / 2.0,
        }
    }

    /// Marginalized loss: zero at a perfect fit, `sigma_max^2 / 2` for
    /// saturated outliers, smooth in between.
    fn loss(&self, residual_sq: f64) -> f64 {
        if residual_sq > self.saturation_sq {
            return self.outlier_loss;
        }
        let x = residual_sq / (2.0 * self.sigma_max_sq);
        let gamma = if x <= 0.0 { 0.0 } else { 1.0 - (-x).exp() };
        self.sigma_max_sq / 2.0 * gamma + residual_sq / 4.0 * (1.0 - gamma)
    }
}

impl ResidualGain for MagsacScoring {
    fn gain(&self, residual: f64) -> f64 {
        self.outlier_loss - self.loss(residual * residual)
    }

    fn inlier_threshold(&self) -> f64 {
        self.sigma_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_is_zero_at_perfect_fit_and_saturates() {
        let scoring = MagsacScoring::new(1.0);
        assert!(scoring.loss(0.0) < 1e-12);

        let at_saturation = scoring.loss(scoring.saturation_sq + 1.0);
        let far_out = scoring.loss(scoring.saturation_sq * 10.0);
        assert!((at_saturation - 0.5).abs() < 1e-12);
        assert!((far_out - 0.5).abs() < 1e-12);
    }

    #[test]
    fn gain_decreases_with_the_residual() {
        let scoring = MagsacScoring::new(1.5);
        let gains: Vec<f64> = [0.0, 0.5, 1.0, 1.5, 3.0]
            .iter()
            .map(|&r| scoring.gain(r))
            .collect();
        for pair in gains.windows(2) {
            assert!(pair[0] > pair[1], "gain not decreasing: {:?}", gains);
        }
        assert!(scoring.gain(100.0).abs() < 1e-12);
    }

    #[test]
    fn residuals_beyond_the_hard_threshold_still_contribute() {
        // The marginalized gain has no cliff at the inlier threshold.
        let scoring = MagsacScoring::new(1.0);
        assert!(scoring.gain(1.2) > 0.0);
        assert!(scoring.gain(1.2) < scoring.gain(0.8));
    }
}
