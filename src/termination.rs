//! Confidence-driven stop rule for the main loop.

use crate::settings::{RansacSettings, TerminationType};

/// Classical RANSAC maximality bound: the iteration count needed so that a
/// fully-inlier sample was drawn with the configured confidence, clamped to
/// the `[min_iterations, max_iterations]` window.
pub struct RansacCriterion {
    pub confidence: f64,
    pub min_iterations: usize,
    pub max_iterations: usize,
}

impl RansacCriterion {
    pub fn required_iterations(
        &self,
        inlier_count: usize,
        total_points: usize,
        sample_size: usize,
    ) -> usize {
        if total_points == 0 || inlier_count == 0 {
            return self.max_iterations;
        }

        let inlier_ratio = (inlier_count as f64 / total_points as f64).min(1.0);
        let all_inlier_probability = inlier_ratio.powi(sample_size as i32);
        if all_inlier_probability >= 1.0 {
            return self.min_iterations;
        }
        if all_inlier_probability <= 0.0 {
            return self.max_iterations;
        }

        let needed =
            ((1.0 - self.confidence).ln() / (1.0 - all_inlier_probability).ln()).ceil();
        if !needed.is_finite() {
            return self.max_iterations;
        }
        (needed as usize).clamp(self.min_iterations, self.max_iterations)
    }

    pub fn should_terminate(
        &self,
        iterations_done: usize,
        inlier_count: usize,
        total_points: usize,
        sample_size: usize,
    ) -> bool {
        iterations_done >= self.required_iterations(inlier_count, total_points, sample_size)
    }
}

/// Termination selected through the settings. The PROSAC variant applies
/// the same bound over the full point set; the sampler converges to uniform
/// sampling, for which the bound is the right limit.
pub enum TerminationChoice {
    Ransac(RansacCriterion),
    Prosac(RansacCriterion),
}

impl TerminationChoice {
    pub fn from_settings(settings: &RansacSettings) -> Self {
        let criterion = RansacCriterion {
            confidence: settings.confidence,
            min_iterations: settings.min_iterations,
            max_iterations: settings.max_iterations,
        };
        match settings.termination_criterion {
            TerminationType::Ransac => TerminationChoice::Ransac(criterion),
            TerminationType::Prosac => TerminationChoice::Prosac(criterion),
        }
    }

    pub fn required_iterations(
        &self,
        inlier_count: usize,
        total_points: usize,
        sample_size: usize,
    ) -> usize {
        match self {
            TerminationChoice::Ransac(c) | TerminationChoice::Prosac(c) => {
                c.required_iterations(inlier_count, total_points, sample_size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion() -> RansacCriterion {
        RansacCriterion {
            confidence: 0.99,
            min_iterations: 100,
            max_iterations: 5000,
        }
    }

    #[test]
    fn all_inliers_terminate_at_the_minimum() {
        let c = criterion();
        assert_eq!(c.required_iterations(200, 200, 4), 100);
        assert!(c.should_terminate(100, 200, 200, 4));
        assert!(!c.should_terminate(99, 200, 200, 4));
    }

    #[test]
    fn no_inliers_require_the_maximum() {
        let c = criterion();
        assert_eq!(c.required_iterations(0, 200, 4), 5000);
    }

    #[test]
    fn bound_matches_the_closed_form() {
        let c = criterion();
        // eps = 0.5, m = 4: N = ln(0.01) / ln(1 - 0.0625) = 71.4 -> 72,
        // clamped up to min_iterations.
        assert_eq!(c.required_iterations(100, 200, 4), 100);

        let loose = RansacCriterion {
            confidence: 0.99,
            min_iterations: 1,
            max_iterations: 5000,
        };
        assert_eq!(loose.required_iterations(100, 200, 4), 72);
    }

    #[test]
    fn bound_is_clamped_to_the_window() {
        let c = criterion();
        // Tiny inlier ratio explodes the bound; it must cap at max.
        assert_eq!(c.required_iterations(5, 1000, 7), 5000);
    }
}
