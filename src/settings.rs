//! Configuration for the robust estimation pipeline.
//!
//! Every pluggable component (scoring, sampler, local optimization,
//! termination) is selected through a closed enum; the full variant list is
//! known and fixed, so runtime dispatch happens over tagged unions rather
//! than trait objects.

/// Scoring strategy used to evaluate candidate models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringType {
    /// Truncated-quadratic (MSAC) cost with a hard inlier threshold.
    Msac,
    /// Marginalization over a noise-scale distribution (MAGSAC).
    Magsac,
}

/// Sampling strategy for minimal sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerType {
    /// Uniform sampling without replacement.
    Uniform,
    /// Progressive sampling biased towards well-scored matches.
    Prosac,
    /// Spatially coherent sampling guided by the grid neighborhood graph.
    Neighborhood,
}

/// Local optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOptimizationType {
    None,
    NestedRansac,
    Irls,
}

/// Termination criterion type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationType {
    Ransac,
    Prosac,
}

/// When the main loop invokes local optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOptimizationCadence {
    /// After every strict improvement of the best score.
    OnImprovement,
    /// Every N iterations, regardless of improvements.
    Periodic(usize),
}

/// Settings controlling a local optimization procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalOptimizationSettings {
    /// Iteration cap of the inner refinement loop.
    pub max_iterations: usize,
    /// The non-minimal sample drawn by nested RANSAC holds at most
    /// `sample_size_multiplier * non_minimal_sample_size` correspondences.
    pub sample_size_multiplier: usize,
}

impl Default for LocalOptimizationSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            sample_size_multiplier: 7,
        }
    }
}

/// Main configuration object for the estimation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacSettings {
    /// Minimum number of main-loop iterations.
    pub min_iterations: usize,
    /// Maximum number of main-loop iterations.
    pub max_iterations: usize,
    /// Worker count for the scoring fan-out; `<= 1` runs sequentially.
    pub core_number: usize,
    /// Inlier threshold in the residual domain (pixels).
    pub inlier_threshold: f64,
    /// Desired confidence in \[0, 1\].
    pub confidence: f64,
    /// Seed for every random draw of the run; fixed seed, inputs and
    /// `core_number` make the run reproducible.
    pub seed: u64,

    pub scoring: ScoringType,
    pub sampler: SamplerType,
    pub local_optimization: LocalOptimizationType,
    pub final_optimization: LocalOptimizationType,
    pub termination_criterion: TerminationType,
    pub local_optimization_cadence: LocalOptimizationCadence,

    pub local_optimization_settings: LocalOptimizationSettings,
    pub final_optimization_settings: LocalOptimizationSettings,

    /// Divisions per axis of the grid neighborhood graph, when the
    /// neighborhood-guided sampler is selected.
    pub neighborhood_divisions: usize,
    /// PROSAC iteration count after which sampling falls back to uniform.
    pub prosac_convergence_iterations: usize,
}

impl Default for RansacSettings {
    fn default() -> Self {
        Self {
            min_iterations: 1000,
            max_iterations: 5000,
            core_number: 4,
            inlier_threshold: 1.5,
            confidence: 0.99,
            seed: 0,
            scoring: ScoringType::Magsac,
            sampler: SamplerType::Uniform,
            local_optimization: LocalOptimizationType::NestedRansac,
            final_optimization: LocalOptimizationType::Irls,
            termination_criterion: TerminationType::Ransac,
            local_optimization_cadence: LocalOptimizationCadence::OnImprovement,
            local_optimization_settings: LocalOptimizationSettings::default(),
            final_optimization_settings: LocalOptimizationSettings::default(),
            neighborhood_divisions: 8,
            prosac_convergence_iterations: 100_000,
        }
    }
}
