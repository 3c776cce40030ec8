//! Error type surfaced by the estimation pipeline.
//!
//! The estimator never aborts the process: internal numerical failures
//! (an SVD that does not converge, a singular linear system) discard the
//! offending candidate model and the loop continues. Only the conditions
//! below reach the caller.

use thiserror::Error;

/// Failure modes of a robust estimation call.
#[derive(Debug, Error)]
pub enum EstimationError {
    /// Shape mismatch, empty input, non-finite values, or missing
    /// intrinsics for essential-matrix estimation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No model ever scored above the invalid sentinel.
    #[error("no valid model could be estimated from the data")]
    Degenerate,

    /// Fewer points than the minimal sample size of the chosen geometry.
    #[error("{found} points given but the minimal solver needs {required}")]
    InsufficientData { found: usize, required: usize },

    /// The caller cancelled the run before any model improved on the
    /// invalid sentinel. Cancellation after a model was found returns the
    /// partial best instead, flagged on the result.
    #[error("estimation cancelled before a model was found")]
    Cancelled,
}
