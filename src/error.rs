//! Error type shared by the aggregation, harness, and optimizer layers.
//!
//! Product implementations report failures through `anyhow`; the harness wraps
//! them into [`CalibrationError::EvaluationFailure`] together with the index of
//! the offending product so callers can locate the bad instrument.

use thiserror::Error;

/// Failures surfaced by the calibration stack.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Parameter, target, or weight vector lengths are inconsistent.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An aggregation was constructed over an empty set of parameter objects.
    #[error("parameter aggregation requires at least one parameter object")]
    EmptyAggregation,

    /// A product or model callback failed; `index` is the product position.
    #[error("evaluation of product {index} failed: {cause}")]
    EvaluationFailure { index: usize, cause: anyhow::Error },

    /// The damped normal matrix stayed non-positive-definite after the
    /// configured number of lambda escalations.
    #[error("normal equation system is singular (lambda escalated to {lambda:.3e} over {rejects} attempts)")]
    SingularSystem { lambda: f64, rejects: usize },

    /// NaN or infinity appeared in residuals or parameters.
    #[error("numerical fault: {0}")]
    NumericalFault(String),

    /// The model refused to rebind one of the requested parameter objects.
    #[error("model cannot rebind parameter object '{0}'")]
    CloneNotSupported(String),

    /// The run was cancelled through its cancellation token.
    #[error("calibration cancelled")]
    Cancelled,

    /// The iteration budget ran out before any convergence criterion was met.
    /// Carries the best solution found so the caller may still accept it.
    #[error("not converged after {iterations} iterations (best error {error:.6e})")]
    NotConverged {
        iterations: usize,
        error: f64,
        best_parameters: Vec<f64>,
    },
}
