use crate::error::CalibrationError;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-object parameter slices, keyed by the object's stable name.
///
/// Produced by `ParameterAggregation::split` and consumed by
/// [`CalibratableModel::clone_with_parameters`].
pub type ParameterMap = HashMap<String, Vec<f64>>;

/// A parameter-bearing sub-object of a model (a curve, a volatility
/// structure, a covariance model).
///
/// Objects are immutable: the optimizer never writes parameters back in
/// place. Instead the owning model rebuilds itself through
/// [`CalibratableModel::clone_with_parameters`], which hands each object a
/// fresh slice. The slice width reported by `parameters()` must be stable for
/// the lifetime of the object; a width of zero marks the object as
/// uncalibratable.
pub trait ParameterObject: Send + Sync {
    /// Stable identity used as the key in a [`ParameterMap`].
    fn name(&self) -> &str;

    /// The current parameter slice.
    fn parameters(&self) -> Vec<f64>;
}

/// A model that can rebuild itself under a new parameter assignment.
///
/// `clone_with_parameters` must be atomic: either a fully rebound model comes
/// back, or an error; a half-updated model state is never observable. The
/// original model is read-only throughout a calibration run; clones taken
/// during a run are evaluated concurrently across Jacobian columns.
pub trait CalibratableModel: Send + Sync {
    /// A fresh model with the named parameter objects replaced by copies
    /// carrying the given slices.
    ///
    /// Fails with [`CalibrationError::CloneNotSupported`] if a named object
    /// cannot be rebound, and with [`CalibrationError::DimensionMismatch`] if
    /// a slice width disagrees with the object's width.
    fn clone_with_parameters(
        &self,
        parameters: &ParameterMap,
    ) -> Result<Arc<dyn CalibratableModel>, CalibrationError>;

    /// Downcasting hook so products can reach their concrete model type.
    fn as_any(&self) -> &dyn Any;
}

/// A calibration product: anything that prices to a single number under a
/// model.
///
/// Analytic curve products compute their value directly from curve lookups;
/// Monte-Carlo products evaluate a pathwise [`RandomVariable`] and reduce it
/// to its expectation at evaluation time 0 before returning. Products are
/// evaluated on cloned models from worker threads and must not cache state
/// across calls.
///
/// [`RandomVariable`]: crate::stochastic::RandomVariable
pub trait Product: Send + Sync {
    fn value(&self, model: &dyn CalibratableModel) -> anyhow::Result<f64>;
}
