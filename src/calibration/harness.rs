// src/calibration/harness.rs

//! Calibration harness: fits a model's parameter objects so that a set of
//! products evaluates as close as possible to given target values.
//!
//! The harness aggregates the selected parameter objects into one flat
//! vector, hands it to the Levenberg-Marquardt solver, and answers the
//! solver's trial vectors by splitting them back into per-object slices,
//! cloning the model under those slices, and re-pricing every product against
//! the clone. The model and products are never mutated; all trial state lives
//! in clones.

use crate::calibration::aggregation::ParameterAggregation;
use crate::calibration::config::OptimizerConfig;
use crate::calibration::types::{CalibratableModel, ParameterObject, Product};
use crate::error::CalibrationError;
use crate::optimizer::levenberg_marquardt::{
    CancellationToken, IterationObserver, LevenbergMarquardt,
};
use log::debug;
use std::sync::Arc;

/// A single calibration run over a model, products, and targets.
pub struct CalibrationProcess {
    model: Arc<dyn CalibratableModel>,
    products: Vec<Arc<dyn Product>>,
    targets: Vec<f64>,
    objects: Vec<Arc<dyn ParameterObject>>,
    weights: Option<Vec<f64>>,
    config: OptimizerConfig,
    observer: Option<IterationObserver>,
    cancellation: CancellationToken,
    iterations: usize,
    final_error: f64,
}

impl CalibrationProcess {
    /// Set up a calibration of `objects` so that `products[i]` evaluates to
    /// `targets[i]` under the calibrated model.
    pub fn new(
        model: Arc<dyn CalibratableModel>,
        products: Vec<Arc<dyn Product>>,
        targets: Vec<f64>,
        objects: Vec<Arc<dyn ParameterObject>>,
    ) -> Self {
        Self {
            model,
            products,
            targets,
            objects,
            weights: None,
            config: OptimizerConfig::default(),
            observer: None,
            cancellation: CancellationToken::new(),
            iterations: 0,
            final_error: f64::NAN,
        }
    }

    /// A token that cancels the running calibration when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Per-product weights (defaults to 1 for every product).
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Iteration observer forwarded to the solver.
    pub fn with_observer(mut self, observer: IterationObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Solver iterations consumed by the last `run`.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Weighted error of the last `run`'s best solution.
    pub fn final_error(&self) -> f64 {
        self.final_error
    }

    /// Run the calibration and return the calibrated model clone.
    ///
    /// The original model is left untouched. Solver exhaustion surfaces as
    /// [`CalibrationError::NotConverged`] with the best parameters found;
    /// product failures surface as [`CalibrationError::EvaluationFailure`]
    /// with the product index.
    pub fn run(&mut self) -> Result<Arc<dyn CalibratableModel>, CalibrationError> {
        if self.products.len() != self.targets.len() {
            return Err(CalibrationError::DimensionMismatch(format!(
                "{} products for {} targets",
                self.products.len(),
                self.targets.len()
            )));
        }

        let aggregation = ParameterAggregation::new(self.objects.clone())?;
        let initial = aggregation.parameter();
        debug!(
            "calibrating {} parameters against {} products",
            initial.len(),
            self.products.len()
        );

        // Nothing to calibrate: rebuild from the current parameters so the
        // caller still gets a fresh clone, and report zero iterations.
        if initial.is_empty() {
            self.iterations = 0;
            let map = aggregation.split(&initial)?;
            return self.model.clone_with_parameters(&map);
        }

        let model = Arc::clone(&self.model);
        let products = self.products.clone();
        let residual = move |parameters: &[f64],
                             residuals: &mut [f64]|
              -> Result<(), CalibrationError> {
            let map = aggregation.split(parameters)?;
            let trial_model = model.clone_with_parameters(&map)?;
            for (index, product) in products.iter().enumerate() {
                residuals[index] = product.value(trial_model.as_ref()).map_err(|cause| {
                    CalibrationError::EvaluationFailure { index, cause }
                })?;
            }
            Ok(())
        };

        let mut solver = LevenbergMarquardt::new(initial, self.targets.clone())
            .with_config(self.config.clone());
        solver.set_cancellation_token(self.cancellation.clone());
        if let Some(weights) = &self.weights {
            solver.set_weights(weights.clone())?;
        }
        if let Some(observer) = self.observer.take() {
            solver.set_observer(observer);
        }

        let outcome = solver.run(&residual);
        self.iterations = solver.iterations();
        self.final_error = solver.final_error();
        if self.config.verbosity >= 1 {
            println!(
                "calibration finished: {:?} after {} iterations, error {:.6e}",
                solver.status(),
                self.iterations,
                self.final_error
            );
        }
        outcome?;

        let best = ParameterAggregation::new(self.objects.clone())?
            .split(solver.best_fit_parameters())?;
        self.model.clone_with_parameters(&best)
    }
}

/// One-call convenience wrapper around [`CalibrationProcess`].
///
/// Builds the process, runs it, and returns the calibrated model together
/// with the number of solver iterations.
pub fn calibrate(
    model: Arc<dyn CalibratableModel>,
    products: Vec<Arc<dyn Product>>,
    targets: Vec<f64>,
    weights: Option<Vec<f64>>,
    objects: Vec<Arc<dyn ParameterObject>>,
    config: OptimizerConfig,
) -> Result<(Arc<dyn CalibratableModel>, usize), CalibrationError> {
    let mut process = CalibrationProcess::new(model, products, targets, objects).with_config(config);
    if let Some(weights) = weights {
        process = process.with_weights(weights);
    }
    let calibrated = process.run()?;
    Ok((calibrated, process.iterations()))
}
