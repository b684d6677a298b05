// src/optimizer/levenberg_marquardt.rs

//! Damped Gauss-Newton least-squares solver with parallel finite-difference
//! Jacobians.
//!
//! The solver minimizes `E = 1/2 * sum_i w_i (f_i(p) - y_i)^2` over the
//! parameter vector `p`. Each iteration linearizes the residual function,
//! assembles the weighted normal equations with Marquardt's scaled damping
//!
//! ```text
//! (J'WJ + lambda * diag(J'WJ)) delta = J'W (y - f(p))
//! ```
//!
//! and solves them by Cholesky factorization. Accepted steps decrease lambda
//! and mark the Jacobian stale; rejected steps increase lambda and reuse the
//! Jacobian. Jacobian columns are central finite differences (chosen over
//! forward differences for accuracy at twice the evaluation cost) and are
//! evaluated in parallel on a rayon pool sized once per [`run`].
//!
//! [`run`]: LevenbergMarquardt::run

use crate::calibration::config::OptimizerConfig;
use crate::error::CalibrationError;
use log::{debug, trace};
use nalgebra::{Cholesky, DMatrix, DVector};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The residual callback: fill `residuals` with `f(parameters)`.
///
/// Implemented for any `Fn(&[f64], &mut [f64]) -> Result<(), CalibrationError>`
/// closure; the `Sync` bound lets Jacobian workers share it.
pub trait ResidualFunction: Sync {
    fn evaluate(&self, parameters: &[f64], residuals: &mut [f64])
        -> Result<(), CalibrationError>;
}

impl<F> ResidualFunction for F
where
    F: Fn(&[f64], &mut [f64]) -> Result<(), CalibrationError> + Sync,
{
    fn evaluate(
        &self,
        parameters: &[f64],
        residuals: &mut [f64],
    ) -> Result<(), CalibrationError> {
        self(parameters, residuals)
    }
}

/// Cooperative cancellation flag shared between the caller and the solver.
///
/// Workers check the flag between Jacobian column evaluations; on
/// cancellation the current iteration is abandoned, the best solution so far
/// is retained, and the run terminates with [`SolverStatus::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Which convergence criterion ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceCriterion {
    /// Weighted error dropped below the error tolerance.
    Residual,
    /// The proposed step became negligible relative to the parameters.
    Step,
    /// The gradient max-norm dropped below the gradient tolerance.
    Gradient,
}

/// Terminal state of a solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    NotStarted,
    Converged(ConvergenceCriterion),
    /// Iteration budget ran out; the best solution so far is available.
    Exhausted,
    Cancelled,
    /// Singular system, numerical fault, or a failing residual callback.
    Failed,
}

/// Observer invoked once per iteration with
/// `(iteration, error, lambda, parameters)`. Wire up logging here.
pub type IterationObserver = Box<dyn Fn(usize, f64, f64, &[f64]) + Send + Sync>;

/// Parallel Levenberg-Marquardt solver.
///
/// The solver is seeded with initial parameters and per-residual targets,
/// then driven by [`run`] against a [`ResidualFunction`]. `run` returns `Ok`
/// only on convergence; exhaustion of the iteration budget is reported as
/// [`CalibrationError::NotConverged`] carrying the best solution so the
/// caller may still accept it.
///
/// [`run`]: LevenbergMarquardt::run
pub struct LevenbergMarquardt {
    config: OptimizerConfig,
    initial_parameters: Vec<f64>,
    targets: Vec<f64>,
    weights: Vec<f64>,
    observer: Option<IterationObserver>,
    cancellation: CancellationToken,

    best_parameters: Vec<f64>,
    best_error: f64,
    iterations: usize,
    status: SolverStatus,
}

impl LevenbergMarquardt {
    /// A solver with unit weights and the default configuration.
    pub fn new(initial_parameters: Vec<f64>, targets: Vec<f64>) -> Self {
        let weights = vec![1.0; targets.len()];
        Self {
            config: OptimizerConfig::default(),
            best_parameters: initial_parameters.clone(),
            initial_parameters,
            targets,
            weights,
            observer: None,
            cancellation: CancellationToken::new(),
            best_error: f64::INFINITY,
            iterations: 0,
            status: SolverStatus::NotStarted,
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Per-residual weights; must be non-negative and match the target count.
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<(), CalibrationError> {
        if weights.len() != self.targets.len() {
            return Err(CalibrationError::DimensionMismatch(format!(
                "{} weights for {} targets",
                weights.len(),
                self.targets.len()
            )));
        }
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(CalibrationError::NumericalFault(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        self.weights = weights;
        Ok(())
    }

    /// Override the Marquardt-scaled initial damping.
    pub fn set_lambda(&mut self, lambda: f64) {
        self.config.lambda = Some(lambda);
    }

    /// Override the finite-difference perturbation sizes.
    pub fn set_finite_difference_step(&mut self, relative: f64, absolute: f64) {
        self.config.finite_difference_step_relative = relative;
        self.config.finite_difference_step_absolute = absolute;
    }

    /// Install a per-iteration observer (replaces any previous one).
    pub fn set_observer(&mut self, observer: IterationObserver) {
        self.observer = Some(observer);
    }

    /// A token that cancels this solver's run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Share an externally owned cancellation token.
    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancellation = token;
    }

    pub fn best_fit_parameters(&self) -> &[f64] {
        &self.best_parameters
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Weighted error of the best solution found.
    pub fn final_error(&self) -> f64 {
        self.best_error
    }

    pub fn status(&self) -> SolverStatus {
        self.status
    }

    fn weighted_error(&self, residuals: &[f64]) -> f64 {
        0.5 * residuals
            .iter()
            .zip(&self.targets)
            .zip(&self.weights)
            .map(|((f, y), w)| w * (f - y) * (f - y))
            .sum::<f64>()
    }

    fn perturbation(&self, parameter: f64) -> f64 {
        (parameter.abs() * self.config.finite_difference_step_relative)
            .max(self.config.finite_difference_step_absolute)
    }

    /// Central-difference Jacobian, columns evaluated in parallel.
    fn jacobian(
        &self,
        pool: &rayon::ThreadPool,
        residual: &(impl ResidualFunction + ?Sized),
        parameters: &[f64],
    ) -> Result<DMatrix<f64>, CalibrationError> {
        let n = parameters.len();
        let m = self.targets.len();
        let token = &self.cancellation;

        let columns: Vec<Result<Vec<f64>, CalibrationError>> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|j| {
                    if token.is_cancelled() {
                        return Err(CalibrationError::Cancelled);
                    }
                    let h = self.perturbation(parameters[j]);
                    let mut shifted = parameters.to_vec();

                    shifted[j] = parameters[j] + h;
                    let mut f_plus = vec![0.0; m];
                    residual.evaluate(&shifted, &mut f_plus)?;

                    shifted[j] = parameters[j] - h;
                    let mut f_minus = vec![0.0; m];
                    residual.evaluate(&shifted, &mut f_minus)?;

                    Ok(f_plus
                        .iter()
                        .zip(&f_minus)
                        .map(|(fp, fm)| (fp - fm) / (2.0 * h))
                        .collect())
                })
                .collect()
        });

        let mut jacobian = DMatrix::zeros(m, n);
        for (j, column) in columns.into_iter().enumerate() {
            let column = column?;
            for (i, value) in column.into_iter().enumerate() {
                jacobian[(i, j)] = value;
            }
        }
        if jacobian.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::NumericalFault(
                "non-finite entry in finite-difference Jacobian".to_string(),
            ));
        }
        Ok(jacobian)
    }

    /// Run the solver to a terminal state.
    ///
    /// Returns `Ok(())` on convergence. [`CalibrationError::NotConverged`]
    /// reports an exhausted iteration budget together with the best solution;
    /// every other error marks a failed run (the partial state remains
    /// readable through the accessors).
    pub fn run(
        &mut self,
        residual: &(impl ResidualFunction + ?Sized),
    ) -> Result<(), CalibrationError> {
        let n = self.initial_parameters.len();
        let m = self.targets.len();
        if self.weights.len() != m {
            return Err(CalibrationError::DimensionMismatch(format!(
                "{} weights for {} targets",
                self.weights.len(),
                m
            )));
        }

        self.iterations = 0;
        self.best_parameters = self.initial_parameters.clone();

        // No calibratable parameters: report the initial residuals and stop.
        if n == 0 {
            let mut residuals = vec![0.0; m];
            residual.evaluate(&[], &mut residuals).map_err(|e| {
                self.status = SolverStatus::Failed;
                e
            })?;
            self.best_error = self.weighted_error(&residuals);
            self.status = SolverStatus::Converged(ConvergenceCriterion::Step);
            return Ok(());
        }

        let threads = self
            .config
            .parallel_threads
            .unwrap_or_else(|| num_cpus::get().max(1).min(n));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| {
                CalibrationError::NumericalFault(format!("worker pool construction failed: {e}"))
            })?;
        debug!(
            "levenberg-marquardt: {} parameters, {} residuals, {} worker threads",
            n, m, threads
        );

        let mut parameters = self.initial_parameters.clone();
        let mut residuals = vec![0.0; m];
        if let Err(e) = residual.evaluate(&parameters, &mut residuals) {
            self.status = SolverStatus::Failed;
            return Err(e);
        }
        let mut error = self.weighted_error(&residuals);
        if !error.is_finite() {
            self.status = SolverStatus::Failed;
            return Err(CalibrationError::NumericalFault(
                "non-finite error at the initial parameters".to_string(),
            ));
        }
        self.best_error = error;

        let mut lambda = self.config.lambda;
        let mut jacobian = DMatrix::zeros(m, n);
        let mut normal_matrix = DMatrix::zeros(n, n);
        let mut gradient = DVector::zeros(n);
        let mut jacobian_stale = true;

        while self.iterations < self.config.max_iterations {
            if self.cancellation.is_cancelled() {
                self.status = SolverStatus::Cancelled;
                return Err(CalibrationError::Cancelled);
            }

            if jacobian_stale {
                jacobian = match self.jacobian(&pool, residual, &parameters) {
                    Ok(j) => j,
                    Err(CalibrationError::Cancelled) => {
                        self.status = SolverStatus::Cancelled;
                        return Err(CalibrationError::Cancelled);
                    }
                    Err(e) => {
                        self.status = SolverStatus::Failed;
                        return Err(e);
                    }
                };

                // J'WJ and J'W(y - f), with W = diag(weights).
                let mut weighted_jacobian = jacobian.clone();
                for i in 0..m {
                    weighted_jacobian.row_mut(i).scale_mut(self.weights[i]);
                }
                normal_matrix = jacobian.transpose() * &weighted_jacobian;
                let weighted_mismatch = DVector::from_iterator(
                    m,
                    residuals
                        .iter()
                        .zip(&self.targets)
                        .zip(&self.weights)
                        .map(|((f, y), w)| w * (y - f)),
                );
                gradient = jacobian.transpose() * weighted_mismatch;

                // Marquardt's tau-scaled initial damping, once the first
                // Gauss-Newton matrix exists.
                if lambda.is_none() {
                    let max_diag = (0..n)
                        .map(|i| normal_matrix[(i, i)])
                        .fold(0.0_f64, f64::max);
                    lambda = Some(if max_diag > 0.0 { 1e-3 * max_diag } else { 1e-3 });
                    trace!("initial lambda = {:.6e}", lambda.unwrap());
                }
            }

            if gradient.amax() <= self.config.gradient_tolerance {
                self.status = SolverStatus::Converged(ConvergenceCriterion::Gradient);
                return Ok(());
            }
            self.iterations += 1;

            // Solve the damped normal equations, escalating lambda while the
            // damped matrix is not positive definite. A parameter no residual
            // depends on has a zero diagonal entry and a zero gradient
            // component; flooring its damping scale keeps the factorization
            // positive definite while its step stays zero.
            let max_diag = (0..n)
                .map(|i| normal_matrix[(i, i)])
                .fold(0.0_f64, f64::max);
            let scale_floor = max_diag * 1e-10;
            let mut current_lambda = lambda.unwrap_or(1e-3);
            let mut solve_rejects = 0;
            let step = loop {
                let mut damped = normal_matrix.clone();
                for i in 0..n {
                    damped[(i, i)] += current_lambda * normal_matrix[(i, i)].max(scale_floor);
                }
                match Cholesky::new(damped) {
                    Some(cholesky) => break cholesky.solve(&gradient),
                    None => {
                        solve_rejects += 1;
                        if solve_rejects > self.config.max_rejects {
                            self.status = SolverStatus::Failed;
                            return Err(CalibrationError::SingularSystem {
                                lambda: current_lambda,
                                rejects: solve_rejects,
                            });
                        }
                        current_lambda *= self.config.lambda_increase_factor;
                    }
                }
            };
            lambda = Some(current_lambda);

            let trial: Vec<f64> = parameters
                .iter()
                .zip(step.iter())
                .map(|(p, d)| p + d)
                .collect();
            if trial.iter().any(|p| !p.is_finite()) {
                self.status = SolverStatus::Failed;
                return Err(CalibrationError::NumericalFault(
                    "non-finite trial parameters".to_string(),
                ));
            }

            let mut trial_residuals = vec![0.0; m];
            if let Err(e) = residual.evaluate(&trial, &mut trial_residuals) {
                self.status = SolverStatus::Failed;
                return Err(e);
            }
            let trial_error = self.weighted_error(&trial_residuals);
            if trial_error.is_nan() {
                self.status = SolverStatus::Failed;
                return Err(CalibrationError::NumericalFault(
                    "NaN error at trial parameters".to_string(),
                ));
            }

            let accepted = trial_error < error;
            if accepted {
                parameters = trial;
                residuals = trial_residuals;
                error = trial_error;
                if error < self.best_error {
                    self.best_error = error;
                    self.best_parameters = parameters.clone();
                }
                lambda = Some(current_lambda / self.config.lambda_decrease_factor);
                jacobian_stale = true;
            } else {
                lambda = Some(current_lambda * self.config.lambda_increase_factor);
                jacobian_stale = false;
            }

            trace!(
                "iteration {}: error = {:.6e}, lambda = {:.3e}, {}",
                self.iterations,
                error,
                lambda.unwrap(),
                if accepted { "accepted" } else { "rejected" }
            );
            if let Some(observer) = &self.observer {
                observer(self.iterations, error, lambda.unwrap(), &parameters);
            }

            if error <= self.config.error_tolerance {
                self.status = SolverStatus::Converged(ConvergenceCriterion::Residual);
                return Ok(());
            }
            let parameter_scale = parameters.iter().fold(0.0_f64, |acc, p| acc.max(p.abs()));
            let step_norm = step.amax();
            if step_norm
                <= self.config.parameter_tolerance
                    * (parameter_scale + self.config.parameter_tolerance)
            {
                self.status = SolverStatus::Converged(ConvergenceCriterion::Step);
                return Ok(());
            }
        }

        self.status = SolverStatus::Exhausted;
        debug!(
            "levenberg-marquardt exhausted after {} iterations, best error {:.6e}",
            self.iterations, self.best_error
        );
        Err(CalibrationError::NotConverged {
            iterations: self.iterations,
            error: self.best_error,
            best_parameters: self.best_parameters.clone(),
        })
    }
}
