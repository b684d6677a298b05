// src/models/monte_carlo.rs

//! Seeded Black-Scholes Monte-Carlo simulation and pathwise products.
//!
//! The simulation generates all asset paths at construction from a fixed
//! seed, so cloning the model under trial parameters re-simulates the same
//! Brownian draws and the calibration residuals stay deterministic functions
//! of the parameters, as finite-difference Jacobians require.
//!
//! The volatility structure is a separate parameter object
//! ([`LognormalVolatility`]) so that a calibration can rebind it through the
//! usual aggregation/split machinery.

use crate::calibration::types::{CalibratableModel, ParameterMap, ParameterObject, Product};
use crate::error::CalibrationError;
use crate::stochastic::RandomVariable;
use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Flat lognormal volatility, the one-parameter covariance structure of the
/// Black-Scholes model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LognormalVolatility {
    name: String,
    sigma: f64,
}

impl LognormalVolatility {
    pub fn new(name: &str, sigma: f64) -> Result<Self> {
        if !sigma.is_finite() {
            return Err(anyhow!("volatility '{}' must be finite, got {}", name, sigma));
        }
        Ok(Self {
            name: name.to_string(),
            sigma,
        })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// A copy carrying a new parameter slice (width 1).
    pub fn with_parameters(&self, parameters: &[f64]) -> Result<Self, CalibrationError> {
        if parameters.len() != 1 {
            return Err(CalibrationError::DimensionMismatch(format!(
                "volatility '{}' has width 1, got {}",
                self.name,
                parameters.len()
            )));
        }
        if !parameters[0].is_finite() {
            return Err(CalibrationError::NumericalFault(format!(
                "non-finite volatility proposed for '{}'",
                self.name
            )));
        }
        Ok(Self {
            name: self.name.clone(),
            sigma: parameters[0],
        })
    }
}

impl ParameterObject for LognormalVolatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.sigma]
    }
}

/// Monte-Carlo simulation of a lognormal asset under a constant rate.
///
/// Stepping is exact in log space: over each grid interval
/// `S_{t+dt} = S_t * exp((r - sigma^2/2) dt + sigma sqrt(dt) Z)`.
pub struct BlackScholesSimulation {
    initial_value: f64,
    riskfree_rate: f64,
    volatility: Arc<LognormalVolatility>,
    time_grid: Vec<f64>,
    paths: usize,
    seed: u64,
    asset_paths: Vec<RandomVariable>,
}

impl BlackScholesSimulation {
    /// Simulate `paths` asset paths over `time_grid` (which must start at 0
    /// and be strictly increasing) from a fixed `seed`.
    pub fn new(
        initial_value: f64,
        riskfree_rate: f64,
        volatility: LognormalVolatility,
        time_grid: Vec<f64>,
        paths: usize,
        seed: u64,
    ) -> Result<Self> {
        if initial_value <= 0.0 || !initial_value.is_finite() {
            return Err(anyhow!("initial value must be positive, got {}", initial_value));
        }
        if time_grid.first() != Some(&0.0) {
            return Err(anyhow!("time grid must start at 0"));
        }
        if time_grid.windows(2).any(|w| w[1] <= w[0]) {
            return Err(anyhow!("time grid must be strictly increasing"));
        }
        if paths == 0 {
            return Err(anyhow!("need at least one path"));
        }

        let asset_paths = Self::simulate(
            initial_value,
            riskfree_rate,
            volatility.sigma(),
            &time_grid,
            paths,
            seed,
        );
        Ok(Self {
            initial_value,
            riskfree_rate,
            volatility: Arc::new(volatility),
            time_grid,
            paths,
            seed,
            asset_paths,
        })
    }

    fn simulate(
        initial_value: f64,
        riskfree_rate: f64,
        sigma: f64,
        time_grid: &[f64],
        paths: usize,
        seed: u64,
    ) -> Vec<RandomVariable> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut asset_paths = Vec::with_capacity(time_grid.len());
        let mut asset = RandomVariable::deterministic(0.0, initial_value);
        asset_paths.push(asset.clone());

        for window in time_grid.windows(2) {
            let dt = window[1] - window[0];
            let increments: Vec<f64> = (0..paths)
                .map(|_| rng.sample::<f64, _>(StandardNormal))
                .collect();
            let brownian = RandomVariable::stochastic(window[1], increments);
            let exponent = brownian
                .mult_scalar(sigma * dt.sqrt())
                .add_scalar((riskfree_rate - 0.5 * sigma * sigma) * dt);
            asset = asset.mult(&exponent.exp());
            asset_paths.push(asset.clone());
        }
        asset_paths
    }

    pub fn riskfree_rate(&self) -> f64 {
        self.riskfree_rate
    }

    pub fn volatility(&self) -> &LognormalVolatility {
        &self.volatility
    }

    pub fn time_grid(&self) -> &[f64] {
        &self.time_grid
    }

    pub fn paths(&self) -> usize {
        self.paths
    }

    /// The asset value at a simulation time.
    pub fn asset_at(&self, time: f64) -> Result<&RandomVariable> {
        self.time_grid
            .iter()
            .position(|&t| (t - time).abs() < 1e-9)
            .map(|idx| &self.asset_paths[idx])
            .with_context(|| format!("{} is not a simulation time", time))
    }

    /// Money-market numeraire `exp(r t)`, deterministic under a constant rate.
    pub fn numeraire(&self, time: f64) -> RandomVariable {
        RandomVariable::deterministic(time, (self.riskfree_rate * time).exp())
    }

    /// A fresh simulation under a different volatility structure, re-using
    /// the same seed and grid.
    pub fn clone_with_modified_volatility(&self, volatility: LognormalVolatility) -> Self {
        let asset_paths = Self::simulate(
            self.initial_value,
            self.riskfree_rate,
            volatility.sigma(),
            &self.time_grid,
            self.paths,
            self.seed,
        );
        Self {
            initial_value: self.initial_value,
            riskfree_rate: self.riskfree_rate,
            volatility: Arc::new(volatility),
            time_grid: self.time_grid.clone(),
            paths: self.paths,
            seed: self.seed,
            asset_paths,
        }
    }
}

impl CalibratableModel for BlackScholesSimulation {
    fn clone_with_parameters(
        &self,
        parameters: &ParameterMap,
    ) -> Result<Arc<dyn CalibratableModel>, CalibrationError> {
        let mut model: Option<Self> = None;
        for (name, slice) in parameters {
            if name != ParameterObject::name(self.volatility.as_ref()) {
                return Err(CalibrationError::CloneNotSupported(name.clone()));
            }
            let volatility = self.volatility.with_parameters(slice)?;
            model = Some(self.clone_with_modified_volatility(volatility));
        }
        // An empty map still yields a fresh clone under the current
        // parameters.
        Ok(Arc::new(model.unwrap_or_else(|| {
            self.clone_with_modified_volatility(self.volatility.as_ref().clone())
        })))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// European call option, valued pathwise and reduced to an expectation.
pub struct EuropeanCall {
    pub maturity: f64,
    pub strike: f64,
}

impl EuropeanCall {
    /// Pathwise value at `evaluation_time`: the discounted payoff rolled
    /// forward by the numeraire. At evaluation time 0 the expectation of the
    /// result is the option price.
    pub fn value_at(
        &self,
        evaluation_time: f64,
        simulation: &BlackScholesSimulation,
    ) -> Result<RandomVariable> {
        let asset = simulation.asset_at(self.maturity)?;
        let payoff = asset.sub_scalar(self.strike).floor_at(0.0);
        Ok(payoff
            .div(&simulation.numeraire(self.maturity))
            .mult(&simulation.numeraire(evaluation_time)))
    }
}

impl Product for EuropeanCall {
    fn value(&self, model: &dyn CalibratableModel) -> Result<f64> {
        let simulation = model
            .as_any()
            .downcast_ref::<BlackScholesSimulation>()
            .context("European call requires a Monte-Carlo simulation")?;
        Ok(self.value_at(0.0, simulation)?.average())
    }
}
