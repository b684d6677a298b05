use serde::Deserialize;

/// Configuration for the Levenberg-Marquardt optimizer.
///
/// Every field has a serde default so partial TOML fragments deserialize
/// cleanly; [`OptimizerConfig::from_toml_str`] is the canonical loader.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Upper bound on LM iterations before the run is declared exhausted.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Residual convergence: stop once the weighted error drops below this.
    #[serde(default = "default_error_tolerance")]
    pub error_tolerance: f64,

    /// Step convergence: stop once the max-norm of the update is below
    /// `parameter_tolerance * (max-norm of parameters + parameter_tolerance)`.
    #[serde(default = "default_parameter_tolerance")]
    pub parameter_tolerance: f64,

    /// Gradient convergence: stop once the max-norm of J'W(y-f) is below this.
    #[serde(default = "default_gradient_tolerance")]
    pub gradient_tolerance: f64,

    /// Initial damping. `None` uses Marquardt's scaling
    /// `1e-3 * max diag(J'WJ)` computed from the first Jacobian.
    #[serde(default)]
    pub lambda: Option<f64>,

    /// Multiplier applied to lambda after a rejected step.
    #[serde(default = "default_lambda_factor")]
    pub lambda_increase_factor: f64,

    /// Divisor applied to lambda after an accepted step.
    #[serde(default = "default_lambda_factor")]
    pub lambda_decrease_factor: f64,

    /// How many lambda escalations to attempt when the damped normal matrix
    /// is not positive definite before declaring the system singular.
    #[serde(default = "default_max_rejects")]
    pub max_rejects: usize,

    /// Relative finite-difference perturbation, scaled by |p_j|.
    #[serde(default = "default_step_relative")]
    pub finite_difference_step_relative: f64,

    /// Absolute finite-difference floor for parameters near zero.
    #[serde(default = "default_step_absolute")]
    pub finite_difference_step_absolute: f64,

    /// Worker threads for Jacobian evaluation. `None` sizes the pool as
    /// `min(max(cores, 1), n_params)`.
    #[serde(default)]
    pub parallel_threads: Option<usize>,

    /// Progress printing: 0 = silent, 1 = per-run summary, 2 = per-iteration.
    #[serde(default)]
    pub verbosity: u8,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            error_tolerance: default_error_tolerance(),
            parameter_tolerance: default_parameter_tolerance(),
            gradient_tolerance: default_gradient_tolerance(),
            lambda: None,
            lambda_increase_factor: default_lambda_factor(),
            lambda_decrease_factor: default_lambda_factor(),
            max_rejects: default_max_rejects(),
            finite_difference_step_relative: default_step_relative(),
            finite_difference_step_absolute: default_step_absolute(),
            parallel_threads: None,
            verbosity: 0,
        }
    }
}

impl OptimizerConfig {
    /// Configuration for curve bootstraps: residuals are cheap analytic
    /// lookups, so a large iteration budget costs little.
    pub fn curves() -> Self {
        Self {
            max_iterations: 10000,
            ..Self::default()
        }
    }

    /// Configuration for Monte-Carlo calibrations: each residual evaluation
    /// re-simulates, so the budget is tighter and the error tolerance is
    /// matched to Monte-Carlo noise rather than machine precision.
    pub fn monte_carlo() -> Self {
        Self {
            max_iterations: 400,
            error_tolerance: 1e-9,
            ..Self::default()
        }
    }

    /// Minimal configuration for quick validation and unit tests.
    pub fn minimal() -> Self {
        Self {
            max_iterations: 50,
            error_tolerance: 1e-8,
            ..Self::default()
        }
    }

    /// Parse a configuration from a TOML fragment; absent keys fall back to
    /// their defaults.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }
}

fn default_max_iterations() -> usize {
    400
}

fn default_error_tolerance() -> f64 {
    1e-12
}

fn default_parameter_tolerance() -> f64 {
    1e-10
}

fn default_gradient_tolerance() -> f64 {
    1e-12
}

fn default_lambda_factor() -> f64 {
    10.0
}

fn default_max_rejects() -> usize {
    20
}

fn default_step_relative() -> f64 {
    1e-8
}

fn default_step_absolute() -> f64 {
    1e-10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default();
        assert_eq!(config.max_iterations, 400);
        assert_eq!(config.error_tolerance, 1e-12);
        assert_eq!(config.lambda_increase_factor, 10.0);
        assert_eq!(config.lambda_decrease_factor, 10.0);
        assert_eq!(config.max_rejects, 20);
        assert!(config.lambda.is_none());
        assert!(config.parallel_threads.is_none());
    }

    #[test]
    fn test_from_toml_fragment() {
        let config = OptimizerConfig::from_toml_str(
            r#"
            max_iterations = 123
            lambda = 0.5
            parallel_threads = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.max_iterations, 123);
        assert_eq!(config.lambda, Some(0.5));
        assert_eq!(config.parallel_threads, Some(2));
        // Unspecified keys keep their defaults.
        assert_eq!(config.finite_difference_step_relative, 1e-8);
    }

    #[test]
    fn test_presets() {
        assert_eq!(OptimizerConfig::curves().max_iterations, 10000);
        assert_eq!(OptimizerConfig::monte_carlo().max_iterations, 400);
        assert!(OptimizerConfig::minimal().max_iterations <= 100);
    }
}
