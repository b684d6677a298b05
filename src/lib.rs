//! # Curvefit-Lib: Model Calibration with Parallel Levenberg-Marquardt
//!
//! `curvefit-lib` is a Rust library for calibrating interest-rate curve and
//! Monte-Carlo models to market-quoted instruments. The library centers on
//! two numerical cores:
//!
//! - **Levenberg-Marquardt optimizer**: damped Gauss-Newton with parallel
//!   central-difference Jacobians, Marquardt-scaled damping, and cooperative
//!   cancellation.
//! - **Calibration harness**: aggregates the parameters of heterogeneous
//!   model components (curves, volatility structures) into one flat vector
//!   and fits them so a set of products reprices to given targets, always
//!   going through immutable clone-with-parameters rebuilds.
//!
//! Monte-Carlo products are written against the [`stochastic::RandomVariable`]
//! path-vector algebra, which short-circuits deterministic operands so the
//! calibration inner loop stays cheap.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use curvefit_lib::models::curve::{CurveModel, DiscountCurve, ZeroCouponBond};
//! use curvefit_lib::{calibrate, OptimizerConfig, ParameterObject, Product};
//! use std::sync::Arc;
//!
//! // A curve with a rough initial guess.
//! let curve = DiscountCurve::new("discount", vec![1.0, 2.0], vec![0.02, 0.02])?;
//! let model = Arc::new(CurveModel::new(vec![curve.clone()]));
//!
//! // Bootstrap instruments: model value minus market value, targets zero.
//! let products: Vec<Arc<dyn Product>> = vec![
//!     Arc::new(ZeroCouponBond { curve: "discount".into(), maturity: 1.0, market_price: 0.97 }),
//!     Arc::new(ZeroCouponBond { curve: "discount".into(), maturity: 2.0, market_price: 0.93 }),
//! ];
//! let objects: Vec<Arc<dyn ParameterObject>> = vec![Arc::new(curve)];
//!
//! let (calibrated, iterations) = calibrate(
//!     model,
//!     products,
//!     vec![0.0, 0.0],
//!     None,
//!     objects,
//!     OptimizerConfig::curves(),
//! )?;
//! println!("calibrated in {} iterations", iterations);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Presets
//!
//! - [`OptimizerConfig::curves()`]: large iteration budget for cheap analytic
//!   residuals
//! - [`OptimizerConfig::monte_carlo()`]: tighter budget for re-simulating
//!   residuals
//! - [`OptimizerConfig::minimal()`]: quick validation settings

// ================================================================================================
// MODULES
// ================================================================================================

pub mod calibration;
pub mod error;
pub mod models;
pub mod optimizer;
pub mod stochastic;

// ================================================================================================
// PUBLIC RE-EXPORTS
// ================================================================================================

// Calibration surface
pub use calibration::{
    calibrate, CalibratableModel, CalibrationProcess, OptimizerConfig, ParameterAggregation,
    ParameterMap, ParameterObject, Product,
};

// Optimizer surface
pub use optimizer::{
    CancellationToken, ConvergenceCriterion, LevenbergMarquardt, ResidualFunction, SolverStatus,
};

// Path-vector algebra
pub use stochastic::RandomVariable;

// Error type
pub use error::CalibrationError;
