//! Nonlinear least-squares optimization.

pub mod levenberg_marquardt;

pub use levenberg_marquardt::{
    CancellationToken, ConvergenceCriterion, LevenbergMarquardt, ResidualFunction, SolverStatus,
};
