//! Path-vector algebra consumed by Monte-Carlo product implementations.
//!
//! The central type is [`RandomVariable`]: a filtration-timed value that is
//! either deterministic (a scalar) or stochastic (a vector of per-path
//! realizations). All arithmetic is elementwise and returns fresh values;
//! deterministic operands never get materialized into vectors.

pub mod random_variable;

pub use random_variable::RandomVariable;
