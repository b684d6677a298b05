// src/models/curve.rs

//! Discount curves and the analytic curve products used to bootstrap them.
//!
//! A [`DiscountCurve`] is a piecewise-linear continuously compounded
//! zero-rate curve over fixed pillar times; its calibration parameters are
//! the pillar rates. A [`CurveModel`] holds a set of named curves and
//! rebuilds itself curve-by-curve under `clone_with_parameters`.
//!
//! The curve products express `model_value - market_value` directly, so a
//! curve calibration always targets zero residuals.

use crate::calibration::types::{CalibratableModel, ParameterMap, ParameterObject, Product};
use crate::error::CalibrationError;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Piecewise-linear zero-rate curve with flat extrapolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCurve {
    name: String,
    times: Vec<f64>,
    zero_rates: Vec<f64>,
}

impl DiscountCurve {
    /// A curve over strictly increasing positive pillar times.
    pub fn new(name: &str, times: Vec<f64>, zero_rates: Vec<f64>) -> Result<Self> {
        if times.is_empty() {
            return Err(anyhow!("curve '{}' needs at least one pillar", name));
        }
        if times.len() != zero_rates.len() {
            return Err(anyhow!(
                "curve '{}': {} pillar times but {} rates",
                name,
                times.len(),
                zero_rates.len()
            ));
        }
        if times[0] <= 0.0 || times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(anyhow!(
                "curve '{}': pillar times must be positive and strictly increasing",
                name
            ));
        }
        if zero_rates.iter().any(|r| !r.is_finite()) {
            return Err(anyhow!("curve '{}': rates must be finite", name));
        }
        Ok(Self {
            name: name.to_string(),
            times,
            zero_rates,
        })
    }

    pub fn pillar_times(&self) -> &[f64] {
        &self.times
    }

    /// Zero rate at `t`, linearly interpolated between pillars and flat
    /// outside them.
    pub fn zero_rate(&self, t: f64) -> f64 {
        let t_clamped = t.clamp(self.times[0], *self.times.last().unwrap());
        let idx = self.times.partition_point(|&pillar| pillar < t_clamped);
        if idx == 0 {
            return self.zero_rates[0];
        }
        if idx >= self.times.len() {
            return *self.zero_rates.last().unwrap();
        }
        let (t0, t1) = (self.times[idx - 1], self.times[idx]);
        let (r0, r1) = (self.zero_rates[idx - 1], self.zero_rates[idx]);
        r0 + (r1 - r0) * (t_clamped - t0) / (t1 - t0)
    }

    /// Discount factor `exp(-z(t) * t)`; 1 at and before time 0.
    pub fn discount_factor(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 1.0;
        }
        (-self.zero_rate(t) * t).exp()
    }

    /// Simply compounded forward rate between `t1 < t2`.
    pub fn forward_rate(&self, t1: f64, t2: f64) -> f64 {
        (self.discount_factor(t1) / self.discount_factor(t2) - 1.0) / (t2 - t1)
    }

    /// A copy of this curve carrying new pillar rates.
    pub fn with_rates(&self, rates: &[f64]) -> Result<Self, CalibrationError> {
        if rates.len() != self.zero_rates.len() {
            return Err(CalibrationError::DimensionMismatch(format!(
                "curve '{}' has {} pillars, got {} rates",
                self.name,
                self.zero_rates.len(),
                rates.len()
            )));
        }
        Ok(Self {
            name: self.name.clone(),
            times: self.times.clone(),
            zero_rates: rates.to_vec(),
        })
    }
}

impl ParameterObject for DiscountCurve {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Vec<f64> {
        self.zero_rates.clone()
    }
}

/// A set of named discount curves forming one calibratable model.
#[derive(Clone)]
pub struct CurveModel {
    curves: HashMap<String, Arc<DiscountCurve>>,
}

impl CurveModel {
    pub fn new(curves: Vec<DiscountCurve>) -> Self {
        let curves = curves
            .into_iter()
            .map(|c| (ParameterObject::name(&c).to_string(), Arc::new(c)))
            .collect();
        Self { curves }
    }

    pub fn curve(&self, name: &str) -> Option<&Arc<DiscountCurve>> {
        self.curves.get(name)
    }

    pub fn discount_factor(&self, curve: &str, t: f64) -> Result<f64> {
        let curve = self
            .curves
            .get(curve)
            .with_context(|| format!("model has no curve '{}'", curve))?;
        Ok(curve.discount_factor(t))
    }
}

impl CalibratableModel for CurveModel {
    fn clone_with_parameters(
        &self,
        parameters: &ParameterMap,
    ) -> Result<Arc<dyn CalibratableModel>, CalibrationError> {
        let mut curves = self.curves.clone();
        for (name, slice) in parameters {
            let curve = curves
                .get(name)
                .ok_or_else(|| CalibrationError::CloneNotSupported(name.clone()))?;
            curves.insert(name.clone(), Arc::new(curve.with_rates(slice)?));
        }
        Ok(Arc::new(Self { curves }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Zero-coupon bond mispricing: model discount factor minus quoted price.
pub struct ZeroCouponBond {
    pub curve: String,
    pub maturity: f64,
    pub market_price: f64,
}

impl Product for ZeroCouponBond {
    fn value(&self, model: &dyn CalibratableModel) -> Result<f64> {
        let model = model
            .as_any()
            .downcast_ref::<CurveModel>()
            .context("zero-coupon bond requires a curve model")?;
        Ok(model.discount_factor(&self.curve, self.maturity)? - self.market_price)
    }
}

/// Par-swap mispricing: the fair fixed rate implied by the curve over a
/// payment schedule, minus the quoted fixed rate.
///
/// The schedule starts at time 0; `payment_times` are the fixed-leg payment
/// dates. Par rate = `(1 - df(t_n)) / annuity`.
pub struct ParSwap {
    pub curve: String,
    pub payment_times: Vec<f64>,
    pub fixed_rate: f64,
}

impl Product for ParSwap {
    fn value(&self, model: &dyn CalibratableModel) -> Result<f64> {
        let model = model
            .as_any()
            .downcast_ref::<CurveModel>()
            .context("par swap requires a curve model")?;
        if self.payment_times.is_empty() {
            return Err(anyhow!("par swap needs at least one payment time"));
        }

        let mut annuity = 0.0;
        let mut previous = 0.0;
        for &t in &self.payment_times {
            annuity += (t - previous) * model.discount_factor(&self.curve, t)?;
            previous = t;
        }
        let final_df = model.discount_factor(&self.curve, *self.payment_times.last().unwrap())?;
        let par_rate = (1.0 - final_df) / annuity;
        Ok(par_rate - self.fixed_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_curve(rate: f64) -> DiscountCurve {
        DiscountCurve::new("discount", vec![1.0, 2.0, 5.0, 10.0], vec![rate; 4]).unwrap()
    }

    #[test]
    fn test_curve_validation() {
        assert!(DiscountCurve::new("c", vec![], vec![]).is_err());
        assert!(DiscountCurve::new("c", vec![1.0, 1.0], vec![0.01, 0.02]).is_err());
        assert!(DiscountCurve::new("c", vec![-1.0, 1.0], vec![0.01, 0.02]).is_err());
        assert!(DiscountCurve::new("c", vec![1.0, 2.0], vec![0.01]).is_err());
        assert!(DiscountCurve::new("c", vec![1.0, 2.0], vec![0.01, 0.02]).is_ok());
    }

    #[test]
    fn test_zero_rate_interpolation() {
        let curve =
            DiscountCurve::new("c", vec![1.0, 2.0], vec![0.02, 0.04]).unwrap();
        assert!((curve.zero_rate(1.0) - 0.02).abs() < 1e-15);
        assert!((curve.zero_rate(1.5) - 0.03).abs() < 1e-15);
        assert!((curve.zero_rate(2.0) - 0.04).abs() < 1e-15);
        // Flat extrapolation on both sides.
        assert!((curve.zero_rate(0.5) - 0.02).abs() < 1e-15);
        assert!((curve.zero_rate(30.0) - 0.04).abs() < 1e-15);
    }

    #[test]
    fn test_discount_factor_and_forward() {
        let curve = flat_curve(0.03);
        assert!((curve.discount_factor(2.0) - (-0.06_f64).exp()).abs() < 1e-15);
        assert_eq!(curve.discount_factor(0.0), 1.0);
        // On a flat curve the simple forward matches the compounded rate.
        let forward = curve.forward_rate(1.0, 2.0);
        let expected = 0.03_f64.exp() - 1.0;
        assert!((forward - expected).abs() < 1e-12);
    }

    #[test]
    fn test_clone_with_parameters_rebinds_curve() {
        let model = CurveModel::new(vec![flat_curve(0.03)]);
        let mut map = ParameterMap::new();
        map.insert("discount".to_string(), vec![0.01, 0.01, 0.01, 0.01]);
        let rebound = model.clone_with_parameters(&map).unwrap();
        let rebound = rebound.as_any().downcast_ref::<CurveModel>().unwrap();
        assert!(
            (rebound.discount_factor("discount", 1.0).unwrap() - (-0.01_f64).exp()).abs() < 1e-15
        );
        // The original model is untouched.
        assert!((model.discount_factor("discount", 1.0).unwrap() - (-0.03_f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn test_clone_with_unknown_curve_is_rejected() {
        let model = CurveModel::new(vec![flat_curve(0.03)]);
        let mut map = ParameterMap::new();
        map.insert("forward".to_string(), vec![0.01]);
        assert!(matches!(
            model.clone_with_parameters(&map),
            Err(CalibrationError::CloneNotSupported(_))
        ));
    }

    #[test]
    fn test_par_swap_is_zero_on_consistent_curve() {
        let model = CurveModel::new(vec![flat_curve(0.03)]);
        let payment_times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut annuity = 0.0;
        for &t in &payment_times {
            annuity += model.discount_factor("discount", t).unwrap();
        }
        let par = (1.0 - model.discount_factor("discount", 5.0).unwrap()) / annuity;
        let swap = ParSwap {
            curve: "discount".to_string(),
            payment_times,
            fixed_rate: par,
        };
        let residual = swap.value(&model).unwrap();
        assert!(residual.abs() < 1e-14, "residual = {}", residual);
    }
}
