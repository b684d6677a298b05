// src/stochastic/random_variable.rs

//! Immutable random variables over Monte-Carlo paths.
//!
//! A [`RandomVariable`] carries a filtration time `t` and either a scalar
//! (deterministic) or a vector of realizations (stochastic). Operations
//! combine operands elementwise; the result's filtration time is the maximum
//! of the operand times, since a value measurable at `t` stays measurable at
//! any later time.
//!
//! Two rules keep the type cheap enough for calibration inner loops:
//!
//! * all-deterministic operands take a scalar fast path and allocate nothing;
//! * a deterministic operand mixed with a stochastic one is broadcast lazily,
//!   element by element, never expanded into a vector.
//!
//! NaN and infinity propagate with IEEE semantics; the algebra itself never
//! fails. Statistics over an empty realization vector return NaN.

use std::ops::{Add, Div, Mul, Sub};

#[derive(Debug, Clone, PartialEq)]
enum Values {
    Deterministic(f64),
    Stochastic(Vec<f64>),
}

/// A filtration-timed value, either a scalar or a vector of realizations.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomVariable {
    time: f64,
    values: Values,
}

impl RandomVariable {
    /// A deterministic value known at time 0.
    pub fn constant(value: f64) -> Self {
        Self::deterministic(0.0, value)
    }

    /// A deterministic value with an explicit filtration time.
    pub fn deterministic(time: f64, value: f64) -> Self {
        Self {
            time,
            values: Values::Deterministic(value),
        }
    }

    /// A stochastic value from per-path realizations.
    pub fn stochastic(time: f64, realizations: Vec<f64>) -> Self {
        Self {
            time,
            values: Values::Stochastic(realizations),
        }
    }

    /// A stochastic value of `size` paths, all equal to `value`.
    pub fn filled(time: f64, size: usize, value: f64) -> Self {
        Self::stochastic(time, vec![value; size])
    }

    /// The earliest time at which this value is known.
    pub fn filtration_time(&self) -> f64 {
        self.time
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.values, Values::Deterministic(_))
    }

    /// Number of realizations; deterministic values broadcast as size 1.
    pub fn size(&self) -> usize {
        match &self.values {
            Values::Deterministic(_) => 1,
            Values::Stochastic(r) => r.len(),
        }
    }

    /// Realization at `path`. Deterministic values broadcast to every path.
    ///
    /// # Panics
    ///
    /// Panics if `path` is out of range for a stochastic value.
    pub fn get(&self, path: usize) -> f64 {
        match &self.values {
            Values::Deterministic(v) => *v,
            Values::Stochastic(r) => r[path],
        }
    }

    /// The realization vector, or `None` for a deterministic value.
    pub fn realizations(&self) -> Option<&[f64]> {
        match &self.values {
            Values::Deterministic(_) => None,
            Values::Stochastic(r) => Some(r),
        }
    }

    /// Materialize a deterministic value into a stochastic one of `size`
    /// paths. Stochastic values are returned unchanged (their own size wins).
    pub fn expand(&self, size: usize) -> Self {
        match &self.values {
            Values::Deterministic(v) => Self::filled(self.time, size, *v),
            Values::Stochastic(_) => self.clone(),
        }
    }

    // ── elementwise combinators ──────────────────────────────────────────────

    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        let values = match &self.values {
            Values::Deterministic(v) => Values::Deterministic(f(*v)),
            Values::Stochastic(r) => Values::Stochastic(r.iter().map(|x| f(*x)).collect()),
        };
        Self {
            time: self.time,
            values,
        }
    }

    /// Common path count of stochastic operands.
    ///
    /// # Panics
    ///
    /// Panics if two stochastic operands disagree on length.
    fn common_size(operands: &[&Self]) -> usize {
        let mut size: Option<usize> = None;
        for op in operands {
            if let Values::Stochastic(r) = &op.values {
                match size {
                    None => size = Some(r.len()),
                    Some(s) if s != r.len() => panic!(
                        "stochastic operands must have equal length (got {} and {})",
                        s,
                        r.len()
                    ),
                    _ => {}
                }
            }
        }
        size.unwrap_or(1)
    }

    fn zip(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let time = self.time.max(other.time);
        if let (Values::Deterministic(x), Values::Deterministic(y)) = (&self.values, &other.values)
        {
            return Self::deterministic(time, f(*x, *y));
        }
        let size = Self::common_size(&[self, other]);
        let realizations = (0..size).map(|i| f(self.get(i), other.get(i))).collect();
        Self::stochastic(time, realizations)
    }

    fn zip3(&self, a: &Self, b: &Self, f: impl Fn(f64, f64, f64) -> f64) -> Self {
        let time = self.time.max(a.time).max(b.time);
        if let (Values::Deterministic(x), Values::Deterministic(y), Values::Deterministic(z)) =
            (&self.values, &a.values, &b.values)
        {
            return Self::deterministic(time, f(*x, *y, *z));
        }
        let size = Self::common_size(&[self, a, b]);
        let realizations = (0..size)
            .map(|i| f(self.get(i), a.get(i), b.get(i)))
            .collect();
        Self::stochastic(time, realizations)
    }

    // ── unary operations ─────────────────────────────────────────────────────

    pub fn exp(&self) -> Self {
        self.map(f64::exp)
    }

    pub fn log(&self) -> Self {
        self.map(f64::ln)
    }

    pub fn sqrt(&self) -> Self {
        self.map(f64::sqrt)
    }

    pub fn sin(&self) -> Self {
        self.map(f64::sin)
    }

    pub fn cos(&self) -> Self {
        self.map(f64::cos)
    }

    pub fn squared(&self) -> Self {
        self.map(|x| x * x)
    }

    pub fn abs(&self) -> Self {
        self.map(f64::abs)
    }

    /// Elementwise reciprocal `1/x`.
    pub fn invert(&self) -> Self {
        self.map(|x| 1.0 / x)
    }

    /// Elementwise lower bound: `max(x, floor)`.
    pub fn floor_at(&self, floor: f64) -> Self {
        self.map(|x| x.max(floor))
    }

    /// Elementwise upper bound: `min(x, cap)`.
    pub fn cap_at(&self, cap: f64) -> Self {
        self.map(|x| x.min(cap))
    }

    pub fn pow(&self, exponent: f64) -> Self {
        self.map(|x| x.powf(exponent))
    }

    pub fn add_scalar(&self, value: f64) -> Self {
        self.map(|x| x + value)
    }

    pub fn sub_scalar(&self, value: f64) -> Self {
        self.map(|x| x - value)
    }

    pub fn mult_scalar(&self, value: f64) -> Self {
        self.map(|x| x * value)
    }

    pub fn div_scalar(&self, value: f64) -> Self {
        self.map(|x| x / value)
    }

    // ── binary operations ────────────────────────────────────────────────────

    pub fn add(&self, other: &Self) -> Self {
        self.zip(other, |x, y| x + y)
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.zip(other, |x, y| x - y)
    }

    pub fn mult(&self, other: &Self) -> Self {
        self.zip(other, |x, y| x * y)
    }

    pub fn div(&self, other: &Self) -> Self {
        self.zip(other, |x, y| x / y)
    }

    /// Elementwise minimum of two random variables.
    pub fn minimum(&self, other: &Self) -> Self {
        self.zip(other, f64::min)
    }

    /// Elementwise maximum of two random variables.
    pub fn maximum(&self, other: &Self) -> Self {
        self.zip(other, f64::max)
    }

    // ── fused operations ─────────────────────────────────────────────────────
    //
    // These show up on every step of an Euler scheme and every Jacobian
    // column; fusing them avoids one intermediate allocation each.

    /// Accrual over a period: `x * (1 + rate * dt)`.
    pub fn accrue(&self, rate: &Self, dt: f64) -> Self {
        self.zip(rate, |x, r| x * (1.0 + r * dt))
    }

    /// Discounting over a period: `x / (1 + rate * dt)`.
    pub fn discount(&self, rate: &Self, dt: f64) -> Self {
        self.zip(rate, |x, r| x / (1.0 + r * dt))
    }

    /// `x + a * b`.
    pub fn add_product(&self, a: &Self, b: &Self) -> Self {
        self.zip3(a, b, |x, a, b| x + a * b)
    }

    /// `x + a / b`.
    pub fn add_ratio(&self, a: &Self, b: &Self) -> Self {
        self.zip3(a, b, |x, a, b| x + a / b)
    }

    /// `x - a / b`.
    pub fn sub_ratio(&self, a: &Self, b: &Self) -> Self {
        self.zip3(a, b, |x, a, b| x - a / b)
    }

    /// Pathwise selection with `self` as the trigger: the value of
    /// `if_nonnegative` on paths where the trigger is `>= 0`, the value of
    /// `otherwise` on the remaining paths.
    pub fn barrier(&self, if_nonnegative: &Self, otherwise: &Self) -> Self {
        self.zip3(
            if_nonnegative,
            otherwise,
            |t, a, b| if t >= 0.0 { a } else { b },
        )
    }

    // ── statistics ───────────────────────────────────────────────────────────

    pub fn min(&self) -> f64 {
        match &self.values {
            Values::Deterministic(v) => *v,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => r.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    pub fn max(&self) -> f64 {
        match &self.values {
            Values::Deterministic(v) => *v,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => r.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    pub fn sum(&self) -> f64 {
        match &self.values {
            Values::Deterministic(v) => *v,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => r.iter().sum(),
        }
    }

    /// Pathwise mean. For a deterministic value this is the value itself.
    pub fn average(&self) -> f64 {
        match &self.values {
            Values::Deterministic(v) => *v,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => r.iter().sum::<f64>() / r.len() as f64,
        }
    }

    /// Population variance over paths (zero for deterministic values).
    pub fn variance(&self) -> f64 {
        match &self.values {
            Values::Deterministic(_) => 0.0,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => {
                let mean = self.average();
                r.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / r.len() as f64
            }
        }
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Monte-Carlo standard error of the mean: `stddev / sqrt(n)`.
    pub fn standard_error(&self) -> f64 {
        match &self.values {
            Values::Deterministic(_) => 0.0,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => self.standard_deviation() / (r.len() as f64).sqrt(),
        }
    }

    fn sorted_realizations(&self) -> Vec<f64> {
        let mut sorted = match &self.values {
            Values::Deterministic(v) => vec![*v],
            Values::Stochastic(r) => r.clone(),
        };
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }

    fn quantile_index(quantile: f64, size: usize) -> usize {
        let index = ((size as f64 + 1.0) * (1.0 - quantile) - 1.0).round();
        (index.max(0.0) as usize).min(size - 1)
    }

    /// The realization at the quantile level `q`, read off the sorted
    /// realization vector at index `round((n+1)(1-q) - 1)`, clamped to the
    /// valid range. Deterministic values return the scalar.
    pub fn quantile(&self, q: f64) -> f64 {
        match &self.values {
            Values::Deterministic(v) => *v,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => {
                let sorted = self.sorted_realizations();
                sorted[Self::quantile_index(q, r.len())]
            }
        }
    }

    /// Average of the sorted realizations between the quantile levels `q1`
    /// and `q2` (inclusive index range; arguments are normalized so that
    /// `q1 <= q2`).
    pub fn quantile_expectation(&self, q1: f64, q2: f64) -> f64 {
        let (q_lo, q_hi) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
        match &self.values {
            Values::Deterministic(v) => *v,
            Values::Stochastic(r) if r.is_empty() => f64::NAN,
            Values::Stochastic(r) => {
                let sorted = self.sorted_realizations();
                // (n+1)(1-q) is decreasing in q, so the higher quantile maps
                // to the lower index.
                let index_hi = Self::quantile_index(q_lo, r.len());
                let index_lo = Self::quantile_index(q_hi, r.len());
                let slice = &sorted[index_lo..=index_hi];
                slice.iter().sum::<f64>() / slice.len() as f64
            }
        }
    }

    /// Density histogram over `k` increasing breakpoints, producing `k + 1`
    /// bins: bin `i < k` counts realizations in `(b[i-1], b[i]]` (with
    /// `b[-1] = -inf`), the last bin counts everything above `b[k-1]`.
    /// Counts are normalized by the number of paths.
    pub fn histogram(&self, breakpoints: &[f64]) -> Vec<f64> {
        let k = breakpoints.len();
        let size = self.size();
        if matches!(&self.values, Values::Stochastic(r) if r.is_empty()) {
            return vec![f64::NAN; k + 1];
        }
        let mut counts = vec![0usize; k + 1];
        for i in 0..size {
            let x = self.get(i);
            let bin = breakpoints.partition_point(|&b| b < x);
            counts[bin] += 1;
        }
        counts
            .into_iter()
            .map(|c| c as f64 / size as f64)
            .collect()
    }

    /// Histogram with `intervals` breakpoints evenly spaced on
    /// `[mean - k_sigma * stddev, mean + k_sigma * stddev]`. Returns
    /// `(anchor_points, densities)`: interior anchors are bin midpoints, the
    /// two open tail bins anchor at the outermost breakpoints.
    pub fn centered_histogram(&self, intervals: usize, k_sigma: f64) -> (Vec<f64>, Vec<f64>) {
        assert!(intervals >= 1, "histogram needs at least one interval");
        let mean = self.average();
        let radius = k_sigma * self.standard_deviation();
        let step = if intervals > 1 {
            2.0 * radius / (intervals - 1) as f64
        } else {
            0.0
        };
        let breakpoints: Vec<f64> = (0..intervals)
            .map(|i| mean - radius + i as f64 * step)
            .collect();

        let mut anchors = Vec::with_capacity(intervals + 1);
        anchors.push(breakpoints[0]);
        for window in breakpoints.windows(2) {
            anchors.push(0.5 * (window[0] + window[1]));
        }
        anchors.push(breakpoints[intervals - 1]);

        let densities = self.histogram(&breakpoints);
        (anchors, densities)
    }
}

// Operator sugar for user-written products; all delegate to the named methods.

impl Add for &RandomVariable {
    type Output = RandomVariable;

    fn add(self, rhs: Self) -> RandomVariable {
        RandomVariable::add(self, rhs)
    }
}

impl Sub for &RandomVariable {
    type Output = RandomVariable;

    fn sub(self, rhs: Self) -> RandomVariable {
        RandomVariable::sub(self, rhs)
    }
}

impl Mul for &RandomVariable {
    type Output = RandomVariable;

    fn mul(self, rhs: Self) -> RandomVariable {
        self.mult(rhs)
    }
}

impl Div for &RandomVariable {
    type Output = RandomVariable;

    fn div(self, rhs: Self) -> RandomVariable {
        RandomVariable::div(self, rhs)
    }
}

impl Add<f64> for &RandomVariable {
    type Output = RandomVariable;

    fn add(self, rhs: f64) -> RandomVariable {
        self.add_scalar(rhs)
    }
}

impl Sub<f64> for &RandomVariable {
    type Output = RandomVariable;

    fn sub(self, rhs: f64) -> RandomVariable {
        self.sub_scalar(rhs)
    }
}

impl Mul<f64> for &RandomVariable {
    type Output = RandomVariable;

    fn mul(self, rhs: f64) -> RandomVariable {
        self.mult_scalar(rhs)
    }
}

impl Div<f64> for &RandomVariable {
    type Output = RandomVariable;

    fn div(self, rhs: f64) -> RandomVariable {
        self.div_scalar(rhs)
    }
}
