pub mod curve;
pub mod monte_carlo;

/// Shared analytic pricing helpers.
pub mod utils {
    use statrs::distribution::{Continuous, Normal};

    /// Standard normal CDF: `0.5 * [1 + erf(x / sqrt(2))]`.
    pub fn norm_cdf(x: f64) -> f64 {
        0.5 * (1.0 + libm::erf(x / (2.0_f64).sqrt()))
    }

    /// Black-Scholes price of a European call (no dividends).
    pub fn black_call_price(s: f64, k: f64, r: f64, t: f64, sigma: f64) -> f64 {
        if t <= 0.0 || sigma <= 0.0 {
            return (s - k * (-r * t).exp()).max(0.0);
        }
        let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt());
        let d2 = d1 - sigma * t.sqrt();
        s * norm_cdf(d1) - k * (-r * t).exp() * norm_cdf(d2)
    }

    /// Black-Scholes vega of a European call, the usual weighting for
    /// volatility calibrations.
    pub fn black_call_vega(s: f64, k: f64, r: f64, t: f64, sigma: f64) -> f64 {
        if t <= 0.0 || sigma <= 0.0 {
            return 0.0;
        }
        let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt());
        let standard_normal = Normal::new(0.0, 1.0).unwrap();
        s * standard_normal.pdf(d1) * t.sqrt()
    }

}
