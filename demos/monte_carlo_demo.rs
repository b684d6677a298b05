// Calibrates a Black-Scholes Monte-Carlo model to an option quote, then
// inspects the payoff distribution through the path-vector algebra.
//
// Run with:
//     cargo run --example monte_carlo_demo

use curvefit_lib::models::monte_carlo::{
    BlackScholesSimulation, EuropeanCall, LognormalVolatility,
};
use curvefit_lib::models::utils::black_call_price;
use curvefit_lib::{calibrate, OptimizerConfig, ParameterObject, Product};
use std::error::Error;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let grid: Vec<f64> = (0..=10).map(|i| i as f64 * 0.1).collect();
    let volatility = LognormalVolatility::new("vol", 0.35)?;
    let simulation = Arc::new(BlackScholesSimulation::new(
        100.0, 0.05, volatility.clone(), grid, 10000, 20260801,
    )?);

    // Market quote: a one-year at-the-money call at 20% implied volatility.
    let market_price = black_call_price(100.0, 100.0, 0.05, 1.0, 0.2);
    println!("Market call price: {:.4}", market_price);

    let call = Arc::new(EuropeanCall {
        maturity: 1.0,
        strike: 100.0,
    });
    let products: Vec<Arc<dyn Product>> = vec![call.clone()];

    let (calibrated, iterations) = calibrate(
        simulation,
        products,
        vec![market_price],
        None,
        vec![Arc::new(volatility) as Arc<dyn ParameterObject>],
        OptimizerConfig::monte_carlo(),
    )?;

    let model = calibrated
        .as_any()
        .downcast_ref::<BlackScholesSimulation>()
        .expect("simulation");
    println!(
        "Calibrated sigma = {:.4} after {} iterations",
        model.volatility().sigma(),
        iterations
    );
    println!("Model call price: {:.4}", call.value(calibrated.as_ref())?);

    // Distribution of the discounted payoff under the calibrated model.
    let payoff = call.value_at(0.0, model)?;
    println!("Payoff statistics:");
    println!("  mean   = {:.4}", payoff.average());
    println!("  stderr = {:.4}", payoff.standard_error());
    println!("  q(95%) = {:.4}", payoff.quantile(0.95));
    println!("  q( 5%) = {:.4}", payoff.quantile(0.05));

    let (anchors, densities) = payoff.centered_histogram(21, 3.0);
    println!("Payoff histogram:");
    for (anchor, density) in anchors.iter().zip(&densities) {
        let bar = "#".repeat((density * 200.0).round() as usize);
        println!("  {:>8.2} | {}", anchor, bar);
    }
    Ok(())
}
