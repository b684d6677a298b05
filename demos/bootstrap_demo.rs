// Bootstraps a discount curve from zero-coupon bond and par-swap quotes.
//
// Run with:
//     cargo run --example bootstrap_demo

use curvefit_lib::models::curve::{CurveModel, DiscountCurve, ParSwap, ZeroCouponBond};
use curvefit_lib::{calibrate, OptimizerConfig, ParameterObject, Product};
use std::error::Error;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // Initial guess: a flat 2% curve over the quoted pillars.
    let pillars = vec![1.0, 2.0, 5.0, 10.0];
    let guess = DiscountCurve::new("discount", pillars.clone(), vec![0.02; 4])?;
    let model = Arc::new(CurveModel::new(vec![guess.clone()]));

    // Market quotes: two zero-coupon bonds and two par swaps.
    let products: Vec<Arc<dyn Product>> = vec![
        Arc::new(ZeroCouponBond {
            curve: "discount".to_string(),
            maturity: 1.0,
            market_price: 0.9851,
        }),
        Arc::new(ZeroCouponBond {
            curve: "discount".to_string(),
            maturity: 2.0,
            market_price: 0.9589,
        }),
        Arc::new(ParSwap {
            curve: "discount".to_string(),
            payment_times: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            fixed_rate: 0.0282,
        }),
        Arc::new(ParSwap {
            curve: "discount".to_string(),
            payment_times: (1..=10).map(|i| i as f64).collect(),
            fixed_rate: 0.0317,
        }),
    ];
    let targets = vec![0.0; products.len()];

    let (calibrated, iterations) = calibrate(
        model,
        products.clone(),
        targets,
        None,
        vec![Arc::new(guess) as Arc<dyn ParameterObject>],
        OptimizerConfig::curves(),
    )?;

    println!("Converged in {} iterations", iterations);

    let curve_model = calibrated
        .as_any()
        .downcast_ref::<CurveModel>()
        .expect("curve model");
    let curve = curve_model.curve("discount").expect("discount curve");
    println!("Calibrated zero rates:");
    for (&t, rate) in pillars.iter().zip(curve.parameters()) {
        println!("  t = {:>5.1}y  z = {:.4}%", t, rate * 100.0);
    }

    println!("Repriced quotes:");
    for (i, product) in products.iter().enumerate() {
        println!("  product {}: residual = {:+.3e}", i, product.value(calibrated.as_ref())?);
    }
    Ok(())
}
