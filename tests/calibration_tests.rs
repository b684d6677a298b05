
use curvefit_lib::models::curve::{CurveModel, DiscountCurve, ZeroCouponBond};
use curvefit_lib::models::monte_carlo::{
    BlackScholesSimulation, EuropeanCall, LognormalVolatility,
};
use curvefit_lib::models::utils::{black_call_price, black_call_vega};
use curvefit_lib::{
    calibrate, CalibratableModel, CalibrationError, CalibrationProcess, OptimizerConfig,
    ParameterAggregation, ParameterMap, ParameterObject, Product,
};
use std::any::Any;
use std::sync::Arc;
use test_utils::{
    create_test_config, initial_guess_model, market_bond_products, true_curve, FrozenObject,
};

/// Calibrating a curve to zero-coupon quotes recovers the quoted curve.
#[test]
fn test_curve_bootstrap_recovers_market_quotes() {
    let (model, curve) = initial_guess_model("discount");
    let products = market_bond_products("discount");
    let targets = vec![0.0; products.len()];

    let (calibrated, iterations) = calibrate(
        model,
        products.clone(),
        targets,
        None,
        vec![curve as Arc<dyn ParameterObject>],
        OptimizerConfig::curves(),
    )
    .expect("bootstrap failed");

    println!("bootstrap converged in {} iterations", iterations);
    assert!(iterations > 0);

    // Repricing the quotes under the calibrated model leaves no mispricing.
    for (i, product) in products.iter().enumerate() {
        let residual = product.value(calibrated.as_ref()).unwrap();
        assert!(
            residual.abs() < 1e-6,
            "product {} reprices with residual {}",
            i,
            residual
        );
    }

    // And the recovered pillar rates match the quoted curve.
    let market = true_curve("discount");
    let calibrated = calibrated
        .as_any()
        .downcast_ref::<CurveModel>()
        .unwrap()
        .curve("discount")
        .unwrap();
    for (got, want) in calibrated.parameters().iter().zip(market.parameters()) {
        assert!((got - want).abs() < 1e-4, "rate {} vs {}", got, want);
    }
}

/// Three pillar rates, two quotes: the damped solve still drives the error
/// to zero even though the system is underdetermined.
#[test]
fn test_underdetermined_curve_calibration() {
    let initial =
        DiscountCurve::new("discount", vec![1.0, 2.0, 3.0], vec![0.02, 0.02, 0.02]).unwrap();
    let model = Arc::new(CurveModel::new(vec![initial.clone()]));

    // Quotes placed so the initial residuals are exactly (0.1, -0.2).
    let products: Vec<Arc<dyn Product>> = vec![
        Arc::new(ZeroCouponBond {
            curve: "discount".to_string(),
            maturity: 1.0,
            market_price: initial.discount_factor(1.0) - 0.1,
        }),
        Arc::new(ZeroCouponBond {
            curve: "discount".to_string(),
            maturity: 2.0,
            market_price: initial.discount_factor(2.0) + 0.2,
        }),
    ];

    let mut process = CalibrationProcess::new(
        model,
        products.clone(),
        vec![0.0, 0.0],
        vec![Arc::new(initial) as Arc<dyn ParameterObject>],
    )
    .with_config(OptimizerConfig {
        max_iterations: 50,
        ..OptimizerConfig::default()
    });

    let calibrated = process.run().expect("underdetermined calibration failed");
    assert!(process.iterations() <= 50);
    assert!(
        process.final_error() < 1e-12,
        "final error = {}",
        process.final_error()
    );
    for product in &products {
        assert!(product.value(calibrated.as_ref()).unwrap().abs() <= 1e-6);
    }
}

// A model with nothing to calibrate, for the zero-width path.
struct FrozenModel;

impl CalibratableModel for FrozenModel {
    fn clone_with_parameters(
        &self,
        parameters: &ParameterMap,
    ) -> Result<Arc<dyn CalibratableModel>, CalibrationError> {
        for (name, slice) in parameters {
            if !slice.is_empty() {
                return Err(CalibrationError::CloneNotSupported(name.clone()));
            }
        }
        Ok(Arc::new(FrozenModel))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ConstantProduct(f64);

impl Product for ConstantProduct {
    fn value(&self, _model: &dyn CalibratableModel) -> anyhow::Result<f64> {
        Ok(self.0)
    }
}

/// All selected objects report zero width: calibration returns immediately.
#[test]
fn test_empty_calibratable_set_returns_immediately() {
    let objects: Vec<Arc<dyn ParameterObject>> = vec![
        Arc::new(FrozenObject {
            name: "frozen-a".to_string(),
        }),
        Arc::new(FrozenObject {
            name: "frozen-b".to_string(),
        }),
    ];
    let aggregation = ParameterAggregation::new(objects.clone()).unwrap();
    assert_eq!(aggregation.parameter().len(), 0);

    let mut process = CalibrationProcess::new(
        Arc::new(FrozenModel),
        vec![Arc::new(ConstantProduct(1.0))],
        vec![0.0],
        objects,
    )
    .with_config(create_test_config());
    process.run().expect("frozen calibration failed");
    assert_eq!(process.iterations(), 0);
}

/// Rebuilding a model from `split(parameter())` reproduces its residuals
/// bit-for-bit.
#[test]
fn test_aggregation_round_trip_preserves_residuals() {
    let (model, curve) = initial_guess_model("discount");
    let products = market_bond_products("discount");

    let aggregation =
        ParameterAggregation::new(vec![curve as Arc<dyn ParameterObject>]).unwrap();
    let map = aggregation.split(&aggregation.parameter()).unwrap();
    let rebuilt = model.clone_with_parameters(&map).unwrap();

    for product in &products {
        let original = product.value(model.as_ref()).unwrap();
        let roundtrip = product.value(rebuilt.as_ref()).unwrap();
        assert_eq!(original, roundtrip);
    }
}

/// Calibrating the Black-Scholes volatility to an analytic option price.
#[test]
fn test_monte_carlo_volatility_calibration() {
    let grid: Vec<f64> = (0..=5).map(|i| i as f64 * 0.2).collect();
    let volatility = LognormalVolatility::new("vol", 0.35).unwrap();
    let simulation = Arc::new(
        BlackScholesSimulation::new(100.0, 0.05, volatility.clone(), grid, 4000, 271828).unwrap(),
    );

    let market_price = black_call_price(100.0, 100.0, 0.05, 1.0, 0.2);
    let products: Vec<Arc<dyn Product>> = vec![Arc::new(EuropeanCall {
        maturity: 1.0,
        strike: 100.0,
    })];
    // Inverse-vega weighting turns the price mismatch into volatility units.
    let vega = black_call_vega(100.0, 100.0, 0.05, 1.0, 0.2);
    let weights = vec![1.0 / (vega * vega)];

    let (calibrated, iterations) = calibrate(
        simulation,
        products,
        vec![market_price],
        Some(weights),
        vec![Arc::new(volatility) as Arc<dyn ParameterObject>],
        OptimizerConfig::monte_carlo(),
    )
    .expect("volatility calibration failed");

    println!("volatility calibrated in {} iterations", iterations);
    let calibrated = calibrated
        .as_any()
        .downcast_ref::<BlackScholesSimulation>()
        .unwrap();
    let sigma = calibrated.volatility().sigma();
    // The fitted volatility matches the quote up to Monte-Carlo bias.
    assert!(
        (sigma - 0.2).abs() < 0.03,
        "calibrated sigma = {}, expected about 0.2",
        sigma
    );
}

struct FailingProduct;

impl Product for FailingProduct {
    fn value(&self, _model: &dyn CalibratableModel) -> anyhow::Result<f64> {
        anyhow::bail!("quote feed unavailable")
    }
}

/// A failing product surfaces as EvaluationFailure with its index.
#[test]
fn test_product_failure_carries_index() {
    let (model, curve) = initial_guess_model("discount");
    let products: Vec<Arc<dyn Product>> = vec![
        Arc::new(ZeroCouponBond {
            curve: "discount".to_string(),
            maturity: 1.0,
            market_price: 0.98,
        }),
        Arc::new(FailingProduct),
    ];

    let mut process = CalibrationProcess::new(
        model,
        products,
        vec![0.0, 0.0],
        vec![curve as Arc<dyn ParameterObject>],
    )
    .with_config(create_test_config());

    match process.run() {
        Err(CalibrationError::EvaluationFailure { index, cause }) => {
            assert_eq!(index, 1);
            assert!(cause.to_string().contains("quote feed"));
        }
        other => panic!("expected EvaluationFailure, got {:?}", other.err()),
    }
}

/// Exhausting the iteration budget reports the best parameters found.
#[test]
fn test_exhausted_run_carries_best_parameters() {
    let (model, curve) = initial_guess_model("discount");
    let products = market_bond_products("discount");
    let targets = vec![0.0; products.len()];

    let mut process = CalibrationProcess::new(
        model,
        products,
        targets,
        vec![curve as Arc<dyn ParameterObject>],
    )
    .with_config(OptimizerConfig {
        max_iterations: 1,
        error_tolerance: 0.0,
        parameter_tolerance: 0.0,
        gradient_tolerance: 0.0,
        ..OptimizerConfig::default()
    });

    match process.run() {
        Err(CalibrationError::NotConverged {
            iterations,
            best_parameters,
            ..
        }) => {
            assert_eq!(iterations, 1);
            assert_eq!(best_parameters.len(), 4);
        }
        other => panic!("expected NotConverged, got {:?}", other.err()),
    }
}

/// Product/target length mismatches are rejected before any evaluation.
#[test]
fn test_product_target_mismatch_is_rejected() {
    let (model, curve) = initial_guess_model("discount");
    let products = market_bond_products("discount");

    let mut process = CalibrationProcess::new(
        model,
        products,
        vec![0.0],
        vec![curve as Arc<dyn ParameterObject>],
    );
    assert!(matches!(
        process.run(),
        Err(CalibrationError::DimensionMismatch(_))
    ));
}

/// A cancelled token aborts the run with the Cancelled state.
#[test]
fn test_cancellation_aborts_run() {
    let (model, curve) = initial_guess_model("discount");
    let products = market_bond_products("discount");
    let targets = vec![0.0; products.len()];

    let mut process = CalibrationProcess::new(
        model,
        products,
        targets,
        vec![curve as Arc<dyn ParameterObject>],
    )
    .with_config(create_test_config());
    process.cancellation_token().cancel();

    assert!(matches!(process.run(), Err(CalibrationError::Cancelled)));
}

/// The iteration observer sees every solver iteration.
#[test]
fn test_observer_reports_progress() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let (model, curve) = initial_guess_model("discount");
    let products = market_bond_products("discount");
    let targets = vec![0.0; products.len()];

    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let mut process = CalibrationProcess::new(
        model,
        products,
        targets,
        vec![curve as Arc<dyn ParameterObject>],
    )
    .with_config(create_test_config())
    .with_observer(Box::new(move |_iteration, _error, _lambda, _parameters| {
        seen.fetch_add(1, Ordering::Relaxed);
    }));

    process.run().expect("calibration failed");
    assert_eq!(count.load(Ordering::Relaxed), process.iterations());
}
