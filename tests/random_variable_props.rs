//! Property-based checks of the path-vector algebra invariants.

use curvefit_lib::RandomVariable;
use proptest::prelude::*;

fn realizations() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1e6f64..1e6, 1..64)
}

fn nonzero_realizations() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop_oneof![0.1f64..1e6, -1e6f64..-0.1], 1..64)
}

proptest! {
    #[test]
    fn prop_filtration_time_is_max_of_operands(
        t1 in 0.0f64..30.0,
        t2 in 0.0f64..30.0,
        values in realizations(),
    ) {
        let a = RandomVariable::deterministic(t1, 1.5);
        let b = RandomVariable::stochastic(t2, values);
        prop_assert_eq!(a.add(&b).filtration_time(), t1.max(t2));
        prop_assert_eq!(b.mult(&a).filtration_time(), t1.max(t2));
        prop_assert_eq!(a.maximum(&b).filtration_time(), t1.max(t2));
    }

    #[test]
    fn prop_deterministic_identity(c in -1e6f64..1e6, d in -1e6f64..1e6) {
        // Scalar arithmetic through the algebra equals plain f64 arithmetic.
        let x = RandomVariable::constant(c);
        let y = RandomVariable::constant(d);
        prop_assert!(x.add(&y).is_deterministic());
        prop_assert_eq!(x.add(&y).average(), c + d);
        prop_assert_eq!(x.sub(&y).average(), c - d);
        prop_assert_eq!(x.mult(&y).average(), c * d);
    }

    #[test]
    fn prop_sub_self_is_zero(values in realizations()) {
        let a = RandomVariable::stochastic(1.0, values);
        let zero = a.sub(&a);
        for i in 0..zero.size() {
            prop_assert_eq!(zero.get(i), 0.0);
        }
    }

    #[test]
    fn prop_div_self_is_one(values in nonzero_realizations()) {
        let a = RandomVariable::stochastic(1.0, values);
        let one = a.div(&a);
        for i in 0..one.size() {
            prop_assert_eq!(one.get(i), 1.0);
        }
    }

    #[test]
    fn prop_expand_preserves_mean(value in -1e6f64..1e6, size in 1usize..256) {
        let expanded = RandomVariable::constant(value).expand(size);
        prop_assert_eq!(expanded.size(), size);
        let mean = expanded.average();
        prop_assert!((mean - value).abs() <= 1e-9 * value.abs().max(1.0));
    }

    #[test]
    fn prop_quantile_monotone_non_increasing(
        values in realizations(),
        q1 in 0.0f64..=1.0,
        q2 in 0.0f64..=1.0,
    ) {
        let rv = RandomVariable::stochastic(0.0, values);
        let (lo, hi) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
        prop_assert!(rv.quantile(lo) >= rv.quantile(hi));
    }

    #[test]
    fn prop_mean_bounded_by_min_and_max(values in realizations()) {
        let rv = RandomVariable::stochastic(0.0, values);
        prop_assert!(rv.min() <= rv.average() + 1e-9);
        prop_assert!(rv.average() <= rv.max() + 1e-9);
    }

    #[test]
    fn prop_histogram_is_a_density(values in realizations()) {
        let rv = RandomVariable::stochastic(0.0, values);
        let densities = rv.histogram(&[-1e5, 0.0, 1e5]);
        let total: f64 = densities.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
    }
}
