//! Property-based tests for the binomial interval solver and distribution
//! kernels.

use proptest::prelude::*;
use sepsis_math::{
    beta_cdf, clopper_pearson, normal_cdf, normal_quantile, tail_probability,
    BISECTION_TOLERANCE, DEFAULT_ALPHA,
};

/// Generates `(numerator, denominator)` with `0 ≤ numerator ≤ denominator`.
fn proportion() -> impl Strategy<Value = (u64, u64)> {
    (1u64..400).prop_flat_map(|n| (0..=n, Just(n)))
}

// ============================================================================
// Clopper-Pearson interval
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The point estimate always lies inside its own interval.
    #[test]
    fn interval_contains_ratio((k, n) in proportion()) {
        let ci = clopper_pearson(k, n, DEFAULT_ALPHA).unwrap();
        let ratio = k as f64 / n as f64;
        prop_assert!(ci.low <= ratio && ratio <= ci.high,
            "{}/{}: [{}, {}] misses {}", k, n, ci.low, ci.high, ratio);
    }

    /// Both bounds are probabilities.
    #[test]
    fn interval_bounds_in_unit_range((k, n) in proportion()) {
        let ci = clopper_pearson(k, n, DEFAULT_ALPHA).unwrap();
        prop_assert!((0.0..=1.0).contains(&ci.low));
        prop_assert!((0.0..=1.0).contains(&ci.high));
    }

    /// Zero successes pin the lower bound; all successes pin the upper bound.
    #[test]
    fn degenerate_counts_pin_bounds(n in 1u64..500) {
        prop_assert_eq!(clopper_pearson(0, n, DEFAULT_ALPHA).unwrap().low, 0.0);
        prop_assert_eq!(clopper_pearson(n, n, DEFAULT_ALPHA).unwrap().high, 1.0);
    }

    /// Complementary counts give mirrored intervals.
    #[test]
    fn interval_mirrors_under_complement((k, n) in proportion()) {
        let ci = clopper_pearson(k, n, DEFAULT_ALPHA).unwrap();
        let mirrored = clopper_pearson(n - k, n, DEFAULT_ALPHA).unwrap();
        prop_assert!((ci.low - (1.0 - mirrored.high)).abs() <= 2.0 * BISECTION_TOLERANCE);
        prop_assert!((ci.high - (1.0 - mirrored.low)).abs() <= 2.0 * BISECTION_TOLERANCE);
    }

    /// The bounds agree with the beta-quantile form of the interval:
    /// I_low(k, n-k+1) = α/2 and I_high(k+1, n-k) = 1 - α/2.
    #[test]
    fn interval_matches_beta_characterisation((k, n) in (2u64..120).prop_flat_map(|n| (1..n, Just(n)))) {
        let ci = clopper_pearson(k, n, DEFAULT_ALPHA).unwrap();
        let kf = k as f64;
        let nf = n as f64;
        let at_low = beta_cdf(ci.low, kf, nf - kf + 1.0);
        let at_high = beta_cdf(ci.high, kf + 1.0, nf - kf);
        prop_assert!((at_low - 0.025).abs() < 2e-3, "I(low) = {}", at_low);
        prop_assert!((at_high - 0.975).abs() < 2e-3, "I(high) = {}", at_high);
    }
}

// ============================================================================
// Binomial tail probability
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A split point partitions the support: P(X ≤ k) + P(X > k) = 1.
    #[test]
    fn tails_partition_the_support((k, n) in proportion(), p in 0.01..0.99f64) {
        let left = tail_probability(n, p, 0, k);
        let right = if k < n { tail_probability(n, p, k + 1, n) } else { 0.0 };
        prop_assert!((left + right - 1.0).abs() < 1e-9, "{} + {}", left, right);
    }

    /// The upper tail P(X ≥ k) never decreases as p grows.
    #[test]
    fn upper_tail_monotone_in_p((k, n) in proportion(), p in 0.01..0.98f64, dp in 0.001..0.01f64) {
        let lo = tail_probability(n, p, k, n);
        let hi = tail_probability(n, (p + dp).min(0.999), k, n);
        prop_assert!(hi + 1e-12 >= lo, "P(X>={}) fell from {} to {}", k, lo, hi);
    }
}

// ============================================================================
// Normal distribution
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn normal_quantile_round_trips(p in 0.0005..0.9995f64) {
        let z = normal_quantile(p);
        prop_assert!((normal_cdf(z) - p).abs() < 1e-8);
    }

    #[test]
    fn normal_cdf_is_symmetric(z in -8.0..8.0f64) {
        prop_assert!((normal_cdf(z) + normal_cdf(-z) - 1.0).abs() < 1e-12);
    }
}
