//! Exact (Clopper-Pearson) confidence intervals for binomial proportions.
//!
//! The interval is found by inverting the binomial tail directly rather than
//! going through a packaged incomplete-beta quantile:
//!
//! - the lower bound is the p at which `P(X ≥ k | n, p) = α/2`,
//! - the upper bound is the p at which `P(X ≤ k | n, p) = α/2`,
//!
//! each located by bisection. Both tails are monotone in p, so bisection always
//! brackets the root. Results are accurate to [`BISECTION_TOLERANCE`].
//!
//! References: C. J. Clopper and E. S. Pearson, "The use of confidence or
//! fiducial limits illustrated in the case of the binomial", Biometrika 26
//! (1934).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default two-sided significance level (95% interval).
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Width of the bisection bracket at which the search stops.
pub const BISECTION_TOLERANCE: f64 = 1e-5;

const RESCALE_LIMIT: f64 = 1e30;

/// A closed interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
}

impl Interval {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    /// The same interval with both ends multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.low * factor, self.high * factor)
    }
}

/// Errors returned by the interval solver.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum IntervalError {
    #[error("invalid proportion {numerator}/{denominator}")]
    InvalidProportion { numerator: u64, denominator: u64 },

    #[error("significance level {0} is outside (0, 1)")]
    InvalidAlpha(f64),
}

/// P(x1 ≤ X ≤ x2) for X ~ Binomial(n, p).
///
/// Walks the probability mass function with the ratio recurrence
/// `w(k+1) = w(k) · p/(1−p) · (n−k)/(k+1)` starting from `w(0) = 1`, keeping
/// the unnormalized total and the in-range sum side by side. When the total
/// passes 1e30 every accumulator is divided by 1e30, so the ratio stays exact
/// while the magnitudes stay finite.
pub fn tail_probability(n: u64, p: f64, x1: u64, x2: u64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    if x1 > x2 || x1 > n {
        return 0.0;
    }
    if p <= 0.0 {
        return if x1 == 0 { 1.0 } else { 0.0 };
    }
    if p >= 1.0 {
        return if x2 >= n { 1.0 } else { 0.0 };
    }

    let odds = p / (1.0 - p);
    let n_f = n as f64;
    let mut weight = 1.0;
    let mut in_range = 0.0;
    let mut total = 0.0;
    let mut k: u64 = 0;

    while k <= n {
        total += weight;
        if k >= x1 && k <= x2 {
            in_range += weight;
        }
        if total > RESCALE_LIMIT {
            in_range /= RESCALE_LIMIT;
            total /= RESCALE_LIMIT;
            weight /= RESCALE_LIMIT;
        }
        k += 1;
        let k_f = k as f64;
        weight *= odds * (n_f + 1.0 - k_f) / k_f;
    }

    in_range / total
}

/// Clopper-Pearson interval for `numerator / denominator` at level `1 − alpha`.
///
/// A zero numerator pins the lower bound to exactly 0 and a numerator equal to
/// the denominator pins the upper bound to exactly 1. A zero denominator is
/// rejected: the proportion itself is undefined.
pub fn clopper_pearson(
    numerator: u64,
    denominator: u64,
    alpha: f64,
) -> Result<Interval, IntervalError> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(IntervalError::InvalidAlpha(alpha));
    }
    if denominator == 0 || numerator > denominator {
        return Err(IntervalError::InvalidProportion {
            numerator,
            denominator,
        });
    }

    let target = alpha / 2.0;
    let ratio = numerator as f64 / denominator as f64;

    let low = if numerator == 0 {
        0.0
    } else {
        // P(X ≥ k) grows with p: too much mass above k means p is too high.
        bisect(0.0, ratio, |p| {
            tail_probability(denominator, p, numerator, denominator) > target
        })
    };

    let high = if numerator == denominator {
        1.0
    } else {
        // P(X ≤ k) shrinks with p: too little mass at or below k means p is too high.
        bisect(ratio, 1.0, |p| tail_probability(denominator, p, 0, numerator) < target)
    };

    Ok(Interval::new(low, high))
}

/// Bisection over `[low, high]`; `too_high(p)` reports that the root lies
/// below `p`. Returns the last midpoint probed.
fn bisect(mut low: f64, mut high: f64, too_high: impl Fn(f64) -> bool) -> f64 {
    let mut mid = 0.5 * (low + high);
    while high - low > BISECTION_TOLERANCE {
        if too_high(mid) {
            high = mid;
        } else {
            low = mid;
        }
        mid = 0.5 * (low + high);
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        !a.is_nan() && !b.is_nan() && (a - b).abs() <= tol
    }

    #[test]
    fn tail_matches_direct_pmf_sum() {
        // Binomial(4, 0.5): pmf = [1, 4, 6, 4, 1] / 16
        assert!(close(tail_probability(4, 0.5, 0, 4), 1.0, 1e-15));
        assert!(close(tail_probability(4, 0.5, 2, 2), 6.0 / 16.0, 1e-15));
        assert!(close(tail_probability(4, 0.5, 3, 4), 5.0 / 16.0, 1e-15));
        // Binomial(3, 0.2): P(X = 0) = 0.512
        assert!(close(tail_probability(3, 0.2, 0, 0), 0.512, 1e-12));
    }

    #[test]
    fn tail_survives_rescaling() {
        // Large n with p near 1 forces the accumulator past 1e30.
        let total = tail_probability(2_000, 0.97, 0, 2_000);
        assert!(close(total, 1.0, 1e-12));
        let upper = tail_probability(2_000, 0.97, 1_900, 2_000);
        assert!(upper > 0.99 && upper <= 1.0);
    }

    #[test]
    fn tail_point_masses_at_extremes() {
        assert_eq!(tail_probability(10, 0.0, 0, 3), 1.0);
        assert_eq!(tail_probability(10, 0.0, 1, 3), 0.0);
        assert_eq!(tail_probability(10, 1.0, 7, 10), 1.0);
        assert_eq!(tail_probability(10, 1.0, 0, 9), 0.0);
    }

    #[test]
    fn five_of_twenty_reference() {
        let ci = clopper_pearson(5, 20, DEFAULT_ALPHA).unwrap();
        assert!(close(ci.low, 0.086_57, 1e-4), "low = {}", ci.low);
        assert!(close(ci.high, 0.491_04, 1e-4), "high = {}", ci.high);
    }

    #[test]
    fn half_of_hundred_is_symmetric() {
        let ci = clopper_pearson(50, 100, DEFAULT_ALPHA).unwrap();
        assert!(close(ci.low, 0.398_32, 1e-4));
        assert!(close(ci.low + ci.high, 1.0, 2.0 * BISECTION_TOLERANCE));
    }

    #[test]
    fn zero_numerator_pins_lower_bound() {
        let ci = clopper_pearson(0, 10, DEFAULT_ALPHA).unwrap();
        assert_eq!(ci.low, 0.0);
        // 1 - 0.025^(1/10)
        assert!(close(ci.high, 0.308_50, 1e-4));
    }

    #[test]
    fn full_numerator_pins_upper_bound() {
        let ci = clopper_pearson(10, 10, DEFAULT_ALPHA).unwrap();
        assert_eq!(ci.high, 1.0);
        assert!(close(ci.low, 0.691_50, 1e-4));
    }

    #[test]
    fn single_trial_bounds() {
        let success = clopper_pearson(1, 1, DEFAULT_ALPHA).unwrap();
        assert!(close(success.low, 0.025, 1e-4));
        assert_eq!(success.high, 1.0);

        let failure = clopper_pearson(0, 1, DEFAULT_ALPHA).unwrap();
        assert_eq!(failure.low, 0.0);
        assert!(close(failure.high, 0.975, 1e-4));
    }

    #[test]
    fn wider_level_gives_wider_interval() {
        let ci95 = clopper_pearson(7, 30, 0.05).unwrap();
        let ci99 = clopper_pearson(7, 30, 0.01).unwrap();
        assert!(ci99.low < ci95.low);
        assert!(ci99.high > ci95.high);
    }

    #[test]
    fn rejects_malformed_proportions() {
        assert_eq!(
            clopper_pearson(3, 2, DEFAULT_ALPHA),
            Err(IntervalError::InvalidProportion {
                numerator: 3,
                denominator: 2
            })
        );
        assert_eq!(
            clopper_pearson(0, 0, DEFAULT_ALPHA),
            Err(IntervalError::InvalidProportion {
                numerator: 0,
                denominator: 0
            })
        );
    }

    #[test]
    fn rejects_alpha_outside_unit_interval() {
        assert_eq!(
            clopper_pearson(1, 2, 0.0),
            Err(IntervalError::InvalidAlpha(0.0))
        );
        assert!(clopper_pearson(1, 2, 1.5).is_err());
        assert!(clopper_pearson(1, 2, f64::NAN).is_err());
    }

    #[test]
    fn interval_helpers() {
        let ci = Interval::new(0.2, 0.6);
        assert!(close(ci.width(), 0.4, 1e-15));
        assert!(ci.contains(0.2) && ci.contains(0.6) && !ci.contains(0.61));
        assert_eq!(ci.scaled(100.0), Interval::new(20.0, 60.0));
    }
}
