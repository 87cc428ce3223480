//! Agreement between two scores: Cronbach's alpha with a percentile
//! bootstrap interval.

use rand::Rng;
use sepsis_math::Interval;
use serde::{Deserialize, Serialize};

/// Resamples used when nothing else is configured.
pub const DEFAULT_ITERATIONS: usize = 2000;

/// Percentiles of the bootstrap distribution reported as the interval.
pub const DEFAULT_PERCENTILES: [f64; 2] = [5.0, 95.0];

/// Cronbach's alpha with its bootstrap interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgreementEstimate {
    pub alpha: f64,
    /// `None` when no resample produced a finite alpha.
    pub interval: Option<Interval>,
    /// Resamples that produced a finite alpha.
    pub replicates: usize,
}

fn variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (n, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if n < 2 {
        return f64::NAN;
    }
    let mean = sum / n as f64;
    values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64
}

/// Cronbach's alpha of K components observed on the same subjects
/// (`items[k][i]` is component k for subject i), sample variances throughout.
///
/// NaN when the total score has zero variance or there are fewer than two
/// components or subjects.
pub fn cronbach_alpha(items: &[&[f64]]) -> f64 {
    let k = items.len();
    if k < 2 {
        return f64::NAN;
    }
    let n = items[0].len();
    let item_variance: f64 = items.iter().map(|x| variance(x.iter().copied())).sum();
    let total_variance = variance((0..n).map(|i| items.iter().map(|x| x[i]).sum::<f64>()));
    let alpha = k as f64 / (k as f64 - 1.0) * (1.0 - item_variance / total_variance);
    if alpha.is_finite() {
        alpha
    } else {
        f64::NAN
    }
}

/// Percentile with linear interpolation between order statistics
/// (position `q / 100 * (n - 1)` of the sorted values).
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Alpha between `a` and `b` plus a percentile bootstrap over subjects.
///
/// Subjects where either score is non-finite are dropped first. Resamples
/// whose alpha is undefined are left out of the percentile computation.
pub fn bootstrap_alpha<R: Rng>(
    a: &[f64],
    b: &[f64],
    iterations: usize,
    percentiles: [f64; 2],
    rng: &mut R,
) -> AgreementEstimate {
    let (xa, xb): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .unzip();
    let n = xa.len();
    let alpha = cronbach_alpha(&[xa.as_slice(), xb.as_slice()]);

    let mut replicates = Vec::with_capacity(iterations);
    if n > 0 {
        let mut ra = vec![0.0; n];
        let mut rb = vec![0.0; n];
        for _ in 0..iterations {
            for (slot_a, slot_b) in ra.iter_mut().zip(rb.iter_mut()) {
                let idx = rng.random_range(0..n);
                *slot_a = xa[idx];
                *slot_b = xb[idx];
            }
            let value = cronbach_alpha(&[ra.as_slice(), rb.as_slice()]);
            if value.is_finite() {
                replicates.push(value);
            }
        }
    }
    replicates.sort_by(f64::total_cmp);

    let interval = (!replicates.is_empty()).then(|| {
        Interval::new(
            percentile(&replicates, percentiles[0]),
            percentile(&replicates, percentiles[1]),
        )
    });

    AgreementEstimate {
        alpha,
        interval,
        replicates: replicates.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn identical_components_agree_perfectly() {
        let x = [1.0, 4.0, 2.0, 8.0, 5.0];
        assert_eq!(cronbach_alpha(&[&x[..], &x[..]]), 1.0);
    }

    #[test]
    fn reference_value() {
        // var(a) = 2.5, var(b) = 0.7, var(a + b) = 5.2
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 1.0, 2.0, 3.0, 3.0];
        let expected = 2.0 * (1.0 - 3.2 / 5.2);
        assert!((cronbach_alpha(&[&a[..], &b[..]]) - expected).abs() < 1e-12);
    }

    #[test]
    fn constant_total_is_undefined() {
        let a = [1.0, 2.0, 3.0];
        let b = [3.0, 2.0, 1.0];
        assert!(cronbach_alpha(&[&a[..], &b[..]]).is_nan());
        assert!(cronbach_alpha(&[&a[..]]).is_nan());
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert_eq!(percentile(&sorted, 100.0), 5.0);
        assert!((percentile(&sorted, 5.0) - 1.2).abs() < 1e-12);
        assert!(percentile(&[], 50.0).is_nan());
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn bootstrap_of_identical_scores_has_zero_width() {
        let x = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let mut rng = StdRng::seed_from_u64(17);
        let est = bootstrap_alpha(&x, &x, 200, DEFAULT_PERCENTILES, &mut rng);
        assert_eq!(est.alpha, 1.0);
        let ci = est.interval.unwrap();
        assert_eq!((ci.low, ci.high), (1.0, 1.0));
        assert!(est.replicates > 0 && est.replicates <= 200);
    }

    #[test]
    fn seeded_bootstrap_is_reproducible() {
        let a: Vec<f64> = (0..60).map(|i| (i % 11) as f64).collect();
        let b: Vec<f64> = (0..60).map(|i| ((i * 7) % 13) as f64 + (i % 11) as f64).collect();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            bootstrap_alpha(&a, &b, 300, DEFAULT_PERCENTILES, &mut rng)
        };
        assert_eq!(run(5), run(5));
        let est = run(5);
        let ci = est.interval.unwrap();
        assert!(ci.low <= ci.high);
        assert_eq!(est.replicates, 300);
    }

    #[test]
    fn non_finite_subjects_are_dropped() {
        let a = [1.0, f64::NAN, 3.0, 4.0];
        let b = [1.0, 2.0, 3.0, 4.0];
        let mut rng = StdRng::seed_from_u64(1);
        let est = bootstrap_alpha(&a, &b, 50, DEFAULT_PERCENTILES, &mut rng);
        assert_eq!(est.alpha, 1.0);
    }

    #[test]
    fn empty_input_has_no_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        let est = bootstrap_alpha(&[], &[], 50, DEFAULT_PERCENTILES, &mut rng);
        assert!(est.alpha.is_nan());
        assert!(est.interval.is_none());
        assert_eq!(est.replicates, 0);
    }
}
