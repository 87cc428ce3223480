//! AUROC estimation and the DeLong paired comparison.
//!
//! The AUROC is the Mann-Whitney statistic computed from mid-ranks, so ties
//! count one half. Its variance comes from the placement values (structural
//! components) of DeLong, DeLong & Clarke-Pearson (1988), computed with the
//! mid-rank shortcut of Sun & Xu (2014):
//!
//! - `v10[i] = (rank of positive i among all − its rank among positives) / n`
//! - `v01[j] = 1 − (rank of negative j among all − its rank among negatives) / m`
//!
//! where m and n are the numbers of positives and negatives.

use sepsis_math::{normal_quantile, normal_two_sided, Interval};
use serde::{Deserialize, Serialize};

/// 1-based mid-ranks: tied values share the mean of their ranks.
pub fn midranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // positions start..=end hold ranks start+1 ..= end+1
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = rank;
        }
        start = end + 1;
    }
    ranks
}

/// Placement values of one score vector.
#[derive(Debug, Clone)]
struct Placements {
    auc: f64,
    v10: Vec<f64>,
    v01: Vec<f64>,
}

impl Placements {
    fn compute(scores: &[f64], labels: &[bool]) -> Self {
        let positives: Vec<f64> = scores
            .iter()
            .zip(labels)
            .filter(|(_, y)| **y)
            .map(|(s, _)| *s)
            .collect();
        let negatives: Vec<f64> = scores
            .iter()
            .zip(labels)
            .filter(|(_, y)| !**y)
            .map(|(s, _)| *s)
            .collect();
        let m = positives.len();
        let n = negatives.len();

        let tx = midranks(&positives);
        let ty = midranks(&negatives);
        let combined: Vec<f64> = positives.iter().chain(&negatives).copied().collect();
        let tz = midranks(&combined);

        let mf = m as f64;
        let nf = n as f64;
        let rank_sum: f64 = tz[..m].iter().sum();
        let auc = (rank_sum - mf * (mf + 1.0) / 2.0) / (mf * nf);

        let v10 = (0..m).map(|i| (tz[i] - tx[i]) / nf).collect();
        let v01 = (0..n).map(|j| 1.0 - (tz[m + j] - ty[j]) / mf).collect();

        Self { auc, v10, v01 }
    }
}

/// AUROC with a normal-approximation interval from the DeLong variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AucEstimate {
    pub auc: f64,
    pub variance: f64,
    /// Clamped to [0, 1]; `None` when the variance is undefined (a class
    /// with a single subject).
    pub interval: Option<Interval>,
    pub positives: usize,
    pub negatives: usize,
}

/// DeLong test of `AUROC(a) = AUROC(b)` on the same subjects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairedTest {
    pub auc_a: f64,
    pub auc_b: f64,
    /// `auc_a − auc_b`.
    pub difference: f64,
    pub z: f64,
    pub p_value: f64,
    /// Interval for the difference.
    pub interval: Option<Interval>,
}

/// Rows where every score is finite.
fn complete_rows(scores: &[&[f64]], labels: &[bool]) -> (Vec<Vec<f64>>, Vec<bool>) {
    let keep: Vec<usize> = (0..labels.len())
        .filter(|i| scores.iter().all(|s| s[*i].is_finite()))
        .collect();
    let columns = scores
        .iter()
        .map(|s| keep.iter().map(|i| s[*i]).collect())
        .collect();
    let labels = keep.iter().map(|i| labels[*i]).collect();
    (columns, labels)
}

fn has_both_classes(labels: &[bool]) -> bool {
    labels.iter().any(|y| *y) && labels.iter().any(|y| !*y)
}

/// Sample covariance (ddof = 1); NaN below two observations.
fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / (n - 1) as f64
}

fn z_critical(alpha: f64) -> f64 {
    normal_quantile(1.0 - alpha / 2.0)
}

/// AUROC of `scores` for `labels`. Rows with a non-finite score are
/// ignored. `None` unless both classes are present; callers have already
/// checked that the lengths agree.
pub fn auroc(scores: &[f64], labels: &[bool], alpha: f64) -> Option<AucEstimate> {
    let (columns, labels) = complete_rows(&[scores], labels);
    if !has_both_classes(&labels) {
        return None;
    }
    let p = Placements::compute(&columns[0], &labels);
    let m = p.v10.len();
    let n = p.v01.len();
    let variance = covariance(&p.v10, &p.v10) / m as f64 + covariance(&p.v01, &p.v01) / n as f64;

    let interval = variance.is_finite().then(|| {
        let half = z_critical(alpha) * variance.max(0.0).sqrt();
        Interval::new((p.auc - half).max(0.0), (p.auc + half).min(1.0))
    });

    Some(AucEstimate {
        auc: p.auc,
        variance,
        interval,
        positives: m,
        negatives: n,
    })
}

/// Paired DeLong test between two score vectors for the same subjects.
/// Rows where either score is non-finite are ignored.
pub fn delong_test(a: &[f64], b: &[f64], labels: &[bool], alpha: f64) -> Option<PairedTest> {
    let (columns, labels) = complete_rows(&[a, b], labels);
    if !has_both_classes(&labels) {
        return None;
    }
    let pa = Placements::compute(&columns[0], &labels);
    let pb = Placements::compute(&columns[1], &labels);
    let m = pa.v10.len() as f64;
    let n = pa.v01.len() as f64;

    let s10 = covariance(&pa.v10, &pa.v10) + covariance(&pb.v10, &pb.v10)
        - 2.0 * covariance(&pa.v10, &pb.v10);
    let s01 = covariance(&pa.v01, &pa.v01) + covariance(&pb.v01, &pb.v01)
        - 2.0 * covariance(&pa.v01, &pb.v01);
    let variance = s10 / m + s01 / n;
    let difference = pa.auc - pb.auc;

    let (z, p_value, interval) = if !variance.is_finite() {
        (f64::NAN, f64::NAN, None)
    } else if variance <= 0.0 {
        // Identical rankings: no evidence of a difference.
        let p = if difference == 0.0 { 1.0 } else { 0.0 };
        let z = if difference == 0.0 {
            0.0
        } else {
            difference.signum() * f64::INFINITY
        };
        (z, p, Some(Interval::new(difference, difference)))
    } else {
        let sd = variance.sqrt();
        let z = difference / sd;
        let half = z_critical(alpha) * sd;
        (
            z,
            normal_two_sided(z),
            Some(Interval::new(difference - half, difference + half)),
        )
    };

    Some(PairedTest {
        auc_a: pa.auc,
        auc_b: pb.auc,
        difference,
        z,
        p_value,
        interval,
    })
}
