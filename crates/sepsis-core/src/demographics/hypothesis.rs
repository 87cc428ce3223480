//! Two-group tests used by the split cohort summary.
//!
//! Missing values (NaN) are omitted before testing. A test that cannot be
//! computed (empty group, zero variance, zero expected count) returns `None`
//! and its p-value cell stays blank.

use crate::auroc::midranks;
use sepsis_math::{chi_square_sf, normal_sf, students_t_two_sided};
use serde::Serialize;

/// Statistic and two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

pub(crate) fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

/// Welch's unequal-variance t-test.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<TestOutcome> {
    let a = finite(a);
    let b = finite(b);
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (mean_a, var_a) = mean_and_variance(&a);
    let (mean_b, var_b) = mean_and_variance(&b);
    let se_a = var_a / a.len() as f64;
    let se_b = var_b / b.len() as f64;
    let se = se_a + se_b;
    if se <= 0.0 {
        return None;
    }

    let t = (mean_a - mean_b) / se.sqrt();
    let df = se * se
        / (se_a * se_a / (a.len() - 1) as f64 + se_b * se_b / (b.len() - 1) as f64);
    Some(TestOutcome {
        statistic: t,
        p_value: students_t_two_sided(t, df),
    })
}

/// Two-sided Mann-Whitney U test, normal approximation with continuity and
/// tie corrections. The reported statistic is max(U1, U2).
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Option<TestOutcome> {
    let a = finite(a);
    let b = finite(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let n = n1 + n2;

    let pooled: Vec<f64> = a.iter().chain(&b).copied().collect();
    let ranks = midranks(&pooled);
    let r1: f64 = ranks[..a.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u = u1.max(n1 * n2 - u1);

    let mut sorted = pooled;
    sorted.sort_by(f64::total_cmp);
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < sorted.len() {
        let end = sorted[start..].iter().take_while(|v| **v == sorted[start]).count();
        let t = end as f64;
        tie_term += t * t * t - t;
        start += end;
    }

    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();
    if !(sigma > 0.0) {
        return None;
    }
    let z = (u - n1 * n2 / 2.0 - 0.5) / sigma;
    Some(TestOutcome {
        statistic: u,
        p_value: (2.0 * normal_sf(z)).min(1.0),
    })
}

/// Pearson chi-square test of independence on an r x c table of counts.
///
/// With `correction`, Yates' continuity correction is applied when the table
/// has one degree of freedom: each observed count moves toward its expected
/// count by at most one half.
pub fn chi2_contingency(table: &[Vec<f64>], correction: bool) -> Option<TestOutcome> {
    let rows = table.len();
    let cols = table.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 || table.iter().any(|r| r.len() != cols) {
        return None;
    }

    let row_totals: Vec<f64> = table.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..cols).map(|j| table.iter().map(|r| r[j]).sum()).collect();
    let total: f64 = row_totals.iter().sum();

    let dof = (rows - 1) * (cols - 1);
    if dof == 0 {
        return Some(TestOutcome {
            statistic: 0.0,
            p_value: 1.0,
        });
    }

    let mut statistic = 0.0;
    for (i, row) in table.iter().enumerate() {
        for (j, observed) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / total;
            if !(expected > 0.0) {
                return None;
            }
            let mut observed = *observed;
            if correction && dof == 1 {
                let shift = (expected - observed).abs().min(0.5);
                observed += shift * (expected - observed).signum();
            }
            statistic += (observed - expected) * (observed - expected) / expected;
        }
    }

    Some(TestOutcome {
        statistic,
        p_value: chi_square_sf(statistic, dof as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn welch_reference() {
        // t = -3 with 8 degrees of freedom
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [4.0, 5.0, 6.0, 7.0, 8.0];
        let out = welch_t_test(&a, &b).unwrap();
        assert!(close(out.statistic, -3.0, 1e-12));
        assert!(close(out.p_value, 0.017072, 1e-5), "p = {}", out.p_value);
    }

    #[test]
    fn welch_ignores_missing_and_degenerate() {
        let a = [1.0, f64::NAN, 1.0];
        let b = [1.0, 1.0, 1.0];
        assert!(welch_t_test(&a, &b).is_none());
        assert!(welch_t_test(&[1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn mann_whitney_reference() {
        // complete separation, n1 = n2 = 5: U = 25, z = (25 - 12.5 - 0.5) / sqrt(22.9167)
        let a = [6.0, 7.0, 8.0, 9.0, 10.0];
        let b = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = mann_whitney_u(&a, &b).unwrap();
        assert_eq!(out.statistic, 25.0);
        let z: f64 = 12.0 / (25.0f64 * 11.0 / 12.0).sqrt();
        assert!(close(out.p_value, 2.0 * normal_sf(z), 1e-12));
        assert!(close(out.p_value, 0.012186, 1e-5), "p = {}", out.p_value);
    }

    #[test]
    fn mann_whitney_identical_groups() {
        let a = [3.0, 3.0];
        let b = [3.0, 3.0, 3.0];
        assert!(mann_whitney_u(&a, &b).is_none());
        let out = mann_whitney_u(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(out.p_value, 1.0);
    }

    #[test]
    fn chi2_with_yates() {
        let table = vec![vec![10.0, 20.0], vec![20.0, 10.0]];
        let out = chi2_contingency(&table, true).unwrap();
        assert!(close(out.statistic, 5.4, 1e-9));
        assert!(close(out.p_value, 0.020137, 1e-5), "p = {}", out.p_value);

        let raw = chi2_contingency(&table, false).unwrap();
        assert!(close(raw.statistic, 20.0 / 3.0, 1e-9));
    }

    #[test]
    fn chi2_three_by_two_ignores_correction() {
        let table = vec![
            vec![30.0, 20.0],
            vec![10.0, 15.0],
            vec![5.0, 10.0],
        ];
        let a = chi2_contingency(&table, true).unwrap();
        let b = chi2_contingency(&table, false).unwrap();
        assert_eq!(a, b);
        assert!(a.p_value > 0.0 && a.p_value < 1.0);
    }

    #[test]
    fn chi2_degenerate_tables() {
        assert!(chi2_contingency(&[vec![0.0, 0.0], vec![3.0, 4.0]], true).is_none());
        let single = chi2_contingency(&[vec![3.0, 4.0]], true).unwrap();
        assert_eq!(single.p_value, 1.0);
        assert!(chi2_contingency(&[], true).is_none());
    }
}
