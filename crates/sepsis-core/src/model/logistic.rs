//! Logistic regression fitted by iteratively reweighted least squares.

use super::PredictionModel;
use crate::config::ModelConfig;
use crate::data::Dataset;
use sepsis_common::{Error, Result};
use serde::Serialize;
use tracing::{debug, trace};

const MU_FLOOR: f64 = 1e-10;
const PIVOT_FLOOR: f64 = 1e-12;

/// Fitted coefficients, intercept first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogisticFit {
    pub terms: Vec<String>,
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    /// Rows used for fitting (complete cases).
    pub rows: usize,
}

impl LogisticFit {
    /// Predicted probabilities for every row of `data`; rows with a missing
    /// term are NaN.
    pub fn predict(&self, data: &Dataset) -> Result<Vec<f64>> {
        let columns = self.terms[1..]
            .iter()
            .map(|t| data.numeric(t))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..data.n_rows())
            .map(|r| {
                let mut eta = self.coefficients[0];
                for (column, beta) in columns.iter().zip(&self.coefficients[1..]) {
                    eta += beta * column[r];
                }
                sigmoid(eta)
            })
            .collect())
    }
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|i, j| a[*i][col].abs().total_cmp(&a[*j][col].abs()))?;
        if !(a[pivot][col].abs() > PIVOT_FLOOR) {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// `target ~ covariates [+ score]` by maximum likelihood.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    covariates: Vec<String>,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for LogisticModel {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

impl LogisticModel {
    pub fn new(covariates: Vec<String>) -> Self {
        Self {
            covariates,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            covariates: config.covariates.clone(),
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }

    pub fn covariates(&self) -> &[String] {
        &self.covariates
    }

    fn failure(&self, target: &str, reason: impl Into<String>) -> Error {
        Error::ModelFit {
            model: self.name().to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fit(&self, data: &Dataset, target: &str, covariate: Option<&str>) -> Result<LogisticFit> {
        let mut terms = vec!["(intercept)".to_string()];
        terms.extend(self.covariates.iter().cloned());
        terms.extend(covariate.map(str::to_string));

        let y_all = data.numeric(target)?;
        let columns = terms[1..]
            .iter()
            .map(|t| data.numeric(t))
            .collect::<Result<Vec<_>>>()?;

        let complete: Vec<usize> = (0..data.n_rows())
            .filter(|r| !y_all[*r].is_nan() && columns.iter().all(|c| !c[*r].is_nan()))
            .collect();
        let p = terms.len();
        if complete.len() <= p {
            return Err(self.failure(
                target,
                format!("{} complete rows for {} terms", complete.len(), p),
            ));
        }

        let x: Vec<Vec<f64>> = complete
            .iter()
            .map(|r| {
                std::iter::once(1.0)
                    .chain(columns.iter().map(|c| c[*r]))
                    .collect()
            })
            .collect();
        let y: Vec<f64> = complete
            .iter()
            .map(|r| if y_all[*r] == 1.0 { 1.0 } else { 0.0 })
            .collect();

        let mut beta = vec![0.0; p];
        for iteration in 1..=self.max_iterations {
            let mut xtwx = vec![vec![0.0; p]; p];
            let mut xtwz = vec![0.0; p];
            for (row, yi) in x.iter().zip(&y) {
                let eta: f64 = row.iter().zip(&beta).map(|(a, b)| a * b).sum();
                let mu = sigmoid(eta).clamp(MU_FLOOR, 1.0 - MU_FLOOR);
                let w = mu * (1.0 - mu);
                let z = eta + (yi - mu) / w;
                for i in 0..p {
                    xtwz[i] += row[i] * w * z;
                    for j in 0..p {
                        xtwx[i][j] += row[i] * w * row[j];
                    }
                }
            }

            let next = solve(xtwx, xtwz)
                .ok_or_else(|| self.failure(target, "design matrix is singular"))?;
            let change = next
                .iter()
                .zip(&beta)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            beta = next;
            trace!(iteration, change, "IRLS step");

            if !change.is_finite() {
                return Err(self.failure(target, "coefficients diverged"));
            }
            if change < self.tolerance {
                debug!(
                    outcome = %target,
                    covariate = covariate.unwrap_or("-"),
                    iterations = iteration,
                    rows = complete.len(),
                    "logistic model converged"
                );
                return Ok(LogisticFit {
                    terms,
                    coefficients: beta,
                    iterations: iteration,
                    rows: complete.len(),
                });
            }
        }

        Err(self.failure(
            target,
            format!("no convergence after {} iterations", self.max_iterations),
        ))
    }
}

impl PredictionModel for LogisticModel {
    fn name(&self) -> &str {
        "logreg"
    }

    fn predict(&self, data: &Dataset, target: &str, covariate: Option<&str>) -> Result<Vec<f64>> {
        self.fit(data, target, covariate)?.predict(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn cohort() -> Dataset {
        let score = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 2.0, 5.0, f64::NAN];
        let died = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0];
        Dataset::new()
            .with_column("sofa", Column::Numeric(score))
            .unwrap()
            .with_column("died", Column::Numeric(died))
            .unwrap()
    }

    #[test]
    fn solve_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
        assert!(solve(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn intercept_only_predicts_prevalence() {
        let data = cohort();
        let model = LogisticModel::new(Vec::new());
        let preds = model.predict(&data, "died", None).unwrap();
        // every row is complete without covariates: 5 of 11 died
        for p in &preds {
            assert!((p - 5.0 / 11.0).abs() < 1e-8, "{}", p);
        }
    }

    #[test]
    fn score_equations_hold_at_the_optimum() {
        let data = cohort();
        let model = LogisticModel::new(Vec::new());
        let fit = model.fit(&data, "died", Some("sofa")).unwrap();
        assert_eq!(fit.terms, vec!["(intercept)", "sofa"]);
        assert_eq!(fit.rows, 10);
        assert!(fit.coefficients[1] > 0.0);

        let preds = fit.predict(&data).unwrap();
        assert!(preds[10].is_nan());
        let y = data.numeric("died").unwrap();
        let x = data.numeric("sofa").unwrap();
        let residual: f64 = (0..10).map(|r| y[r] - preds[r]).sum();
        let weighted: f64 = (0..10).map(|r| x[r] * (y[r] - preds[r])).sum();
        assert!(residual.abs() < 1e-6, "{}", residual);
        assert!(weighted.abs() < 1e-6, "{}", weighted);
    }

    #[test]
    fn collinear_terms_are_a_fit_failure() {
        let mut data = cohort();
        let copy = data.numeric("sofa").unwrap().to_vec();
        data.insert("sofa_copy", Column::Numeric(copy)).unwrap();
        let model = LogisticModel::new(vec!["sofa".to_string()]);
        let err = model.predict(&data, "died", Some("sofa_copy")).unwrap_err();
        assert!(matches!(err, Error::ModelFit { .. }));
        assert!(err.is_skippable());
    }

    #[test]
    fn too_few_rows_and_missing_columns() {
        let data = Dataset::new()
            .with_column("died", Column::Numeric(vec![0.0, 1.0]))
            .unwrap()
            .with_column("sofa", Column::Numeric(vec![1.0, 2.0]))
            .unwrap();
        let model = LogisticModel::new(Vec::new());
        assert!(matches!(
            model.predict(&data, "died", Some("sofa")),
            Err(Error::ModelFit { .. })
        ));
        assert!(matches!(
            model.predict(&data, "died", Some("qsofa")),
            Err(Error::MissingColumn { .. })
        ));
    }
}
