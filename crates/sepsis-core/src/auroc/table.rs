//! Pairwise AUROC comparison table.
//!
//! Row i, column j of the table holds:
//! - i == j: the AUROC of prediction i with its interval
//! - j > i: Cronbach's alpha between i and j with a bootstrap interval
//! - j < i: the DeLong p-value for AUROC(i) = AUROC(j)
//!
//! A name with no prediction leaves its whole row and column blank.

use super::agreement::{bootstrap_alpha, AgreementEstimate, DEFAULT_ITERATIONS, DEFAULT_PERCENTILES};
use super::delong::{auroc, delong_test, AucEstimate, PairedTest};
use crate::config::StatsConfig;
use crate::format;
use crate::metrics::ReportTarget;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sepsis_common::{Error, LabelVector, PredictionSet, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Width of a console cell.
const CELL_WIDTH: usize = 20;

/// One cell of an [`AurocTable`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AurocCell {
    Blank,
    Auroc(AucEstimate),
    Agreement(AgreementEstimate),
    Comparison(PairedTest),
}

impl AurocCell {
    /// Text of the cell, without padding.
    pub fn text(&self) -> String {
        match self {
            AurocCell::Blank => String::new(),
            AurocCell::Auroc(est) => format::with_interval(est.auc, est.interval, 3),
            AurocCell::Agreement(est) => format::with_interval(est.alpha, est.interval, 3),
            AurocCell::Comparison(test) => format::p_value(test.p_value),
        }
    }
}

/// Computed comparison table; cells are addressed by name order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AurocTable {
    names: Vec<String>,
    /// Base seed every agreement cell was bootstrapped with.
    seed: u64,
    cells: Vec<Vec<AurocCell>>,
}

impl AurocTable {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&AurocCell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn cell_by_name(&self, row: &str, col: &str) -> Option<&AurocCell> {
        self.cell(self.index(row)?, self.index(col)?)
    }

    /// Diagonal entry for `name`.
    pub fn auroc(&self, name: &str) -> Option<&AucEstimate> {
        match self.cell_by_name(name, name)? {
            AurocCell::Auroc(est) => Some(est),
            _ => None,
        }
    }

    /// Agreement between two predictions, whichever order they were listed in.
    pub fn agreement(&self, a: &str, b: &str) -> Option<&AgreementEstimate> {
        let (ia, ib) = (self.index(a)?, self.index(b)?);
        let (row, col) = if ia < ib { (ia, ib) } else { (ib, ia) };
        match self.cell(row, col)? {
            AurocCell::Agreement(est) => Some(est),
            _ => None,
        }
    }

    /// DeLong comparison between two predictions, oriented as `a` vs `b`.
    pub fn comparison(&self, a: &str, b: &str) -> Option<PairedTest> {
        let (ia, ib) = (self.index(a)?, self.index(b)?);
        let (row, col) = if ia > ib { (ia, ib) } else { (ib, ia) };
        match self.cell(row, col)? {
            AurocCell::Comparison(test) if ia > ib => Some(*test),
            AurocCell::Comparison(test) => Some(PairedTest {
                auc_a: test.auc_b,
                auc_b: test.auc_a,
                difference: -test.difference,
                z: -test.z,
                p_value: test.p_value,
                interval: test
                    .interval
                    .map(|ci| sepsis_math::Interval::new(-ci.high, -ci.low)),
            }),
            _ => None,
        }
    }

    pub fn render(&self, target: ReportTarget<'_>, delimiter: &str) -> Result<()> {
        match target {
            ReportTarget::Console(out) => self.write_console(out),
            ReportTarget::Delimited(path) => self.write_delimited(path, delimiter),
        }
    }

    fn write_console(&self, out: &mut dyn Write) -> Result<()> {
        write!(out, "{:5}", "")?;
        for name in &self.names {
            write!(out, "\t{}", format::pad(name, CELL_WIDTH))?;
        }
        writeln!(out)?;

        for (name, row) in self.names.iter().zip(&self.cells) {
            write!(out, "{:5}", name)?;
            for cell in row {
                write!(out, "\t{}", format::pad(&cell.text(), CELL_WIDTH))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_delimited(&self, path: &Path, delimiter: &str) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);

        let header: Vec<&str> = std::iter::once("")
            .chain(self.names.iter().map(String::as_str))
            .collect();
        writeln!(out, "{}", header.join(delimiter))?;

        for (name, row) in self.names.iter().zip(&self.cells) {
            let cells: Vec<String> = std::iter::once(name.clone())
                .chain(row.iter().map(AurocCell::text))
                .collect();
            writeln!(out, "{}", cells.join(delimiter))?;
        }

        out.flush()?;
        debug!(path = %path.display(), rows = self.names.len(), "wrote AUROC table");
        Ok(())
    }
}

/// Builds [`AurocTable`]s.
#[derive(Debug, Clone)]
pub struct AurocComparisonTable {
    alpha: f64,
    iterations: usize,
    percentiles: [f64; 2],
    seed: Option<u64>,
}

impl Default for AurocComparisonTable {
    fn default() -> Self {
        Self {
            alpha: sepsis_math::DEFAULT_ALPHA,
            iterations: DEFAULT_ITERATIONS,
            percentiles: DEFAULT_PERCENTILES,
            seed: None,
        }
    }
}

impl AurocComparisonTable {
    pub fn new(alpha: f64, iterations: usize) -> Self {
        Self {
            alpha,
            iterations,
            ..Self::default()
        }
    }

    pub fn from_config(stats: &StatsConfig) -> Self {
        Self {
            alpha: stats.alpha,
            iterations: stats.bootstrap_iterations,
            percentiles: stats.agreement_percentiles,
            seed: stats.bootstrap_seed,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_percentiles(mut self, percentiles: [f64; 2]) -> Self {
        self.percentiles = percentiles;
        self
    }

    /// Fill the table for `names`. Names absent from `predictions` give
    /// blank rows and columns; a present prediction whose length differs
    /// from the target is an error.
    pub fn compute(
        &self,
        predictions: &PredictionSet,
        target: &LabelVector,
        names: &[String],
    ) -> Result<AurocTable> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::InvalidAlpha(self.alpha));
        }
        for name in names {
            if let Some(scores) = predictions.get(name) {
                if scores.len() != target.len() {
                    return Err(Error::dimension(
                        format!("prediction '{}'", name),
                        target.len(),
                        scores.len(),
                    ));
                }
            } else {
                debug!(name = %name, "no prediction; leaving row blank");
            }
        }

        let positives = target.positives();
        if positives == 0 || positives == target.len() {
            warn!(
                rows = target.len(),
                positives, "target has a single class; AUROC cells are blank"
            );
        }

        let seed = self.seed.unwrap_or_else(rand::random);
        info!(
            seed,
            iterations = self.iterations,
            predictions = names.len(),
            "computing AUROC table"
        );

        let labels = target.as_slice();
        let mut cells = Vec::with_capacity(names.len());
        for (i, row_name) in names.iter().enumerate() {
            let mut row = Vec::with_capacity(names.len());
            for (j, col_name) in names.iter().enumerate() {
                let pair = predictions
                    .get(row_name)
                    .zip(predictions.get(col_name))
                    .map(|(a, b)| (a.as_slice(), b.as_slice()));
                let cell = match pair {
                    None => AurocCell::Blank,
                    Some((a, _)) if i == j => auroc(a, labels, self.alpha)
                        .map_or(AurocCell::Blank, AurocCell::Auroc),
                    Some((a, b)) if j > i => {
                        let mut rng = StdRng::seed_from_u64(seed);
                        AurocCell::Agreement(bootstrap_alpha(
                            a,
                            b,
                            self.iterations,
                            self.percentiles,
                            &mut rng,
                        ))
                    }
                    Some((a, b)) => delong_test(a, b, labels, self.alpha)
                        .map_or(AurocCell::Blank, AurocCell::Comparison),
                };
                row.push(cell);
            }
            cells.push(row);
        }

        Ok(AurocTable {
            names: names.to_vec(),
            seed,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sepsis_common::ScoreVector;

    fn fixture() -> (PredictionSet, LabelVector) {
        let target = LabelVector::from_flags(&[1, 1, 1, 0, 0, 0, 1, 0, 1, 0]);
        let set = PredictionSet::from_entries(vec![
            (
                "sofa",
                ScoreVector::new(vec![9.0, 6.0, 3.0, 7.0, 4.0, 1.0, 5.0, 2.0, 8.0, 3.0]),
            ),
            (
                "qsofa",
                ScoreVector::new(vec![2.0, 1.0, 1.0, 1.0, 0.0, 0.0, 2.0, 1.0, 3.0, 0.0]),
            ),
        ])
        .unwrap();
        (set, target)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cells_follow_the_triangle_layout() {
        let (set, target) = fixture();
        let table = AurocComparisonTable::new(0.05, 100)
            .with_seed(3)
            .compute(&set, &target, &names(&["sofa", "qsofa"]))
            .unwrap();

        assert!(matches!(table.cell(0, 0), Some(AurocCell::Auroc(_))));
        assert!(matches!(table.cell(0, 1), Some(AurocCell::Agreement(_))));
        assert!(matches!(table.cell(1, 0), Some(AurocCell::Comparison(_))));
        assert!(matches!(table.cell(1, 1), Some(AurocCell::Auroc(_))));
        assert!(table.cell(2, 0).is_none());
        assert_eq!(table.seed(), 3);
    }

    #[test]
    fn missing_names_are_blank() {
        let (set, target) = fixture();
        let table = AurocComparisonTable::new(0.05, 10)
            .with_seed(1)
            .compute(&set, &target, &names(&["sofa", "sirs", "qsofa"]))
            .unwrap();
        for k in 0..3 {
            assert_eq!(table.cell(1, k), Some(&AurocCell::Blank));
            assert_eq!(table.cell(k, 1), Some(&AurocCell::Blank));
        }
        assert!(table.auroc("sofa").is_some());
        assert!(table.agreement("qsofa", "sofa").is_some());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let (mut set, target) = fixture();
        set.insert("short", ScoreVector::new(vec![1.0, 2.0])).unwrap();
        let err = AurocComparisonTable::default()
            .compute(&set, &target, &names(&["sofa", "short"]))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 10, actual: 2, .. }));
    }

    #[test]
    fn single_class_target_leaves_auroc_blank() {
        let (set, _) = fixture();
        let target = LabelVector::new(vec![true; 10]);
        let table = AurocComparisonTable::new(0.05, 10)
            .with_seed(1)
            .compute(&set, &target, &names(&["sofa", "qsofa"]))
            .unwrap();
        assert_eq!(table.cell(0, 0), Some(&AurocCell::Blank));
        assert_eq!(table.cell(1, 0), Some(&AurocCell::Blank));
        // agreement does not depend on the target
        assert!(matches!(table.cell(0, 1), Some(AurocCell::Agreement(_))));
    }

    #[test]
    fn comparison_is_reoriented_by_name_order() {
        let (set, target) = fixture();
        let table = AurocComparisonTable::new(0.05, 10)
            .with_seed(1)
            .compute(&set, &target, &names(&["sofa", "qsofa"]))
            .unwrap();
        let ab = table.comparison("qsofa", "sofa").unwrap();
        let ba = table.comparison("sofa", "qsofa").unwrap();
        assert_eq!(ab.p_value, ba.p_value);
        assert_eq!(ab.difference, -ba.difference);
        assert_eq!(ab.auc_a, table.auroc("qsofa").unwrap().auc);
    }

    #[test]
    fn console_rendering() {
        let (set, target) = fixture();
        let table = AurocComparisonTable::new(0.05, 50)
            .with_seed(9)
            .compute(&set, &target, &names(&["sofa", "qsofa"]))
            .unwrap();
        let mut out = Vec::new();
        table.render(ReportTarget::Console(&mut out), "\t").unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("     \tsofa"));
        assert!(lines[1].starts_with("sofa \t"));
        let diagonal = table.cell(0, 0).unwrap().text();
        assert!(lines[1].contains(&diagonal));
        assert!(diagonal.contains(" ["));
    }

    #[test]
    fn delimited_rendering() {
        let (set, target) = fixture();
        let table = AurocComparisonTable::new(0.05, 50)
            .with_seed(9)
            .compute(&set, &target, &names(&["sofa", "sirs", "qsofa"]))
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auc.csv");
        table.render(ReportTarget::Delimited(&path), ",").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ",sofa,sirs,qsofa");
        assert_eq!(lines[2], "sirs,,,");
        assert!(lines[3].starts_with("qsofa,"));
    }

    #[test]
    fn serializes_tagged_cells() {
        let (set, target) = fixture();
        let table = AurocComparisonTable::new(0.05, 10)
            .with_seed(1)
            .compute(&set, &target, &names(&["sofa", "missing"]))
            .unwrap();
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["cells"][0][0]["kind"], "auroc");
        assert_eq!(json["cells"][0][1]["kind"], "blank");
        assert_eq!(json["names"][1], "missing");
    }
}
