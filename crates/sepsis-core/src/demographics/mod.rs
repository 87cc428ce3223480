//! Cohort characteristics ("table 1"), for the whole cohort or split into two
//! groups with a between-group test per variable.

pub mod hypothesis;

pub use hypothesis::{chi2_contingency, mann_whitney_u, welch_t_test, TestOutcome};

use crate::data::Dataset;
use crate::format;
use hypothesis::mean_and_variance;
use sepsis_common::{Error, Result, SubgroupMask};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;

/// Width of the label column.
const LABEL_WIDTH: usize = 20;

/// How a variable is summarised and tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Number of rows.
    Count,
    /// Median [Q1, Q3]; Mann-Whitney U between groups.
    Median,
    /// Mean +- SD; Welch t-test between groups.
    Continuous,
    /// 0/1 indicator: count (pct); chi-square with Yates correction.
    Binary,
    /// `M`/`F` text column, counted as male.
    Gender,
    /// White/Black/Other from the derived `race_black` and `race_other`.
    Race,
    /// Non-missing count (pct).
    Measured,
}

/// One row group of the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub kind: VariableKind,
    /// Adds `measured` and `> threshold` rows after the variable itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// `lactate_max` -> `lactate `, used to label the threshold rows.
    fn stem(&self) -> String {
        match self.name.strip_suffix("_max") {
            Some(stem) => format!("{} ", stem),
            None => format!("{} ", self.name),
        }
    }
}

/// The standard sepsis cohort table.
pub fn default_variables() -> Vec<VariableSpec> {
    use VariableKind::*;
    vec![
        VariableSpec::new("N", Count),
        VariableSpec::new("age", Median),
        VariableSpec::new("gender", Gender),
        VariableSpec::new("bmi", Continuous),
        VariableSpec::new("hospital_expire_flag", Binary),
        VariableSpec::new("thirtyday_expire_flag", Binary),
        VariableSpec::new("icu_los", Median),
        VariableSpec::new("hosp_los", Median),
        VariableSpec::new("vent", Binary),
        VariableSpec::new("race", Race),
        VariableSpec::new("elixhauser_hospital", Median),
        VariableSpec::new("sirs", Median),
        VariableSpec::new("sofa", Median),
        VariableSpec::new("qsofa", Median),
        VariableSpec::new("mlods", Median),
        VariableSpec::new("lactate_max", Continuous).with_threshold(2.0),
    ]
}

/// One printed line: a label, one cell per group, and the test p-value when
/// the cohort is split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub label: String,
    pub cells: Vec<String>,
    pub p_value: Option<f64>,
}

impl SummaryRow {
    fn new(label: impl Into<String>, cells: Vec<String>, p_value: Option<f64>) -> Self {
        Self {
            label: label.into(),
            cells,
            p_value,
        }
    }

    /// A variable whose column is absent prints its bare name.
    fn bare(label: impl Into<String>) -> Self {
        Self::new(label, Vec::new(), None)
    }
}

/// Rendered summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTable {
    /// 1 for the whole cohort, 2 when split.
    pub groups: usize,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn render(&self, out: &mut dyn Write) -> Result<()> {
        for row in &self.rows {
            write!(out, "{}", format::pad(&row.label, LABEL_WIDTH))?;
            if !row.cells.is_empty() {
                for cell in &row.cells {
                    write!(out, "\t{}", cell)?;
                }
                if self.groups > 1 {
                    write!(out, "\t{}", row.p_value.map(format::p_value).unwrap_or_default())?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Rows of each group: group 0 is everyone outside the mask, group 1 inside.
struct Groups<'a> {
    members: Vec<Vec<usize>>,
    data: &'a Dataset,
}

impl<'a> Groups<'a> {
    fn numeric(&self, name: &str) -> Result<Vec<Vec<f64>>> {
        let values = self.data.numeric(name)?;
        Ok(self
            .members
            .iter()
            .map(|rows| rows.iter().map(|r| values[*r]).collect())
            .collect())
    }

    fn len(&self, group: usize) -> usize {
        self.members[group].len()
    }

    fn split(&self) -> bool {
        self.members.len() > 1
    }
}

fn present(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Percentile using the midpoint of the two nearest order statistics.
pub fn midpoint_percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = present(values);
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    (sorted[pos.floor() as usize] + sorted[pos.ceil() as usize]) / 2.0
}

fn median_cell(values: &[f64]) -> String {
    format!(
        "{} [{}, {}]",
        format::number(midpoint_percentile(values, 50.0), 2),
        format::number(midpoint_percentile(values, 25.0), 2),
        format::number(midpoint_percentile(values, 75.0), 2)
    )
}

fn mean_sd_cell(values: &[f64]) -> String {
    let values = present(values);
    let (mean, variance) = if values.is_empty() {
        (f64::NAN, f64::NAN)
    } else {
        mean_and_variance(&values)
    };
    format!(
        "{} +- {}",
        format::number(mean, 2),
        format::number(variance.sqrt(), 2)
    )
}

/// 2 x groups table of (hits, misses), tested with Yates correction.
fn proportion_row(label: impl Into<String>, counts: &[(usize, usize)]) -> SummaryRow {
    let cells = counts
        .iter()
        .map(|(hit, miss)| format::count_with_percent(*hit, hit + miss))
        .collect();
    let p_value = (counts.len() > 1)
        .then(|| {
            let table: Vec<Vec<f64>> = vec![
                counts.iter().map(|(hit, _)| *hit as f64).collect(),
                counts.iter().map(|(_, miss)| *miss as f64).collect(),
            ];
            chi2_contingency(&table, true)
        })
        .flatten()
        .map(|t| t.p_value);
    SummaryRow::new(label, cells, p_value)
}

/// Builds [`SummaryTable`]s from a variable list.
#[derive(Debug, Clone)]
pub struct DescriptiveSummary {
    variables: Vec<VariableSpec>,
}

impl Default for DescriptiveSummary {
    fn default() -> Self {
        Self::new(default_variables())
    }
}

impl DescriptiveSummary {
    pub fn new(variables: Vec<VariableSpec>) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    /// Summarise `data`, either as a whole or split by `split` (rows inside
    /// the mask form the second group).
    pub fn summarize(&self, data: &Dataset, split: Option<&SubgroupMask>) -> Result<SummaryTable> {
        let members: Vec<Vec<usize>> = match split {
            None => vec![(0..data.n_rows()).collect()],
            Some(mask) => {
                if mask.len() != data.n_rows() {
                    return Err(Error::dimension("split mask", data.n_rows(), mask.len()));
                }
                let (inside, outside): (Vec<usize>, Vec<usize>) =
                    (0..data.n_rows()).partition(|r| mask.as_slice()[*r]);
                vec![outside, inside]
            }
        };
        let groups = Groups { members, data };

        let mut rows = Vec::new();
        for spec in &self.variables {
            self.summarize_variable(spec, &groups, &mut rows)?;
        }
        debug!(rows = rows.len(), groups = groups.members.len(), "summarised cohort");
        Ok(SummaryTable {
            groups: groups.members.len(),
            rows,
        })
    }

    fn summarize_variable(
        &self,
        spec: &VariableSpec,
        groups: &Groups<'_>,
        rows: &mut Vec<SummaryRow>,
    ) -> Result<()> {
        let data = groups.data;
        let name = spec.name.as_str();
        let available = match spec.kind {
            VariableKind::Count => true,
            VariableKind::Race => data.has_column("race_black") && data.has_column("race_other"),
            _ => data.has_column(name),
        };
        if !available {
            rows.push(SummaryRow::bare(name));
            return Ok(());
        }

        match spec.kind {
            VariableKind::Count => {
                let cells = groups
                    .members
                    .iter()
                    .map(|m| format!("{:4}", m.len()))
                    .collect();
                rows.push(SummaryRow::new(name, cells, None));
            }
            VariableKind::Median => {
                let values = groups.numeric(name)?;
                let cells = values.iter().map(|v| median_cell(v)).collect();
                let p_value = groups
                    .split()
                    .then(|| mann_whitney_u(&values[0], &values[1]))
                    .flatten()
                    .map(|t| t.p_value);
                rows.push(SummaryRow::new(name, cells, p_value));
            }
            VariableKind::Continuous => {
                let values = groups.numeric(name)?;
                let cells = values.iter().map(|v| mean_sd_cell(v)).collect();
                let p_value = groups
                    .split()
                    .then(|| welch_t_test(&values[0], &values[1]))
                    .flatten()
                    .map(|t| t.p_value);
                rows.push(SummaryRow::new(name, cells, p_value));
            }
            VariableKind::Binary => {
                let counts: Vec<(usize, usize)> = groups
                    .numeric(name)?
                    .iter()
                    .map(|v| {
                        let present = present(v);
                        let hit = present.iter().filter(|x| **x == 1.0).count();
                        (hit, present.len() - hit)
                    })
                    .collect();
                rows.push(proportion_row(name, &counts));
            }
            VariableKind::Gender => {
                let values = data.text(name)?;
                let counts: Vec<(usize, usize)> = groups
                    .members
                    .iter()
                    .map(|m| {
                        let male = m
                            .iter()
                            .filter(|r| values[**r].as_deref() == Some("M"))
                            .count();
                        (male, m.len() - male)
                    })
                    .collect();
                rows.push(proportion_row(name, &counts));
            }
            VariableKind::Race => self.summarize_race(name, groups, rows)?,
            VariableKind::Measured => {
                let counts = measured_counts(&groups.numeric(name)?);
                rows.push(proportion_row(name, &counts));
            }
        }

        if let Some(threshold) = spec.threshold {
            let values = groups.numeric(name)?;
            let stem = spec.stem();
            rows.push(proportion_row(
                format!("{}measured", stem),
                &measured_counts(&values),
            ));
            let above: Vec<(usize, usize)> = values
                .iter()
                .map(|v| {
                    let hit = v.iter().filter(|x| **x > threshold).count();
                    (hit, v.len() - hit)
                })
                .collect();
            rows.push(proportion_row(format!("{}> {}", stem, threshold), &above));
        }
        Ok(())
    }

    fn summarize_race(
        &self,
        name: &str,
        groups: &Groups<'_>,
        rows: &mut Vec<SummaryRow>,
    ) -> Result<()> {
        let black = groups.numeric("race_black")?;
        let other = groups.numeric("race_other")?;

        // counts[race][group]: White, Black, Other
        let mut counts = vec![vec![0.0; groups.members.len()]; 3];
        for g in 0..groups.members.len() {
            for (b, o) in black[g].iter().zip(&other[g]) {
                let race = if *b == 1.0 {
                    1
                } else if *o == 1.0 {
                    2
                } else {
                    0
                };
                counts[race][g] += 1.0;
            }
        }

        let p_value = groups
            .split()
            .then(|| chi2_contingency(&counts, false))
            .flatten()
            .map(|t| t.p_value);
        rows.push(SummaryRow::new(
            name,
            vec![String::new(); groups.members.len()],
            p_value,
        ));

        for (label, row) in ["White", "Black", "Other"].iter().zip(&counts) {
            let cells = row
                .iter()
                .enumerate()
                .map(|(g, count)| format::count_with_percent(*count as usize, groups.len(g)))
                .collect();
            rows.push(SummaryRow::new(format!("  {}", label), cells, None));
        }
        Ok(())
    }
}

fn measured_counts(values: &[Vec<f64>]) -> Vec<(usize, usize)> {
    values
        .iter()
        .map(|v| {
            let measured = v.iter().filter(|x| !x.is_nan()).count();
            (measured, v.len() - measured)
        })
        .collect()
}
