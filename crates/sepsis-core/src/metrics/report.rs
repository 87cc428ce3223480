//! Rendering of confusion statistics with exact intervals.

use super::confusion::{ConfusionCounts, Stat, StatsTable};
use crate::format;
use sepsis_common::{Error, LabelVector, Result};
use sepsis_math::{clopper_pearson, Interval};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Header of the delimited statistics file.
pub const FILE_COLUMNS: [&str; 13] = [
    "Subgroup", "TN", "FP", "FN", "TP", "N", "Sens", "Spec", "PPV", "NPV", "F1", "NTP", "NFP",
];

/// Where a report goes.
pub enum ReportTarget<'a> {
    /// Fixed-width, tab separated text (usually stdout).
    Console(&'a mut dyn Write),
    /// Delimited file; created or truncated.
    Delimited(&'a Path),
}

/// Formats a [`StatsTable`] with Clopper-Pearson intervals on the four
/// proportions.
#[derive(Debug, Clone)]
pub struct MetricsReporter {
    alpha: f64,
    delimiter: String,
}

impl Default for MetricsReporter {
    fn default() -> Self {
        Self::new(sepsis_math::DEFAULT_ALPHA, "\t")
    }
}

impl MetricsReporter {
    pub fn new(alpha: f64, delimiter: impl Into<String>) -> Self {
        Self {
            alpha,
            delimiter: delimiter.into(),
        }
    }

    /// Interval for a proportion statistic, in percent. `None` when the
    /// statistic has no interval or its denominator is zero.
    pub fn interval(&self, counts: &ConfusionCounts, stat: Stat) -> Result<Option<Interval>> {
        match counts.proportion(stat) {
            Some((_, 0)) | None => Ok(None),
            Some((numerator, denominator)) => {
                let ci = clopper_pearson(numerator, denominator, self.alpha)?;
                Ok(Some(ci.scaled(100.0)))
            }
        }
    }

    pub fn render(&self, table: &StatsTable, names: &[String], target: ReportTarget<'_>) -> Result<()> {
        if names.len() != table.n_columns() {
            return Err(Error::dimension(
                "prediction names",
                table.n_columns(),
                names.len(),
            ));
        }
        match target {
            ReportTarget::Console(out) => self.write_console(table, names, out),
            ReportTarget::Delimited(path) => self.write_file(table, names, path),
        }
    }

    fn write_console(&self, table: &StatsTable, names: &[String], out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Metric")?;
        writeln!(out)?;
        write!(out, "{:5}", "")?;
        for name in names {
            write!(out, "\t{:20}", name)?;
        }
        writeln!(out)?;

        for stat in Stat::ALL {
            write!(out, "{:5}", stat.label())?;
            for counts in table.columns() {
                let value = counts.value(stat);
                let cell = if stat.is_count() {
                    format!("{:>5} {:10}", format::number(value, 0), "")
                } else if stat.is_proportion() {
                    format::with_interval(value, self.interval(counts, stat)?, 2)
                } else {
                    format!("{} {:12}", format::number(value, 2), "")
                };
                write!(out, "\t{}", cell)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    // The writer is owned by this frame, so an early `?` return (including a
    // solver failure mid-row) closes the file.
    fn write_file(&self, table: &StatsTable, names: &[String], path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{}", FILE_COLUMNS.join(self.delimiter.as_str()))?;

        for (name, counts) in names.iter().zip(table.columns()) {
            let mut cells = vec![name.clone()];
            for stat in &Stat::ALL[..4] {
                cells.push(format::number(counts.value(*stat), 0));
            }
            cells.push(counts.total().to_string());
            for stat in &Stat::ALL[4..] {
                let value = counts.value(*stat);
                cells.push(if stat.is_proportion() {
                    format::with_interval(value, self.interval(counts, *stat)?, 2)
                } else {
                    format::number(value, 2)
                });
            }
            writeln!(out, "{}", cells.join(self.delimiter.as_str()))?;
        }

        out.flush()?;
        debug!(path = %path.display(), rows = names.len(), "wrote statistics file");
        Ok(())
    }
}

/// Print a 2x2 confusion matrix with NPV/PPV beside the rows and
/// specificity/sensitivity/accuracy underneath.
pub fn render_confusion_matrix(
    target: &LabelVector,
    predicted: &LabelVector,
    headers: (&str, &str),
    out: &mut dyn Write,
) -> Result<()> {
    if target.len() != predicted.len() {
        return Err(Error::dimension("prediction", target.len(), predicted.len()));
    }
    let counts = ConfusionCounts::tally(target.as_slice(), predicted.as_slice(), None);
    let (y, yhat) = headers;
    let accuracy = 100.0 * (counts.tp + counts.tn) as f64 / counts.total() as f64;

    writeln!(out, "\nConfusion matrix")?;
    writeln!(out, "      \t{:6}\t{:6}", format!("{}=0", y), format!("{}=1", y))?;
    writeln!(
        out,
        "{:6}\t{:6}\t{:6}\tNPV={}",
        format!("{}=0", yhat),
        counts.tn,
        counts.fn_,
        format::number(counts.value(Stat::Npv), 2)
    )?;
    writeln!(
        out,
        "{:6}\t{:6}\t{:6}\tPPV={}",
        format!("{}=1", yhat),
        counts.fp,
        counts.tp,
        format::number(counts.value(Stat::Ppv), 2)
    )?;
    writeln!(
        out,
        "   \t{}\t{}\tAcc={}",
        format::number(counts.value(Stat::Spec), 2),
        format::number(counts.value(Stat::Sens), 2),
        format::number(accuracy, 2)
    )?;
    writeln!(out, "   \tSpec\tSens")?;
    Ok(())
}
