//! Cohort data access.
//!
//! The statistics never see storage: they work on a [`Dataset`], an ordered
//! set of equally long typed columns, obtained from a [`DataSource`]. The
//! bundled source reads JSON or JSON-Lines exports of the cohort table.

pub mod covariates;
pub mod file;
pub mod filter;

pub use covariates::derive_covariates;
pub use file::{DataFormat, DataSourceConfig, FileDataSource};
pub use filter::{Comparison, Condition, FilterValue, RowFilter};

use chrono::NaiveDateTime;
use sepsis_common::{Error, LabelVector, Result, ScoreVector, SubgroupMask};

/// Anything that can produce the cohort table.
pub trait DataSource {
    /// Fetch every row matching `filter` (all rows when `None`), in source
    /// order.
    fn fetch(&self, filter: Option<&RowFilter>) -> Result<Dataset>;
}

/// One typed column. Missing numeric values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Text(values) => values.len(),
            Column::Timestamp(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Text(_) => "text",
            Column::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Numeric(values) => values.get(row).map_or(true, |v| v.is_nan()),
            Column::Text(values) => values.get(row).map_or(true, Option::is_none),
            Column::Timestamp(values) => values.get(row).map_or(true, Option::is_none),
        }
    }

    /// Keep the rows where `keep` is true.
    pub fn select(&self, keep: &[bool]) -> Column {
        fn pick<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| v.clone())
                .collect()
        }
        match self {
            Column::Numeric(values) => Column::Numeric(pick(values, keep)),
            Column::Text(values) => Column::Text(pick(values, keep)),
            Column::Timestamp(values) => Column::Timestamp(pick(values, keep)),
        }
    }

    /// Reorder rows by `order` (a permutation of row indices).
    pub fn reorder(&self, order: &[usize]) -> Column {
        match self {
            Column::Numeric(values) => Column::Numeric(order.iter().map(|i| values[*i]).collect()),
            Column::Text(values) => Column::Text(order.iter().map(|i| values[*i].clone()).collect()),
            Column::Timestamp(values) => {
                Column::Timestamp(order.iter().map(|i| values[*i]).collect())
            }
        }
    }
}

/// Ordered named columns of equal length; one row per subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<(String, Column)>,
    rows: usize,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Dataset::insert`].
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.insert(name, column)?;
        Ok(self)
    }

    /// Adds or replaces a column. The first column fixes the row count.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(Error::dimension(
                format!("column '{}'", name),
                self.rows,
                column.len(),
            ));
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name, column)),
        }
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| Error::MissingColumn {
                column: name.to_string(),
            })
    }

    /// A numeric column; text and timestamp columns are rejected.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Numeric(values) => Ok(values),
            other => Err(Error::DataAccess(format!(
                "column '{}' is {}, expected numeric",
                name,
                other.kind()
            ))),
        }
    }

    pub fn text(&self, name: &str) -> Result<&[Option<String>]> {
        match self.column(name)? {
            Column::Text(values) => Ok(values),
            other => Err(Error::DataAccess(format!(
                "column '{}' is {}, expected text",
                name,
                other.kind()
            ))),
        }
    }

    /// Outcome labels from an indicator column (`== 1`).
    pub fn labels(&self, name: &str) -> Result<LabelVector> {
        Ok(LabelVector::from_indicator(self.numeric(name)?))
    }

    pub fn scores(&self, name: &str) -> Result<ScoreVector> {
        Ok(ScoreVector::new(self.numeric(name)?.to_vec()))
    }

    /// Subgroup mask from an indicator column (`== 1`).
    pub fn mask(&self, name: &str) -> Result<SubgroupMask> {
        Ok(SubgroupMask::from_indicator(self.numeric(name)?))
    }

    /// Keep the rows where `keep` is true.
    pub fn select_rows(&self, keep: &[bool]) -> Result<Dataset> {
        if keep.len() != self.rows {
            return Err(Error::dimension("row selection", self.rows, keep.len()));
        }
        Ok(Dataset {
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.select(keep)))
                .collect(),
            rows: keep.iter().filter(|k| **k).count(),
        })
    }

    /// Stable ascending sort of all rows by a numeric column; NaN sorts last.
    pub fn sort_by(&self, name: &str) -> Result<Dataset> {
        let key = self.numeric(name)?;
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by(|a, b| key[*a].total_cmp(&key[*b]));
        Ok(Dataset {
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.reorder(&order)))
                .collect(),
            rows: self.rows,
        })
    }
}
