//! File-backed data source for JSON and JSON-Lines cohort exports.

use super::{derive_covariates, Column, DataSource, Dataset, RowFilter};
use chrono::{NaiveDate, NaiveDateTime};
use sepsis_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Layout of the export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// One JSON object per line (default).
    #[default]
    Jsonl,
    /// A single JSON array of objects.
    Json,
}

impl DataFormat {
    /// Guess from the file extension; anything but `.json` is read as lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DataFormat::Json,
            _ => DataFormat::Jsonl,
        }
    }
}

/// Where and how to read the cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub path: PathBuf,
    /// `None` infers the layout from the extension.
    pub format: Option<DataFormat>,
    /// Columns parsed as timestamps instead of text.
    pub timestamp_columns: Vec<String>,
    /// Numeric column the rows are sorted by after loading.
    pub order_by: Option<String>,
    /// Add `race_black`, `race_other` and `is_male` when possible.
    pub derive_covariates: bool,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            format: None,
            timestamp_columns: vec![
                "suspected_infection_time".to_string(),
                "intime".to_string(),
                "outtime".to_string(),
            ],
            order_by: Some("icustay_id".to_string()),
            derive_covariates: true,
        }
    }
}

impl DataSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn resolved_format(&self) -> DataFormat {
        self.format.unwrap_or_else(|| DataFormat::from_path(&self.path))
    }
}

/// Reads the whole file on every fetch; exports are small enough.
#[derive(Debug, Clone)]
pub struct FileDataSource {
    config: DataSourceConfig,
}

impl FileDataSource {
    pub fn new(config: DataSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    fn read_records(&self) -> Result<Vec<Map<String, Value>>> {
        let path = &self.config.path;
        let file = std::fs::File::open(path)
            .map_err(|e| Error::DataAccess(format!("cannot open {}: {}", path.display(), e)))?;
        let reader = std::io::BufReader::new(file);

        match self.config.resolved_format() {
            DataFormat::Json => {
                let value: Value = serde_json::from_reader(reader).map_err(|e| {
                    Error::DataAccess(format!("{} is not valid JSON: {}", path.display(), e))
                })?;
                match value {
                    Value::Array(rows) => rows
                        .into_iter()
                        .enumerate()
                        .map(|(i, row)| into_record(row, path, i + 1))
                        .collect(),
                    _ => Err(Error::DataAccess(format!(
                        "{} must hold an array of row objects",
                        path.display()
                    ))),
                }
            }
            DataFormat::Jsonl => {
                let mut records = Vec::new();
                for (i, line) in reader.lines().enumerate() {
                    let line = line.map_err(|e| {
                        Error::DataAccess(format!("{}:{}: {}", path.display(), i + 1, e))
                    })?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let value: Value = serde_json::from_str(&line).map_err(|e| {
                        Error::DataAccess(format!("{}:{}: {}", path.display(), i + 1, e))
                    })?;
                    records.push(into_record(value, path, i + 1)?);
                }
                Ok(records)
            }
        }
    }
}

impl DataSource for FileDataSource {
    fn fetch(&self, filter: Option<&RowFilter>) -> Result<Dataset> {
        let records = self.read_records()?;
        debug!(path = %self.config.path.display(), rows = records.len(), "read cohort export");

        let mut data = records_to_dataset(&records, &self.config.timestamp_columns)?;
        if let Some(key) = &self.config.order_by {
            if data.has_column(key) {
                data = data.sort_by(key)?;
            }
        }
        if self.config.derive_covariates {
            derive_covariates(&mut data)?;
        }
        if let Some(filter) = filter {
            data = filter.apply(&data)?;
            info!(filter = %filter, rows = data.n_rows(), "applied exclusions");
        }
        Ok(data)
    }
}

fn into_record(value: Value, path: &Path, line: usize) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::DataAccess(format!(
            "{}:{}: expected a JSON object per row",
            path.display(),
            line
        ))),
    }
}

/// Turn row objects into typed columns.
///
/// A column is numeric when every present value is a number or boolean,
/// text otherwise. Columns listed in `timestamp_columns` are parsed with
/// [`parse_timestamp`]. Keys absent from a row are missing values.
pub fn records_to_dataset(
    records: &[Map<String, Value>],
    timestamp_columns: &[String],
) -> Result<Dataset> {
    let mut names: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }

    let mut data = Dataset::new();
    for name in names {
        let values: Vec<&Value> = records
            .iter()
            .map(|r| r.get(name).unwrap_or(&Value::Null))
            .collect();

        let column = if timestamp_columns.iter().any(|c| c == name) {
            timestamp_column(name, &values)?
        } else if values
            .iter()
            .all(|v| matches!(v, Value::Null | Value::Number(_) | Value::Bool(_)))
        {
            Column::Numeric(values.iter().map(|v| numeric_value(v)).collect())
        } else {
            Column::Text(values.iter().map(|v| text_value(v)).collect())
        };
        data.insert(name, column)?;
    }
    Ok(data)
}

fn numeric_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => f64::NAN,
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn timestamp_column(name: &str, values: &[&Value]) -> Result<Column> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => parse_timestamp(s).map(Some).ok_or_else(|| {
                Error::DataAccess(format!(
                    "column '{}' row {}: cannot parse '{}' as a timestamp",
                    name,
                    row + 1,
                    s
                ))
            }),
            other => Err(Error::DataAccess(format!(
                "column '{}' row {}: expected a timestamp string, got {}",
                name,
                row + 1,
                other
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(Column::Timestamp)
}

/// Parse the timestamp spellings found in database exports: ISO 8601 with `T`
/// or a space, optional fractional seconds and offset, or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
