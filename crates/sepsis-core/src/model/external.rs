//! Predictions produced by an external fitting program.
//!
//! The program is called as
//!
//! ```text
//! <program> [args...] <input.csv> <output.csv> <target> [<covariate>]
//! ```
//!
//! in a scratch directory holding the cohort as `input.csv`. It must write
//! one prediction per row in the first column of `output.csv` (with a header
//! line); `NA` or an empty field is read as missing. Leaving out the covariate
//! asks for a baseline model.

use super::PredictionModel;
use crate::data::{Column, Dataset};
use sepsis_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};
use uuid::Uuid;

/// Longest stderr excerpt carried into an error.
const STDERR_EXCERPT: usize = 400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalModelConfig {
    /// Program to run (looked up on PATH when relative).
    pub program: PathBuf,
    /// Arguments placed before the file names.
    pub args: Vec<String>,
    /// Parent of the per-run scratch directory; the system temp dir if unset.
    pub work_dir: Option<PathBuf>,
    pub input_file: String,
    pub output_file: String,
}

impl Default for ExternalModelConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::new(),
            args: Vec::new(),
            work_dir: None,
            input_file: "sepsis3-design-matrix.csv".to_string(),
            output_file: "sepsis3-preds.csv".to_string(),
        }
    }
}

/// Scratch directory removed when dropped.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(parent: &Path) -> Result<Self> {
        let path = parent.join(format!("sepsis-model-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Write every column of `data` as CSV; missing values are `NA`.
pub fn write_design_matrix(data: &Dataset, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let names = data.column_names();
    let header: Vec<String> = names.iter().map(|n| csv_field(n)).collect();
    writeln!(out, "{}", header.join(","))?;

    let columns = names
        .iter()
        .map(|n| data.column(n))
        .collect::<Result<Vec<_>>>()?;
    for row in 0..data.n_rows() {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| match column {
                Column::Numeric(values) if values[row].is_nan() => "NA".to_string(),
                Column::Numeric(values) => values[row].to_string(),
                Column::Text(values) => values[row]
                    .as_deref()
                    .map_or_else(|| "NA".to_string(), csv_field),
                Column::Timestamp(values) => values[row].map_or_else(
                    || "NA".to_string(),
                    |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
                ),
            })
            .collect();
        writeln!(out, "{}", cells.join(","))?;
    }
    out.flush()?;
    Ok(())
}

/// First column of a CSV file with a header line.
fn read_first_column(path: &Path) -> std::result::Result<Vec<f64>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            let field = line.split(',').next().unwrap_or("").trim().trim_matches('"');
            if field.is_empty() || field.eq_ignore_ascii_case("NA") {
                Ok(f64::NAN)
            } else {
                field
                    .parse::<f64>()
                    .map_err(|_| format!("line {}: '{}' is not a number", i + 2, field))
            }
        })
        .collect()
}

/// Runs a configured program to fit each model.
#[derive(Debug, Clone)]
pub struct ExternalCommandModel {
    config: ExternalModelConfig,
}

impl ExternalCommandModel {
    pub fn new(config: ExternalModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExternalModelConfig {
        &self.config
    }

    fn failure(&self, target: &str, reason: impl Into<String>) -> Error {
        Error::ModelFit {
            model: self.name().to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

impl PredictionModel for ExternalCommandModel {
    fn name(&self) -> &str {
        "external"
    }

    fn predict(&self, data: &Dataset, target: &str, covariate: Option<&str>) -> Result<Vec<f64>> {
        let parent = self
            .config
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let scratch = ScratchDir::create(&parent)?;
        let input = scratch.path.join(&self.config.input_file);
        let output = scratch.path.join(&self.config.output_file);
        write_design_matrix(data, &input)?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&input)
            .arg(&output)
            .arg(target)
            .args(covariate)
            .current_dir(&scratch.path)
            .stdin(Stdio::null());
        info!(
            program = %self.config.program.display(),
            outcome = %target,
            covariate = covariate.unwrap_or("-"),
            "running external model"
        );

        let result = command
            .output()
            .map_err(|e| self.failure(target, format!("cannot start program: {}", e)))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(self.failure(
                target,
                format!("program exited with {}: {}", result.status, excerpt),
            ));
        }

        let predictions = read_first_column(&output).map_err(|reason| self.failure(target, reason))?;
        if predictions.len() != data.n_rows() {
            return Err(self.failure(
                target,
                format!(
                    "program returned {} predictions for {} rows",
                    predictions.len(),
                    data.n_rows()
                ),
            ));
        }
        debug!(rows = predictions.len(), "read external predictions");
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort() -> Dataset {
        Dataset::new()
            .with_column("sofa", Column::Numeric(vec![1.0, f64::NAN, 3.5]))
            .unwrap()
            .with_column(
                "gender",
                Column::Text(vec![Some("M".into()), None, Some("a,b".into())]),
            )
            .unwrap()
    }

    #[test]
    fn design_matrix_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.csv");
        write_design_matrix(&cohort(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "sofa,gender\n1,M\nNA,NA\n3.5,\"a,b\"\n");
    }

    #[test]
    fn first_column_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preds.csv");
        fs::write(&path, "pred,other\n0.25,x\nNA,y\n\"0.5\",z\n,w\n").unwrap();
        let values = read_first_column(&path).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values[0], 0.25);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 0.5);
        assert!(values[3].is_nan());

        fs::write(&path, "pred\nhigh\n").unwrap();
        assert!(read_first_column(&path).unwrap_err().contains("line 2"));
    }

    #[cfg(unix)]
    fn shell_model(script: &str, work_dir: &Path) -> ExternalCommandModel {
        ExternalCommandModel::new(ExternalModelConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            work_dir: Some(work_dir.to_path_buf()),
            ..ExternalModelConfig::default()
        })
    }

    #[cfg(unix)]
    #[test]
    fn round_trips_through_the_program() {
        let dir = tempfile::tempdir().unwrap();
        // echo the input back: its first column is the sofa score
        let model = shell_model(r#"cp "$1" "$2""#, dir.path());
        let preds = model.predict(&cohort(), "died", Some("sofa")).unwrap();
        assert_eq!(preds[0], 1.0);
        assert!(preds[1].is_nan());
        assert_eq!(preds[2], 3.5);

        // scratch directory is gone
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn passes_target_and_covariate() {
        let dir = tempfile::tempdir().unwrap();
        let model = shell_model(
            r#"[ "$3" = died ] && [ "$4" = sofa ] && printf 'p\n1\n2\n3\n' > "$2""#,
            dir.path(),
        );
        assert_eq!(
            model.predict(&cohort(), "died", Some("sofa")).unwrap(),
            vec![1.0, 2.0, 3.0]
        );
        // baseline call has no fourth argument
        let baseline = shell_model(
            r#"[ -z "$4" ] && printf 'p\n0\n0\n0\n' > "$2""#,
            dir.path(),
        );
        assert!(baseline.predict(&cohort(), "died", None).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn failures_are_model_errors() {
        let dir = tempfile::tempdir().unwrap();
        let failing = shell_model("echo broken >&2; exit 3", dir.path());
        let err = failing.predict(&cohort(), "died", Some("sofa")).unwrap_err();
        assert!(err.is_skippable());
        assert!(err.to_string().contains("broken"));

        let short = shell_model(r#"printf 'p\n1\n' > "$2""#, dir.path());
        let err = short.predict(&cohort(), "died", None).unwrap_err();
        assert!(err.to_string().contains("1 predictions for 3 rows"));

        let missing = ExternalCommandModel::new(ExternalModelConfig {
            program: PathBuf::from("/nonexistent/fit-model"),
            work_dir: Some(dir.path().to_path_buf()),
            ..ExternalModelConfig::default()
        });
        assert!(matches!(
            missing.predict(&cohort(), "died", None),
            Err(Error::ModelFit { .. })
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
