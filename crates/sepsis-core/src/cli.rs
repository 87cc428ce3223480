//! Command implementations behind the `sepsis-core` binary.
//!
//! Each `run_*` function loads the cohort, computes one report and writes it
//! to the given writer (stdout in the binary). Argument structs live here so
//! the commands can be driven without spawning a process.

use crate::auroc::AurocComparisonTable;
use crate::config::ResolvedConfig;
use crate::data::{DataSource, Dataset, FileDataSource, RowFilter};
use crate::demographics::DescriptiveSummary;
use crate::metrics::{compute_stats, render_confusion_matrix, MetricsReporter, ReportTarget, Stat};
use crate::model::{
    baseline_prediction, calc_predictions, ExternalCommandModel, LogisticModel, PredictionModel,
    PredictionStrategy,
};
use clap::{Args, ValueEnum};
use sepsis_common::{Error, OutputFormat, Result, Targets};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Version of the JSON documents written with `--format json`.
pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

/// Name given to the covariate-only model in the AUROC table.
pub const BASELINE_NAME: &str = "baseline";

/// Default cut-off for `--pred` columns without an explicit one.
pub const DEFAULT_THRESHOLD: f64 = 1.0;

/// A binary prediction taken from a score column: `column` or
/// `column:threshold`. Subjects with a score at or above the threshold are
/// predicted positive.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSpec {
    pub column: String,
    pub threshold: Option<f64>,
}

impl PredictionSpec {
    pub fn threshold_or_default(&self) -> f64 {
        self.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Column heading used in reports.
    pub fn label(&self) -> String {
        match self.threshold {
            Some(t) => format!("{}>={}", self.column, t),
            None => self.column.clone(),
        }
    }
}

impl FromStr for PredictionSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (column, threshold) = match s.rsplit_once(':') {
            Some((column, value)) => {
                let t = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("invalid threshold '{}' in '{}'", value, s))?;
                if !t.is_finite() {
                    return Err(format!("threshold in '{}' must be finite", s));
                }
                (column.trim(), Some(t))
            }
            None => (s.trim(), None),
        };
        if column.is_empty() {
            return Err(format!("missing column name in '{}'", s));
        }
        Ok(Self {
            column: column.to_string(),
            threshold,
        })
    }
}

/// How `auc` turns score columns into predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ModelChoice {
    /// Compare the columns as they are
    #[default]
    Raw,
    /// Built-in logistic regression on the baseline covariates plus each score
    Logreg,
    /// The program configured under `model.external`
    External,
}

/// Arguments for `ops`.
#[derive(Args, Debug, Clone)]
pub struct OpsArgs {
    /// Cohort export (JSON array or JSON lines); overrides `data.path`
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Outcome column (1 = event)
    #[arg(long)]
    pub target: String,

    /// Prediction as COLUMN or COLUMN:THRESHOLD (repeatable)
    #[arg(long = "pred", required = true, num_args = 1..)]
    pub predictions: Vec<PredictionSpec>,

    /// Indicator column restricting every prediction to a subgroup
    #[arg(long)]
    pub subgroup: Option<String>,

    /// Also write the table to this delimited file
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Print a 2x2 confusion matrix per prediction
    #[arg(long)]
    pub matrix: bool,
}

/// Arguments for `auc`.
#[derive(Args, Debug, Clone)]
pub struct AucArgs {
    /// Cohort export (JSON array or JSON lines); overrides `data.path`
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Outcome column (1 = event)
    #[arg(long)]
    pub target: String,

    /// Score columns to compare (repeatable)
    #[arg(long = "pred", required = true, num_args = 1..)]
    pub predictions: Vec<String>,

    /// How scores become predictions
    #[arg(long, value_enum, default_value_t = ModelChoice::Raw)]
    pub model: ModelChoice,

    /// Add the covariate-only model as the first row (fitted models only)
    #[arg(long)]
    pub baseline: bool,

    /// Also write the table to this delimited file
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Bootstrap seed; overrides `stats.bootstrap_seed`
    #[arg(long)]
    pub seed: Option<u64>,

    /// Bootstrap replicates; overrides `stats.bootstrap_iterations`
    #[arg(long)]
    pub iterations: Option<usize>,
}

/// Arguments for `demographics`.
#[derive(Args, Debug, Clone)]
pub struct DemographicsArgs {
    /// Cohort export (JSON array or JSON lines); overrides `data.path`
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Indicator column splitting the cohort into two compared groups
    #[arg(long)]
    pub split: Option<String>,
}

/// State shared by every command of one invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: ResolvedConfig,
    pub filter: Option<RowFilter>,
    pub format: OutputFormat,
    pub run_id: String,
}

impl RunContext {
    pub fn new(config: ResolvedConfig, run_id: impl Into<String>) -> Self {
        Self {
            config,
            filter: None,
            format: OutputFormat::Text,
            run_id: run_id.into(),
        }
    }

    pub fn with_filter(mut self, filter: Option<RowFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Read the cohort named by `path`, or by `data.path` in the config.
    pub fn load_dataset(&self, path: Option<&Path>) -> Result<Dataset> {
        let mut source = self.config.config.data.clone().unwrap_or_default();
        if let Some(path) = path {
            source.path = path.to_path_buf();
        }
        if source.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "no cohort file: pass --data or set data.path".to_string(),
            ));
        }
        let data = FileDataSource::new(source).fetch(self.filter.as_ref())?;
        info!(rows = data.n_rows(), columns = data.n_columns(), "loaded cohort");
        Ok(data)
    }

    fn write_json(&self, command: &str, result: serde_json::Value, out: &mut dyn Write) -> Result<()> {
        let document = serde_json::json!({
            "schema_version": OUTPUT_SCHEMA_VERSION,
            "run_id": self.run_id,
            "command": command,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "config": self.config.snapshot(),
            "filter": self.filter.as_ref().map(|f| f.to_string()),
            "result": result,
        });
        serde_json::to_writer_pretty(&mut *out, &document)?;
        writeln!(out)?;
        Ok(())
    }
}

/// Operating characteristics of thresholded predictions.
pub fn run_ops(ctx: &RunContext, args: &OpsArgs, out: &mut dyn Write) -> Result<()> {
    let data = ctx.load_dataset(args.data.as_deref())?;
    let target = data.labels(&args.target)?;

    let mut names = Vec::with_capacity(args.predictions.len());
    let mut predictions = Vec::with_capacity(args.predictions.len());
    for spec in &args.predictions {
        let scores = data.scores(&spec.column)?;
        predictions.push(scores.threshold(spec.threshold_or_default()));
        names.push(spec.label());
    }

    let subgroups = match &args.subgroup {
        Some(column) => {
            let mask = data.mask(column)?;
            info!(subgroup = %column, selected = mask.selected(), "restricting to subgroup");
            Some(vec![mask; predictions.len()])
        }
        None => None,
    };

    let targets = Targets::Single(target.clone());
    let table = compute_stats(&predictions, &targets, subgroups.as_deref())?;
    let settings = &ctx.config.config;
    let reporter = MetricsReporter::new(settings.stats.alpha, settings.report.delimiter.clone());

    if let Some(path) = &args.out {
        reporter.render(&table, &names, ReportTarget::Delimited(path))?;
        info!(path = %path.display(), "wrote statistics file");
    }

    match ctx.format {
        OutputFormat::Text => {
            reporter.render(&table, &names, ReportTarget::Console(&mut *out))?;
            if args.matrix {
                for (name, predicted) in names.iter().zip(&predictions) {
                    render_confusion_matrix(
                        &target,
                        predicted,
                        (args.target.as_str(), name.as_str()),
                        &mut *out,
                    )?;
                }
            }
        }
        OutputFormat::Json => {
            let mut columns = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                let counts = table.columns()[i];
                let mut intervals = serde_json::Map::new();
                for stat in Stat::ALL.iter().copied().filter(|s| s.is_proportion()) {
                    intervals.insert(
                        stat.label().to_string(),
                        serde_json::to_value(reporter.interval(&counts, stat)?)?,
                    );
                }
                columns.push(serde_json::json!({
                    "name": name,
                    "counts": counts,
                    "total": counts.total(),
                    "rates": counts.rates(),
                    "intervals": intervals,
                }));
            }
            let result = serde_json::json!({
                "target": args.target,
                "subgroup": args.subgroup,
                "alpha": settings.stats.alpha,
                "columns": columns,
            });
            ctx.write_json("ops", result, out)?;
        }
    }
    Ok(())
}

/// AUROC, agreement and paired comparison table.
pub fn run_auc(ctx: &RunContext, args: &AucArgs, out: &mut dyn Write) -> Result<()> {
    let settings = &ctx.config.config;
    let data = ctx.load_dataset(args.data.as_deref())?;
    let target = data.labels(&args.target)?;

    let logistic;
    let external;
    let model: Option<&dyn PredictionModel> = match args.model {
        ModelChoice::Raw => None,
        ModelChoice::Logreg => {
            logistic = LogisticModel::from_config(&settings.model);
            Some(&logistic as &dyn PredictionModel)
        }
        ModelChoice::External => {
            let command = settings.model.external.clone().ok_or_else(|| {
                Error::InvalidConfig("--model external needs model.external in the config".to_string())
            })?;
            external = ExternalCommandModel::new(command);
            Some(&external as &dyn PredictionModel)
        }
    };
    let strategy = match model {
        Some(model) => PredictionStrategy::Model(model),
        None => PredictionStrategy::Raw,
    };

    let mut predictions = calc_predictions(&data, &args.predictions, &args.target, strategy)?;
    let mut names = Vec::with_capacity(args.predictions.len() + 1);
    match (args.baseline, model) {
        (true, Some(model)) => {
            names.push(BASELINE_NAME.to_string());
            match baseline_prediction(&data, &args.target, model) {
                Ok(scores) => predictions.insert(BASELINE_NAME, scores)?,
                Err(err) if err.is_skippable() => {
                    warn!(code = err.code(), error = %err, "baseline model failed; row left blank");
                }
                Err(err) => return Err(err),
            }
        }
        (true, None) => warn!("--baseline has no effect with --model raw"),
        _ => {}
    }
    names.extend(args.predictions.iter().cloned());

    let mut builder = AurocComparisonTable::from_config(&settings.stats);
    if let Some(seed) = args.seed {
        builder = builder.with_seed(seed);
    }
    if let Some(iterations) = args.iterations {
        builder = builder.with_iterations(iterations);
    }
    let table = builder.compute(&predictions, &target, &names)?;

    if let Some(path) = &args.out {
        table.render(ReportTarget::Delimited(path), &settings.report.delimiter)?;
        info!(path = %path.display(), "wrote AUROC table");
    }

    match ctx.format {
        OutputFormat::Text => table.render(ReportTarget::Console(out), &settings.report.delimiter),
        OutputFormat::Json => {
            let result = serde_json::json!({
                "target": args.target,
                "model": format!("{:?}", args.model).to_lowercase(),
                "table": table,
            });
            ctx.write_json("auc", result, out)
        }
    }
}

/// Cohort characteristics, optionally compared across two groups.
pub fn run_demographics(ctx: &RunContext, args: &DemographicsArgs, out: &mut dyn Write) -> Result<()> {
    let data = ctx.load_dataset(args.data.as_deref())?;
    let split = args.split.as_deref().map(|c| data.mask(c)).transpose()?;

    let summary = DescriptiveSummary::new(ctx.config.config.demographics.variables.clone());
    let table = summary.summarize(&data, split.as_ref())?;

    match ctx.format {
        OutputFormat::Text => table.render(out),
        OutputFormat::Json => {
            let result = serde_json::json!({
                "split": args.split,
                "rows": data.n_rows(),
                "table": table,
            });
            ctx.write_json("demographics", result, out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_spec_parsing() {
        let plain: PredictionSpec = "sofa".parse().unwrap();
        assert_eq!(plain.column, "sofa");
        assert_eq!(plain.threshold, None);
        assert_eq!(plain.threshold_or_default(), 1.0);
        assert_eq!(plain.label(), "sofa");

        let cut: PredictionSpec = "qsofa:2".parse().unwrap();
        assert_eq!(cut.column, "qsofa");
        assert_eq!(cut.threshold, Some(2.0));
        assert_eq!(cut.label(), "qsofa>=2");

        assert!("sofa:high".parse::<PredictionSpec>().is_err());
        assert!(":2".parse::<PredictionSpec>().is_err());
        assert!("sofa:inf".parse::<PredictionSpec>().is_err());
    }

    #[test]
    fn missing_data_path_is_a_config_error() {
        let ctx = RunContext::new(
            ResolvedConfig {
                config: Default::default(),
                path: None,
                hash: None,
            },
            "run-test",
        );
        assert!(matches!(ctx.load_dataset(None), Err(Error::InvalidConfig(_))));
    }
}
