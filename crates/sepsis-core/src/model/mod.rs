//! Turning cohort columns into named predictions.
//!
//! Severity scores can be compared directly (`Raw`) or through a fitted model
//! that adjusts each score for baseline covariates (`Model`). Model fitting
//! sits behind [`PredictionModel`], so the built-in logistic regression and an
//! external fitting program are interchangeable.

pub mod external;
pub mod logistic;

pub use external::{write_design_matrix, ExternalCommandModel, ExternalModelConfig};
pub use logistic::{LogisticFit, LogisticModel};

use crate::data::Dataset;
use sepsis_common::{Error, PredictionSet, Result, ScoreVector};
use tracing::{info, warn};

/// Baseline covariates every adjusted model includes.
pub const DEFAULT_COVARIATES: &[&str] = &[
    "age",
    "elixhauser_hospital",
    "race_black",
    "race_other",
    "is_male",
];

/// Fits `target ~ baseline [+ covariate]` and returns one probability per row
/// (NaN where the row could not be scored).
pub trait PredictionModel {
    fn name(&self) -> &str;

    fn predict(&self, data: &Dataset, target: &str, covariate: Option<&str>) -> Result<Vec<f64>>;
}

/// How [`calc_predictions`] obtains scores.
#[derive(Clone, Copy)]
pub enum PredictionStrategy<'a> {
    /// Use each column as it is.
    Raw,
    /// Fit one model per column, with the column as the extra covariate.
    Model(&'a dyn PredictionModel),
}

impl std::fmt::Debug for PredictionStrategy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionStrategy::Raw => write!(f, "Raw"),
            PredictionStrategy::Model(model) => write!(f, "Model({})", model.name()),
        }
    }
}

/// Whether a failed prediction should be skipped rather than abort the run.
fn skippable(err: &Error) -> bool {
    err.is_skippable() || matches!(err, Error::MissingColumn { .. })
}

/// Predictions for each of `headers`, in order. Columns that are absent, and
/// models that fail to fit, are logged and left out of the set.
pub fn calc_predictions(
    data: &Dataset,
    headers: &[String],
    target: &str,
    strategy: PredictionStrategy<'_>,
) -> Result<PredictionSet> {
    let mut set = PredictionSet::new();
    for header in headers {
        let scores = match strategy {
            PredictionStrategy::Raw => data.scores(header),
            PredictionStrategy::Model(model) => model
                .predict(data, target, Some(header))
                .map(ScoreVector::new),
        };
        match scores {
            Ok(scores) => set.insert(header.clone(), scores)?,
            Err(err) if skippable(&err) => {
                warn!(prediction = %header, code = err.code(), error = %err, "skipping prediction");
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        strategy = ?strategy,
        requested = headers.len(),
        produced = set.len(),
        "calculated predictions"
    );
    Ok(set)
}

/// The baseline model without any severity score.
pub fn baseline_prediction(data: &Dataset, target: &str, model: &dyn PredictionModel) -> Result<ScoreVector> {
    model.predict(data, target, None).map(ScoreVector::new)
}
