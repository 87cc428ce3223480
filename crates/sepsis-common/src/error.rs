//! Error types for sepsis cohort validation.
//!
//! Every error carries:
//! - a stable numeric code, grouped by category
//! - a short headline and a remediation hint for humans
//! - a [`StructuredError`] form for machine consumers
//!
//! Undefined rates (0/0 and friends) are *not* errors. They travel as
//! `f64::NAN` and are rendered as blank cells, so one degenerate subgroup never
//! aborts a whole report.
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Dimension Mismatch
//!   Reason: dimension mismatch: prediction 'sofa' has 812 rows, target has 815
//!   Fix: Check that every prediction, target and subgroup mask comes from the same rows.
//! ```

use sepsis_math::IntervalError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for sepsis validation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration loading and validation.
    Config,
    /// Dataset access and column lookups.
    Data,
    /// Statistical preconditions (shapes, proportions, levels).
    Stats,
    /// Prediction model fitting.
    Model,
    /// File I/O and serialization.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Data => write!(f, "data"),
            ErrorCategory::Stats => write!(f, "stats"),
            ErrorCategory::Model => write!(f, "model"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Data errors (20-29)
    #[error("data access failed: {0}")]
    DataAccess(String),

    #[error("column '{column}' not found in dataset")]
    MissingColumn { column: String },

    #[error("duplicate prediction name '{name}'")]
    DuplicateName { name: String },

    // Statistical errors (30-39)
    #[error("invalid proportion {numerator}/{denominator}")]
    InvalidProportion { numerator: u64, denominator: u64 },

    #[error("dimension mismatch: {what} has {actual} rows, expected {expected}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("significance level {0} is outside (0, 1)")]
    InvalidAlpha(f64),

    // Model errors (40-49)
    #[error("model '{model}' failed for '{target}': {reason}")]
    ModelFit {
        model: String,
        target: String,
        reason: String,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<IntervalError> for Error {
    fn from(err: IntervalError) -> Self {
        match err {
            IntervalError::InvalidProportion {
                numerator,
                denominator,
            } => Error::InvalidProportion {
                numerator,
                denominator,
            },
            IntervalError::InvalidAlpha(alpha) => Error::InvalidAlpha(alpha),
        }
    }
}

impl Error {
    /// Shorthand for a [`Error::DimensionMismatch`].
    pub fn dimension(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Returns the stable error code.
    ///
    /// - 10-19: configuration
    /// - 20-29: data
    /// - 30-39: statistics
    /// - 40-49: model fitting
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::DataAccess(_) => 20,
            Error::MissingColumn { .. } => 21,
            Error::DuplicateName { .. } => 22,
            Error::InvalidProportion { .. } => 30,
            Error::DimensionMismatch { .. } => 31,
            Error::InvalidAlpha(_) => 32,
            Error::ModelFit { .. } => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => ErrorCategory::Config,
            Error::DataAccess(_) | Error::MissingColumn { .. } | Error::DuplicateName { .. } => {
                ErrorCategory::Data
            }
            Error::InvalidProportion { .. }
            | Error::DimensionMismatch { .. }
            | Error::InvalidAlpha(_) => ErrorCategory::Stats,
            Error::ModelFit { .. } => ErrorCategory::Model,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether the caller may skip the affected computation and keep going.
    ///
    /// Model failures only lose one prediction; everything else invalidates
    /// the report being built.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::ModelFit { .. })
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig(_) => "Invalid Configuration",
            Error::DataAccess(_) => "Data Access Error",
            Error::MissingColumn { .. } => "Missing Column",
            Error::DuplicateName { .. } => "Duplicate Prediction Name",
            Error::InvalidProportion { .. } => "Invalid Proportion",
            Error::DimensionMismatch { .. } => "Dimension Mismatch",
            Error::InvalidAlpha(_) => "Invalid Significance Level",
            Error::ModelFit { .. } => "Model Fitting Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => {
                "Check the config file passed with --config or $SEPSIS_CONFIG."
            }
            Error::DataAccess(_) => {
                "Check that the dataset path exists and holds one JSON object per subject."
            }
            Error::MissingColumn { .. } => {
                "Check the column name against the dataset; names are case-sensitive."
            }
            Error::DuplicateName { .. } => "Give every prediction a unique name.",
            Error::InvalidProportion { .. } => {
                "The numerator must not exceed a non-zero denominator."
            }
            Error::DimensionMismatch { .. } => {
                "Check that every prediction, target and subgroup mask comes from the same rows."
            }
            Error::InvalidAlpha(_) => "Use a significance level strictly between 0 and 1.",
            Error::ModelFit { .. } => {
                "Inspect the model inputs; the prediction is skipped and the report continues."
            }
            Error::Io(_) => "Check permissions and free space for the output path.",
            Error::Json(_) => "Check the file syntax with a JSON validator.",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the affected computation can be skipped.
    pub skippable: bool,

    /// Additional structured context (column, counts, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::MissingColumn { column } => {
                context.insert("column".to_string(), serde_json::json!(column));
            }
            Error::DuplicateName { name } => {
                context.insert("name".to_string(), serde_json::json!(name));
            }
            Error::InvalidProportion {
                numerator,
                denominator,
            } => {
                context.insert("numerator".to_string(), serde_json::json!(numerator));
                context.insert("denominator".to_string(), serde_json::json!(denominator));
            }
            Error::DimensionMismatch {
                what,
                expected,
                actual,
            } => {
                context.insert("what".to_string(), serde_json::json!(what));
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::ModelFit { model, target, .. } => {
                context.insert("model".to_string(), serde_json::json!(model));
                context.insert("target".to_string(), serde_json::json!(target));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            skippable: err.is_skippable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
