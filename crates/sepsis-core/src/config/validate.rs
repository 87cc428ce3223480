//! Configuration validation errors and semantic validation.

use super::{AnalysisConfig, CONFIG_SCHEMA_VERSION};
use std::collections::HashSet;
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate an analysis config semantically.
pub fn validate_config(config: &AnalysisConfig) -> ValidationResult<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    let stats = &config.stats;
    if !(stats.alpha > 0.0 && stats.alpha < 1.0) {
        return Err(invalid(
            "stats.alpha",
            format!("must be strictly between 0 and 1, got {}", stats.alpha),
        ));
    }
    if stats.bootstrap_iterations == 0 {
        return Err(invalid("stats.bootstrap_iterations", "must be at least 1"));
    }
    let [low, high] = stats.agreement_percentiles;
    if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
        return Err(invalid(
            "stats.agreement_percentiles",
            format!("need 0 <= low < high <= 100, got [{}, {}]", low, high),
        ));
    }

    let delimiter = &config.report.delimiter;
    if delimiter.is_empty() || delimiter.contains('\n') || delimiter.contains('\r') {
        return Err(invalid(
            "report.delimiter",
            "must be non-empty and must not contain a line break",
        ));
    }

    let model = &config.model;
    if model.covariates.iter().any(|c| c.trim().is_empty()) {
        return Err(invalid("model.covariates", "covariate names must be non-empty"));
    }
    if model.max_iterations == 0 {
        return Err(invalid("model.max_iterations", "must be at least 1"));
    }
    if !(model.tolerance > 0.0 && model.tolerance.is_finite()) {
        return Err(invalid("model.tolerance", "must be a positive number"));
    }
    if let Some(external) = &model.external {
        if external.program.as_os_str().is_empty() {
            return Err(invalid("model.external.program", "must name a program"));
        }
    }

    let mut seen = HashSet::new();
    for variable in &config.demographics.variables {
        if !seen.insert(variable.name.as_str()) {
            return Err(invalid(
                "demographics.variables",
                format!("'{}' is listed twice", variable.name),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate_config(&AnalysisConfig::default()).unwrap();
    }

    #[test]
    fn rejects_out_of_range_stats() {
        let mut config = AnalysisConfig::default();
        config.stats.alpha = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = AnalysisConfig::default();
        config.stats.bootstrap_iterations = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AnalysisConfig::default();
        config.stats.agreement_percentiles = [95.0, 5.0];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("agreement_percentiles"));
    }

    #[test]
    fn rejects_bad_delimiter_and_model_settings() {
        let mut config = AnalysisConfig::default();
        config.report.delimiter = "\n".into();
        assert!(validate_config(&config).is_err());

        let mut config = AnalysisConfig::default();
        config.model.tolerance = -1.0;
        assert!(validate_config(&config).is_err());

        let mut config = AnalysisConfig::default();
        config.model.covariates.push(" ".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_duplicate_demographic_rows() {
        let mut config = AnalysisConfig::default();
        let first = config.demographics.variables[1].clone();
        config.demographics.variables.push(first);
        assert!(validate_config(&config).is_err());
    }
}
