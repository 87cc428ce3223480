//! Configuration loading and validation for sepsis-core.
//!
//! This module handles:
//! - Loading the analysis config (`config.json`)
//! - Config resolution order (CLI > env > XDG > defaults)
//! - Semantic validation (levels in range, positive iteration counts)
//! - Config snapshots recording which file (and which bytes) produced a report

pub mod validate;

pub use validate::{validate_config, ValidationError};

use crate::data::DataSourceConfig;
use crate::demographics::{default_variables, VariableSpec};
use crate::model::ExternalModelConfig;
use sepsis_common::Error;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "sepsis_stats";

const CONFIG_FILE_NAME: &str = "config.json";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ValidationError(_) | ConfigError::VersionMismatch { .. } => {
                Error::InvalidConfig(err.to_string())
            }
            other => Error::Config(other.to_string()),
        }
    }
}

/// Everything an analysis run can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub schema_version: String,
    pub stats: StatsConfig,
    pub report: ReportConfig,
    /// Default cohort source; `--data` overrides the path.
    pub data: Option<DataSourceConfig>,
    pub model: ModelConfig,
    pub demographics: DemographicsConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            stats: StatsConfig::default(),
            report: ReportConfig::default(),
            data: None,
            model: ModelConfig::default(),
            demographics: DemographicsConfig::default(),
        }
    }
}

/// Interval levels and bootstrap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Two-sided significance level for every interval.
    pub alpha: f64,
    /// Bootstrap replicates per agreement cell.
    pub bootstrap_iterations: usize,
    /// Fixed seed for reproducible bootstrap intervals; `None` draws one.
    pub bootstrap_seed: Option<u64>,
    /// Lower and upper percentile (0-100) of the bootstrap distribution.
    pub agreement_percentiles: [f64; 2],
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            alpha: sepsis_math::DEFAULT_ALPHA,
            bootstrap_iterations: 2000,
            bootstrap_seed: None,
            agreement_percentiles: [5.0, 95.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Field separator for delimited files.
    pub delimiter: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            delimiter: "\t".to_string(),
        }
    }
}

/// Settings for the fitted prediction strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Baseline covariates; the severity score is appended per model.
    pub covariates: Vec<String>,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub external: Option<ExternalModelConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            covariates: crate::model::DEFAULT_COVARIATES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            max_iterations: 50,
            tolerance: 1e-8,
            external: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographicsConfig {
    pub variables: Vec<VariableSpec>,
}

impl Default for DemographicsConfig {
    fn default() -> Self {
        Self {
            variables: default_variables(),
        }
    }
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: AnalysisConfig,
    /// Path to the config file (None if using defaults).
    pub path: Option<PathBuf>,
    /// SHA-256 hash of the config file content (None if using defaults).
    pub hash: Option<String>,
}

impl ResolvedConfig {
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            path: self.path.clone(),
            hash: self.hash.clone(),
            schema_version: self.config.schema_version.clone(),
        }
    }
}

/// Config provenance attached to structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub path: Option<PathBuf>,
    pub hash: Option<String>,
    pub schema_version: String,
}

/// Configuration resolution options.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit CLI flag (via ConfigOptions)
/// 2. Environment variable (SEPSIS_CONFIG)
/// 3. XDG config home (~/.config/sepsis_stats/config.json), if present
/// 4. Built-in defaults
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    load_config_with(options, |key| std::env::var(key).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with<F>(options: &ConfigOptions, env: F) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let explicit = options
        .config_path
        .clone()
        .or_else(|| env("SEPSIS_CONFIG").map(PathBuf::from));

    let resolved = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound { path });
            }
            load_config_file(&path)?
        }
        None => {
            let default_path = xdg_config_dir(&env).join(CONFIG_FILE_NAME);
            if default_path.exists() {
                load_config_file(&default_path)?
            } else {
                ResolvedConfig {
                    config: AnalysisConfig::default(),
                    path: None,
                    hash: None,
                }
            }
        }
    };

    validate_config(&resolved.config)?;
    Ok(resolved)
}

fn xdg_config_dir<F>(env: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(CONFIG_DIR_NAME)
}

/// Load and version-check a single config file.
pub fn load_config_file(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let hash = compute_hash(&content);

    let config: AnalysisConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::VersionMismatch {
            expected: CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    Ok(ResolvedConfig {
        config,
        path: Some(path.to_path_buf()),
        hash: Some(hash),
    })
}

/// SHA-256 of the file content, hex encoded.
fn compute_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
