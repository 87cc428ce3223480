//! Shared types for sepsis cohort validation.
//!
//! This crate provides the vocabulary used across `sepsis-core`:
//! - Subject-aligned label, score and mask vectors
//! - Named prediction sets and broadcastable targets
//! - The unified error type
//! - Output format specifications

pub mod error;
pub mod labels;
pub mod output;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError};
pub use labels::{LabelVector, NamedPrediction, PredictionSet, ScoreVector, SubgroupMask, Targets};
pub use output::OutputFormat;
