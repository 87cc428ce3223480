//! Sepsis Validation Core Library
//!
//! This library provides the statistics behind a sepsis cohort validation
//! study:
//! - Exit codes for CLI operations
//! - Configuration loading and validation
//! - Cohort data access and row filtering
//! - Confusion metrics with exact binomial intervals
//! - AUROC, agreement and paired DeLong comparisons
//! - Fitted prediction models and cohort summaries
//!
//! The binary entry point is in `main.rs`.

pub mod auroc;
pub mod cli;
pub mod config;
pub mod data;
pub mod demographics;
pub mod exit_codes;
pub mod format;
pub mod logging;
pub mod metrics;
pub mod model;
