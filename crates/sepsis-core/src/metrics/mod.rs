//! Diagnostic-performance metrics for thresholded predictions.
//!
//! [`compute_stats`] builds the confusion matrices; [`MetricsReporter`] adds
//! exact intervals and writes the table to the console or a delimited file.

pub mod confusion;
pub mod report;

pub use confusion::{compute_stats, ConfusionCounts, DerivedRates, Stat, StatsTable};
pub use report::{render_confusion_matrix, MetricsReporter, ReportTarget, FILE_COLUMNS};
