//! Discrimination and agreement between competing predictions.

pub mod agreement;
pub mod delong;
pub mod table;

pub use agreement::{bootstrap_alpha, cronbach_alpha, percentile, AgreementEstimate};
pub use delong::{auroc, delong_test, midranks, AucEstimate, PairedTest};
pub use table::{AurocCell, AurocComparisonTable, AurocTable};
