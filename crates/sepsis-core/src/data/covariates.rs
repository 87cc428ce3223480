//! Covariates derived from raw cohort columns.

use super::{Column, Dataset};
use sepsis_common::Result;

const BLACK: [&str; 4] = [
    "BLACK/AFRICAN AMERICAN",
    "BLACK/CAPE VERDEAN",
    "BLACK/HAITIAN",
    "BLACK/AFRICAN",
];

const WHITE: [&str; 5] = [
    "WHITE",
    "WHITE - RUSSIAN",
    "WHITE - OTHER EUROPEAN",
    "WHITE - BRAZILIAN",
    "WHITE - EASTERN EUROPEAN",
];

/// Adds `race_black` and `race_other` (from `ethnicity`) and `is_male` (from
/// `gender`) as 0/1 numeric columns. Source columns that are absent or not
/// text are skipped. An unknown or missing ethnicity counts as "other".
pub fn derive_covariates(data: &mut Dataset) -> Result<()> {
    let race = data.text("ethnicity").ok().map(|ethnicity| {
        let black: Vec<f64> = ethnicity
            .iter()
            .map(|e| indicator(e.as_deref().is_some_and(|e| BLACK.contains(&e))))
            .collect();
        let other: Vec<f64> = ethnicity
            .iter()
            .map(|e| {
                let e = e.as_deref().unwrap_or_default();
                indicator(!BLACK.contains(&e) && !WHITE.contains(&e))
            })
            .collect();
        (black, other)
    });
    let male = data.text("gender").ok().map(|gender| {
        gender
            .iter()
            .map(|g| indicator(g.as_deref() == Some("M")))
            .collect::<Vec<f64>>()
    });

    if let Some((black, other)) = race {
        data.insert("race_black", Column::Numeric(black))?;
        data.insert("race_other", Column::Numeric(other))?;
    }
    if let Some(male) = male {
        data.insert("is_male", Column::Numeric(male))?;
    }
    Ok(())
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
