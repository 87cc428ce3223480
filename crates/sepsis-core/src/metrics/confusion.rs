//! Confusion-matrix statistics for thresholded predictions.

use sepsis_common::{Error, LabelVector, Result, SubgroupMask, Targets};
use serde::{Deserialize, Serialize};

/// The statistics reported per prediction, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Tn,
    Fp,
    Fn,
    Tp,
    Sens,
    Spec,
    Ppv,
    Npv,
    F1,
    Ntp,
    Nfp,
}

impl Stat {
    pub const ALL: [Stat; 11] = [
        Stat::Tn,
        Stat::Fp,
        Stat::Fn,
        Stat::Tp,
        Stat::Sens,
        Stat::Spec,
        Stat::Ppv,
        Stat::Npv,
        Stat::F1,
        Stat::Ntp,
        Stat::Nfp,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stat::Tn => "TN",
            Stat::Fp => "FP",
            Stat::Fn => "FN",
            Stat::Tp => "TP",
            Stat::Sens => "Sens",
            Stat::Spec => "Spec",
            Stat::Ppv => "PPV",
            Stat::Npv => "NPV",
            Stat::F1 => "F1",
            Stat::Ntp => "NTP",
            Stat::Nfp => "NFP",
        }
    }

    pub fn is_count(self) -> bool {
        matches!(self, Stat::Tn | Stat::Fp | Stat::Fn | Stat::Tp)
    }

    /// Whether the statistic is a binomial proportion with an exact interval.
    pub fn is_proportion(self) -> bool {
        matches!(self, Stat::Sens | Stat::Spec | Stat::Ppv | Stat::Npv)
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 2x2 confusion matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tn: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub tp: u64,
}

impl ConfusionCounts {
    pub fn new(tn: u64, fp: u64, fn_: u64, tp: u64) -> Self {
        Self { tn, fp, fn_, tp }
    }

    /// Count outcomes against predictions, optionally within a subgroup.
    /// Callers guarantee equal lengths.
    pub fn tally(target: &[bool], predicted: &[bool], mask: Option<&[bool]>) -> Self {
        let mut counts = Self::default();
        for (i, (&y, &yhat)) in target.iter().zip(predicted).enumerate() {
            if mask.is_some_and(|m| !m[i]) {
                continue;
            }
            match (y, yhat) {
                (false, false) => counts.tn += 1,
                (false, true) => counts.fp += 1,
                (true, false) => counts.fn_ += 1,
                (true, true) => counts.tp += 1,
            }
        }
        counts
    }

    /// N, the number of subjects evaluated.
    pub fn total(&self) -> u64 {
        self.tn + self.fp + self.fn_ + self.tp
    }

    /// `(numerator, denominator)` behind a proportion statistic.
    pub fn proportion(&self, stat: Stat) -> Option<(u64, u64)> {
        match stat {
            Stat::Sens => Some((self.tp, self.tp + self.fn_)),
            Stat::Spec => Some((self.tn, self.tn + self.fp)),
            Stat::Ppv => Some((self.tp, self.tp + self.fp)),
            Stat::Npv => Some((self.tn, self.tn + self.fn_)),
            _ => None,
        }
    }

    pub fn rates(&self) -> DerivedRates {
        DerivedRates::from_counts(self)
    }

    /// Value of any statistic; NaN when undefined.
    pub fn value(&self, stat: Stat) -> f64 {
        let rates = self.rates();
        match stat {
            Stat::Tn => self.tn as f64,
            Stat::Fp => self.fp as f64,
            Stat::Fn => self.fn_ as f64,
            Stat::Tp => self.tp as f64,
            Stat::Sens => rates.sensitivity,
            Stat::Spec => rates.specificity,
            Stat::Ppv => rates.ppv,
            Stat::Npv => rates.npv,
            Stat::F1 => rates.f1,
            Stat::Ntp => rates.ntp,
            Stat::Nfp => rates.nfp,
        }
    }
}

/// Rates derived from a confusion matrix. Sens/Spec/PPV/NPV/F1 are percent;
/// NTP/NFP are expected true/false positives per 100 subjects. A rate whose
/// denominator is zero is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedRates {
    pub sensitivity: f64,
    pub specificity: f64,
    pub ppv: f64,
    pub npv: f64,
    pub f1: f64,
    pub ntp: f64,
    pub nfp: f64,
}

impl DerivedRates {
    pub fn from_counts(counts: &ConfusionCounts) -> Self {
        let tn = counts.tn as f64;
        let fp = counts.fp as f64;
        let fn_ = counts.fn_ as f64;
        let tp = counts.tp as f64;
        let n = tn + fp + fn_ + tp;

        let sensitivity = percent(tp, tp + fn_);
        let specificity = percent(tn, tn + fp);
        let ppv = percent(tp, tp + fp);
        let npv = percent(tn, tn + fn_);
        // harmonic mean of PPV and sensitivity
        let f1 = 2.0 * (ppv * sensitivity) / (ppv + sensitivity);
        let flagged = 100.0 * (tp + fp) / n;

        Self {
            sensitivity,
            specificity,
            ppv,
            npv,
            f1,
            ntp: flagged * (ppv / 100.0),
            nfp: flagged * (1.0 - ppv / 100.0),
        }
    }
}

fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        100.0 * numerator / denominator
    }
}

/// Statistics for several predictions; one column per prediction, rows in
/// [`Stat::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsTable {
    columns: Vec<ConfusionCounts>,
}

impl StatsTable {
    pub fn from_counts(columns: Vec<ConfusionCounts>) -> Self {
        Self { columns }
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn counts(&self, column: usize) -> Option<&ConfusionCounts> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> &[ConfusionCounts] {
        &self.columns
    }

    /// Cell lookup; NaN for undefined rates, `None` for an unknown column.
    pub fn value(&self, stat: Stat, column: usize) -> Option<f64> {
        self.columns.get(column).map(|c| c.value(stat))
    }

    /// One statistic across all columns.
    pub fn row(&self, stat: Stat) -> Vec<f64> {
        self.columns.iter().map(|c| c.value(stat)).collect()
    }
}

/// Confusion statistics for each prediction against its target.
///
/// A [`Targets::Single`] outcome is shared by every prediction. When
/// `subgroups` is given, prediction `i` is evaluated only on the subjects
/// selected by `subgroups[i]`.
pub fn compute_stats(
    predictions: &[LabelVector],
    targets: &Targets,
    subgroups: Option<&[SubgroupMask]>,
) -> Result<StatsTable> {
    if let Some(count) = targets.explicit_len() {
        if count != predictions.len() {
            return Err(Error::dimension("target list", predictions.len(), count));
        }
    }
    if let Some(masks) = subgroups {
        if masks.len() != predictions.len() {
            return Err(Error::dimension("subgroup list", predictions.len(), masks.len()));
        }
    }

    let mut columns = Vec::with_capacity(predictions.len());
    for (i, prediction) in predictions.iter().enumerate() {
        let target = targets
            .for_prediction(i)
            .ok_or_else(|| Error::dimension("target list", predictions.len(), i))?;
        if target.len() != prediction.len() {
            return Err(Error::dimension(
                format!("prediction {}", i),
                target.len(),
                prediction.len(),
            ));
        }

        let mask = match subgroups {
            Some(masks) => {
                let mask = &masks[i];
                if mask.len() != target.len() {
                    return Err(Error::dimension(
                        format!("subgroup mask {}", i),
                        target.len(),
                        mask.len(),
                    ));
                }
                Some(mask.as_slice())
            }
            None => None,
        };

        columns.push(ConfusionCounts::tally(
            target.as_slice(),
            prediction.as_slice(),
            mask,
        ));
    }

    Ok(StatsTable { columns })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[u8]) -> LabelVector {
        LabelVector::from_flags(values)
    }

    #[test]
    fn balanced_matrix_gives_fifty_percent_everywhere() {
        let table = compute_stats(
            &[labels(&[1, 0, 0, 1])],
            &Targets::Single(labels(&[1, 1, 0, 0])),
            None,
        )
        .unwrap();

        assert_eq!(table.counts(0), Some(&ConfusionCounts::new(1, 1, 1, 1)));
        for stat in [Stat::Sens, Stat::Spec, Stat::Ppv, Stat::Npv, Stat::F1] {
            assert_eq!(table.value(stat, 0), Some(50.0), "{}", stat);
        }
        assert_eq!(table.value(Stat::Ntp, 0), Some(25.0));
        assert_eq!(table.value(Stat::Nfp, 0), Some(25.0));
    }

    #[test]
    fn single_target_equals_repeated_targets() {
        let y = labels(&[1, 1, 0, 0, 1, 0]);
        let preds = [labels(&[1, 0, 0, 1, 1, 0]), labels(&[1, 1, 1, 0, 0, 0])];

        let broadcast = compute_stats(&preds, &Targets::Single(y.clone()), None).unwrap();
        let repeated =
            compute_stats(&preds, &Targets::PerPrediction(vec![y.clone(), y]), None).unwrap();
        assert_eq!(broadcast, repeated);
    }

    #[test]
    fn subgroup_restricts_counts() {
        let y = labels(&[1, 1, 0, 0]);
        let yhat = labels(&[1, 0, 0, 1]);
        let mask = SubgroupMask::new(vec![true, true, false, false]);
        let table = compute_stats(&[yhat], &Targets::Single(y), Some(&[mask])).unwrap();

        let counts = table.counts(0).unwrap();
        assert_eq!(*counts, ConfusionCounts::new(0, 0, 1, 1));
        assert_eq!(counts.total(), 2);
        assert_eq!(table.value(Stat::Sens, 0), Some(50.0));
        assert!(table.value(Stat::Spec, 0).unwrap().is_nan());
        assert_eq!(table.value(Stat::Ppv, 0), Some(100.0));
    }

    #[test]
    fn undefined_rates_are_nan_not_panics() {
        // no predicted positives and no actual positives
        let table = compute_stats(
            &[labels(&[0, 0, 0])],
            &Targets::Single(labels(&[0, 0, 0])),
            None,
        )
        .unwrap();
        assert_eq!(table.value(Stat::Spec, 0), Some(100.0));
        for stat in [Stat::Sens, Stat::Ppv, Stat::F1, Stat::Ntp, Stat::Nfp] {
            assert!(table.value(stat, 0).unwrap().is_nan(), "{}", stat);
        }

        let empty = ConfusionCounts::default();
        assert!(empty.value(Stat::Npv).is_nan());
    }

    #[test]
    fn rows_follow_fixed_order_and_columns_follow_input() {
        let y = labels(&[1, 0]);
        let table = compute_stats(
            &[labels(&[1, 0]), labels(&[0, 1])],
            &Targets::Single(y),
            None,
        )
        .unwrap();
        assert_eq!(table.row(Stat::Tp), vec![1.0, 0.0]);
        assert_eq!(table.row(Stat::Fp), vec![0.0, 1.0]);
        assert_eq!(Stat::ALL.map(Stat::label).join(","), "TN,FP,FN,TP,Sens,Spec,PPV,NPV,F1,NTP,NFP");
    }

    #[test]
    fn dimension_mismatches_are_reported() {
        let y = labels(&[1, 0, 1]);
        let short = labels(&[1, 0]);
        assert!(matches!(
            compute_stats(&[short], &Targets::Single(y.clone()), None),
            Err(Error::DimensionMismatch { .. })
        ));

        let preds = [labels(&[1, 0, 1]), labels(&[0, 0, 1])];
        assert!(matches!(
            compute_stats(&preds, &Targets::PerPrediction(vec![y.clone()]), None),
            Err(Error::DimensionMismatch { expected: 2, actual: 1, .. })
        ));

        let masks = [SubgroupMask::new(vec![true; 3])];
        assert!(compute_stats(&preds, &Targets::Single(y.clone()), Some(&masks)).is_err());

        let bad_mask = [SubgroupMask::new(vec![true; 2])];
        assert!(compute_stats(&preds[..1], &Targets::Single(y), Some(&bad_mask)).is_err());
    }

    #[test]
    fn idempotent() {
        let y = Targets::Single(labels(&[1, 1, 0, 0, 1]));
        let preds = [labels(&[1, 0, 0, 1, 1])];
        assert_eq!(
            compute_stats(&preds, &y, None).unwrap(),
            compute_stats(&preds, &y, None).unwrap()
        );
    }
}
