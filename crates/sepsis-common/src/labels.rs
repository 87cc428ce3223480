//! Subject-aligned vectors: outcomes, scores, subgroup masks and named
//! prediction sets.
//!
//! Every vector used together in one computation must describe the same
//! subjects in the same order. Lengths are checked where vectors meet, not
//! here.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Binary outcome (or thresholded prediction) per subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVector(Vec<bool>);

impl LabelVector {
    pub fn new(values: Vec<bool>) -> Self {
        Self(values)
    }

    /// Labels from an indicator column: exactly `1.0` is positive, anything
    /// else (including NaN) is negative.
    pub fn from_indicator(values: &[f64]) -> Self {
        Self(values.iter().map(|v| *v == 1.0).collect())
    }

    /// Labels from integer flags; non-zero is positive.
    pub fn from_flags(values: &[u8]) -> Self {
        Self(values.iter().map(|v| *v != 0).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn positives(&self) -> usize {
        self.0.iter().filter(|v| **v).count()
    }
}

impl From<Vec<bool>> for LabelVector {
    fn from(values: Vec<bool>) -> Self {
        Self(values)
    }
}

/// Real-valued prediction score per subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector(Vec<f64>);

impl ScoreVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Applies a decision threshold: `score >= threshold` is positive.
    pub fn threshold(&self, threshold: f64) -> LabelVector {
        LabelVector(self.0.iter().map(|v| *v >= threshold).collect())
    }
}

impl From<Vec<f64>> for ScoreVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Boolean mask selecting the subjects of one subgroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgroupMask(Vec<bool>);

impl SubgroupMask {
    pub fn new(values: Vec<bool>) -> Self {
        Self(values)
    }

    /// Mask from an indicator column (`value == 1`).
    pub fn from_indicator(values: &[f64]) -> Self {
        Self(values.iter().map(|v| *v == 1.0).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// The complementary subgroup.
    pub fn invert(&self) -> Self {
        Self(self.0.iter().map(|v| !v).collect())
    }

    /// Number of selected subjects.
    pub fn selected(&self) -> usize {
        self.0.iter().filter(|v| **v).count()
    }
}

/// Outcome vectors for a batch of predictions, resolved once at the API
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// One outcome shared by every prediction.
    Single(LabelVector),
    /// One outcome per prediction, in prediction order.
    PerPrediction(Vec<LabelVector>),
}

impl Targets {
    /// The outcome paired with prediction `index`, or `None` when a
    /// per-prediction list is too short.
    pub fn for_prediction(&self, index: usize) -> Option<&LabelVector> {
        match self {
            Targets::Single(target) => Some(target),
            Targets::PerPrediction(targets) => targets.get(index),
        }
    }

    /// Number of explicit targets; `None` when a single target is broadcast.
    pub fn explicit_len(&self) -> Option<usize> {
        match self {
            Targets::Single(_) => None,
            Targets::PerPrediction(targets) => Some(targets.len()),
        }
    }
}

impl From<LabelVector> for Targets {
    fn from(target: LabelVector) -> Self {
        Targets::Single(target)
    }
}

impl From<Vec<LabelVector>> for Targets {
    fn from(targets: Vec<LabelVector>) -> Self {
        Targets::PerPrediction(targets)
    }
}

/// A named prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedPrediction {
    pub name: String,
    pub scores: ScoreVector,
}

/// Ordered predictions with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    entries: Vec<NamedPrediction>,
}

impl PredictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from `(name, scores)` pairs, rejecting duplicate names.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ScoreVector)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (name, scores) in entries {
            set.insert(name, scores)?;
        }
        Ok(set)
    }

    /// Appends a prediction; fails if the name is already present.
    pub fn insert(&mut self, name: impl Into<String>, scores: ScoreVector) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(Error::DuplicateName { name });
        }
        self.entries.push(NamedPrediction { name, scores });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ScoreVector> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.scores)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedPrediction> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_treats_only_one_as_positive() {
        let labels = LabelVector::from_indicator(&[1.0, 0.0, f64::NAN, 2.0, 1.0]);
        assert_eq!(labels.as_slice(), &[true, false, false, false, true]);
        assert_eq!(labels.positives(), 2);
    }

    #[test]
    fn threshold_is_inclusive() {
        let scores = ScoreVector::new(vec![0.2, 0.5, 0.7]);
        assert_eq!(scores.threshold(0.5).as_slice(), &[false, true, true]);
    }

    #[test]
    fn single_target_broadcasts() {
        let target = Targets::from(LabelVector::from_flags(&[1, 0]));
        assert!(target.for_prediction(0).is_some());
        assert_eq!(target.for_prediction(0), target.for_prediction(7));
        assert_eq!(target.explicit_len(), None);
    }

    #[test]
    fn per_prediction_targets_are_indexed() {
        let targets = Targets::from(vec![
            LabelVector::from_flags(&[1, 0]),
            LabelVector::from_flags(&[0, 1]),
        ]);
        assert_eq!(targets.explicit_len(), Some(2));
        assert_eq!(targets.for_prediction(1).unwrap().as_slice(), &[false, true]);
        assert!(targets.for_prediction(2).is_none());
    }

    #[test]
    fn prediction_set_rejects_duplicates() {
        let mut set = PredictionSet::new();
        set.insert("sofa", ScoreVector::new(vec![1.0])).unwrap();
        let err = set.insert("sofa", ScoreVector::new(vec![2.0])).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { ref name } if name == "sofa"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn prediction_set_keeps_insertion_order() {
        let set = PredictionSet::from_entries([
            ("sirs", ScoreVector::new(vec![1.0])),
            ("qsofa", ScoreVector::new(vec![0.0])),
            ("sofa", ScoreVector::new(vec![3.0])),
        ])
        .unwrap();
        assert_eq!(set.names(), vec!["sirs", "qsofa", "sofa"]);
        assert_eq!(set.get("qsofa").unwrap().as_slice(), &[0.0]);
        assert!(set.get("lods").is_none());
    }

    #[test]
    fn mask_inversion() {
        let mask = SubgroupMask::from_indicator(&[1.0, 0.0, 1.0]);
        assert_eq!(mask.selected(), 2);
        assert_eq!(mask.invert().as_slice(), &[false, true, false]);
    }
}
