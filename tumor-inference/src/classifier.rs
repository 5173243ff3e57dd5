use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};

/// Tolerance for the probability mass check. The upstream model rounds each
/// probability to three decimals, so the sum can legitimately drift by a
/// couple of thousandths.
pub const PROB_SUM_TOLERANCE: f64 = 1e-2;

/// Categorical output of the MRI classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TumorLabel {
    Glioma,
    Meningioma,
    Pituitary,
    NoTumor,
}

impl TumorLabel {
    pub const ALL: [TumorLabel; 4] = [
        TumorLabel::Glioma,
        TumorLabel::Meningioma,
        TumorLabel::Pituitary,
        TumorLabel::NoTumor,
    ];

    pub fn is_tumor(&self) -> bool {
        !matches!(self, TumorLabel::NoTumor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TumorLabel::Glioma => "Glioma",
            TumorLabel::Meningioma => "Meningioma",
            TumorLabel::Pituitary => "Pituitary",
            TumorLabel::NoTumor => "NoTumor",
        }
    }
}

impl fmt::Display for TumorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TumorLabel {
    type Err = InferenceError;

    // "No Tumor" and "Pituitary Tumor" are the spellings the legacy model
    // emits; accept them alongside the canonical names.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Glioma" => Ok(TumorLabel::Glioma),
            "Meningioma" => Ok(TumorLabel::Meningioma),
            "Pituitary" | "Pituitary Tumor" => Ok(TumorLabel::Pituitary),
            "NoTumor" | "No Tumor" => Ok(TumorLabel::NoTumor),
            other => Err(InferenceError::InvalidLabel(other.to_string())),
        }
    }
}

/// One classification of one image: the winning label plus the full
/// probability distribution over all four labels. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: TumorLabel,
    pub probabilities: BTreeMap<TumorLabel, f64>,
}

impl ClassificationResult {
    pub fn new(label: TumorLabel, probabilities: BTreeMap<TumorLabel, f64>) -> Self {
        Self {
            label,
            probabilities,
        }
    }

    /// Probability mass assigned to the winning label.
    pub fn confidence(&self) -> f64 {
        self.probabilities.get(&self.label).copied().unwrap_or(0.0)
    }

    /// Check the distribution contract before any downstream work: every
    /// probability in [0, 1], mass summing to ~1, and the winning label
    /// present in the map. Ties between labels are the classifier's to
    /// resolve; its stated label is taken as authoritative.
    pub fn validate(&self) -> Result<()> {
        for (label, p) in &self.probabilities {
            if !(0.0..=1.0).contains(p) || !p.is_finite() {
                return Err(InferenceError::InvalidClassification(format!(
                    "probability {p} for {label} is outside [0, 1]"
                )));
            }
        }

        let sum: f64 = self.probabilities.values().sum();
        if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(InferenceError::InvalidClassification(format!(
                "probabilities sum to {sum}, expected ~1.0"
            )));
        }

        if !self.probabilities.contains_key(&self.label) {
            return Err(InferenceError::InvalidClassification(format!(
                "winning label {} is missing from the distribution",
                self.label
            )));
        }

        Ok(())
    }
}

/// Opaque classification capability. The model runtime behind it is out of
/// scope here; implementations only promise the `ClassificationResult`
/// contract.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult>;
}

/// Classifier double returning the same fixed distribution for every image.
/// Used by tests and demos to decouple the pipeline from a real model.
pub struct FixedClassifier {
    result: ClassificationResult,
}

impl FixedClassifier {
    pub fn new(result: ClassificationResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _image: &DynamicImage) -> Result<ClassificationResult> {
        Ok(self.result.clone())
    }
}
