use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{ClassificationResult, TumorLabel};
use crate::error::{InferenceError, Result};
use crate::simulate::GrowthSimulator;

/// Message attached to a clean scan.
pub const NO_TUMOR_MESSAGE: &str = "No tumor detected";

/// Fixed rationale strings attached to every tumor report. They describe the
/// simulated basis of the figures and are identical for all tumor types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisNotes {
    pub size_estimation: String,
    pub growth_model: String,
    pub symptoms: String,
}

impl Default for AnalysisNotes {
    fn default() -> Self {
        Self {
            size_estimation: "Simulated based on typical tumor characteristics".to_string(),
            growth_model: "Fixed rate of 0.4 cm²/month (simplified model)".to_string(),
            symptoms: "Based on tumor size correlation studies".to_string(),
        }
    }
}

/// Report for a scan with no tumor found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoTumorReport {
    pub tumor_detected: bool,
    pub message: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Full report for a detected tumor, including the growth forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TumorReport {
    pub tumor_detected: bool,
    pub tumor_type: TumorLabel,
    pub confidence: f64,
    pub current_size_cm2: f64,
    pub predicted_size_after_3_months: f64,
    pub growth_rate_cm2_per_month: f64,
    pub current_expected_symptoms: Vec<String>,
    pub future_expected_symptoms: Vec<String>,
    pub all_probabilities: BTreeMap<TumorLabel, f64>,
    pub analysis_notes: AnalysisNotes,
    pub timestamp: DateTime<Utc>,
}

/// Per-image diagnostic result. Serializes to one of the two wire shapes,
/// discriminated by the `tumor_detected` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticReport {
    Tumor(TumorReport),
    Clear(NoTumorReport),
}

impl DiagnosticReport {
    pub fn tumor_detected(&self) -> bool {
        matches!(self, DiagnosticReport::Tumor(_))
    }

    pub fn confidence(&self) -> f64 {
        match self {
            DiagnosticReport::Tumor(report) => report.confidence,
            DiagnosticReport::Clear(report) => report.confidence,
        }
    }
}

/// Turns one classification into one diagnostic report, invoking the growth
/// simulator when a tumor is present.
pub struct ReportAssembler {
    simulator: GrowthSimulator,
}

impl ReportAssembler {
    pub fn new(simulator: GrowthSimulator) -> Self {
        Self { simulator }
    }

    /// Assemble a report from a validated classification.
    ///
    /// The distribution is validated before the simulator runs; a malformed
    /// distribution is an upstream contract violation and never reaches the
    /// forecast path.
    pub fn assemble(&self, classification: &ClassificationResult) -> Result<DiagnosticReport> {
        classification.validate()?;

        let timestamp = Utc::now();
        let confidence = classification.confidence();

        if classification.label == TumorLabel::NoTumor {
            debug!(confidence, "no tumor detected");
            return Ok(DiagnosticReport::Clear(NoTumorReport {
                tumor_detected: false,
                message: NO_TUMOR_MESSAGE.to_string(),
                confidence,
                timestamp,
            }));
        }

        let forecast = self
            .simulator
            .simulate(classification.label)
            .ok_or_else(|| InferenceError::InvalidLabel(classification.label.to_string()))?;

        debug!(
            label = %classification.label,
            confidence,
            current_size_cm2 = forecast.current_size_cm2,
            "tumor detected, forecast attached"
        );

        Ok(DiagnosticReport::Tumor(TumorReport {
            tumor_detected: true,
            tumor_type: classification.label,
            confidence,
            current_size_cm2: forecast.current_size_cm2,
            predicted_size_after_3_months: forecast.projected_size_cm2,
            growth_rate_cm2_per_month: forecast.growth_rate_cm2_per_month,
            current_expected_symptoms: forecast.current_symptoms,
            future_expected_symptoms: forecast.future_symptoms,
            all_probabilities: classification.probabilities.clone(),
            analysis_notes: AnalysisNotes::default(),
            timestamp,
        }))
    }
}
