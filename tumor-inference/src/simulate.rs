use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::classifier::TumorLabel;

/// Fixed growth rate, identical for every tumor type.
pub const GROWTH_RATE_CM2_PER_MONTH: f64 = 0.4;

/// Fixed forecast window.
pub const FORECAST_HORIZON_MONTHS: u32 = 3;

/// Bounds of the simulated current-size draw.
pub const MIN_SIMULATED_SIZE_CM2: f64 = 2.0;
pub const MAX_SIMULATED_SIZE_CM2: f64 = 5.0;

/// Simulated size, growth, and symptom projection for one detected tumor.
///
/// `projected_size_cm2` is always `current_size_cm2` plus the fixed growth
/// over the horizon, so it can never shrink below the current size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthForecast {
    pub current_size_cm2: f64,
    pub growth_rate_cm2_per_month: f64,
    pub projected_size_cm2: f64,
    pub current_symptoms: Vec<String>,
    pub future_symptoms: Vec<String>,
}

/// Expected symptoms for a tumor of the given size.
///
/// Bands are half-open: inclusive on the lower edge, exclusive on the upper,
/// with the last band unbounded. The returned order is display order.
pub fn expected_symptoms(size_cm2: f64) -> Vec<String> {
    let band: &[&str] = if size_cm2 < 2.0 {
        &["Mild headache"]
    } else if size_cm2 < 4.0 {
        &["Fatigue", "Blurred vision"]
    } else if size_cm2 < 6.0 {
        &["Memory loss", "Speech difficulty"]
    } else {
        &["Seizures", "Cognitive decline"]
    };
    band.iter().map(|s| s.to_string()).collect()
}

/// Deterministic growth and symptom simulator.
///
/// The size draw is the only randomness in the whole pipeline, so the
/// generator is held explicitly and can be seeded for reproducible tests.
/// This is an illustrative simulation, not a learned model.
pub struct GrowthSimulator {
    rng: Mutex<StdRng>,
}

impl GrowthSimulator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Build a forecast for a tumor label. Returns `None` for `NoTumor`,
    /// which carries no forecast.
    ///
    /// The current size is drawn exactly once per forecast; both symptom
    /// lists derive from that single draw and its projection.
    pub fn simulate(&self, label: TumorLabel) -> Option<GrowthForecast> {
        if !label.is_tumor() {
            return None;
        }

        let current_size_cm2 = {
            // A panic on another thread holding the lock must not take the
            // simulator down with it; the generator state is still usable.
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            round2(rng.gen_range(MIN_SIMULATED_SIZE_CM2..=MAX_SIMULATED_SIZE_CM2))
        };
        let projected_size_cm2 = round2(
            current_size_cm2 + GROWTH_RATE_CM2_PER_MONTH * f64::from(FORECAST_HORIZON_MONTHS),
        );

        Some(GrowthForecast {
            current_size_cm2,
            growth_rate_cm2_per_month: GROWTH_RATE_CM2_PER_MONTH,
            projected_size_cm2,
            current_symptoms: expected_symptoms(current_size_cm2),
            future_symptoms: expected_symptoms(projected_size_cm2),
        })
    }
}

impl Default for GrowthSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
