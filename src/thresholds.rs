//! Clinical threshold profiles
//!
//! A `ThresholdProfile` holds critical and warning bounds per metric. It is
//! built from a default profile and adjusted for the patient's age and
//! chronic conditions, then stays fixed for that patient-context snapshot.

use crate::error::MonitorError;
use crate::types::MetricName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Age above which elderly adjustments apply
pub const ELDERLY_AGE: u32 = 65;

/// Inclusive range; a missing side is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// The bound `value` reaches or passes, if any. Bounds are inclusive:
    /// a value exactly at the bound breaches it.
    pub fn breach(&self, value: f64) -> Option<Breach> {
        if let Some(max) = self.max {
            if value >= max {
                return Some(Breach::High(max));
            }
        }
        if let Some(min) = self.min {
            if value <= min {
                return Some(Breach::Low(min));
            }
        }
        None
    }

    fn is_valid(&self) -> bool {
        let finite = self.min.map_or(true, f64::is_finite) && self.max.map_or(true, f64::is_finite);
        let ordered = match (self.min, self.max) {
            (Some(min), Some(max)) => min < max,
            _ => true,
        };
        finite && ordered
    }
}

/// Side of a breached bound, carrying the bound value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Breach {
    High(f64),
    Low(f64),
}

impl Breach {
    pub fn bound(&self) -> f64 {
        match self {
            Breach::High(b) | Breach::Low(b) => *b,
        }
    }
}

/// Critical and warning bounds for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub critical: Bounds,
    pub warning: Bounds,
}

impl MetricThresholds {
    const fn new(critical: Bounds, warning: Bounds) -> Self {
        Self { critical, warning }
    }
}

/// Patient information used to personalize thresholds and assess risk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientContext {
    pub age: Option<u32>,
    pub chronic_conditions: Vec<String>,
    /// Behavioral risk factors (smoking, alcohol, obesity, ...)
    pub risk_factors: Vec<String>,
}

impl PatientContext {
    /// Case-insensitive condition lookup
    pub fn has_condition(&self, name: &str) -> bool {
        self.chronic_conditions
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(name))
    }

    pub fn has_risk_factor(&self, name: &str) -> bool {
        self.risk_factors
            .iter()
            .any(|r| r.trim().eq_ignore_ascii_case(name))
    }
}

/// Per-patient clinical bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    metrics: BTreeMap<MetricName, MetricThresholds>,
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            MetricName::HeartRate,
            MetricThresholds::new(
                Bounds::new(Some(40.0), Some(150.0)),
                Bounds::new(Some(50.0), Some(120.0)),
            ),
        );
        metrics.insert(
            MetricName::SystolicBp,
            MetricThresholds::new(
                Bounds::new(Some(70.0), Some(180.0)),
                Bounds::new(Some(90.0), Some(140.0)),
            ),
        );
        metrics.insert(
            MetricName::DiastolicBp,
            MetricThresholds::new(
                Bounds::new(Some(40.0), Some(110.0)),
                Bounds::new(Some(60.0), Some(90.0)),
            ),
        );
        metrics.insert(
            MetricName::OxygenSaturation,
            MetricThresholds::new(Bounds::new(Some(88.0), None), Bounds::new(Some(92.0), None)),
        );
        metrics.insert(
            MetricName::BloodGlucose,
            MetricThresholds::new(
                Bounds::new(Some(50.0), Some(400.0)),
                Bounds::new(Some(70.0), Some(180.0)),
            ),
        );
        metrics.insert(
            MetricName::BodyTemperature,
            MetricThresholds::new(
                Bounds::new(Some(35.0), Some(40.0)),
                Bounds::new(Some(36.0), Some(38.0)),
            ),
        );
        metrics.insert(
            MetricName::RespiratoryRate,
            MetricThresholds::new(
                Bounds::new(Some(8.0), Some(30.0)),
                Bounds::new(Some(12.0), Some(24.0)),
            ),
        );
        Self { metrics }
    }
}

impl ThresholdProfile {
    /// Build the profile for a patient.
    ///
    /// Condition adjustments apply first; the elderly adjustment applies last
    /// and may relax a condition-tightened bound.
    pub fn for_patient(context: &PatientContext) -> Self {
        let mut profile = Self::default();

        if context.has_condition("hypertension") {
            profile.set_warning_max(MetricName::SystolicBp, 130.0);
            profile.set_warning_max(MetricName::DiastolicBp, 80.0);
        }
        if context.has_condition("diabetes") {
            profile.set_warning_max(MetricName::BloodGlucose, 140.0);
        }
        if context.has_condition("heart disease") || context.has_condition("heart_disease") {
            profile.set_warning_max(MetricName::HeartRate, 100.0);
        }
        if context.age.map_or(false, |age| age > ELDERLY_AGE) {
            profile.set_critical_max(MetricName::HeartRate, 130.0);
            profile.set_warning_max(MetricName::SystolicBp, 150.0);
        }

        profile
    }

    /// Custom profile, validated
    pub fn from_map(metrics: BTreeMap<MetricName, MetricThresholds>) -> Result<Self, MonitorError> {
        let profile = Self { metrics };
        profile.validate()?;
        Ok(profile)
    }

    pub fn get(&self, metric: MetricName) -> Option<&MetricThresholds> {
        self.metrics.get(&metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricName, &MetricThresholds)> {
        self.metrics.iter()
    }

    /// Every bound must be finite and every min below its max
    pub fn validate(&self) -> Result<(), MonitorError> {
        for (metric, thresholds) in &self.metrics {
            if !thresholds.critical.is_valid() || !thresholds.warning.is_valid() {
                return Err(MonitorError::ThresholdConfig(format!(
                    "invalid bounds for {metric}"
                )));
            }
        }
        Ok(())
    }

    fn set_warning_max(&mut self, metric: MetricName, max: f64) {
        if let Some(t) = self.metrics.get_mut(&metric) {
            t.warning.max = Some(max);
        }
    }

    fn set_critical_max(&mut self, metric: MetricName, max: f64) {
        if let Some(t) = self.metrics.get_mut(&metric) {
            t.critical.max = Some(max);
        }
    }
}
