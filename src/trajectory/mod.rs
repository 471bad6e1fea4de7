//! Trajectory and risk aggregation
//!
//! This module fuses three sources into one `HealthTrajectory`:
//! - Symptom history (interval trends and mined patterns)
//! - Vital history (least-squares trends and out-of-range share)
//! - A general risk assessment
//!
//! Sources without enough data are reported as insufficient and left out.
//! The concern level is the maximum across the remaining sources.

pub mod risk;
pub mod symptoms;
pub mod vitals;
pub mod warnings;

pub use risk::RiskAssessment;
pub use symptoms::{SymptomEntry, SymptomInsights, SymptomPattern, SymptomTrend};
pub use vitals::{VitalInsights, VitalReading, VitalTrend};
pub use warnings::{EarlyWarning, WarningKind};

use crate::clock::{Clock, SystemClock};
use crate::thresholds::ELDERLY_AGE;
use crate::types::{Assessment, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Data points a source needs before it is assessed
    pub min_data_points: usize,
    /// Out-of-range share above which a vital is of medium concern
    pub vital_medium_fraction: f64,
    /// Out-of-range share above which a vital is of high concern
    pub vital_high_fraction: f64,
    /// Per-minute slope beyond which a moving heart rate or a rising systolic
    /// pressure is of medium concern
    pub vital_slope_per_minute: f64,
    /// Interval std dev / mean below which a symptom is cyclical
    pub cyclical_cv: f64,
    /// Joint occurrences that make a symptom pair a pattern
    pub co_occurrence_min: usize,
    pub elderly_age: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_data_points: 3,
            vital_medium_fraction: 0.2,
            vital_high_fraction: 0.5,
            vital_slope_per_minute: 0.5,
            cyclical_cv: 0.2,
            co_occurrence_min: 2,
            elderly_age: ELDERLY_AGE,
        }
    }
}

/// Overall health direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Improving,
    Declining,
    Fluctuating,
    Stable,
}

/// Aggregated multi-source assessment. Superseded by the next computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTrajectory {
    pub patient_id: String,
    pub overall_trend: OverallTrend,
    pub concern_level: Severity,
    pub symptom_insights: Assessment<SymptomInsights>,
    pub vital_insights: Assessment<VitalInsights>,
    pub risk_factors: Vec<String>,
    pub early_warnings: Vec<EarlyWarning>,
    pub generated_at: DateTime<Utc>,
}

/// Trajectory aggregator
pub struct TrajectoryAggregator {
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
}

impl Default for TrajectoryAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default(), Arc::new(SystemClock))
    }
}

impl TrajectoryAggregator {
    pub fn new(config: AggregatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn aggregate(
        &self,
        patient_id: &str,
        symptom_history: &[SymptomEntry],
        vital_history: &[VitalReading],
        risk: &RiskAssessment,
    ) -> HealthTrajectory {
        let symptom_insights = symptoms::analyze(symptom_history, &self.config);
        let vital_insights = vitals::analyze(vital_history, &self.config);

        let symptom_concern = symptom_insights.assessed().map(|s| s.concern);
        let vital_concern = vital_insights.assessed().map(|v| v.concern);
        let concern_level = [symptom_concern, vital_concern, Some(risk.level)]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(Severity::Low);

        let overall_trend = overall_trend(&symptom_insights, vital_concern);

        let early_warnings = warnings::derive(&warnings::WarningInputs {
            concern: concern_level,
            overall_trend,
            symptoms: &symptom_insights,
            vitals: &vital_insights,
            patient_age: risk.patient_age,
            elderly_age: self.config.elderly_age,
        });

        HealthTrajectory {
            patient_id: patient_id.to_string(),
            overall_trend,
            concern_level,
            symptom_insights,
            vital_insights,
            risk_factors: risk.risk_factors.clone(),
            early_warnings,
            generated_at: self.clock.now(),
        }
    }
}

/// Declining wins over everything: worsening symptoms, or vitals at high
/// concern. Vitals at medium concern (out of range, or drifting per
/// `vital_slope_per_minute`) make the trend fluctuating unless symptoms
/// trend firmly. Improving needs improving symptoms and no declining vital.
fn overall_trend(
    symptoms: &Assessment<SymptomInsights>,
    vital_concern: Option<Severity>,
) -> OverallTrend {
    let symptom_direction = symptoms.assessed().map(|s| s.direction);

    if symptom_direction == Some(SymptomTrend::Worsening)
        || vital_concern.map_or(false, |c| c >= Severity::High)
    {
        return OverallTrend::Declining;
    }

    let firm_symptom_trend = matches!(
        symptom_direction,
        Some(SymptomTrend::Improving) | Some(SymptomTrend::Worsening)
    );
    if vital_concern == Some(Severity::Medium) && !firm_symptom_trend {
        return OverallTrend::Fluctuating;
    }

    if symptom_direction == Some(SymptomTrend::Improving) {
        return OverallTrend::Improving;
    }

    OverallTrend::Stable
}
