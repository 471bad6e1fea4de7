//! Home clinical device adapters
//!
//! Blood-pressure cuffs, glucose meters and smart scales. Glucose meters and
//! scales may report in non-canonical units; values are converted to mg/dL
//! and kilograms.

use crate::types::{FieldValue, MetricName};
use std::collections::HashMap;

use super::DeviceAdapter;

/// mmol/L to mg/dL for glucose
const MMOL_TO_MG_DL: f64 = 18.0;

/// Pounds to kilograms
const LB_TO_KG: f64 = 0.453_592;

fn unit_of(fields: &HashMap<String, FieldValue>) -> Option<String> {
    match fields.get("unit") {
        Some(FieldValue::Text(unit)) => Some(unit.trim().to_ascii_lowercase()),
        _ => None,
    }
}

/// Blood-pressure monitor adapter
pub struct BloodPressureMonitorAdapter;

impl DeviceAdapter for BloodPressureMonitorAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[
            ("systolic", MetricName::SystolicBp),
            ("diastolic", MetricName::DiastolicBp),
            ("pulse", MetricName::HeartRate),
        ]
    }
}

/// Glucose meter adapter
pub struct GlucoseMeterAdapter;

impl DeviceAdapter for GlucoseMeterAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[
            ("glucose", MetricName::BloodGlucose),
            ("ketones", MetricName::Ketones),
        ]
    }

    fn convert(&self, metric: MetricName, value: f64, fields: &HashMap<String, FieldValue>) -> f64 {
        match (metric, unit_of(fields).as_deref()) {
            (MetricName::BloodGlucose, Some("mmol/l")) => value * MMOL_TO_MG_DL,
            _ => value,
        }
    }
}

/// Smart scale adapter
pub struct SmartScaleAdapter;

impl DeviceAdapter for SmartScaleAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[
            ("weight", MetricName::Weight),
            ("bodyFat", MetricName::BodyFat),
            ("muscleMass", MetricName::MuscleMass),
            ("bmi", MetricName::Bmi),
            ("water", MetricName::WaterPercentage),
            ("waterPercentage", MetricName::WaterPercentage),
        ]
    }

    fn convert(&self, metric: MetricName, value: f64, fields: &HashMap<String, FieldValue>) -> f64 {
        match (metric, unit_of(fields).as_deref()) {
            (MetricName::Weight | MetricName::MuscleMass, Some("lb" | "lbs")) => value * LB_TO_KG,
            _ => value,
        }
    }
}
