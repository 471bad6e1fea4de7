//! Device payload adapters
//!
//! This module provides the per-device-type field mapping tables that turn raw
//! device payload fields into canonical metrics.

mod clinical;
mod wearable;

pub use clinical::{BloodPressureMonitorAdapter, GlucoseMeterAdapter, SmartScaleAdapter};
pub use wearable::{
    EcgMonitorAdapter, HeartRateMonitorAdapter, PulseOximeterAdapter, SmartwatchAdapter,
};

use crate::types::{DeviceType, FieldValue, MetricName, QualityFlag};
use std::collections::{BTreeMap, HashMap};

/// Field names a device may use to self-report measurement confidence.
/// These never map to metrics.
pub const CONFIDENCE_FIELDS: [&str; 3] = ["confidence", "signalQuality", "quality"];

/// Output of a field mapping pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedFields {
    pub metrics: BTreeMap<MetricName, f64>,
    pub flags: Vec<QualityFlag>,
}

impl MappedFields {
    fn flag(&mut self, flag: QualityFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }
}

/// Trait for device payload adapters
pub trait DeviceAdapter: Send + Sync {
    /// Device field name to canonical metric
    fn field_map(&self) -> &'static [(&'static str, MetricName)];

    /// Unit conversion hook, applied after a field is mapped
    fn convert(&self, _metric: MetricName, value: f64, _fields: &HashMap<String, FieldValue>) -> f64 {
        value
    }

    /// Map raw payload fields to canonical metrics.
    ///
    /// Numeric fields that match no table entry are flagged; textual
    /// annotations (rhythm, meal context, units) are ignored silently.
    fn map_fields(&self, fields: &HashMap<String, FieldValue>) -> MappedFields {
        let mut mapped = MappedFields::default();
        let table = self.field_map();

        // Sorted iteration keeps the output deterministic when two device
        // fields map to the same metric.
        let mut names: Vec<&String> = fields.keys().collect();
        names.sort();

        for name in names {
            if CONFIDENCE_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let value = &fields[name];
            match table.iter().find(|(field, _)| *field == name.as_str()) {
                Some((_, metric)) => match value.as_f64() {
                    Some(number) => {
                        let converted = self.convert(*metric, number, fields);
                        mapped.metrics.entry(*metric).or_insert(converted);
                    }
                    None => mapped.flag(QualityFlag::NonNumericValue),
                },
                None => {
                    if matches!(value, FieldValue::Number(_)) {
                        mapped.flag(QualityFlag::UnmappedField);
                    }
                }
            }
        }

        mapped
    }
}

/// Adapter for devices without a dedicated table: accepts fields that are
/// already named after canonical metrics.
pub struct GenericAdapter;

impl DeviceAdapter for GenericAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[]
    }

    fn map_fields(&self, fields: &HashMap<String, FieldValue>) -> MappedFields {
        let mut mapped = MappedFields::default();
        for (name, value) in fields {
            if CONFIDENCE_FIELDS.contains(&name.as_str()) {
                continue;
            }
            match (MetricName::from_name(name), value.as_f64()) {
                (Some(metric), Some(number)) => {
                    mapped.metrics.insert(metric, number);
                }
                (Some(_), None) => mapped.flag(QualityFlag::NonNumericValue),
                (None, _) => {
                    if matches!(value, FieldValue::Number(_)) {
                        mapped.flag(QualityFlag::UnmappedField);
                    }
                }
            }
        }
        mapped
    }
}

/// Select the adapter for a device type
pub fn adapter_for(device_type: &DeviceType) -> &'static dyn DeviceAdapter {
    match device_type {
        DeviceType::Smartwatch => &SmartwatchAdapter,
        DeviceType::HeartRateMonitor => &HeartRateMonitorAdapter,
        DeviceType::EcgMonitor => &EcgMonitorAdapter,
        DeviceType::PulseOximeter => &PulseOximeterAdapter,
        DeviceType::BloodPressureMonitor => &BloodPressureMonitorAdapter,
        DeviceType::GlucoseMeter => &GlucoseMeterAdapter,
        DeviceType::SmartScale => &SmartScaleAdapter,
        DeviceType::Other(_) => &GenericAdapter,
    }
}
