//! Wearable and bedside cardiac device adapters
//!
//! Smartwatches, chest-strap heart-rate monitors, ECG monitors and pulse
//! oximeters all report heart rate under different field names.

use crate::types::MetricName;

use super::DeviceAdapter;

/// Smartwatch adapter
pub struct SmartwatchAdapter;

impl DeviceAdapter for SmartwatchAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[
            ("heartRate", MetricName::HeartRate),
            ("steps", MetricName::Steps),
            ("calories", MetricName::Calories),
            ("sleepQuality", MetricName::SleepQuality),
            ("stressLevel", MetricName::StressLevel),
            ("oxygenSaturation", MetricName::OxygenSaturation),
            ("spo2", MetricName::OxygenSaturation),
            ("hrv", MetricName::HeartRateVariability),
            ("skinTemperature", MetricName::BodyTemperature),
        ]
    }
}

/// Heart-rate monitor adapter
pub struct HeartRateMonitorAdapter;

impl DeviceAdapter for HeartRateMonitorAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[
            ("bpm", MetricName::HeartRate),
            ("heartRate", MetricName::HeartRate),
            ("hrv", MetricName::HeartRateVariability),
        ]
    }
}

/// ECG monitor adapter
pub struct EcgMonitorAdapter;

impl DeviceAdapter for EcgMonitorAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[
            ("heartRate", MetricName::HeartRate),
            ("bpm", MetricName::HeartRate),
            ("qrsWidth", MetricName::QrsWidth),
            ("qtInterval", MetricName::QtInterval),
        ]
    }
}

/// Pulse oximeter adapter
pub struct PulseOximeterAdapter;

impl DeviceAdapter for PulseOximeterAdapter {
    fn field_map(&self) -> &'static [(&'static str, MetricName)] {
        &[
            ("spo2", MetricName::OxygenSaturation),
            ("heartRate", MetricName::HeartRate),
            ("pulse", MetricName::HeartRate),
            ("pi", MetricName::PerfusionIndex),
        ]
    }
}
