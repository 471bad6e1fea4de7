//! Core types for the Synheart Vigil monitoring pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw device samples, normalized samples, anomalies and trends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Canonical metric names. Closed set; device-specific field names are mapped
/// onto these by the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricName {
    #[serde(rename = "heartRate")]
    HeartRate,
    #[serde(rename = "systolicBP")]
    SystolicBp,
    #[serde(rename = "diastolicBP")]
    DiastolicBp,
    #[serde(rename = "oxygenSaturation")]
    OxygenSaturation,
    #[serde(rename = "bloodGlucose")]
    BloodGlucose,
    #[serde(rename = "weight")]
    Weight,
    #[serde(rename = "bodyTemperature")]
    BodyTemperature,
    #[serde(rename = "respiratoryRate")]
    RespiratoryRate,
    #[serde(rename = "heartRateVariability")]
    HeartRateVariability,
    #[serde(rename = "steps")]
    Steps,
    #[serde(rename = "calories")]
    Calories,
    #[serde(rename = "bodyFat")]
    BodyFat,
    #[serde(rename = "muscleMass")]
    MuscleMass,
    #[serde(rename = "bmi")]
    Bmi,
    #[serde(rename = "waterPercentage")]
    WaterPercentage,
    #[serde(rename = "perfusionIndex")]
    PerfusionIndex,
    #[serde(rename = "ketones")]
    Ketones,
    #[serde(rename = "qrsWidth")]
    QrsWidth,
    #[serde(rename = "qtInterval")]
    QtInterval,
    #[serde(rename = "stressLevel")]
    StressLevel,
    #[serde(rename = "sleepQuality")]
    SleepQuality,
}

impl MetricName {
    pub const ALL: [MetricName; 21] = [
        MetricName::HeartRate,
        MetricName::SystolicBp,
        MetricName::DiastolicBp,
        MetricName::OxygenSaturation,
        MetricName::BloodGlucose,
        MetricName::Weight,
        MetricName::BodyTemperature,
        MetricName::RespiratoryRate,
        MetricName::HeartRateVariability,
        MetricName::Steps,
        MetricName::Calories,
        MetricName::BodyFat,
        MetricName::MuscleMass,
        MetricName::Bmi,
        MetricName::WaterPercentage,
        MetricName::PerfusionIndex,
        MetricName::Ketones,
        MetricName::QrsWidth,
        MetricName::QtInterval,
        MetricName::StressLevel,
        MetricName::SleepQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HeartRate => "heartRate",
            MetricName::SystolicBp => "systolicBP",
            MetricName::DiastolicBp => "diastolicBP",
            MetricName::OxygenSaturation => "oxygenSaturation",
            MetricName::BloodGlucose => "bloodGlucose",
            MetricName::Weight => "weight",
            MetricName::BodyTemperature => "bodyTemperature",
            MetricName::RespiratoryRate => "respiratoryRate",
            MetricName::HeartRateVariability => "heartRateVariability",
            MetricName::Steps => "steps",
            MetricName::Calories => "calories",
            MetricName::BodyFat => "bodyFat",
            MetricName::MuscleMass => "muscleMass",
            MetricName::Bmi => "bmi",
            MetricName::WaterPercentage => "waterPercentage",
            MetricName::PerfusionIndex => "perfusionIndex",
            MetricName::Ketones => "ketones",
            MetricName::QrsWidth => "qrsWidth",
            MetricName::QtInterval => "qtInterval",
            MetricName::StressLevel => "stressLevel",
            MetricName::SleepQuality => "sleepQuality",
        }
    }

    /// Look up a metric by its canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == name)
    }

    /// Physiologically plausible range. Readings outside it are treated as
    /// sensor glitches and dropped during normalization.
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        match self {
            MetricName::HeartRate => Some((30.0, 220.0)),
            MetricName::SystolicBp => Some((70.0, 250.0)),
            MetricName::DiastolicBp => Some((40.0, 150.0)),
            MetricName::OxygenSaturation => Some((50.0, 100.0)),
            MetricName::BloodGlucose => Some((20.0, 600.0)),
            MetricName::BodyTemperature => Some((30.0, 45.0)),
            MetricName::RespiratoryRate => Some((4.0, 60.0)),
            MetricName::Weight => Some((1.0, 500.0)),
            MetricName::BodyFat | MetricName::WaterPercentage => Some((0.0, 100.0)),
            MetricName::Steps | MetricName::Calories => Some((0.0, f64::MAX)),
            _ => None,
        }
    }

    /// Normal clinical range used by vital trend analysis
    pub fn normal_range(&self) -> Option<(f64, f64)> {
        match self {
            MetricName::HeartRate => Some((60.0, 100.0)),
            MetricName::SystolicBp => Some((90.0, 120.0)),
            MetricName::DiastolicBp => Some((60.0, 80.0)),
            MetricName::BodyTemperature => Some((36.1, 37.2)),
            MetricName::RespiratoryRate => Some((12.0, 20.0)),
            MetricName::OxygenSaturation => Some((95.0, 100.0)),
            MetricName::BloodGlucose => Some((70.0, 140.0)),
            _ => None,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitoring device category
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Smartwatch,
    HeartRateMonitor,
    EcgMonitor,
    PulseOximeter,
    BloodPressureMonitor,
    GlucoseMeter,
    SmartScale,
    /// Devices without a dedicated mapping table
    #[serde(untagged)]
    Other(String),
}

impl DeviceType {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::Smartwatch => "smartwatch",
            DeviceType::HeartRateMonitor => "heart_rate_monitor",
            DeviceType::EcgMonitor => "ecg_monitor",
            DeviceType::PulseOximeter => "pulse_oximeter",
            DeviceType::BloodPressureMonitor => "blood_pressure_monitor",
            DeviceType::GlucoseMeter => "glucose_meter",
            DeviceType::SmartScale => "smart_scale",
            DeviceType::Other(name) => name.as_str(),
        }
    }
}

/// A single field of a raw device payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Device-specific payload as delivered by the transport. Ephemeral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(default, alias = "deviceId")]
    pub device_id: String,
    #[serde(alias = "deviceType")]
    pub device_type: DeviceType,
    #[serde(default, alias = "patientId")]
    pub patient_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl RawSample {
    /// Create a sample with no fields
    pub fn new(
        patient_id: impl Into<String>,
        device_id: impl Into<String>,
        device_type: DeviceType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_type,
            patient_id: patient_id.into(),
            timestamp: Some(timestamp),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Quality flag indicating data issues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    NoMetrics,
    ImplausibleValue,
    NonNumericValue,
    UnmappedField,
    DeviceReportedConfidence,
}

/// Canonical form of a device sample. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    pub patient_id: String,
    pub device_id: String,
    pub device_type: DeviceType,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<MetricName, f64>,
    /// Sample quality (0-1)
    pub quality: f64,
    pub quality_flags: Vec<QualityFlag>,
}

impl NormalizedSample {
    pub fn metric(&self, metric: MetricName) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }
}

/// Severity scale shared by anomalies, concern levels and warning urgency.
/// Ordered so that `max` picks the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Kind of anomaly. Severity is a static property of the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Tachycardia,
    Bradycardia,
    HypertensiveEmergency,
    Hypotension,
    Hypoxemia,
    Hyperglycemia,
    Hypoglycemia,
    /// Critical breach on a metric without a dedicated kind
    CriticalReading,
    BorderlineHigh,
    BorderlineLow,
    StatisticalOutlier,
    RapidGlucoseRise,
    RapidGlucoseFall,
    RapidBloodPressureChange,
    RapidHeartRateChange,
    #[serde(untagged)]
    Other(String),
}

impl AnomalyType {
    pub fn as_str(&self) -> &str {
        match self {
            AnomalyType::Tachycardia => "tachycardia",
            AnomalyType::Bradycardia => "bradycardia",
            AnomalyType::HypertensiveEmergency => "hypertensive_emergency",
            AnomalyType::Hypotension => "hypotension",
            AnomalyType::Hypoxemia => "hypoxemia",
            AnomalyType::Hyperglycemia => "hyperglycemia",
            AnomalyType::Hypoglycemia => "hypoglycemia",
            AnomalyType::CriticalReading => "critical_reading",
            AnomalyType::BorderlineHigh => "borderline_high",
            AnomalyType::BorderlineLow => "borderline_low",
            AnomalyType::StatisticalOutlier => "statistical_outlier",
            AnomalyType::RapidGlucoseRise => "rapid_glucose_rise",
            AnomalyType::RapidGlucoseFall => "rapid_glucose_fall",
            AnomalyType::RapidBloodPressureChange => "rapid_blood_pressure_change",
            AnomalyType::RapidHeartRateChange => "rapid_heart_rate_change",
            AnomalyType::Other(name) => name.as_str(),
        }
    }

    /// Static severity lookup. Unknown kinds are `Low`.
    pub fn severity(&self) -> Severity {
        match self {
            AnomalyType::Tachycardia
            | AnomalyType::Bradycardia
            | AnomalyType::HypertensiveEmergency
            | AnomalyType::Hypotension
            | AnomalyType::Hypoxemia
            | AnomalyType::Hypoglycemia => Severity::Critical,
            AnomalyType::Hyperglycemia
            | AnomalyType::CriticalReading
            | AnomalyType::RapidGlucoseRise
            | AnomalyType::RapidGlucoseFall
            | AnomalyType::RapidBloodPressureChange => Severity::High,
            AnomalyType::StatisticalOutlier | AnomalyType::RapidHeartRateChange => {
                Severity::Medium
            }
            AnomalyType::BorderlineHigh | AnomalyType::BorderlineLow | AnomalyType::Other(_) => {
                Severity::Low
            }
        }
    }
}

/// Detection strategy that produced an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    RuleBased,
    Statistical,
    TrendBased,
}

/// What an anomalous value was compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyReference {
    Threshold { bound: f64 },
    Baseline { mean: f64, std_dev: f64, deviation_ratio: f64 },
    Rate { change: f64, window_secs: f64 },
}

/// A single flagged deviation event. Produced, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub patient_id: String,
    pub device_id: String,
    pub metric: MetricName,
    pub severity: Severity,
    pub value: f64,
    pub reference: AnomalyReference,
    /// Confidence (0-1)
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Every strategy that flagged this metric in the same detection pass
    pub strategies: Vec<DetectionStrategy>,
}

/// Direction of a metric over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Directional/statistical summary of a metric over a buffer window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub metric: MetricName,
    pub direction: TrendDirection,
    /// Least-squares slope per sample
    pub slope: f64,
    /// Least-squares slope against wall-clock time, per minute
    pub rate_per_minute: f64,
    pub variance: f64,
    pub average: f64,
    pub window_size: usize,
    pub time_span_secs: f64,
}

/// Result that is either computed or explicitly lacking data.
/// Insufficient data is a status value, never an error and never "no risk".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Assessment<T> {
    InsufficientData,
    Assessed(T),
}

impl<T> Assessment<T> {
    pub fn is_insufficient(&self) -> bool {
        matches!(self, Assessment::InsufficientData)
    }

    pub fn assessed(&self) -> Option<&T> {
        match self {
            Assessment::Assessed(value) => Some(value),
            Assessment::InsufficientData => None,
        }
    }
}
