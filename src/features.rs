//! Feature derivation
//!
//! This module derives window-level features from buffered readings:
//! - Least-squares trends per metric
//! - Summary statistics per metric
//! - Clinical categories for the latest readings
//! - Data quality of an aggregation window

use crate::types::{Assessment, MetricName, NormalizedSample, Trend, TrendDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-sample slope magnitude below which a trend is stable
pub const STABLE_SLOPE: f64 = 0.1;

/// Samples per window considered complete
pub const COMPLETE_WINDOW_SAMPLES: f64 = 20.0;

/// Feature deriver for computing window features
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Trend of a metric over a window of (timestamp, value) readings in
    /// arrival order. Fewer than `min_points` readings is insufficient data.
    pub fn trend(
        metric: MetricName,
        window: &[(DateTime<Utc>, f64)],
        min_points: usize,
    ) -> Assessment<Trend> {
        if window.len() < min_points.max(2) {
            return Assessment::InsufficientData;
        }

        let values: Vec<f64> = window.iter().map(|(_, v)| *v).collect();
        let indices: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        let slope = ols_slope(&indices, &values).unwrap_or(0.0);

        let start = window[0].0;
        let minutes: Vec<f64> = window
            .iter()
            .map(|(t, _)| (*t - start).num_milliseconds() as f64 / 60_000.0)
            .collect();
        let rate_per_minute = ols_slope(&minutes, &values).unwrap_or(0.0);

        let direction = if slope > STABLE_SLOPE {
            TrendDirection::Increasing
        } else if slope < -STABLE_SLOPE {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        let time_span_secs = (window[window.len() - 1].0 - start).num_milliseconds() as f64 / 1000.0;

        Assessment::Assessed(Trend {
            metric,
            direction,
            slope,
            rate_per_minute,
            variance: variance(&values),
            average: mean(&values),
            window_size: values.len(),
            time_span_secs,
        })
    }
}

/// Ordinary least-squares slope of y on x. `None` when x has no spread.
pub fn ols_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = mean(&xs[..n]);
    let mean_y = mean(&ys[..n]);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        numerator += dx * (ys[i] - mean_y);
        denominator += dx * dx;
    }
    if denominator <= f64::EPSILON {
        return None;
    }
    Some(numerator / denominator)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Summary statistics of one metric over an aggregation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl MetricStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: mean(values),
            median,
            std_dev: variance(values).sqrt(),
            count: values.len(),
        })
    }
}

/// Heart-rate zone of a single reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartRateZone {
    Bradycardia,
    Normal,
    Elevated,
    High,
    Critical,
}

impl HeartRateZone {
    pub fn classify(bpm: f64) -> Self {
        if bpm < 60.0 {
            HeartRateZone::Bradycardia
        } else if bpm < 100.0 {
            HeartRateZone::Normal
        } else if bpm < 150.0 {
            HeartRateZone::Elevated
        } else if bpm < 180.0 {
            HeartRateZone::High
        } else {
            HeartRateZone::Critical
        }
    }
}

/// Blood-pressure category of a systolic/diastolic pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodPressureCategory {
    Normal,
    Elevated,
    Stage1,
    Stage2,
    HypertensiveCrisis,
}

impl BloodPressureCategory {
    /// Most severe matching category wins; either reading alone can escalate
    pub fn classify(systolic: f64, diastolic: f64) -> Self {
        if systolic >= 180.0 || diastolic >= 120.0 {
            BloodPressureCategory::HypertensiveCrisis
        } else if systolic >= 140.0 || diastolic >= 90.0 {
            BloodPressureCategory::Stage2
        } else if systolic >= 130.0 || diastolic >= 80.0 {
            BloodPressureCategory::Stage1
        } else if systolic >= 120.0 {
            BloodPressureCategory::Elevated
        } else {
            BloodPressureCategory::Normal
        }
    }
}

/// Glucose category of a mg/dL reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlucoseCategory {
    Hypoglycemia,
    Normal,
    Prediabetes,
    Diabetes,
}

impl GlucoseCategory {
    pub fn classify(mg_dl: f64) -> Self {
        if mg_dl < 70.0 {
            GlucoseCategory::Hypoglycemia
        } else if mg_dl < 100.0 {
            GlucoseCategory::Normal
        } else if mg_dl < 126.0 {
            GlucoseCategory::Prediabetes
        } else {
            GlucoseCategory::Diabetes
        }
    }
}

/// Clinical categories of the most recent readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalCategories {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate_zone: Option<HeartRateZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressureCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glucose: Option<GlucoseCategory>,
}

impl ClinicalCategories {
    /// Categorize using the latest value of each metric across `samples`
    pub fn from_samples(samples: &[NormalizedSample]) -> Self {
        let latest = |metric: MetricName| {
            samples
                .iter()
                .filter_map(|s| s.metric(metric).map(|v| (s.timestamp, v)))
                .max_by_key(|(t, _)| *t)
                .map(|(_, v)| v)
        };

        // Both pressures must come from the same reading
        let blood_pressure = samples
            .iter()
            .filter_map(|s| {
                match (s.metric(MetricName::SystolicBp), s.metric(MetricName::DiastolicBp)) {
                    (Some(sys), Some(dia)) => Some((s.timestamp, sys, dia)),
                    _ => None,
                }
            })
            .max_by_key(|(t, _, _)| *t)
            .map(|(_, sys, dia)| BloodPressureCategory::classify(sys, dia));

        Self {
            heart_rate_zone: latest(MetricName::HeartRate).map(HeartRateZone::classify),
            blood_pressure,
            glucose: latest(MetricName::BloodGlucose).map(GlucoseCategory::classify),
        }
    }
}

/// Quality of an aggregation window, each score on a 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Sample count relative to a complete window
    pub completeness: f64,
    /// Penalizes heart-rate variance within the window
    pub consistency: f64,
    /// Penalizes staleness of the latest sample, one point per minute
    pub timeliness: f64,
    pub overall: f64,
}

impl DataQuality {
    pub fn assess(samples: &[NormalizedSample], now: DateTime<Utc>) -> Self {
        let completeness = (samples.len() as f64 / COMPLETE_WINDOW_SAMPLES * 100.0).min(100.0);

        let heart_rates: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.metric(MetricName::HeartRate))
            .collect();
        let consistency = (100.0 - variance(&heart_rates)).clamp(0.0, 100.0);

        let timeliness = match samples.iter().map(|s| s.timestamp).max() {
            Some(latest) => {
                let minutes = (now - latest).num_milliseconds().max(0) as f64 / 60_000.0;
                (100.0 - minutes).clamp(0.0, 100.0)
            }
            None => 0.0,
        };

        Self {
            completeness,
            consistency,
            timeliness,
            overall: (completeness + consistency + timeliness) / 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceType;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn make_window(values: &[f64], step_secs: i64) -> Vec<(DateTime<Utc>, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (t0() + Duration::seconds(i as i64 * step_secs), *v))
            .collect()
    }

    fn make_sample(offset_secs: i64, metrics: &[(MetricName, f64)]) -> NormalizedSample {
        NormalizedSample {
            patient_id: "patient-1".to_string(),
            device_id: "device-1".to_string(),
            device_type: DeviceType::Smartwatch,
            timestamp: t0() + Duration::seconds(offset_secs),
            metrics: metrics.iter().copied().collect::<BTreeMap<_, _>>(),
            quality: 0.9,
            quality_flags: vec![],
        }
    }

    #[test]
    fn test_increasing_trend() {
        let window = make_window(&[70.0, 72.0, 74.0, 76.0], 60);
        let trend = FeatureDeriver::trend(MetricName::HeartRate, &window, 3);
        let trend = trend.assessed().unwrap();

        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!((trend.rate_per_minute - 2.0).abs() < 1e-9);
        assert!((trend.average - 73.0).abs() < 1e-9);
        assert!((trend.variance - 5.0).abs() < 1e-9);
        assert_eq!(trend.window_size, 4);
        assert_eq!(trend.time_span_secs, 180.0);
    }

    #[test]
    fn test_small_slope_is_stable() {
        let window = make_window(&[70.0, 70.05, 70.1], 10);
        let trend = FeatureDeriver::trend(MetricName::HeartRate, &window, 3);
        assert_eq!(trend.assessed().unwrap().direction, TrendDirection::Stable);
    }

    #[test]
    fn test_trend_needs_minimum_points() {
        let window = make_window(&[70.0, 90.0], 10);
        assert!(FeatureDeriver::trend(MetricName::HeartRate, &window, 3).is_insufficient());
    }

    #[test]
    fn test_metric_stats() {
        let stats = MetricStats::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(
            stats,
            MetricStats {
                min: 1.0,
                max: 4.0,
                mean: 2.5,
                median: 2.5,
                std_dev: 1.25f64.sqrt(),
                count: 4,
            }
        );
        assert_eq!(MetricStats::from_values(&[]), None);
    }

    #[test]
    fn test_clinical_categories() {
        assert_eq!(HeartRateZone::classify(55.0), HeartRateZone::Bradycardia);
        assert_eq!(HeartRateZone::classify(100.0), HeartRateZone::Elevated);
        assert_eq!(HeartRateZone::classify(180.0), HeartRateZone::Critical);

        assert_eq!(BloodPressureCategory::classify(118.0, 76.0), BloodPressureCategory::Normal);
        assert_eq!(BloodPressureCategory::classify(125.0, 78.0), BloodPressureCategory::Elevated);
        assert_eq!(BloodPressureCategory::classify(135.0, 85.0), BloodPressureCategory::Stage1);
        assert_eq!(BloodPressureCategory::classify(150.0, 95.0), BloodPressureCategory::Stage2);
        assert_eq!(
            BloodPressureCategory::classify(185.0, 125.0),
            BloodPressureCategory::HypertensiveCrisis
        );

        assert_eq!(GlucoseCategory::classify(65.0), GlucoseCategory::Hypoglycemia);
        assert_eq!(GlucoseCategory::classify(110.0), GlucoseCategory::Prediabetes);
        assert_eq!(GlucoseCategory::classify(126.0), GlucoseCategory::Diabetes);
    }

    #[test]
    fn test_blood_pressure_most_severe_reading_wins() {
        let cases = [
            (200.0, 85.0, BloodPressureCategory::HypertensiveCrisis),
            (150.0, 125.0, BloodPressureCategory::HypertensiveCrisis),
            (185.0, 95.0, BloodPressureCategory::HypertensiveCrisis),
            (180.0, 70.0, BloodPressureCategory::HypertensiveCrisis),
            (145.0, 70.0, BloodPressureCategory::Stage2),
            (118.0, 92.0, BloodPressureCategory::Stage2),
            (115.0, 82.0, BloodPressureCategory::Stage1),
            (130.0, 70.0, BloodPressureCategory::Stage1),
            (120.0, 79.0, BloodPressureCategory::Elevated),
            (119.0, 79.0, BloodPressureCategory::Normal),
        ];
        for (systolic, diastolic, expected) in cases {
            assert_eq!(
                BloodPressureCategory::classify(systolic, diastolic),
                expected,
                "{}/{}",
                systolic,
                diastolic
            );
        }
    }

    #[test]
    fn test_categories_use_latest_readings() {
        let samples = vec![
            make_sample(0, &[(MetricName::HeartRate, 190.0)]),
            make_sample(60, &[(MetricName::HeartRate, 72.0)]),
            make_sample(
                30,
                &[(MetricName::SystolicBp, 122.0), (MetricName::DiastolicBp, 78.0)],
            ),
        ];
        let categories = ClinicalCategories::from_samples(&samples);
        assert_eq!(categories.heart_rate_zone, Some(HeartRateZone::Normal));
        assert_eq!(categories.blood_pressure, Some(BloodPressureCategory::Elevated));
        assert_eq!(categories.glucose, None);
    }

    #[test]
    fn test_data_quality() {
        let samples: Vec<NormalizedSample> = (0..10)
            .map(|i| make_sample(i * 6, &[(MetricName::HeartRate, 70.0)]))
            .collect();
        // Latest sample at +54s, assessed 10 minutes 54 seconds later
        let now = t0() + Duration::seconds(54) + Duration::minutes(10);
        let quality = DataQuality::assess(&samples, now);

        assert_eq!(quality.completeness, 50.0);
        assert_eq!(quality.consistency, 100.0);
        assert!((quality.timeliness - 90.0).abs() < 1e-9);
        assert!((quality.overall - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_ols_slope_without_spread() {
        assert_eq!(ols_slope(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(ols_slope(&[0.0, 1.0, 2.0], &[5.0, 3.0, 1.0]), Some(-2.0));
    }
}
