//! Anomaly detection
//!
//! Three independent strategies evaluate each accepted sample:
//! - Rule-based: absolute critical/warning bounds from the threshold profile
//! - Statistical: deviation from the patient's baseline in standard deviations
//! - Trend-based: rate of change over the recent buffer window
//!
//! Candidates below the confidence threshold are dropped, then the survivors
//! are collapsed to one anomaly per metric.

use crate::baseline::BaselineStore;
use crate::buffer::SignalBuffer;
use crate::features::ols_slope;
use crate::thresholds::{Breach, ThresholdProfile};
use crate::types::{
    Anomaly, AnomalyReference, AnomalyType, DetectionStrategy, MetricName, NormalizedSample,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Longest accepted rate-of-change window (one day)
pub const MAX_TREND_WINDOW_SECS: u64 = 86_400;

/// Metric-specific rate-of-change limits over the trend window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    /// mg/dL rise
    pub glucose_rise: f64,
    /// mg/dL fall
    pub glucose_fall: f64,
    /// mmHg change in either direction
    pub systolic_change: f64,
    /// bpm change in either direction
    pub heart_rate_change: f64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            glucose_rise: 50.0,
            glucose_fall: 30.0,
            systolic_change: 30.0,
            heart_rate_change: 30.0,
        }
    }
}

/// Detection policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Anomalies below this confidence are never published
    pub confidence_threshold: f64,
    /// Standard deviations from the baseline mean that count as an outlier
    pub deviation_multiplier: f64,
    pub critical_confidence: f64,
    pub warning_confidence: f64,
    /// Baseline samples needed before statistical anomalies can publish
    pub statistical_min_samples: u64,
    /// Baseline samples at which statistical confidence stops growing
    pub statistical_sample_cap: u64,
    /// Capped at `MAX_TREND_WINDOW_SECS`
    pub trend_window_secs: u64,
    pub rate_limits: RateLimits,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            deviation_multiplier: 2.5,
            critical_confidence: 0.9,
            warning_confidence: 0.6,
            statistical_min_samples: 20,
            statistical_sample_cap: 100,
            trend_window_secs: 300,
            rate_limits: RateLimits::default(),
        }
    }
}

/// Anomaly detector
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectorConfig,
    min_trend_points: usize,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default(), 3)
    }
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig, min_trend_points: usize) -> Self {
        Self {
            config,
            min_trend_points: min_trend_points.max(2),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Evaluate a sample that has already been appended to `buffer`.
    ///
    /// `baselines` must be the snapshot from before this sample was folded in.
    /// Malformed state yields an empty list and a warning; this never fails.
    pub fn detect(
        &self,
        patient_id: &str,
        sample: &NormalizedSample,
        buffer: &SignalBuffer,
        thresholds: &ThresholdProfile,
        baselines: &BaselineStore,
    ) -> Vec<Anomaly> {
        if let Err(e) = thresholds.validate() {
            warn!(patient_id, device_id = %sample.device_id, error = %e, "Skipping detection: malformed thresholds");
            return Vec::new();
        }
        if !buffer.is_consistent() {
            warn!(patient_id, device_id = %sample.device_id, "Skipping detection: buffer out of order");
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (metric, value) in &sample.metrics {
            if !value.is_finite() {
                continue;
            }
            candidates.extend(self.rule_based(patient_id, sample, *metric, *value, thresholds));
            candidates.extend(self.statistical(patient_id, sample, *metric, *value, baselines));
            candidates.extend(self.trend_based(patient_id, sample, *metric, *value, buffer));
        }

        let anomalies = self.consolidate(candidates);
        for anomaly in &anomalies {
            debug!(
                patient_id,
                device_id = %anomaly.device_id,
                metric = %anomaly.metric,
                kind = anomaly.anomaly_type.as_str(),
                severity = anomaly.severity.as_str(),
                confidence = anomaly.confidence,
                "Anomaly detected"
            );
        }
        anomalies
    }

    fn rule_based(
        &self,
        patient_id: &str,
        sample: &NormalizedSample,
        metric: MetricName,
        value: f64,
        thresholds: &ThresholdProfile,
    ) -> Option<Anomaly> {
        let bounds = thresholds.get(metric)?;

        let (kind, breach, confidence) = if let Some(breach) = bounds.critical.breach(value) {
            (critical_kind(metric, breach), breach, self.config.critical_confidence)
        } else if let Some(breach) = bounds.warning.breach(value) {
            let kind = match breach {
                Breach::High(_) => AnomalyType::BorderlineHigh,
                Breach::Low(_) => AnomalyType::BorderlineLow,
            };
            (kind, breach, self.config.warning_confidence)
        } else {
            return None;
        };

        Some(make_anomaly(
            patient_id,
            sample,
            metric,
            value,
            kind,
            AnomalyReference::Threshold {
                bound: breach.bound(),
            },
            confidence,
            DetectionStrategy::RuleBased,
        ))
    }

    fn statistical(
        &self,
        patient_id: &str,
        sample: &NormalizedSample,
        metric: MetricName,
        value: f64,
        baselines: &BaselineStore,
    ) -> Option<Anomaly> {
        let baseline = baselines.get(metric)?;
        if !baseline.is_valid() {
            warn!(patient_id, metric = %metric, "Ignoring malformed baseline");
            return None;
        }
        let ratio = baseline.deviation_ratio(value)?;
        if ratio <= self.config.deviation_multiplier {
            return None;
        }

        Some(make_anomaly(
            patient_id,
            sample,
            metric,
            value,
            AnomalyType::StatisticalOutlier,
            AnomalyReference::Baseline {
                mean: baseline.mean,
                std_dev: baseline.std_dev,
                deviation_ratio: ratio,
            },
            self.statistical_confidence(baseline.sample_count, ratio),
            DetectionStrategy::Statistical,
        ))
    }

    /// Confidence grows with baseline maturity. Immature baselines stay
    /// below the publish threshold regardless of the deviation.
    fn statistical_confidence(&self, sample_count: u64, ratio: f64) -> f64 {
        let min = self.config.statistical_min_samples.max(1);
        if sample_count < min {
            return 0.65 * sample_count as f64 / min as f64;
        }
        let cap = self.config.statistical_sample_cap;
        let maturity = if cap > min {
            ((sample_count - min) as f64 / (cap - min) as f64).min(1.0)
        } else {
            1.0
        };
        let mut confidence = 0.7 + 0.15 * maturity;
        if ratio > 2.0 * self.config.deviation_multiplier {
            confidence += 0.1;
        }
        confidence.min(1.0)
    }

    fn trend_based(
        &self,
        patient_id: &str,
        sample: &NormalizedSample,
        metric: MetricName,
        value: f64,
        buffer: &SignalBuffer,
    ) -> Option<Anomaly> {
        let limits = &self.config.rate_limits;
        if !matches!(
            metric,
            MetricName::BloodGlucose | MetricName::SystolicBp | MetricName::HeartRate
        ) {
            return None;
        }

        let window_secs = self.config.trend_window_secs.min(MAX_TREND_WINDOW_SECS);
        let since = sample.timestamp - Duration::seconds(window_secs as i64);
        let window: Vec<_> = buffer
            .window_since(metric, since)
            .into_iter()
            .filter(|(t, _)| *t <= sample.timestamp)
            .collect();
        if window.len() < self.min_trend_points {
            return None;
        }

        let start = window[0].0;
        let secs: Vec<f64> = window
            .iter()
            .map(|(t, _)| (*t - start).num_milliseconds() as f64 / 1000.0)
            .collect();
        let values: Vec<f64> = window.iter().map(|(_, v)| *v).collect();
        let rate = ols_slope(&secs, &values)?;
        let span = secs[secs.len() - 1];
        let change = rate * span;

        let kind = match metric {
            MetricName::BloodGlucose if change >= limits.glucose_rise => AnomalyType::RapidGlucoseRise,
            MetricName::BloodGlucose if change <= -limits.glucose_fall => AnomalyType::RapidGlucoseFall,
            MetricName::SystolicBp if change.abs() >= limits.systolic_change => {
                AnomalyType::RapidBloodPressureChange
            }
            MetricName::HeartRate if change.abs() >= limits.heart_rate_change => {
                AnomalyType::RapidHeartRateChange
            }
            _ => return None,
        };

        let extra_points = (window.len() - self.min_trend_points) as f64;
        let confidence = (0.75 + 0.05 * extra_points).min(0.9);

        Some(make_anomaly(
            patient_id,
            sample,
            metric,
            value,
            kind,
            AnomalyReference::Rate {
                change,
                window_secs: span,
            },
            confidence,
            DetectionStrategy::TrendBased,
        ))
    }

    /// Gate on confidence, then keep one anomaly per metric: the most severe,
    /// ties broken by confidence. The survivor lists every strategy that
    /// published a candidate for its metric.
    fn consolidate(&self, candidates: Vec<Anomaly>) -> Vec<Anomaly> {
        let mut by_metric: BTreeMap<MetricName, Anomaly> = BTreeMap::new();

        for candidate in candidates
            .into_iter()
            .filter(|a| a.confidence >= self.config.confidence_threshold)
        {
            match by_metric.get_mut(&candidate.metric) {
                None => {
                    by_metric.insert(candidate.metric, candidate);
                }
                Some(kept) => {
                    let mut strategies = kept.strategies.clone();
                    for strategy in &candidate.strategies {
                        if !strategies.contains(strategy) {
                            strategies.push(*strategy);
                        }
                    }
                    let stronger = (candidate.severity, candidate.confidence)
                        > (kept.severity, kept.confidence);
                    if stronger {
                        *kept = candidate;
                    }
                    kept.strategies = strategies;
                }
            }
        }

        by_metric.into_values().collect()
    }
}

/// Kind of a critical bound breach
fn critical_kind(metric: MetricName, breach: Breach) -> AnomalyType {
    match (metric, breach) {
        (MetricName::HeartRate, Breach::High(_)) => AnomalyType::Tachycardia,
        (MetricName::HeartRate, Breach::Low(_)) => AnomalyType::Bradycardia,
        (MetricName::SystolicBp | MetricName::DiastolicBp, Breach::High(_)) => {
            AnomalyType::HypertensiveEmergency
        }
        (MetricName::SystolicBp | MetricName::DiastolicBp, Breach::Low(_)) => {
            AnomalyType::Hypotension
        }
        (MetricName::OxygenSaturation, Breach::Low(_)) => AnomalyType::Hypoxemia,
        (MetricName::BloodGlucose, Breach::High(_)) => AnomalyType::Hyperglycemia,
        (MetricName::BloodGlucose, Breach::Low(_)) => AnomalyType::Hypoglycemia,
        _ => AnomalyType::CriticalReading,
    }
}

#[allow(clippy::too_many_arguments)]
fn make_anomaly(
    patient_id: &str,
    sample: &NormalizedSample,
    metric: MetricName,
    value: f64,
    kind: AnomalyType,
    reference: AnomalyReference,
    confidence: f64,
    strategy: DetectionStrategy,
) -> Anomaly {
    Anomaly {
        severity: kind.severity(),
        anomaly_type: kind,
        patient_id: patient_id.to_string(),
        device_id: sample.device_id.clone(),
        metric,
        value,
        reference,
        confidence,
        timestamp: sample.timestamp,
        strategies: vec![strategy],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::Baseline;
    use crate::types::{DeviceType, Severity};
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn make_sample(offset_secs: i64, metric: MetricName, value: f64) -> NormalizedSample {
        let mut metrics = BTreeMap::new();
        metrics.insert(metric, value);
        NormalizedSample {
            patient_id: "patient-1".to_string(),
            device_id: "device-1".to_string(),
            device_type: DeviceType::HeartRateMonitor,
            timestamp: t0() + Duration::seconds(offset_secs),
            metrics,
            quality: 0.9,
            quality_flags: vec![],
        }
    }

    fn make_baselines(metric: MetricName, mean: f64, std_dev: f64, count: u64) -> BaselineStore {
        let mut store = BaselineStore::new();
        store.seed(metric, Baseline::from_stats(mean, std_dev, count, t0()));
        store
    }

    /// Append every reading and detect on the last one
    fn run(
        detector: &AnomalyDetector,
        metric: MetricName,
        readings: &[(i64, f64)],
        baselines: &BaselineStore,
    ) -> Vec<Anomaly> {
        let mut buffer = SignalBuffer::new("patient-1", "device-1", 100);
        let mut last = None;
        for (offset, value) in readings {
            let sample = make_sample(*offset, metric, *value);
            buffer.append(sample.clone()).unwrap();
            last = Some(sample);
        }
        let sample = last.unwrap();
        detector.detect(
            "patient-1",
            &sample,
            &buffer,
            &ThresholdProfile::default(),
            baselines,
        )
    }

    #[test]
    fn test_tachycardia_collapses_strategies() {
        let detector = AnomalyDetector::default();
        let baselines = make_baselines(MetricName::HeartRate, 74.0, 5.0, 30);
        let anomalies = run(
            &detector,
            MetricName::HeartRate,
            &[(0, 72.0), (1, 75.0), (2, 180.0)],
            &baselines,
        );

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.anomaly_type, AnomalyType::Tachycardia);
        assert_eq!(anomaly.severity, Severity::Critical);
        assert_eq!(anomaly.confidence, 0.9);
        assert_eq!(anomaly.reference, AnomalyReference::Threshold { bound: 150.0 });
        assert_eq!(
            anomaly.strategies,
            vec![
                DetectionStrategy::RuleBased,
                DetectionStrategy::Statistical,
                DetectionStrategy::TrendBased
            ]
        );
    }

    #[test]
    fn test_normal_reading_has_no_anomaly() {
        let detector = AnomalyDetector::default();
        let baselines = make_baselines(MetricName::HeartRate, 74.0, 5.0, 30);
        let anomalies = run(
            &detector,
            MetricName::HeartRate,
            &[(0, 72.0), (1, 75.0), (2, 76.0)],
            &baselines,
        );
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_warning_breach_is_gated_out() {
        let detector = AnomalyDetector::default();
        let anomalies = run(
            &detector,
            MetricName::HeartRate,
            &[(0, 125.0)],
            &BaselineStore::new(),
        );
        assert!(anomalies.is_empty());

        // With a permissive gate the warning is published
        let config = DetectorConfig {
            confidence_threshold: 0.5,
            ..DetectorConfig::default()
        };
        let anomalies = run(
            &AnomalyDetector::new(config, 3),
            MetricName::HeartRate,
            &[(0, 125.0)],
            &BaselineStore::new(),
        );
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::BorderlineHigh);
        assert_eq!(anomalies[0].severity, Severity::Low);
    }

    #[test]
    fn test_immature_baseline_is_suppressed() {
        let detector = AnomalyDetector::default();
        // 110 bpm: inside thresholds, far from the baseline
        let young = make_baselines(MetricName::HeartRate, 74.0, 5.0, 10);
        assert!(run(&detector, MetricName::HeartRate, &[(0, 110.0)], &young).is_empty());

        let mature = make_baselines(MetricName::HeartRate, 74.0, 5.0, 20);
        let anomalies = run(&detector, MetricName::HeartRate, &[(0, 110.0)], &mature);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::StatisticalOutlier);
        assert_eq!(anomalies[0].severity, Severity::Medium);
        // 7.2 standard deviations: maturity 0 plus the strong-deviation bonus
        assert!((anomalies[0].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_rapid_glucose_rise() {
        let detector = AnomalyDetector::default();
        let anomalies = run(
            &detector,
            MetricName::BloodGlucose,
            &[(0, 100.0), (60, 125.0), (120, 155.0)],
            &BaselineStore::new(),
        );
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::RapidGlucoseRise);
        assert_eq!(anomalies[0].strategies, vec![DetectionStrategy::TrendBased]);
        match anomalies[0].reference {
            AnomalyReference::Rate { change, window_secs } => {
                assert!((change - 55.0).abs() < 1e-9);
                assert_eq!(window_secs, 120.0);
            }
            ref other => panic!("unexpected reference {other:?}"),
        }
    }

    #[test]
    fn test_readings_outside_trend_window_are_ignored() {
        let detector = AnomalyDetector::default();
        let anomalies = run(
            &detector,
            MetricName::BloodGlucose,
            &[(0, 60.0), (400, 100.0), (460, 105.0), (520, 110.0)],
            &BaselineStore::new(),
        );
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_malformed_thresholds_yield_empty_list() {
        let detector = AnomalyDetector::default();
        let mut buffer = SignalBuffer::new("patient-1", "device-1", 10);
        let sample = make_sample(0, MetricName::HeartRate, 200.0);
        buffer.append(sample.clone()).unwrap();

        let profile: ThresholdProfile =
            serde_json::from_value(serde_json::json!({ "metrics": { "heartRate": {
                "critical": { "min": 150.0, "max": 40.0 },
                "warning": { "min": null, "max": null }
            }}}))
            .unwrap();

        let anomalies = detector.detect("patient-1", &sample, &buffer, &profile, &BaselineStore::new());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_hypoxemia_kind() {
        let detector = AnomalyDetector::default();
        let anomalies = run(
            &detector,
            MetricName::OxygenSaturation,
            &[(0, 86.0)],
            &BaselineStore::new(),
        );
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::Hypoxemia);
        assert_eq!(anomalies[0].severity, Severity::Critical);
    }

    proptest! {
        #[test]
        fn prop_published_anomalies_meet_confidence_threshold(
            values in proptest::collection::vec(30.0f64..220.0, 1..30),
            count in 0u64..200,
            std_dev in 0.5f64..20.0,
            threshold in 0.5f64..0.95,
        ) {
            let config = DetectorConfig {
                confidence_threshold: threshold,
                ..DetectorConfig::default()
            };
            let detector = AnomalyDetector::new(config, 3);
            let baselines = make_baselines(MetricName::HeartRate, 74.0, std_dev, count);
            let readings: Vec<(i64, f64)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as i64 * 10, *v))
                .collect();

            for anomaly in run(&detector, MetricName::HeartRate, &readings, &baselines) {
                prop_assert!(anomaly.confidence >= threshold);
            }
        }
    }
}
