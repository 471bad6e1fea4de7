//! Vital-sign history analysis

use crate::features::{mean, ols_slope};
use crate::types::{Assessment, MetricName, NormalizedSample, Severity, TrendDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::AggregatorConfig;

/// Per-minute slope magnitude below which a vital is stable
const STABLE_RATE_PER_MINUTE: f64 = 0.01;

/// Vital readings taken together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalReading {
    pub timestamp: DateTime<Utc>,
    pub vitals: BTreeMap<MetricName, f64>,
}

impl From<&NormalizedSample> for VitalReading {
    fn from(sample: &NormalizedSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            vitals: sample.metrics.clone(),
        }
    }
}

/// Regression summary of one vital
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalTrend {
    pub direction: TrendDirection,
    /// Least-squares slope against time
    pub rate_per_minute: f64,
    /// Share of readings outside the normal clinical range (0-1)
    pub out_of_range_fraction: f64,
    pub concern: Severity,
    pub latest: f64,
    pub average: f64,
    pub count: usize,
}

/// Result of vital history analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalInsights {
    pub trends: BTreeMap<MetricName, VitalTrend>,
    /// Highest concern across vitals
    pub concern: Severity,
}

impl VitalInsights {
    /// Vitals at high concern or above
    pub fn concerning(&self) -> Vec<MetricName> {
        self.trends
            .iter()
            .filter(|(_, t)| t.concern >= Severity::High)
            .map(|(m, _)| *m)
            .collect()
    }
}

/// Analyze a vital history. Metrics with fewer readings than the minimum are
/// left out; a history shorter than the minimum is insufficient data.
pub fn analyze(history: &[VitalReading], config: &AggregatorConfig) -> Assessment<VitalInsights> {
    if history.len() < config.min_data_points {
        return Assessment::InsufficientData;
    }

    let mut series: BTreeMap<MetricName, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
    for reading in history {
        for (metric, value) in &reading.vitals {
            series
                .entry(*metric)
                .or_default()
                .push((reading.timestamp, *value));
        }
    }

    let trends: BTreeMap<MetricName, VitalTrend> = series
        .into_iter()
        .filter(|(_, points)| points.len() >= config.min_data_points)
        .map(|(metric, mut points)| {
            points.sort_by_key(|(t, _)| *t);
            (metric, vital_trend(metric, &points, config))
        })
        .collect();

    if trends.is_empty() {
        return Assessment::InsufficientData;
    }

    let concern = trends
        .values()
        .map(|t| t.concern)
        .max()
        .unwrap_or(Severity::Low);

    Assessment::Assessed(VitalInsights { trends, concern })
}

fn vital_trend(metric: MetricName, points: &[(DateTime<Utc>, f64)], config: &AggregatorConfig) -> VitalTrend {
    let start = points[0].0;
    let minutes: Vec<f64> = points
        .iter()
        .map(|(t, _)| (*t - start).num_milliseconds() as f64 / 60_000.0)
        .collect();
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let rate_per_minute = ols_slope(&minutes, &values).unwrap_or(0.0);

    let direction = if rate_per_minute > STABLE_RATE_PER_MINUTE {
        TrendDirection::Increasing
    } else if rate_per_minute < -STABLE_RATE_PER_MINUTE {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let out_of_range_fraction = match metric.normal_range() {
        Some((min, max)) => {
            let outside = values.iter().filter(|v| **v < min || **v > max).count();
            outside as f64 / values.len() as f64
        }
        None => 0.0,
    };

    let mut concern = if out_of_range_fraction > config.vital_high_fraction {
        Severity::High
    } else if out_of_range_fraction > config.vital_medium_fraction {
        Severity::Medium
    } else {
        Severity::Low
    };
    if moving_with_concern(metric, rate_per_minute, config.vital_slope_per_minute) {
        concern = concern.max(Severity::Medium);
    }

    VitalTrend {
        direction,
        rate_per_minute,
        out_of_range_fraction,
        concern,
        latest: values[values.len() - 1],
        average: mean(&values),
        count: values.len(),
    }
}

/// Heart rate drifting either way, or systolic pressure climbing, is a
/// concern even while readings stay in range
fn moving_with_concern(metric: MetricName, rate_per_minute: f64, limit: f64) -> bool {
    match metric {
        MetricName::HeartRate => rate_per_minute.abs() > limit,
        MetricName::SystolicBp => rate_per_minute > limit,
        _ => false,
    }
}
