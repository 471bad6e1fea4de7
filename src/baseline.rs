//! Baseline management
//!
//! This module maintains per-patient adaptive baselines: a streaming
//! mean/variance per metric (Welford's algorithm), plus the observed range.
//! Baselines enable deviation-based interpretation of incoming readings.

use crate::types::{MetricName, NormalizedSample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rolling statistical summary of one metric for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
    /// Sum of squared deviations from the mean
    #[serde(default)]
    m2: f64,
}

impl Baseline {
    /// Baseline from a single first reading
    pub fn first(value: f64, at: DateTime<Utc>) -> Self {
        Self {
            mean: value,
            std_dev: 0.0,
            min: value,
            max: value,
            sample_count: 1,
            last_updated: at,
            m2: 0.0,
        }
    }

    /// Baseline seeded from known summary statistics, e.g. imported from a
    /// clinical record.
    pub fn from_stats(mean: f64, std_dev: f64, sample_count: u64, at: DateTime<Utc>) -> Self {
        let m2 = if sample_count > 1 {
            std_dev * std_dev * (sample_count - 1) as f64
        } else {
            0.0
        };
        Self {
            mean,
            std_dev,
            min: mean,
            max: mean,
            sample_count,
            last_updated: at,
            m2,
        }
    }

    /// Fold one reading into the running statistics
    pub fn update(&mut self, value: f64, at: DateTime<Utc>) {
        self.sample_count += 1;
        let n = self.sample_count as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);
        self.std_dev = if self.sample_count > 1 {
            (self.m2 / (n - 1.0)).max(0.0).sqrt()
        } else {
            0.0
        };
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if at > self.last_updated {
            self.last_updated = at;
        }
    }

    /// Distance from the mean in standard deviations.
    /// `None` when the spread is too small to be meaningful.
    pub fn deviation_ratio(&self, value: f64) -> Option<f64> {
        if !self.std_dev.is_finite() || self.std_dev <= f64::EPSILON {
            return None;
        }
        Some((value - self.mean).abs() / self.std_dev)
    }

    pub fn is_valid(&self) -> bool {
        self.mean.is_finite() && self.std_dev.is_finite() && self.std_dev >= 0.0
    }
}

/// Baseline store for one patient
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineStore {
    baselines: BTreeMap<MetricName, Baseline>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: MetricName) -> Option<&Baseline> {
        self.baselines.get(&metric)
    }

    /// Replace the baseline for a metric
    pub fn seed(&mut self, metric: MetricName, baseline: Baseline) {
        self.baselines.insert(metric, baseline);
    }

    /// Fold every metric of an accepted sample into its baseline
    pub fn update(&mut self, sample: &NormalizedSample) {
        for (metric, value) in &sample.metrics {
            match self.baselines.get_mut(metric) {
                Some(baseline) => baseline.update(*value, sample.timestamp),
                None => {
                    self.baselines
                        .insert(*metric, Baseline::first(*value, sample.timestamp));
                }
            }
        }
    }

    pub fn snapshot(&self) -> BTreeMap<MetricName, Baseline> {
        self.baselines.clone()
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    /// Load baseline store from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize baseline store to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
