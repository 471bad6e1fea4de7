//! Per-device signal buffer
//!
//! A bounded, time-ordered window of normalized samples for one
//! (patient, device) pair. Appends beyond capacity evict the oldest sample.
//!
//! The buffer also keeps a pending cursor: the samples appended since the last
//! aggregation cycle. Draining the cursor does not shrink the detection window.

use crate::error::MonitorError;
use crate::types::{MetricName, NormalizedSample};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Default samples kept per device connection
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded ring of normalized samples, non-decreasing in timestamp
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    patient_id: String,
    device_id: String,
    capacity: usize,
    samples: VecDeque<NormalizedSample>,
    /// Samples at the tail not yet seen by aggregation
    pending: usize,
    total_appended: u64,
}

impl SignalBuffer {
    pub fn new(patient_id: impl Into<String>, device_id: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            patient_id: patient_id.into(),
            device_id: device_id.into(),
            capacity,
            samples: VecDeque::with_capacity(capacity),
            pending: 0,
            total_appended: 0,
        }
    }

    /// Append a sample, evicting the oldest entry when full.
    ///
    /// A sample older than the latest buffered one is rejected so the buffer
    /// stays ordered; equal timestamps are accepted.
    pub fn append(&mut self, sample: NormalizedSample) -> Result<(), MonitorError> {
        if let Some(latest) = self.samples.back() {
            if sample.timestamp < latest.timestamp {
                return Err(MonitorError::OutOfOrderSample {
                    patient_id: self.patient_id.clone(),
                    device_id: self.device_id.clone(),
                    timestamp: sample.timestamp.to_rfc3339(),
                    latest: latest.timestamp.to_rfc3339(),
                });
            }
        }

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.pending = (self.pending + 1).min(self.samples.len());
        self.total_appended += 1;
        Ok(())
    }

    /// The last `size` readings of `metric`, in arrival order.
    /// Samples that lack the metric are skipped.
    pub fn window(&self, metric: MetricName, size: usize) -> Vec<(DateTime<Utc>, f64)> {
        let mut readings: Vec<(DateTime<Utc>, f64)> = self
            .samples
            .iter()
            .rev()
            .filter_map(|s| s.metric(metric).map(|v| (s.timestamp, v)))
            .take(size)
            .collect();
        readings.reverse();
        readings
    }

    /// Readings of `metric` at or after `since`, in arrival order
    pub fn window_since(&self, metric: MetricName, since: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= since)
            .filter_map(|s| s.metric(metric).map(|v| (s.timestamp, v)))
            .collect()
    }

    /// Take the samples appended since the previous drain.
    /// Samples evicted before aggregation saw them are gone.
    pub fn drain_pending(&mut self) -> Vec<NormalizedSample> {
        let start = self.samples.len() - self.pending;
        self.pending = 0;
        self.samples.iter().skip(start).cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending
    }

    pub fn latest(&self) -> Option<&NormalizedSample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &NormalizedSample> {
        self.samples.iter()
    }

    /// Metrics present in at least one buffered sample
    pub fn metrics(&self) -> Vec<MetricName> {
        let mut metrics: Vec<MetricName> = self
            .samples
            .iter()
            .flat_map(|s| s.metrics.keys().copied())
            .collect();
        metrics.sort();
        metrics.dedup();
        metrics
    }

    /// Check the ordering and capacity invariants
    pub fn is_consistent(&self) -> bool {
        self.samples.len() <= self.capacity
            && self
                .samples
                .iter()
                .zip(self.samples.iter().skip(1))
                .all(|(a, b)| a.timestamp <= b.timestamp)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}
