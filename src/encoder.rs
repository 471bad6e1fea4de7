//! Aggregated record encoding
//!
//! This module encodes one aggregation cycle for a patient into the record
//! handed to the persistence collaborator:
//! - Producer metadata and computation time
//! - Per-metric summary statistics over the samples of the cycle
//! - Per-device trends over the buffered window
//! - Data quality and clinical categories
//! - The trajectory computed in the same cycle

use crate::buffer::SignalBuffer;
use crate::clock::{Clock, SystemClock};
use crate::error::MonitorError;
use crate::features::{ClinicalCategories, DataQuality, FeatureDeriver, MetricStats};
use crate::trajectory::HealthTrajectory;
use crate::types::{Assessment, MetricName, NormalizedSample, Trend};
use crate::{PRODUCER_NAME, VIGIL_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Current aggregated record format version
pub const RECORD_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Trends of one device connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTrends {
    pub device_id: String,
    pub trends: BTreeMap<MetricName, Assessment<Trend>>,
}

impl DeviceTrends {
    /// Trend of every metric present in the buffer, over the whole buffer
    pub fn from_buffer(buffer: &SignalBuffer, min_points: usize) -> Self {
        let trends = buffer
            .metrics()
            .into_iter()
            .map(|metric| {
                let window = buffer.window(metric, buffer.capacity());
                (metric, FeatureDeriver::trend(metric, &window, min_points))
            })
            .collect();

        Self {
            device_id: buffer.device_id().to_string(),
            trends,
        }
    }
}

/// Output of one aggregation cycle for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub record_version: String,
    pub producer: RecordProducer,
    pub patient_id: String,
    pub computed_at: DateTime<Utc>,
    /// Earliest sample of the cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    /// Latest sample of the cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
    pub sample_count: usize,
    pub device_types: Vec<String>,
    pub metrics: BTreeMap<MetricName, MetricStats>,
    pub device_trends: Vec<DeviceTrends>,
    pub quality: DataQuality,
    pub categories: ClinicalCategories,
    pub trajectory: HealthTrajectory,
}

/// Encoder for aggregated records
pub struct RecordEncoder {
    instance_id: String,
    clock: Arc<dyn Clock>,
}

impl Default for RecordEncoder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RecordEncoder {
    /// Create an encoder with a unique instance ID
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            clock,
        }
    }

    pub fn with_instance_id(instance_id: String, clock: Arc<dyn Clock>) -> Self {
        Self { instance_id, clock }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode the samples drained in one cycle together with the cycle's
    /// trends and trajectory
    pub fn encode(
        &self,
        patient_id: &str,
        samples: &[NormalizedSample],
        device_trends: Vec<DeviceTrends>,
        trajectory: HealthTrajectory,
    ) -> AggregatedRecord {
        let computed_at = self.clock.now();

        let mut values: BTreeMap<MetricName, Vec<f64>> = BTreeMap::new();
        for sample in samples {
            for (metric, value) in &sample.metrics {
                values.entry(*metric).or_default().push(*value);
            }
        }
        let metrics = values
            .into_iter()
            .filter_map(|(metric, v)| MetricStats::from_values(&v).map(|s| (metric, s)))
            .collect();

        let device_types: BTreeSet<&str> = samples.iter().map(|s| s.device_type.as_str()).collect();

        AggregatedRecord {
            record_version: RECORD_VERSION.to_string(),
            producer: RecordProducer {
                name: PRODUCER_NAME.to_string(),
                version: VIGIL_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            patient_id: patient_id.to_string(),
            computed_at,
            window_start: samples.iter().map(|s| s.timestamp).min(),
            window_end: samples.iter().map(|s| s.timestamp).max(),
            sample_count: samples.len(),
            device_types: device_types.into_iter().map(String::from).collect(),
            metrics,
            device_trends,
            quality: DataQuality::assess(samples, computed_at),
            categories: ClinicalCategories::from_samples(samples),
            trajectory,
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(
        &self,
        patient_id: &str,
        samples: &[NormalizedSample],
        device_trends: Vec<DeviceTrends>,
        trajectory: HealthTrajectory,
    ) -> Result<String, MonitorError> {
        let record = self.encode(patient_id, samples, device_trends, trajectory);
        serde_json::to_string_pretty(&record).map_err(MonitorError::Json)
    }
}
