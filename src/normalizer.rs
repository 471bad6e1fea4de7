//! Sample normalization
//!
//! This module turns device-specific raw samples into canonical samples.
//! - Required identity fields validated (patient, device, timestamp)
//! - Device fields mapped to canonical metrics via the device adapter
//! - Physiologically implausible readings dropped and flagged
//! - Quality taken from device-reported confidence, else a fixed default

use crate::adapters::{adapter_for, CONFIDENCE_FIELDS};
use crate::error::MonitorError;
use crate::types::{NormalizedSample, QualityFlag, RawSample};

/// Quality assigned when the device reports no confidence of its own
pub const DEFAULT_QUALITY: f64 = 0.9;

/// Normalizer for converting raw device samples to canonical samples
pub struct Normalizer;

impl Normalizer {
    /// Normalize a raw sample.
    ///
    /// Pure and deterministic. A sample whose fields yield no metric is still
    /// returned, with quality 0 and [`QualityFlag::NoMetrics`]; the caller
    /// decides whether to accept it.
    pub fn normalize(raw: &RawSample) -> Result<NormalizedSample, MonitorError> {
        if raw.patient_id.trim().is_empty() {
            return Err(MonitorError::InvalidSample("missing patient id".to_string()));
        }
        if raw.device_id.trim().is_empty() {
            return Err(MonitorError::InvalidSample("missing device id".to_string()));
        }
        let timestamp = raw
            .timestamp
            .ok_or_else(|| MonitorError::InvalidSample("missing timestamp".to_string()))?;

        let mapped = adapter_for(&raw.device_type).map_fields(&raw.fields);
        let mut quality_flags = mapped.flags;
        let mut metrics = mapped.metrics;

        // Drop sensor glitches
        let before = metrics.len();
        metrics.retain(|metric, value| match metric.valid_range() {
            Some((min, max)) => *value >= min && *value <= max,
            None => true,
        });
        if metrics.len() < before {
            quality_flags.push(QualityFlag::ImplausibleValue);
        }

        let quality = if metrics.is_empty() {
            quality_flags.push(QualityFlag::NoMetrics);
            0.0
        } else {
            match reported_confidence(raw) {
                Some(confidence) => {
                    quality_flags.push(QualityFlag::DeviceReportedConfidence);
                    confidence
                }
                None => DEFAULT_QUALITY,
            }
        };

        Ok(NormalizedSample {
            patient_id: raw.patient_id.clone(),
            device_id: raw.device_id.clone(),
            device_type: raw.device_type.clone(),
            timestamp,
            metrics,
            quality,
            quality_flags,
        })
    }
}

/// Device-reported confidence, scaled to 0-1. Percent values are accepted.
fn reported_confidence(raw: &RawSample) -> Option<f64> {
    CONFIDENCE_FIELDS
        .iter()
        .find_map(|name| raw.fields.get(*name).and_then(|v| v.as_f64()))
        .map(|value| {
            let scaled = if value > 1.0 { value / 100.0 } else { value };
            scaled.clamp(0.0, 1.0)
        })
}
