//! Monitor configuration
//!
//! Every numeric policy of the engine is configurable. Missing fields take
//! their defaults, so `{}` is a valid configuration file.

use crate::buffer::DEFAULT_CAPACITY;
use crate::detector::{DetectorConfig, MAX_TREND_WINDOW_SECS};
use crate::emergency::{EmergencyConfig, MAX_RESOLVED_RETENTION_SECS};
use crate::error::MonitorError;
use crate::trajectory::AggregatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Samples kept per device connection
    pub buffer_capacity: usize,
    /// Readings a trend needs before it is assessed
    pub min_trend_points: usize,
    pub aggregation_interval_secs: u64,
    pub detector: DetectorConfig,
    pub aggregator: AggregatorConfig,
    pub emergency: EmergencyConfig,
    /// Buffered events per subscriber before the slowest one lags
    pub event_channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            min_trend_points: 3,
            aggregation_interval_secs: 5,
            detector: DetectorConfig::default(),
            aggregator: AggregatorConfig::default(),
            emergency: EmergencyConfig::default(),
            event_channel_capacity: 1024,
        }
    }
}

impl MonitorConfig {
    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn aggregation_interval(&self) -> Duration {
        Duration::from_secs(self.aggregation_interval_secs)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.buffer_capacity == 0 {
            return Err(MonitorError::Config("buffer_capacity must be at least 1".into()));
        }
        if self.min_trend_points < 2 {
            return Err(MonitorError::Config("min_trend_points must be at least 2".into()));
        }
        if self.aggregation_interval_secs == 0 {
            return Err(MonitorError::Config(
                "aggregation_interval_secs must be at least 1".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(MonitorError::Config(
                "event_channel_capacity must be at least 1".into(),
            ));
        }

        let detector = &self.detector;
        for (name, value) in [
            ("confidence_threshold", detector.confidence_threshold),
            ("critical_confidence", detector.critical_confidence),
            ("warning_confidence", detector.warning_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MonitorError::Config(format!(
                    "detector.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if !(detector.deviation_multiplier > 0.0) {
            return Err(MonitorError::Config(
                "detector.deviation_multiplier must be positive".into(),
            ));
        }
        if !(1..=MAX_TREND_WINDOW_SECS).contains(&detector.trend_window_secs) {
            return Err(MonitorError::Config(format!(
                "detector.trend_window_secs must be within [1, {MAX_TREND_WINDOW_SECS}]"
            )));
        }

        let aggregator = &self.aggregator;
        if aggregator.min_data_points == 0 {
            return Err(MonitorError::Config(
                "aggregator.min_data_points must be at least 1".into(),
            ));
        }
        if !(0.0 < aggregator.vital_medium_fraction
            && aggregator.vital_medium_fraction <= aggregator.vital_high_fraction
            && aggregator.vital_high_fraction <= 1.0)
        {
            return Err(MonitorError::Config(
                "aggregator vital fractions must satisfy 0 < medium <= high <= 1".into(),
            ));
        }
        if !(aggregator.vital_slope_per_minute > 0.0) {
            return Err(MonitorError::Config(
                "aggregator.vital_slope_per_minute must be positive".into(),
            ));
        }

        if self.emergency.action_timeout_secs == Some(0) {
            return Err(MonitorError::Config(
                "emergency.action_timeout_secs must be at least 1".into(),
            ));
        }
        if self.emergency.notification_timeout_secs == 0 {
            return Err(MonitorError::Config(
                "emergency.notification_timeout_secs must be at least 1".into(),
            ));
        }
        if !(1..=MAX_RESOLVED_RETENTION_SECS).contains(&self.emergency.resolved_retention_secs) {
            return Err(MonitorError::Config(format!(
                "emergency.resolved_retention_secs must be within [1, {MAX_RESOLVED_RETENTION_SECS}]"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_json_is_default() {
        let config = MonitorConfig::from_json("{}").unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.aggregation_interval(), Duration::from_secs(5));
        assert_eq!(config.detector.confidence_threshold, 0.7);
        assert_eq!(config.emergency.resolved_retention_secs, 3600);
        assert_eq!(config.emergency.notification_timeout_secs, 30);
        assert_eq!(config.aggregator.vital_slope_per_minute, 0.5);
    }

    #[test]
    fn test_partial_override() {
        let config = MonitorConfig::from_json(
            r#"{"buffer_capacity": 50, "detector": {"deviation_multiplier": 3.0}}"#,
        )
        .unwrap();
        assert_eq!(config.buffer_capacity, 50);
        assert_eq!(config.detector.deviation_multiplier, 3.0);
        assert_eq!(config.detector.statistical_min_samples, 20);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = MonitorConfig::from_json(r#"{"buffer_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));

        let err = MonitorConfig::from_json(r#"{"detector": {"confidence_threshold": 1.5}}"#)
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG");

        let err = MonitorConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, MonitorError::Json(_)));
    }

    #[test]
    fn test_time_windows_are_bounded() {
        for json in [
            r#"{"detector": {"trend_window_secs": 18446744073709551615}}"#,
            r#"{"detector": {"trend_window_secs": 86401}}"#,
            r#"{"emergency": {"resolved_retention_secs": 18446744073709551615}}"#,
            r#"{"emergency": {"resolved_retention_secs": 0}}"#,
            r#"{"emergency": {"notification_timeout_secs": 0}}"#,
            r#"{"aggregator": {"vital_slope_per_minute": 0.0}}"#,
        ] {
            let err = MonitorConfig::from_json(json).unwrap_err();
            assert!(matches!(err, MonitorError::Config(_)), "{json}");
        }

        let config = MonitorConfig::from_json(
            r#"{"detector": {"trend_window_secs": 86400}, "emergency": {"resolved_retention_secs": 31536000}}"#,
        )
        .unwrap();
        assert_eq!(config.detector.trend_window_secs, MAX_TREND_WINDOW_SECS);
        assert_eq!(config.emergency.resolved_retention_secs, MAX_RESOLVED_RETENTION_SECS);
    }

    #[test]
    fn test_missing_file() {
        let err = MonitorConfig::from_file("/nonexistent/vigil.json").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }
}
