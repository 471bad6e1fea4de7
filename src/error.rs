//! Error types for Synheart Vigil

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while monitoring
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Out-of-order sample for {patient_id}/{device_id}: {timestamp} precedes {latest}")]
    OutOfOrderSample {
        patient_id: String,
        device_id: String,
        timestamp: String,
        latest: String,
    },

    #[error("Device not connected: {patient_id}/{device_id}")]
    DeviceNotConnected {
        patient_id: String,
        device_id: String,
    },

    #[error("Threshold configuration error: {0}")]
    ThresholdConfig(String),

    #[error("Emergency action {action} failed: {reason}")]
    ActionExecution { action: String, reason: String },

    #[error("Emergency action {action} timed out after {timeout:?}")]
    ActionTimeout { action: String, timeout: Duration },

    #[error("Notification to contact {contact_id} failed: {reason}")]
    Notification { contact_id: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonitorError {
    /// Short machine-readable code, used in sample outcomes and CLI reports
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::InvalidSample(_) => "INVALID_SAMPLE",
            MonitorError::OutOfOrderSample { .. } => "OUT_OF_ORDER",
            MonitorError::DeviceNotConnected { .. } => "NOT_CONNECTED",
            MonitorError::ThresholdConfig(_) => "THRESHOLD_CONFIG",
            MonitorError::ActionExecution { .. } => "ACTION_FAILED",
            MonitorError::ActionTimeout { .. } => "ACTION_TIMEOUT",
            MonitorError::Notification { .. } => "NOTIFICATION_FAILED",
            MonitorError::Persistence(_) => "PERSISTENCE",
            MonitorError::Config(_) => "CONFIG",
            MonitorError::Json(_) => "JSON",
        }
    }
}
