//! Synheart Vigil - Real-time vital-sign monitoring and emergency response engine
//!
//! Vigil ingests streaming samples from heterogeneous monitoring devices and runs
//! them through a per-device pipeline: device adaptation → normalization →
//! buffering → anomaly detection → emergency response. A periodic aggregation
//! cycle turns buffered data into health trajectories and aggregated records.
//!
//! ## Modules
//!
//! - **Ingestion**: device adapters, normalizer and per-device signal buffers
//! - **Detection**: thresholds, adaptive baselines and the anomaly detector
//! - **Aggregation**: trends, trajectories, risk and early warnings
//! - **Response**: emergency protocols, orchestration and contact notification
//!
//! [`MonitorCoordinator`] ties them together behind the collaborator traits in
//! [`collaborators`].

pub mod adapters;
pub mod baseline;
pub mod buffer;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod detector;
pub mod emergency;
pub mod encoder;
pub mod error;
pub mod features;
pub mod normalizer;
pub mod pipeline;
pub mod thresholds;
pub mod trajectory;
pub mod types;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use pipeline::{
    AggregationHandle, AggregationReport, MonitorCoordinator, MonitorEvent, MonitorStats,
    SampleOutcome,
};

// Data model exports
pub use types::{Anomaly, AnomalyType, DeviceType, MetricName, NormalizedSample, RawSample, Severity};

// Response exports
pub use emergency::{Emergency, EmergencyContact, EmergencyOrchestrator, EmergencyType, Triggered};

/// Vigil version embedded in all aggregated records
pub const VIGIL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for aggregated records
pub const PRODUCER_NAME: &str = "synheart-vigil";
