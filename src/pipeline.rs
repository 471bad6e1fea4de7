//! Monitoring coordinator
//!
//! This module provides the public API for Synheart Vigil. It owns the
//! per-patient state and runs every sample through the pipeline:
//! 1. Normalizer - map device fields to canonical metrics
//! 2. SignalBuffer - append to the (patient, device) window
//! 3. AnomalyDetector - rule, statistical and trend checks
//! 4. BaselineStore - fold the sample into the patient's baselines
//! 5. EmergencyOrchestrator - respond to critical anomalies
//!
//! A periodic aggregation cycle drains what each buffer accepted since the
//! previous cycle, computes the patient's trajectory and hands an
//! `AggregatedRecord` to the persistence collaborator.
//!
//! At most one sample per (patient, device) is in flight at a time. Ingestion
//! and aggregation for the same patient are serialized by a per-patient gate;
//! different patients never contend.

use crate::baseline::{Baseline, BaselineStore};
use crate::buffer::SignalBuffer;
use crate::clock::Clock;
use crate::collaborators::{EmergencyServices, Notifier, PatientRepository};
use crate::config::MonitorConfig;
use crate::detector::AnomalyDetector;
use crate::emergency::{Emergency, EmergencyContact, EmergencyOrchestrator, EmergencyType, Triggered};
use crate::encoder::{AggregatedRecord, DeviceTrends, RecordEncoder};
use crate::error::MonitorError;
use crate::normalizer::Normalizer;
use crate::thresholds::{PatientContext, ThresholdProfile};
use crate::trajectory::{HealthTrajectory, RiskAssessment, TrajectoryAggregator, VitalReading};
use crate::types::{Anomaly, DeviceType, MetricName, NormalizedSample, RawSample};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Why a sample was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: String,
    pub message: String,
}

impl From<&MonitorError> for Rejection {
    fn from(error: &MonitorError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of pushing one raw sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleOutcome {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<NormalizedSample>,
    pub anomalies: Vec<Anomaly>,
    /// Emergencies started or joined by this sample
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emergency_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl SampleOutcome {
    fn rejected(error: &MonitorError) -> Self {
        Self {
            accepted: false,
            sample: None,
            anomalies: Vec::new(),
            emergency_ids: Vec::new(),
            rejection: Some(error.into()),
        }
    }
}

/// Output of one aggregation cycle for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub record: AggregatedRecord,
    /// Whether the persistence collaborator accepted the record
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

/// Events published to subscribers, in processing order per (patient, device)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    DeviceConnected {
        patient_id: String,
        device_id: String,
        device_type: DeviceType,
    },
    DeviceDisconnected {
        patient_id: String,
        device_id: String,
    },
    SampleProcessed {
        sample: NormalizedSample,
    },
    SampleRejected {
        patient_id: String,
        device_id: String,
        rejection: Rejection,
    },
    AnomalyDetected {
        anomaly: Anomaly,
    },
    EmergencyTriggered {
        emergency_id: String,
        patient_id: String,
        emergency_type: EmergencyType,
    },
    /// A critical anomaly joined an emergency that was already active
    EmergencyUpdated {
        emergency_id: String,
        patient_id: String,
    },
    EmergencyResolved {
        emergency_id: String,
    },
    AggregationCompleted {
        report: Box<AggregationReport>,
    },
}

/// Status of one device connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub patient_id: String,
    pub device_id: String,
    pub device_type: DeviceType,
    pub connected: bool,
    pub connected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sample_at: Option<DateTime<Utc>>,
    pub accepted_samples: u64,
    pub rejected_samples: u64,
}

/// Monitoring statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub patients: usize,
    pub active_connections: usize,
    pub accepted_samples: u64,
    pub rejected_samples: u64,
    pub active_emergencies: usize,
    pub devices: Vec<DeviceStatus>,
}

/// One (patient, device) connection
struct DeviceLane {
    device_type: DeviceType,
    connected: AtomicBool,
    connected_at: Mutex<DateTime<Utc>>,
    buffer: AsyncMutex<SignalBuffer>,
    last_sample_at: Mutex<Option<DateTime<Utc>>>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl DeviceLane {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn status(&self, patient_id: &str, device_id: &str) -> DeviceStatus {
        DeviceStatus {
            patient_id: patient_id.to_string(),
            device_id: device_id.to_string(),
            device_type: self.device_type.clone(),
            connected: self.is_connected(),
            connected_at: *self.connected_at.lock(),
            last_sample_at: *self.last_sample_at.lock(),
            accepted_samples: self.accepted.load(Ordering::Relaxed),
            rejected_samples: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Everything the coordinator keeps for one patient
struct PatientState {
    /// Shared by ingestion, exclusive for aggregation
    gate: AsyncRwLock<()>,
    lanes: DashMap<String, Arc<DeviceLane>>,
    context: RwLock<PatientContext>,
    thresholds: RwLock<ThresholdProfile>,
    baselines: RwLock<BaselineStore>,
    trajectory: RwLock<Option<HealthTrajectory>>,
}

impl PatientState {
    fn new(context: PatientContext) -> Self {
        Self {
            gate: AsyncRwLock::new(()),
            lanes: DashMap::new(),
            thresholds: RwLock::new(ThresholdProfile::for_patient(&context)),
            context: RwLock::new(context),
            baselines: RwLock::new(BaselineStore::new()),
            trajectory: RwLock::new(None),
        }
    }

    fn lane(&self, device_id: &str) -> Option<Arc<DeviceLane>> {
        self.lanes.get(device_id).map(|lane| lane.clone())
    }

    fn lanes(&self) -> Vec<(String, Arc<DeviceLane>)> {
        let mut lanes: Vec<_> = self
            .lanes
            .iter()
            .map(|lane| (lane.key().clone(), lane.value().clone()))
            .collect();
        lanes.sort_by(|a, b| a.0.cmp(&b.0));
        lanes
    }
}

/// Handle to a running aggregation loop
pub struct AggregationHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AggregationHandle {
    /// Stop the loop once the in-flight cycle, if any, has completed
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Aggregation loop ended abnormally");
        }
    }
}

/// Monitoring coordinator for all patients of a deployment
pub struct MonitorCoordinator {
    config: MonitorConfig,
    patients: DashMap<String, Arc<PatientState>>,
    detector: AnomalyDetector,
    aggregator: TrajectoryAggregator,
    encoder: RecordEncoder,
    orchestrator: EmergencyOrchestrator,
    repository: Arc<dyn PatientRepository>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<MonitorEvent>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl MonitorCoordinator {
    pub fn new(
        config: MonitorConfig,
        repository: Arc<dyn PatientRepository>,
        notifier: Arc<dyn Notifier>,
        services: Arc<dyn EmergencyServices>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            detector: AnomalyDetector::new(config.detector.clone(), config.min_trend_points),
            aggregator: TrajectoryAggregator::new(config.aggregator.clone(), clock.clone()),
            encoder: RecordEncoder::new(clock.clone()),
            orchestrator: EmergencyOrchestrator::new(
                config.emergency.clone(),
                services,
                notifier,
                clock.clone(),
            ),
            config,
            patients: DashMap::new(),
            repository,
            clock,
            events,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Subscribe to monitoring events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn patient(&self, patient_id: &str) -> Option<Arc<PatientState>> {
        self.patients.get(patient_id).map(|state| state.clone())
    }

    /// Register a device connection for a patient.
    ///
    /// The first connection for a patient loads their context and builds the
    /// threshold profile; a missing or unreadable context falls back to the
    /// default thresholds. Reconnecting a device resumes its buffer.
    pub async fn connect_device(
        &self,
        patient_id: &str,
        device_id: &str,
        device_type: DeviceType,
    ) -> Result<(), MonitorError> {
        if patient_id.trim().is_empty() || device_id.trim().is_empty() {
            return Err(MonitorError::InvalidSample(
                "patient_id and device_id are required to connect".into(),
            ));
        }

        // The lane is attached under the patient's map entry so a concurrent
        // aggregation cycle cannot retire the patient in between
        let now = self.clock.now();
        let mut context: Option<PatientContext> = None;
        let lane = loop {
            let attached = match self.patients.entry(patient_id.to_string()) {
                Entry::Occupied(entry) => {
                    Some(self.attach_lane(entry.get(), patient_id, device_id, &device_type, now))
                }
                Entry::Vacant(slot) => context.take().map(|context| {
                    let state = slot.insert(Arc::new(PatientState::new(context)));
                    self.attach_lane(&state, patient_id, device_id, &device_type, now)
                }),
            };
            match attached {
                Some(lane) => break lane,
                None => context = Some(self.load_context(patient_id).await),
            }
        };
        if !lane.connected.swap(true, Ordering::AcqRel) {
            *lane.connected_at.lock() = now;
        }

        info!(patient_id, device_id, device_type = device_type.as_str(), "Device connected");
        self.emit(MonitorEvent::DeviceConnected {
            patient_id: patient_id.to_string(),
            device_id: device_id.to_string(),
            device_type,
        });
        Ok(())
    }

    async fn load_context(&self, patient_id: &str) -> PatientContext {
        match self.repository.load_patient_context(patient_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(patient_id, error = %e, "Using default thresholds");
                PatientContext::default()
            }
        }
    }

    fn attach_lane(
        &self,
        state: &PatientState,
        patient_id: &str,
        device_id: &str,
        device_type: &DeviceType,
        now: DateTime<Utc>,
    ) -> Arc<DeviceLane> {
        state
            .lanes
            .entry(device_id.to_string())
            .or_insert_with(|| {
                Arc::new(DeviceLane {
                    device_type: device_type.clone(),
                    connected: AtomicBool::new(true),
                    connected_at: Mutex::new(now),
                    buffer: AsyncMutex::new(SignalBuffer::new(
                        patient_id,
                        device_id,
                        self.config.buffer_capacity,
                    )),
                    last_sample_at: Mutex::new(None),
                    accepted: AtomicU64::new(0),
                    rejected: AtomicU64::new(0),
                })
            })
            .clone()
    }

    /// Stop ingestion for a device. Samples it already delivered are still
    /// aggregated and active emergencies are untouched. Returns false for an
    /// unknown connection.
    pub fn disconnect_device(&self, patient_id: &str, device_id: &str) -> bool {
        let Some(lane) = self.patient(patient_id).and_then(|s| s.lane(device_id)) else {
            warn!(patient_id, device_id, "Disconnect ignored: unknown device");
            return false;
        };
        if !lane.connected.swap(false, Ordering::AcqRel) {
            return false;
        }

        info!(patient_id, device_id, "Device disconnected");
        self.emit(MonitorEvent::DeviceDisconnected {
            patient_id: patient_id.to_string(),
            device_id: device_id.to_string(),
        });
        true
    }

    /// Replace a patient's context and rebuild their thresholds
    pub fn update_patient_context(&self, patient_id: &str, context: PatientContext) -> bool {
        let Some(state) = self.patient(patient_id) else {
            return false;
        };
        *state.thresholds.write() = ThresholdProfile::for_patient(&context);
        *state.context.write() = context;
        info!(patient_id, "Patient thresholds rebuilt");
        true
    }

    /// Push one raw sample through the pipeline.
    ///
    /// Rejected samples never reach the buffer; the outcome carries the
    /// reason. Critical anomalies start (or join) an emergency before this
    /// returns.
    pub async fn on_sample(&self, raw: &RawSample) -> SampleOutcome {
        let (sample, anomalies) = match self.ingest(raw).await {
            Ok(processed) => processed,
            Err(e) => return self.reject(raw, e),
        };
        self.accepted.fetch_add(1, Ordering::Relaxed);

        let mut emergency_ids: Vec<String> = Vec::new();
        for anomaly in anomalies
            .iter()
            .filter(|a| EmergencyOrchestrator::warrants_emergency(a))
        {
            let emergency_type = EmergencyType::for_anomaly(&anomaly.anomaly_type);
            let Triggered { emergency_id, joined } =
                self.orchestrator.trigger(&sample.patient_id, anomaly).await;

            if joined {
                self.emit(MonitorEvent::EmergencyUpdated {
                    emergency_id: emergency_id.clone(),
                    patient_id: sample.patient_id.clone(),
                });
            } else {
                self.emit(MonitorEvent::EmergencyTriggered {
                    emergency_id: emergency_id.clone(),
                    patient_id: sample.patient_id.clone(),
                    emergency_type,
                });
            }
            if !emergency_ids.contains(&emergency_id) {
                emergency_ids.push(emergency_id);
            }
        }

        SampleOutcome {
            accepted: true,
            sample: Some(sample),
            anomalies,
            emergency_ids,
            rejection: None,
        }
    }

    async fn ingest(&self, raw: &RawSample) -> Result<(NormalizedSample, Vec<Anomaly>), MonitorError> {
        let sample = Normalizer::normalize(raw)?;
        if sample.metrics.is_empty() {
            return Err(MonitorError::InvalidSample(
                "sample has no recognizable metrics".into(),
            ));
        }

        let not_connected = || MonitorError::DeviceNotConnected {
            patient_id: sample.patient_id.clone(),
            device_id: sample.device_id.clone(),
        };
        let state = self.patient(&sample.patient_id).ok_or_else(not_connected)?;
        let lane = state
            .lane(&sample.device_id)
            .filter(|lane| lane.is_connected())
            .ok_or_else(not_connected)?;

        let _gate = state.gate.read().await;
        let mut buffer = lane.buffer.lock().await;
        buffer.append(sample.clone())?;

        let anomalies = {
            let thresholds = state.thresholds.read();
            let baselines = state.baselines.read();
            self.detector
                .detect(&sample.patient_id, &sample, &buffer, &thresholds, &baselines)
        };
        state.baselines.write().update(&sample);

        lane.accepted.fetch_add(1, Ordering::Relaxed);
        *lane.last_sample_at.lock() = Some(sample.timestamp);

        debug!(
            patient_id = %sample.patient_id,
            device_id = %sample.device_id,
            metrics = sample.metrics.len(),
            anomalies = anomalies.len(),
            "Sample processed"
        );
        self.emit(MonitorEvent::SampleProcessed {
            sample: sample.clone(),
        });
        for anomaly in &anomalies {
            self.emit(MonitorEvent::AnomalyDetected {
                anomaly: anomaly.clone(),
            });
        }

        Ok((sample, anomalies))
    }

    fn reject(&self, raw: &RawSample, error: MonitorError) -> SampleOutcome {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        if let Some(lane) = self
            .patient(&raw.patient_id)
            .and_then(|s| s.lane(&raw.device_id))
        {
            lane.rejected.fetch_add(1, Ordering::Relaxed);
        }

        warn!(
            patient_id = %raw.patient_id,
            device_id = %raw.device_id,
            code = error.code(),
            error = %error,
            "Sample rejected"
        );
        let outcome = SampleOutcome::rejected(&error);
        self.emit(MonitorEvent::SampleRejected {
            patient_id: raw.patient_id.clone(),
            device_id: raw.device_id.clone(),
            rejection: Rejection::from(&error),
        });
        outcome
    }

    /// Aggregate every patient with samples accepted since the previous
    /// cycle. One patient's failure never stops the others.
    pub async fn run_aggregation_cycle(&self) -> Vec<AggregationReport> {
        let mut patients: Vec<(String, Arc<PatientState>)> = self
            .patients
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        patients.sort_by(|a, b| a.0.cmp(&b.0));

        let mut reports = Vec::new();
        for (patient_id, state) in patients {
            if let Some(report) = self.aggregate_patient(&patient_id, &state).await {
                reports.push(report);
            }
        }

        let pruned = self.orchestrator.prune_resolved();
        if pruned > 0 {
            debug!(pruned, "Pruned resolved emergencies");
        }
        reports
    }

    async fn aggregate_patient(&self, patient_id: &str, state: &PatientState) -> Option<AggregationReport> {
        let mut samples = Vec::new();
        let mut vitals = Vec::new();
        let mut device_trends = Vec::new();
        {
            let _gate = state.gate.write().await;
            for (device_id, lane) in state.lanes() {
                let mut buffer = lane.buffer.lock().await;
                let pending = buffer.drain_pending();
                if !pending.is_empty() {
                    device_trends.push(DeviceTrends::from_buffer(&buffer, self.config.min_trend_points));
                }
                vitals.extend(buffer.samples().map(VitalReading::from));
                samples.extend(pending);
                drop(buffer);

                if !lane.is_connected() {
                    state.lanes.remove_if(&device_id, |_, lane| !lane.is_connected());
                }
            }

            // Everything is drained; a patient without devices is retired
            if state.lanes.is_empty()
                && self
                    .patients
                    .remove_if(patient_id, |_, state| state.lanes.is_empty())
                    .is_some()
            {
                info!(patient_id, "Patient retired: no connected devices");
            }
        }
        if samples.is_empty() {
            return None;
        }
        samples.sort_by_key(|s| s.timestamp);
        vitals.sort_by_key(|v| v.timestamp);

        let symptoms = match self.repository.load_symptom_history(patient_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(patient_id, error = %e, "Symptom history unavailable");
                Vec::new()
            }
        };
        let context = state.context.read().clone();
        let risk = RiskAssessment::assess(&context, &symptoms);
        let trajectory = self.aggregator.aggregate(patient_id, &symptoms, &vitals, &risk);
        *state.trajectory.write() = Some(trajectory.clone());

        let record = self.encoder.encode(patient_id, &samples, device_trends, trajectory);
        let persistence_error = match self.repository.append_aggregated_record(patient_id, &record).await {
            Ok(()) => None,
            Err(e) => {
                error!(patient_id, error = %e, "Failed to persist aggregated record");
                Some(e.to_string())
            }
        };

        info!(
            patient_id,
            samples = record.sample_count,
            concern = record.trajectory.concern_level.as_str(),
            warnings = record.trajectory.early_warnings.len(),
            "Aggregation cycle completed"
        );
        let report = AggregationReport {
            record,
            persisted: persistence_error.is_none(),
            persistence_error,
        };
        self.emit(MonitorEvent::AggregationCompleted {
            report: Box::new(report.clone()),
        });
        Some(report)
    }

    /// Run aggregation cycles every `aggregation_interval_secs` on the
    /// current tokio runtime until the handle is shut down
    pub fn spawn_aggregation_loop(self: &Arc<Self>) -> AggregationHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let coordinator = Arc::clone(self);
        let period = self.config.aggregation_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reports = coordinator.run_aggregation_cycle().await;
                        debug!(patients = reports.len(), "Aggregation tick");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Aggregation loop stopped");
        });

        AggregationHandle { shutdown, task }
    }

    /// Latest trajectory computed for a patient
    pub fn latest_trajectory(&self, patient_id: &str) -> Option<HealthTrajectory> {
        self.patient(patient_id)
            .and_then(|state| state.trajectory.read().clone())
    }

    pub fn thresholds(&self, patient_id: &str) -> Option<ThresholdProfile> {
        self.patient(patient_id)
            .map(|state| state.thresholds.read().clone())
    }

    pub fn add_emergency_contact(&self, patient_id: &str, contact: EmergencyContact) -> String {
        self.orchestrator.add_emergency_contact(patient_id, contact)
    }

    /// Resolve an emergency; a no-op for unknown or resolved ids
    pub fn resolve_emergency(&self, emergency_id: &str, resolution: &str) {
        if self.orchestrator.resolve(emergency_id, resolution) {
            self.emit(MonitorEvent::EmergencyResolved {
                emergency_id: emergency_id.to_string(),
            });
        }
    }

    pub fn emergency_status(&self, emergency_id: &str) -> Option<Emergency> {
        self.orchestrator.get_status(emergency_id)
    }

    pub fn active_emergencies(&self, patient_id: Option<&str>) -> Vec<Emergency> {
        self.orchestrator.active_emergencies(patient_id)
    }

    fn known_patient(&self, patient_id: &str) -> Result<Arc<PatientState>, MonitorError> {
        self.patient(patient_id)
            .ok_or_else(|| MonitorError::Persistence(format!("unknown patient {patient_id}")))
    }

    /// Replace one baseline of a connected patient
    pub fn seed_baseline(
        &self,
        patient_id: &str,
        metric: MetricName,
        baseline: Baseline,
    ) -> Result<(), MonitorError> {
        self.known_patient(patient_id)?
            .baselines
            .write()
            .seed(metric, baseline);
        Ok(())
    }

    pub fn export_baselines(&self, patient_id: &str) -> Result<String, MonitorError> {
        let state = self.known_patient(patient_id)?;
        let json = state.baselines.read().to_json()?;
        Ok(json)
    }

    /// Replace every baseline of a connected patient
    pub fn import_baselines(&self, patient_id: &str, json: &str) -> Result<(), MonitorError> {
        let state = self.known_patient(patient_id)?;
        let store = BaselineStore::from_json(json)?;
        info!(patient_id, metrics = store.len(), "Baselines imported");
        *state.baselines.write() = store;
        Ok(())
    }

    pub fn stats(&self) -> MonitorStats {
        let mut devices: Vec<DeviceStatus> = Vec::new();
        for patient in self.patients.iter() {
            for (device_id, lane) in patient.lanes() {
                devices.push(lane.status(patient.key(), &device_id));
            }
        }
        devices.sort_by(|a, b| {
            (a.patient_id.as_str(), a.device_id.as_str()).cmp(&(b.patient_id.as_str(), b.device_id.as_str()))
        });

        MonitorStats {
            patients: self.patients.len(),
            active_connections: devices.iter().filter(|d| d.connected).count(),
            accepted_samples: self.accepted.load(Ordering::Relaxed),
            rejected_samples: self.rejected.load(Ordering::Relaxed),
            active_emergencies: self.orchestrator.active_emergencies(None).len(),
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::{InMemoryPatientRepository, LoggingEmergencyServices, LoggingNotifier};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn make_coordinator() -> (MonitorCoordinator, Arc<InMemoryPatientRepository>) {
        let repository = Arc::new(InMemoryPatientRepository::new());
        let coordinator = MonitorCoordinator::new(
            MonitorConfig::default(),
            repository.clone(),
            Arc::new(LoggingNotifier::new()),
            Arc::new(LoggingEmergencyServices::new()),
            Arc::new(ManualClock::new(t0())),
        )
        .unwrap();
        (coordinator, repository)
    }

    fn make_hr_sample(offset_secs: i64, bpm: f64) -> RawSample {
        RawSample::new("patient-1", "hrm-1", DeviceType::HeartRateMonitor, t0() + Duration::seconds(offset_secs))
            .with_field("bpm", bpm)
    }

    #[tokio::test]
    async fn test_unconnected_device_is_rejected() {
        let (coordinator, _) = make_coordinator();
        let outcome = coordinator.on_sample(&make_hr_sample(0, 72.0)).await;
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejection.unwrap().code, "NOT_CONNECTED");

        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        assert!(coordinator.on_sample(&make_hr_sample(5, 72.0)).await.accepted);

        assert!(coordinator.disconnect_device("patient-1", "hrm-1"));
        assert!(!coordinator.disconnect_device("patient-1", "hrm-1"));
        let outcome = coordinator.on_sample(&make_hr_sample(10, 72.0)).await;
        assert!(!outcome.accepted);

        let stats = coordinator.stats();
        assert_eq!(stats.accepted_samples, 1);
        assert_eq!(stats.rejected_samples, 2);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.devices[0].accepted_samples, 1);
        assert_eq!(stats.devices[0].rejected_samples, 1);
    }

    #[tokio::test]
    async fn test_invalid_and_out_of_order_samples_never_buffer() {
        let (coordinator, _) = make_coordinator();
        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();

        let mut missing_timestamp = make_hr_sample(0, 72.0);
        missing_timestamp.timestamp = None;
        let outcome = coordinator.on_sample(&missing_timestamp).await;
        assert_eq!(outcome.rejection.unwrap().code, "INVALID_SAMPLE");

        let no_metrics = RawSample::new("patient-1", "hrm-1", DeviceType::HeartRateMonitor, t0())
            .with_field("battery", "low");
        assert_eq!(
            coordinator.on_sample(&no_metrics).await.rejection.unwrap().code,
            "INVALID_SAMPLE"
        );

        assert!(coordinator.on_sample(&make_hr_sample(60, 72.0)).await.accepted);
        let outcome = coordinator.on_sample(&make_hr_sample(30, 74.0)).await;
        assert_eq!(outcome.rejection.unwrap().code, "OUT_OF_ORDER");

        let reports = coordinator.run_aggregation_cycle().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].record.sample_count, 1);
    }

    #[tokio::test]
    async fn test_events_follow_processing_order() {
        let (coordinator, _) = make_coordinator();
        let mut events = coordinator.subscribe();
        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        coordinator.on_sample(&make_hr_sample(0, 72.0)).await;
        coordinator.on_sample(&make_hr_sample(5, 75.0)).await;

        assert!(matches!(events.recv().await.unwrap(), MonitorEvent::DeviceConnected { .. }));
        for expected in [72.0, 75.0] {
            match events.recv().await.unwrap() {
                MonitorEvent::SampleProcessed { sample } => {
                    assert_eq!(sample.metric(MetricName::HeartRate), Some(expected))
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_aggregation_drains_pending_once() {
        let (coordinator, repository) = make_coordinator();
        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        for (i, bpm) in [70.0, 72.0, 74.0].into_iter().enumerate() {
            coordinator.on_sample(&make_hr_sample(i as i64 * 5, bpm)).await;
        }

        let reports = coordinator.run_aggregation_cycle().await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].persisted);
        assert_eq!(reports[0].record.device_trends.len(), 1);
        assert!(coordinator.latest_trajectory("patient-1").is_some());

        assert!(coordinator.run_aggregation_cycle().await.is_empty());
        assert_eq!(repository.records().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_device_is_still_aggregated() {
        let (coordinator, repository) = make_coordinator();
        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        coordinator.on_sample(&make_hr_sample(0, 70.0)).await;
        coordinator.disconnect_device("patient-1", "hrm-1");

        let reports = coordinator.run_aggregation_cycle().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(repository.records()[0].sample_count, 1);
        assert!(coordinator.stats().devices.is_empty());
    }

    #[tokio::test]
    async fn test_patient_without_devices_is_retired() {
        let (coordinator, repository) = make_coordinator();
        for device_id in ["hrm-1", "hrm-2"] {
            coordinator
                .connect_device("patient-1", device_id, DeviceType::HeartRateMonitor)
                .await
                .unwrap();
        }
        coordinator.on_sample(&make_hr_sample(0, 70.0)).await;

        // One device left: the patient stays
        coordinator.disconnect_device("patient-1", "hrm-1");
        assert_eq!(coordinator.run_aggregation_cycle().await.len(), 1);
        assert_eq!(coordinator.stats().patients, 1);

        // Nothing pending and no devices: retired without a report
        coordinator.disconnect_device("patient-1", "hrm-2");
        assert!(coordinator.run_aggregation_cycle().await.is_empty());
        assert_eq!(coordinator.stats().patients, 0);
        assert!(coordinator.thresholds("patient-1").is_none());
        assert!(coordinator.export_baselines("patient-1").is_err());

        // Reconnecting reloads the context and starts afresh
        repository.set_context(
            "patient-1",
            PatientContext {
                age: Some(72),
                ..Default::default()
            },
        );
        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        assert_eq!(coordinator.stats().patients, 1);
        assert!(coordinator.on_sample(&make_hr_sample(60, 72.0)).await.accepted);
        assert_eq!(coordinator.run_aggregation_cycle().await.len(), 1);
        assert_eq!(repository.records().len(), 2);
    }

    #[tokio::test]
    async fn test_patient_context_personalizes_thresholds() {
        let (coordinator, repository) = make_coordinator();
        repository.set_context(
            "patient-1",
            PatientContext {
                age: Some(72),
                chronic_conditions: vec!["hypertension".into()],
                ..Default::default()
            },
        );
        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        coordinator
            .connect_device("patient-2", "hrm-2", DeviceType::HeartRateMonitor)
            .await
            .unwrap();

        assert_ne!(
            coordinator.thresholds("patient-1"),
            coordinator.thresholds("patient-2")
        );
        assert_eq!(
            coordinator.thresholds("patient-2"),
            Some(ThresholdProfile::default())
        );

        assert!(coordinator.update_patient_context("patient-1", PatientContext::default()));
        assert_eq!(
            coordinator.thresholds("patient-1"),
            Some(ThresholdProfile::default())
        );
    }

    #[tokio::test]
    async fn test_baseline_export_import() {
        let (coordinator, _) = make_coordinator();
        assert!(coordinator.export_baselines("patient-1").is_err());

        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        coordinator
            .seed_baseline("patient-1", MetricName::HeartRate, Baseline::from_stats(74.0, 5.0, 30, t0()))
            .unwrap();
        let json = coordinator.export_baselines("patient-1").unwrap();

        coordinator
            .connect_device("patient-2", "hrm-2", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        coordinator.import_baselines("patient-2", &json).unwrap();
        assert_eq!(coordinator.export_baselines("patient-2").unwrap(), json);

        let err = coordinator.import_baselines("patient-2", "[").unwrap_err();
        assert!(matches!(err, MonitorError::Json(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregation_loop_runs_until_shutdown() {
        let (coordinator, repository) = make_coordinator();
        let coordinator = Arc::new(coordinator);
        let handle = coordinator.spawn_aggregation_loop();

        coordinator
            .connect_device("patient-1", "hrm-1", DeviceType::HeartRateMonitor)
            .await
            .unwrap();
        coordinator.on_sample(&make_hr_sample(0, 72.0)).await;

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;
        assert_eq!(repository.records().len(), 1);

        handle.shutdown().await;
        coordinator.on_sample(&make_hr_sample(5, 73.0)).await;
        tokio::time::sleep(std::time::Duration::from_secs(20)).await;
        assert_eq!(repository.records().len(), 1);
    }
}
