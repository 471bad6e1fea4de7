//! Emergency response orchestration
//!
//! Each emergency moves `active -> resolved` exactly once. Triggering runs the
//! protocol's actions in order; every action is attempted and recorded even
//! when an earlier one fails or times out. Contacts are notified afterwards,
//! one by one, with per-contact outcomes recorded on the emergency.
//!
//! Records live in a concurrent map and are only mutated through the map's
//! per-entry guard, never across an await.

mod contacts;
mod protocol;

pub use contacts::{ContactDirectory, EmergencyContact, NotificationRecord};
pub use protocol::{EmergencyType, Protocol, ResponseAction};

use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    ActionOutcome, ActionRequest, EmergencyServices, LoggingEmergencyServices, LoggingNotifier,
    Notifier,
};
use crate::error::MonitorError;
use crate::types::{Anomaly, Severity};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Longest retention of resolved emergencies (one year)
pub const MAX_RESOLVED_RETENTION_SECS: u64 = 31_536_000;

/// Orchestration policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Per-action timeout; defaults to an even share of the protocol budget
    pub action_timeout_secs: Option<u64>,
    pub notification_timeout_secs: u64,
    /// How long resolved emergencies stay queryable, at most
    /// `MAX_RESOLVED_RETENTION_SECS`
    pub resolved_retention_secs: u64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            action_timeout_secs: None,
            notification_timeout_secs: 30,
            resolved_retention_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Active,
    Resolved,
}

/// Recorded result of one protocol action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action: ResponseAction,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A tracked response workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emergency {
    pub emergency_id: String,
    pub patient_id: String,
    pub emergency_type: EmergencyType,
    pub triggering_anomaly: Anomaly,
    /// Later critical anomalies of the same type while active
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_anomalies: Vec<Anomaly>,
    pub protocol: Protocol,
    pub status: EmergencyStatus,
    pub responses: Vec<ActionResponse>,
    pub notifications: Vec<NotificationRecord>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl Emergency {
    pub fn is_active(&self) -> bool {
        self.status == EmergencyStatus::Active
    }

    pub fn failed_actions(&self) -> Vec<&ActionResponse> {
        self.responses.iter().filter(|r| !r.success).collect()
    }

    pub fn notification_failures(&self) -> Vec<&NotificationRecord> {
        self.notifications.iter().filter(|n| !n.success).collect()
    }

    /// Message sent to emergency contacts
    pub fn message(&self) -> String {
        format!(
            "HEALTH EMERGENCY: {} detected for patient. Severity: {}. Emergency services have been contacted. Emergency ID: {}",
            self.emergency_type.as_str(),
            self.triggering_anomaly.severity.as_str(),
            self.emergency_id
        )
    }
}

/// Result of [`EmergencyOrchestrator::trigger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triggered {
    pub emergency_id: String,
    /// The anomaly was attached to an already active emergency
    pub joined: bool,
}

/// Emergency response orchestrator
pub struct EmergencyOrchestrator {
    config: EmergencyConfig,
    emergencies: DashMap<String, Emergency>,
    /// (patient, type) to the active emergency id
    active_index: DashMap<(String, EmergencyType), String>,
    contacts: ContactDirectory,
    services: Arc<dyn EmergencyServices>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl Default for EmergencyOrchestrator {
    fn default() -> Self {
        Self::new(
            EmergencyConfig::default(),
            Arc::new(LoggingEmergencyServices::new()),
            Arc::new(LoggingNotifier::new()),
            Arc::new(SystemClock),
        )
    }
}

impl EmergencyOrchestrator {
    pub fn new(
        config: EmergencyConfig,
        services: Arc<dyn EmergencyServices>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            emergencies: DashMap::new(),
            active_index: DashMap::new(),
            contacts: ContactDirectory::new(),
            services,
            notifier,
            clock,
        }
    }

    /// Register an emergency contact for a patient, returning the contact id
    pub fn add_emergency_contact(&self, patient_id: &str, contact: EmergencyContact) -> String {
        self.contacts.add(patient_id, contact)
    }

    /// Start (or join) the emergency for a critical anomaly and run its
    /// protocol to completion.
    ///
    /// A patient with an active emergency of the same type gets the anomaly
    /// attached to it; the protocol is not run again. Whether the anomaly
    /// joined is decided under the same index entry that dedupes it.
    pub async fn trigger(&self, patient_id: &str, anomaly: &Anomaly) -> Triggered {
        let emergency_type = EmergencyType::for_anomaly(&anomaly.anomaly_type);
        let key = (patient_id.to_string(), emergency_type);

        let emergency_id = match self.active_index.entry(key) {
            Entry::Occupied(existing) => {
                let id = existing.get().clone();
                drop(existing);
                if let Some(mut emergency) = self.emergencies.get_mut(&id) {
                    emergency.related_anomalies.push(anomaly.clone());
                }
                info!(patient_id, emergency_id = %id, "Anomaly attached to active emergency");
                return Triggered {
                    emergency_id: id,
                    joined: true,
                };
            }
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4().to_string();
                let emergency = Emergency {
                    emergency_id: id.clone(),
                    patient_id: patient_id.to_string(),
                    emergency_type,
                    triggering_anomaly: anomaly.clone(),
                    related_anomalies: Vec::new(),
                    protocol: Protocol::for_type(emergency_type),
                    status: EmergencyStatus::Active,
                    responses: Vec::new(),
                    notifications: Vec::new(),
                    created_at: self.clock.now(),
                    resolved_at: None,
                    resolution: None,
                };
                // Insert the record before publishing the index entry
                self.emergencies.insert(id.clone(), emergency);
                slot.insert(id.clone());
                id
            }
        };

        warn!(
            patient_id,
            emergency_id = %emergency_id,
            emergency_type = emergency_type.as_str(),
            "Emergency triggered"
        );

        self.execute_protocol(&emergency_id, patient_id, emergency_type)
            .await;
        self.notify_contacts(&emergency_id, patient_id).await;

        Triggered {
            emergency_id,
            joined: false,
        }
    }

    async fn execute_protocol(&self, emergency_id: &str, patient_id: &str, emergency_type: EmergencyType) {
        let protocol = Protocol::for_type(emergency_type);
        let timeout = self
            .config
            .action_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| protocol.default_action_timeout());

        for action in protocol.actions {
            let request = ActionRequest {
                emergency_id: emergency_id.to_string(),
                patient_id: patient_id.to_string(),
                emergency_type,
                action,
            };

            let result = match tokio::time::timeout(timeout, self.execute_action(&request)).await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::ActionTimeout {
                    action: action.as_str().to_string(),
                    timeout,
                }),
            };

            let response = match result {
                Ok(outcome) => ActionResponse {
                    action,
                    success: true,
                    outcome: Some(outcome),
                    error: None,
                    timestamp: self.clock.now(),
                },
                Err(e) => {
                    error!(emergency_id, patient_id, action = action.as_str(), error = %e, "Emergency action failed");
                    ActionResponse {
                        action,
                        success: false,
                        outcome: None,
                        error: Some(e.to_string()),
                        timestamp: self.clock.now(),
                    }
                }
            };

            if let Some(mut emergency) = self.emergencies.get_mut(emergency_id) {
                emergency.responses.push(response);
            }
        }
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
        match request.action {
            ResponseAction::CallEmergencyServices
            | ResponseAction::DispatchAmbulance
            | ResponseAction::HospitalTransport => self.services.request_dispatch(request).await,
            ResponseAction::NotifyHospital | ResponseAction::NotifyCareTeam => {
                self.services.notify_facility(request).await
            }
            ResponseAction::CheckGlucose
            | ResponseAction::AdministerGlucose
            | ResponseAction::BloodPressureMedication => {
                self.services.issue_care_instruction(request).await
            }
            ResponseAction::MonitorVitals => self.services.escalate_monitoring(request).await,
        }
    }

    async fn notify_contacts(&self, emergency_id: &str, patient_id: &str) {
        let message = match self.emergencies.get(emergency_id) {
            Some(emergency) => emergency.message(),
            None => return,
        };
        let timeout = Duration::from_secs(self.config.notification_timeout_secs);

        for contact in self.contacts.active_for(patient_id) {
            let result = tokio::time::timeout(timeout, self.notifier.notify(&contact, &message)).await;
            let error = match result {
                Ok(Ok(delivery)) if delivery.success => None,
                Ok(Ok(delivery)) => Some(
                    delivery
                        .detail
                        .unwrap_or_else(|| "delivery not confirmed".to_string()),
                ),
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {timeout:?}")),
            };

            if let Some(reason) = &error {
                let e = MonitorError::Notification {
                    contact_id: contact.id.clone(),
                    reason: reason.clone(),
                };
                error!(emergency_id, patient_id, contact_id = %contact.id, error = %e, "Contact notification failed");
            }

            let record = NotificationRecord {
                contact_id: contact.id.clone(),
                success: error.is_none(),
                error,
                timestamp: self.clock.now(),
            };
            if let Some(mut emergency) = self.emergencies.get_mut(emergency_id) {
                emergency.notifications.push(record);
            }
        }
    }

    /// Resolve an active emergency. Resolving an unknown or already
    /// resolved emergency is a logged no-op. Returns whether the emergency
    /// changed state.
    pub fn resolve(&self, emergency_id: &str, resolution: &str) -> bool {
        let key = {
            let Some(mut emergency) = self.emergencies.get_mut(emergency_id) else {
                warn!(emergency_id, "Resolve ignored: unknown emergency");
                return false;
            };
            if emergency.status != EmergencyStatus::Active {
                warn!(emergency_id, "Resolve ignored: emergency already resolved");
                return false;
            }
            emergency.status = EmergencyStatus::Resolved;
            emergency.resolved_at = Some(self.clock.now());
            emergency.resolution = Some(resolution.to_string());
            info!(emergency_id, patient_id = %emergency.patient_id, "Emergency resolved");
            (emergency.patient_id.clone(), emergency.emergency_type)
        };

        self.active_index
            .remove_if(&key, |_, active_id| active_id == emergency_id);
        true
    }

    /// Id of the patient's active emergency of a type, if any
    pub fn active_emergency_id(&self, patient_id: &str, emergency_type: EmergencyType) -> Option<String> {
        self.active_index
            .get(&(patient_id.to_string(), emergency_type))
            .map(|id| id.clone())
    }

    /// Snapshot of an emergency
    pub fn get_status(&self, emergency_id: &str) -> Option<Emergency> {
        self.emergencies.get(emergency_id).map(|e| e.clone())
    }

    /// Active emergencies, optionally for one patient, oldest first
    pub fn active_emergencies(&self, patient_id: Option<&str>) -> Vec<Emergency> {
        let mut active: Vec<Emergency> = self
            .emergencies
            .iter()
            .filter(|e| e.is_active())
            .filter(|e| patient_id.map_or(true, |p| e.patient_id == p))
            .map(|e| e.clone())
            .collect();
        active.sort_by_key(|e| e.created_at);
        active
    }

    /// Drop resolved emergencies past the retention window. Returns the
    /// number removed.
    pub fn prune_resolved(&self) -> usize {
        let cutoff = self.clock.now() - ChronoDuration::seconds(
            self.config.resolved_retention_secs.min(MAX_RESOLVED_RETENTION_SECS) as i64,
        );
        let before = self.emergencies.len();
        self.emergencies.retain(|_, e| match e.resolved_at {
            Some(resolved_at) => resolved_at > cutoff,
            None => true,
        });
        before - self.emergencies.len()
    }

    /// Whether an anomaly warrants an emergency
    pub fn warrants_emergency(anomaly: &Anomaly) -> bool {
        anomaly.severity == Severity::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::NotificationResult;
    use crate::types::{AnomalyReference, AnomalyType, DetectionStrategy, MetricName};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn make_anomaly(kind: AnomalyType) -> Anomaly {
        Anomaly {
            severity: kind.severity(),
            anomaly_type: kind,
            patient_id: "patient-1".to_string(),
            device_id: "device-1".to_string(),
            metric: MetricName::HeartRate,
            value: 180.0,
            reference: AnomalyReference::Threshold { bound: 150.0 },
            confidence: 0.9,
            timestamp: t0(),
            strategies: vec![DetectionStrategy::RuleBased],
        }
    }

    /// Services that fail chosen actions
    #[derive(Default)]
    struct FlakyServices {
        failing: Vec<ResponseAction>,
        hanging: Vec<ResponseAction>,
        attempted: Mutex<Vec<ResponseAction>>,
    }

    impl FlakyServices {
        async fn run(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
            self.attempted.lock().push(request.action);
            if self.hanging.contains(&request.action) {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(&request.action) {
                return Err(MonitorError::ActionExecution {
                    action: request.action.as_str().to_string(),
                    reason: "channel unavailable".to_string(),
                });
            }
            Ok(ActionOutcome {
                status: "ok".to_string(),
                reference: None,
                details: serde_json::Value::Null,
            })
        }
    }

    #[async_trait]
    impl EmergencyServices for FlakyServices {
        async fn request_dispatch(&self, r: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
            self.run(r).await
        }
        async fn notify_facility(&self, r: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
            self.run(r).await
        }
        async fn issue_care_instruction(&self, r: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
            self.run(r).await
        }
        async fn escalate_monitoring(&self, r: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
            self.run(r).await
        }
    }

    /// Notifier that rejects one contact
    struct PickyNotifier {
        reject: String,
    }

    #[async_trait]
    impl Notifier for PickyNotifier {
        async fn notify(
            &self,
            contact: &EmergencyContact,
            _message: &str,
        ) -> Result<NotificationResult, MonitorError> {
            if contact.id == self.reject {
                return Err(MonitorError::Notification {
                    contact_id: contact.id.clone(),
                    reason: "sms gateway down".to_string(),
                });
            }
            Ok(NotificationResult {
                success: true,
                detail: None,
            })
        }
    }

    fn make_orchestrator(services: Arc<FlakyServices>) -> (EmergencyOrchestrator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let orchestrator = EmergencyOrchestrator::new(
            EmergencyConfig::default(),
            services,
            Arc::new(LoggingNotifier::new()),
            clock.clone(),
        );
        (orchestrator, clock)
    }

    #[tokio::test]
    async fn test_failed_action_does_not_abort_protocol() {
        let services = Arc::new(FlakyServices {
            failing: vec![ResponseAction::NotifyHospital],
            ..Default::default()
        });
        let (orchestrator, _) = make_orchestrator(services.clone());

        let id = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Tachycardia))
            .await
            .emergency_id;
        let emergency = orchestrator.get_status(&id).unwrap();

        assert_eq!(emergency.emergency_type, EmergencyType::CardiacEmergency);
        assert_eq!(emergency.responses.len(), 3);
        let successes: Vec<bool> = emergency.responses.iter().map(|r| r.success).collect();
        assert_eq!(successes, vec![true, false, true]);
        assert_eq!(emergency.failed_actions()[0].action, ResponseAction::NotifyHospital);
        assert_eq!(services.attempted.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_action_is_a_failed_action() {
        let services = Arc::new(FlakyServices {
            hanging: vec![ResponseAction::CallEmergencyServices],
            ..Default::default()
        });
        let (orchestrator, _) = make_orchestrator(services);

        let id = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::HypertensiveEmergency))
            .await
            .emergency_id;
        let emergency = orchestrator.get_status(&id).unwrap();

        assert_eq!(emergency.responses.len(), 3);
        assert!(!emergency.responses[0].success);
        assert!(emergency.responses[0]
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert!(emergency.responses[1].success && emergency.responses[2].success);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let (orchestrator, clock) = make_orchestrator(Arc::new(FlakyServices::default()));
        let id = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Hypoglycemia))
            .await
            .emergency_id;

        clock.advance(ChronoDuration::minutes(10));
        assert!(orchestrator.resolve(&id, "glucose administered"));
        let first = orchestrator.get_status(&id).unwrap();
        assert_eq!(first.status, EmergencyStatus::Resolved);
        assert_eq!(first.resolved_at, Some(t0() + ChronoDuration::minutes(10)));

        clock.advance(ChronoDuration::minutes(10));
        assert!(!orchestrator.resolve(&id, "second resolution"));
        let second = orchestrator.get_status(&id).unwrap();
        assert_eq!(second, first);

        // Unknown ids are ignored too
        assert!(!orchestrator.resolve("no-such-emergency", "n/a"));
    }

    #[tokio::test]
    async fn test_same_type_attaches_to_active_emergency() {
        let services = Arc::new(FlakyServices::default());
        let (orchestrator, _) = make_orchestrator(services.clone());

        let first = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Tachycardia))
            .await
            .emergency_id;
        let second = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Bradycardia))
            .await
            .emergency_id;
        assert_eq!(first, second);
        assert_eq!(services.attempted.lock().len(), 3);
        assert_eq!(orchestrator.get_status(&first).unwrap().related_anomalies.len(), 1);
        assert_eq!(
            orchestrator.active_emergency_id("patient-1", EmergencyType::CardiacEmergency),
            Some(first.clone())
        );

        // After resolution a new emergency starts
        orchestrator.resolve(&first, "stabilized");
        let third = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Tachycardia))
            .await
            .emergency_id;
        assert_ne!(first, third);
        assert_eq!(orchestrator.active_emergencies(Some("patient-1")).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_start_exactly_one_emergency() {
        let services = Arc::new(FlakyServices::default());
        let (orchestrator, _) = make_orchestrator(services.clone());
        let orchestrator = Arc::new(orchestrator);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .trigger("patient-1", &make_anomaly(AnomalyType::Tachycardia))
                        .await
                })
            })
            .collect();
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        let started: Vec<&Triggered> = results.iter().filter(|r| !r.joined).collect();
        assert_eq!(started.len(), 1);
        assert!(results.iter().all(|r| r.emergency_id == started[0].emergency_id));
        assert_eq!(services.attempted.lock().len(), 3);
        let emergency = orchestrator.get_status(&started[0].emergency_id).unwrap();
        assert_eq!(emergency.related_anomalies.len(), 7);
    }

    #[tokio::test]
    async fn test_contact_failure_is_recorded_per_contact() {
        let clock = Arc::new(ManualClock::new(t0()));
        let orchestrator = EmergencyOrchestrator::new(
            EmergencyConfig::default(),
            Arc::new(FlakyServices::default()),
            Arc::new(PickyNotifier {
                reject: "c-2".to_string(),
            }),
            clock,
        );
        for (id, name) in [("c-1", "Alex"), ("c-2", "Sam"), ("c-3", "Kim")] {
            let mut contact = EmergencyContact::new(name, "family");
            contact.id = id.to_string();
            orchestrator.add_emergency_contact("patient-1", contact);
        }

        let id = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Hypoxemia))
            .await
            .emergency_id;
        let emergency = orchestrator.get_status(&id).unwrap();

        assert!(emergency.is_active());
        assert_eq!(emergency.notifications.len(), 3);
        let failures = emergency.notification_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].contact_id, "c-2");
    }

    #[tokio::test]
    async fn test_message_and_pruning() {
        let (orchestrator, clock) = make_orchestrator(Arc::new(FlakyServices::default()));
        let id = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Tachycardia))
            .await
            .emergency_id;
        let message = orchestrator.get_status(&id).unwrap().message();
        assert!(message.starts_with("HEALTH EMERGENCY: cardiac_emergency detected"));
        assert!(message.contains("Severity: critical"));
        assert!(message.ends_with(&id));

        orchestrator.resolve(&id, "false alarm");
        clock.advance(ChronoDuration::minutes(30));
        assert_eq!(orchestrator.prune_resolved(), 0);
        clock.advance(ChronoDuration::minutes(31));
        assert_eq!(orchestrator.prune_resolved(), 1);
        assert!(orchestrator.get_status(&id).is_none());
    }

    #[tokio::test]
    async fn test_oversized_retention_is_clamped() {
        let clock = Arc::new(ManualClock::new(t0()));
        let orchestrator = EmergencyOrchestrator::new(
            EmergencyConfig {
                resolved_retention_secs: u64::MAX,
                ..Default::default()
            },
            Arc::new(FlakyServices::default()),
            Arc::new(LoggingNotifier::new()),
            clock.clone(),
        );
        let id = orchestrator
            .trigger("patient-1", &make_anomaly(AnomalyType::Tachycardia))
            .await
            .emergency_id;
        orchestrator.resolve(&id, "stabilized");

        clock.advance(ChronoDuration::days(364));
        assert_eq!(orchestrator.prune_resolved(), 0);
        clock.advance(ChronoDuration::days(2));
        assert_eq!(orchestrator.prune_resolved(), 1);
    }
}
