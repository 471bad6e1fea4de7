//! External collaborator interfaces
//!
//! The monitoring core reaches the outside world only through these traits:
//! - `PatientRepository`: patient context, symptom history, aggregated records
//! - `Notifier`: outbound messages to emergency contacts
//! - `EmergencyServices`: dispatch and care actions run by emergency protocols
//!
//! In-memory and log-only implementations are provided for the CLI and tests.

use crate::emergency::{EmergencyContact, EmergencyType, ResponseAction};
use crate::encoder::AggregatedRecord;
use crate::error::MonitorError;
use crate::thresholds::PatientContext;
use crate::trajectory::SymptomEntry;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Persistence collaborator
#[async_trait]
pub trait PatientRepository: Send + Sync {
    /// Context used to personalize thresholds and assess risk
    async fn load_patient_context(&self, patient_id: &str) -> Result<PatientContext, MonitorError>;

    async fn load_symptom_history(&self, patient_id: &str) -> Result<Vec<SymptomEntry>, MonitorError>;

    /// Write-only sink for aggregation output
    async fn append_aggregated_record(
        &self,
        patient_id: &str,
        record: &AggregatedRecord,
    ) -> Result<(), MonitorError>;
}

/// Delivery result reported by a notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        contact: &EmergencyContact,
        message: &str,
    ) -> Result<NotificationResult, MonitorError>;
}

/// Context passed to every emergency-service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub emergency_id: String,
    pub patient_id: String,
    pub emergency_type: EmergencyType,
    pub action: ResponseAction,
}

/// Structured outcome of an emergency-service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Dispatch/emergency-services collaborator. Calls must be idempotent per
/// (emergency id, action).
#[async_trait]
pub trait EmergencyServices: Send + Sync {
    /// Emergency services, ambulance dispatch, hospital transport
    async fn request_dispatch(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError>;

    /// Hospital or care team notification
    async fn notify_facility(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError>;

    /// Care instruction to the patient or an on-site caregiver
    async fn issue_care_instruction(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError>;

    /// Raise monitoring intensity for the patient
    async fn escalate_monitoring(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError>;
}

/// Repository backed by process memory
#[derive(Default)]
pub struct InMemoryPatientRepository {
    contexts: RwLock<HashMap<String, PatientContext>>,
    symptoms: RwLock<HashMap<String, Vec<SymptomEntry>>>,
    records: RwLock<Vec<AggregatedRecord>>,
}

impl InMemoryPatientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_context(&self, patient_id: &str, context: PatientContext) {
        self.contexts.write().insert(patient_id.to_string(), context);
    }

    pub fn add_symptom_entry(&self, patient_id: &str, entry: SymptomEntry) {
        self.symptoms
            .write()
            .entry(patient_id.to_string())
            .or_default()
            .push(entry);
    }

    /// Every record appended so far, oldest first
    pub fn records(&self) -> Vec<AggregatedRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl PatientRepository for InMemoryPatientRepository {
    async fn load_patient_context(&self, patient_id: &str) -> Result<PatientContext, MonitorError> {
        self.contexts
            .read()
            .get(patient_id)
            .cloned()
            .ok_or_else(|| {
                MonitorError::ThresholdConfig(format!("no patient context for {patient_id}"))
            })
    }

    async fn load_symptom_history(&self, patient_id: &str) -> Result<Vec<SymptomEntry>, MonitorError> {
        Ok(self
            .symptoms
            .read()
            .get(patient_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_aggregated_record(
        &self,
        _patient_id: &str,
        record: &AggregatedRecord,
    ) -> Result<(), MonitorError> {
        self.records.write().push(record.clone());
        Ok(())
    }
}

/// Notifier that logs each message and reports success
#[derive(Default)]
pub struct LoggingNotifier {
    sent: RwLock<Vec<(String, String)>>,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// (contact id, message) pairs delivered so far
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(
        &self,
        contact: &EmergencyContact,
        message: &str,
    ) -> Result<NotificationResult, MonitorError> {
        info!(contact_id = %contact.id, contact = %contact.name, "Notifying emergency contact: {}", message);
        self.sent
            .write()
            .push((contact.id.clone(), message.to_string()));
        Ok(NotificationResult {
            success: true,
            detail: None,
        })
    }
}

/// Emergency services that log each call and acknowledge it
#[derive(Default)]
pub struct LoggingEmergencyServices {
    calls: RwLock<Vec<ActionRequest>>,
}

impl LoggingEmergencyServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ActionRequest> {
        self.calls.read().clone()
    }

    fn acknowledge(&self, request: &ActionRequest, status: &str) -> ActionOutcome {
        info!(
            emergency_id = %request.emergency_id,
            patient_id = %request.patient_id,
            action = request.action.as_str(),
            "Emergency action {}", status
        );
        self.calls.write().push(request.clone());
        ActionOutcome {
            status: status.to_string(),
            reference: Some(Uuid::new_v4().to_string()),
            details: serde_json::json!({
                "emergency_type": request.emergency_type.as_str(),
            }),
        }
    }
}

#[async_trait]
impl EmergencyServices for LoggingEmergencyServices {
    async fn request_dispatch(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
        Ok(self.acknowledge(request, "dispatched"))
    }

    async fn notify_facility(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
        Ok(self.acknowledge(request, "notified"))
    }

    async fn issue_care_instruction(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
        Ok(self.acknowledge(request, "instructed"))
    }

    async fn escalate_monitoring(&self, request: &ActionRequest) -> Result<ActionOutcome, MonitorError> {
        Ok(self.acknowledge(request, "escalated"))
    }
}
