//! Emergency protocols
//!
//! Static map from anomaly kind to emergency type, and from emergency type to
//! an ordered action list with a target response-time budget.

use crate::types::AnomalyType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    CardiacEmergency,
    DiabeticEmergency,
    HypertensiveCrisis,
    RespiratoryEmergency,
    GeneralEmergency,
}

impl EmergencyType {
    pub const ALL: [EmergencyType; 5] = [
        EmergencyType::CardiacEmergency,
        EmergencyType::DiabeticEmergency,
        EmergencyType::HypertensiveCrisis,
        EmergencyType::RespiratoryEmergency,
        EmergencyType::GeneralEmergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyType::CardiacEmergency => "cardiac_emergency",
            EmergencyType::DiabeticEmergency => "diabetic_emergency",
            EmergencyType::HypertensiveCrisis => "hypertensive_crisis",
            EmergencyType::RespiratoryEmergency => "respiratory_emergency",
            EmergencyType::GeneralEmergency => "general_emergency",
        }
    }

    pub fn for_anomaly(anomaly_type: &AnomalyType) -> Self {
        match anomaly_type {
            AnomalyType::Tachycardia
            | AnomalyType::Bradycardia
            | AnomalyType::Hypotension
            | AnomalyType::RapidHeartRateChange => EmergencyType::CardiacEmergency,
            AnomalyType::HypertensiveEmergency | AnomalyType::RapidBloodPressureChange => {
                EmergencyType::HypertensiveCrisis
            }
            AnomalyType::Hypoglycemia
            | AnomalyType::Hyperglycemia
            | AnomalyType::RapidGlucoseRise
            | AnomalyType::RapidGlucoseFall => EmergencyType::DiabeticEmergency,
            AnomalyType::Hypoxemia => EmergencyType::RespiratoryEmergency,
            _ => EmergencyType::GeneralEmergency,
        }
    }
}

/// A single protocol step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    CallEmergencyServices,
    NotifyHospital,
    DispatchAmbulance,
    CheckGlucose,
    AdministerGlucose,
    MonitorVitals,
    BloodPressureMedication,
    HospitalTransport,
    NotifyCareTeam,
}

impl ResponseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseAction::CallEmergencyServices => "call_emergency_services",
            ResponseAction::NotifyHospital => "notify_hospital",
            ResponseAction::DispatchAmbulance => "dispatch_ambulance",
            ResponseAction::CheckGlucose => "check_glucose",
            ResponseAction::AdministerGlucose => "administer_glucose",
            ResponseAction::MonitorVitals => "monitor_vitals",
            ResponseAction::BloodPressureMedication => "blood_pressure_medication",
            ResponseAction::HospitalTransport => "hospital_transport",
            ResponseAction::NotifyCareTeam => "notify_care_team",
        }
    }
}

/// Ordered response for one emergency type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub emergency_type: EmergencyType,
    pub actions: Vec<ResponseAction>,
    /// Target time to complete every action
    pub response_budget_secs: u64,
}

impl Protocol {
    pub fn for_type(emergency_type: EmergencyType) -> Self {
        use ResponseAction::*;

        let (actions, budget) = match emergency_type {
            EmergencyType::CardiacEmergency => {
                (vec![CallEmergencyServices, NotifyHospital, DispatchAmbulance], 300)
            }
            EmergencyType::DiabeticEmergency => {
                (vec![CheckGlucose, AdministerGlucose, MonitorVitals], 600)
            }
            EmergencyType::HypertensiveCrisis => (
                vec![CallEmergencyServices, BloodPressureMedication, HospitalTransport],
                300,
            ),
            EmergencyType::RespiratoryEmergency => {
                (vec![CallEmergencyServices, NotifyHospital, MonitorVitals], 300)
            }
            EmergencyType::GeneralEmergency => (vec![NotifyCareTeam, MonitorVitals], 900),
        };

        Self {
            emergency_type,
            actions,
            response_budget_secs: budget,
        }
    }

    /// Every protocol, in emergency-type order
    pub fn all() -> Vec<Self> {
        EmergencyType::ALL.iter().map(|t| Self::for_type(*t)).collect()
    }

    pub fn response_budget(&self) -> Duration {
        Duration::from_secs(self.response_budget_secs)
    }

    /// Even share of the budget per action
    pub fn default_action_timeout(&self) -> Duration {
        let count = self.actions.len().max(1) as u32;
        self.response_budget() / count
    }
}
