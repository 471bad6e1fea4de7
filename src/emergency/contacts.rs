//! Emergency contacts

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    /// Generated when empty
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Lower is notified first
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_priority() -> u8 {
    1
}

fn default_active() -> bool {
    true
}

impl EmergencyContact {
    pub fn new(name: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            relationship: relationship.into(),
            phone: None,
            email: None,
            priority: default_priority(),
            active: true,
        }
    }
}

/// Outcome of notifying one contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub contact_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Contacts per patient
#[derive(Debug, Default)]
pub struct ContactDirectory {
    contacts: DashMap<String, Vec<EmergencyContact>>,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contact, returning its id
    pub fn add(&self, patient_id: &str, mut contact: EmergencyContact) -> String {
        if contact.id.trim().is_empty() {
            contact.id = Uuid::new_v4().to_string();
        }
        let id = contact.id.clone();
        let mut entry = self.contacts.entry(patient_id.to_string()).or_default();
        entry.retain(|c| c.id != id);
        entry.push(contact);
        id
    }

    /// Active contacts in notification order
    pub fn active_for(&self, patient_id: &str) -> Vec<EmergencyContact> {
        let mut contacts: Vec<EmergencyContact> = self
            .contacts
            .get(patient_id)
            .map(|c| c.iter().filter(|c| c.active).cloned().collect())
            .unwrap_or_default();
        contacts.sort_by_key(|c| c.priority);
        contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_and_priority_order() {
        let directory = ContactDirectory::new();
        let mut sibling = EmergencyContact::new("Sam", "sibling");
        sibling.priority = 2;
        let spouse = EmergencyContact::new("Alex", "spouse");
        let mut former = EmergencyContact::new("Kim", "former caregiver");
        former.active = false;

        let sibling_id = directory.add("patient-1", sibling);
        let spouse_id = directory.add("patient-1", spouse);
        directory.add("patient-1", former);
        assert_ne!(sibling_id, spouse_id);

        let active = directory.active_for("patient-1");
        let ids: Vec<&str> = active.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![spouse_id.as_str(), sibling_id.as_str()]);
        assert!(directory.active_for("patient-2").is_empty());
    }

    #[test]
    fn test_re_adding_an_id_replaces_it() {
        let directory = ContactDirectory::new();
        let mut contact = EmergencyContact::new("Alex", "spouse");
        contact.id = "c-1".to_string();
        directory.add("patient-1", contact.clone());
        contact.phone = Some("+15550100".to_string());
        directory.add("patient-1", contact);

        let active = directory.active_for("patient-1");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].phone.as_deref(), Some("+15550100"));
    }
}
