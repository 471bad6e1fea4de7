//! Early warnings derived from a trajectory
//!
//! Warnings restate facts already present in the aggregated insights, each
//! with an urgency for downstream recommendation logic.

use crate::types::{Assessment, Severity};
use serde::{Deserialize, Serialize};

use super::symptoms::SymptomInsights;
use super::vitals::VitalInsights;
use super::OverallTrend;

/// Worsening symptoms above this count are urgent
const URGENT_WORSENING_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    HighConcern,
    WorseningSymptoms,
    ConcerningVitals,
    AgeRelatedRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyWarning {
    pub kind: WarningKind,
    pub message: String,
    pub urgency: Severity,
    /// Symptoms or metrics the warning is about
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
}

pub(crate) struct WarningInputs<'a> {
    pub concern: Severity,
    pub overall_trend: OverallTrend,
    pub symptoms: &'a Assessment<SymptomInsights>,
    pub vitals: &'a Assessment<VitalInsights>,
    pub patient_age: Option<u32>,
    pub elderly_age: u32,
}

pub(crate) fn derive(inputs: &WarningInputs<'_>) -> Vec<EarlyWarning> {
    let mut warnings = Vec::new();

    if inputs.concern >= Severity::High {
        warnings.push(EarlyWarning {
            kind: WarningKind::HighConcern,
            message: "Multiple health indicators showing concerning patterns".to_string(),
            urgency: Severity::High,
            subjects: Vec::new(),
        });
    }

    if let Some(symptoms) = inputs.symptoms.assessed() {
        let worsening = symptoms.worsening();
        if !worsening.is_empty() {
            warnings.push(EarlyWarning {
                kind: WarningKind::WorseningSymptoms,
                message: format!("Worsening symptoms detected: {}", worsening.join(", ")),
                urgency: if worsening.len() > URGENT_WORSENING_COUNT {
                    Severity::High
                } else {
                    Severity::Medium
                },
                subjects: worsening,
            });
        }
    }

    if let Some(vitals) = inputs.vitals.assessed() {
        let concerning: Vec<String> = vitals
            .concerning()
            .iter()
            .map(|m| m.as_str().to_string())
            .collect();
        if !concerning.is_empty() {
            warnings.push(EarlyWarning {
                kind: WarningKind::ConcerningVitals,
                message: format!("Concerning vital sign trends: {}", concerning.join(", ")),
                urgency: Severity::High,
                subjects: concerning,
            });
        }
    }

    let elderly = inputs.patient_age.map_or(false, |age| age > inputs.elderly_age);
    if elderly && inputs.overall_trend == OverallTrend::Declining {
        warnings.push(EarlyWarning {
            kind: WarningKind::AgeRelatedRisk,
            message: "Declining health trajectory in elderly patient".to_string(),
            urgency: Severity::High,
            subjects: Vec::new(),
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::symptoms::{RecurringSymptom, SymptomTrend};

    fn make_symptoms(worsening: &[&str]) -> Assessment<SymptomInsights> {
        Assessment::Assessed(SymptomInsights {
            recurring_symptoms: worsening
                .iter()
                .map(|name| RecurringSymptom {
                    name: name.to_string(),
                    frequency: 3,
                    trend: SymptomTrend::Worsening,
                })
                .collect(),
            patterns: vec![],
            direction: SymptomTrend::Worsening,
            concern: Severity::High,
        })
    }

    #[test]
    fn test_worsening_symptom_urgency() {
        let vitals = Assessment::InsufficientData;
        let two = make_symptoms(&["cough", "fever"]);
        let warnings = derive(&WarningInputs {
            concern: Severity::Medium,
            overall_trend: OverallTrend::Declining,
            symptoms: &two,
            vitals: &vitals,
            patient_age: Some(40),
            elderly_age: 65,
        });
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::WorseningSymptoms);
        assert_eq!(warnings[0].urgency, Severity::Medium);

        let three = make_symptoms(&["cough", "fever", "fatigue"]);
        let warnings = derive(&WarningInputs {
            concern: Severity::Medium,
            overall_trend: OverallTrend::Declining,
            symptoms: &three,
            vitals: &vitals,
            patient_age: Some(40),
            elderly_age: 65,
        });
        assert_eq!(warnings[0].urgency, Severity::High);
    }

    #[test]
    fn test_elderly_declining_and_high_concern() {
        let symptoms = Assessment::InsufficientData;
        let vitals = Assessment::InsufficientData;
        let warnings = derive(&WarningInputs {
            concern: Severity::Critical,
            overall_trend: OverallTrend::Declining,
            symptoms: &symptoms,
            vitals: &vitals,
            patient_age: Some(70),
            elderly_age: 65,
        });
        let kinds: Vec<WarningKind> = warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::HighConcern, WarningKind::AgeRelatedRisk]);
    }
}
