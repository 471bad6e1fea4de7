//! General risk assessment
//!
//! Scores demographic, behavioral and clinical risk from the patient context
//! and recent symptom reports. Each component is capped at 1; the mean of the
//! components sets the level.

use crate::thresholds::{PatientContext, ELDERLY_AGE};
use crate::types::Severity;
use serde::{Deserialize, Serialize};

use super::symptoms::SymptomEntry;

/// Symptom phrases that raise clinical risk
pub const HIGH_RISK_SYMPTOMS: [&str; 3] = ["chest pain", "difficulty breathing", "severe headache"];

/// Most recent symptom reports considered for clinical risk
const RECENT_SYMPTOM_ENTRIES: usize = 5;

/// Risk components and overall level for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub demographic: f64,
    pub behavioral: f64,
    pub clinical: f64,
    /// Mean of the components
    pub score: f64,
    pub level: Severity,
    pub risk_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_age: Option<u32>,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            demographic: 0.0,
            behavioral: 0.0,
            clinical: 0.0,
            score: 0.0,
            level: Severity::Low,
            risk_factors: Vec::new(),
            patient_age: None,
        }
    }
}

impl RiskAssessment {
    pub fn assess(context: &PatientContext, symptoms: &[SymptomEntry]) -> Self {
        let mut risk_factors = Vec::new();

        let mut demographic: f64 = 0.0;
        match context.age {
            Some(age) if age > ELDERLY_AGE => {
                demographic += 0.3;
                risk_factors.push(format!("Advanced age (>{ELDERLY_AGE})"));
            }
            Some(age) if age < 18 => {
                demographic += 0.2;
                risk_factors.push("Young age (<18)".to_string());
            }
            _ => {}
        }

        let mut behavioral: f64 = 0.0;
        for factor in &context.risk_factors {
            let factor = factor.to_lowercase();
            if factor.contains("smoking") {
                behavioral += 0.4;
                risk_factors.push("Smoking".to_string());
            }
            if factor.contains("alcohol") {
                behavioral += 0.3;
                risk_factors.push("Alcohol use".to_string());
            }
            if factor.contains("obesity") {
                behavioral += 0.3;
                risk_factors.push("Obesity".to_string());
            }
        }

        let mut clinical = 0.2 * context.chronic_conditions.len() as f64;
        risk_factors.extend(context.chronic_conditions.iter().cloned());

        let mut recent: Vec<&SymptomEntry> = symptoms.iter().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let high_risk_entries = recent
            .iter()
            .take(RECENT_SYMPTOM_ENTRIES)
            .filter(|entry| {
                entry.symptoms.iter().any(|s| {
                    let s = s.to_lowercase();
                    HIGH_RISK_SYMPTOMS.iter().any(|hrs| s.contains(hrs))
                })
            })
            .count();
        if high_risk_entries > 0 {
            clinical += 0.3 * high_risk_entries as f64;
            risk_factors.push("High-risk symptoms reported".to_string());
        }

        let demographic = demographic.min(1.0);
        let behavioral = behavioral.min(1.0);
        let clinical = clinical.min(1.0);
        let score = (demographic + behavioral + clinical) / 3.0;

        Self {
            demographic,
            behavioral,
            clinical,
            score,
            level: level_for(score),
            risk_factors,
            patient_age: context.age,
        }
    }
}

fn level_for(score: f64) -> Severity {
    if score >= 0.8 {
        Severity::Critical
    } else if score >= 0.6 {
        Severity::High
    } else if score >= 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_entry(day: i64, symptoms: &[&str]) -> SymptomEntry {
        SymptomEntry {
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::days(day),
            severity: None,
        }
    }

    #[test]
    fn test_healthy_adult_is_low_risk() {
        let context = PatientContext {
            age: Some(40),
            ..Default::default()
        };
        let risk = RiskAssessment::assess(&context, &[]);
        assert_eq!(risk.score, 0.0);
        assert_eq!(risk.level, Severity::Low);
        assert!(risk.risk_factors.is_empty());
    }

    #[test]
    fn test_components_are_capped() {
        let context = PatientContext {
            age: Some(80),
            chronic_conditions: vec![
                "diabetes".into(),
                "hypertension".into(),
                "copd".into(),
                "ckd".into(),
                "heart disease".into(),
                "asthma".into(),
            ],
            risk_factors: vec!["Smoking".into(), "alcohol".into(), "obesity".into()],
        };
        let risk = RiskAssessment::assess(&context, &[]);
        assert_eq!(risk.behavioral, 1.0);
        assert_eq!(risk.clinical, 1.0);
        assert!((risk.demographic - 0.3).abs() < 1e-9);
        // (0.3 + 1 + 1) / 3
        assert_eq!(risk.level, Severity::High);
        assert_eq!(risk.patient_age, Some(80));
    }

    #[test]
    fn test_only_recent_high_risk_symptoms_count() {
        let context = PatientContext::default();
        // The chest pain report is the sixth most recent
        let mut history = vec![make_entry(0, &["Chest pain"])];
        for day in 1..=5 {
            history.push(make_entry(day, &["fatigue"]));
        }
        assert_eq!(RiskAssessment::assess(&context, &history).clinical, 0.0);

        history.push(make_entry(6, &["difficulty breathing at night"]));
        let risk = RiskAssessment::assess(&context, &history);
        assert!((risk.clinical - 0.3).abs() < 1e-9);
        assert!(risk
            .risk_factors
            .contains(&"High-risk symptoms reported".to_string()));
    }
}
