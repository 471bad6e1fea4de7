//! Symptom history analysis
//!
//! Recurring symptoms are trended by their inter-occurrence intervals:
//! intervals that shrink more often than they grow mean the symptom is
//! worsening. Pattern mining finds co-occurring pairs and cyclical symptoms.

use crate::features::{mean, variance};
use crate::types::{Assessment, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::AggregatorConfig;

/// Co-occurrence count at which a pair becomes concerning
const CONCERNING_CO_OCCURRENCE: usize = 3;

/// Cyclical regularity above which a cycle becomes concerning
const CONCERNING_CYCLE_CONFIDENCE: f64 = 0.8;

/// Occurrences needed to trend a single symptom
const SYMPTOM_TREND_MIN: usize = 3;

/// One symptom report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomEntry {
    pub symptoms: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
}

/// Direction of a symptom over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomTrend {
    Worsening,
    Improving,
    Stable,
    InsufficientData,
}

/// A symptom reported more than once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSymptom {
    pub name: String,
    pub frequency: usize,
    pub trend: SymptomTrend,
}

/// Mined symptom pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SymptomPattern {
    CoOccurrence {
        symptoms: [String; 2],
        frequency: usize,
    },
    Cyclical {
        symptom: String,
        interval_days: f64,
        /// 1 - (interval std dev / mean interval)
        confidence: f64,
    },
}

impl SymptomPattern {
    fn is_concerning(&self) -> bool {
        match self {
            SymptomPattern::CoOccurrence { frequency, .. } => {
                *frequency >= CONCERNING_CO_OCCURRENCE
            }
            SymptomPattern::Cyclical { confidence, .. } => {
                *confidence > CONCERNING_CYCLE_CONFIDENCE
            }
        }
    }
}

/// Result of symptom history analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomInsights {
    pub recurring_symptoms: Vec<RecurringSymptom>,
    pub patterns: Vec<SymptomPattern>,
    pub direction: SymptomTrend,
    pub concern: Severity,
}

impl SymptomInsights {
    pub fn worsening(&self) -> Vec<String> {
        self.recurring_symptoms
            .iter()
            .filter(|s| s.trend == SymptomTrend::Worsening)
            .map(|s| s.name.clone())
            .collect()
    }
}

/// Analyze a symptom history. Entries need not be sorted.
pub fn analyze(history: &[SymptomEntry], config: &AggregatorConfig) -> Assessment<SymptomInsights> {
    if history.len() < config.min_data_points {
        return Assessment::InsufficientData;
    }

    let mut sorted: Vec<&SymptomEntry> = history.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);

    let occurrences = occurrences(&sorted);
    let recurring_symptoms: Vec<RecurringSymptom> = occurrences
        .iter()
        .filter(|(_, times)| times.len() > 1)
        .map(|(name, times)| RecurringSymptom {
            name: name.clone(),
            frequency: times.len(),
            trend: interval_trend(times),
        })
        .collect();

    let mut patterns = co_occurrences(&sorted, config.co_occurrence_min);
    patterns.extend(cycles(&occurrences, config.cyclical_cv));

    let worsening = recurring_symptoms
        .iter()
        .filter(|s| s.trend == SymptomTrend::Worsening)
        .count();
    let improving = recurring_symptoms
        .iter()
        .filter(|s| s.trend == SymptomTrend::Improving)
        .count();
    let direction = if worsening > improving {
        SymptomTrend::Worsening
    } else if improving > worsening {
        SymptomTrend::Improving
    } else {
        SymptomTrend::Stable
    };

    let concerning = patterns.iter().filter(|p| p.is_concerning()).count();
    let concern = if worsening >= 2 || concerning >= 2 {
        Severity::High
    } else if worsening >= 1 || concerning >= 1 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Assessment::Assessed(SymptomInsights {
        recurring_symptoms,
        patterns,
        direction,
        concern,
    })
}

/// Timestamps per symptom, in time order. A symptom repeated within one
/// entry counts once.
fn occurrences(sorted: &[&SymptomEntry]) -> BTreeMap<String, Vec<DateTime<Utc>>> {
    let mut map: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
    for entry in sorted {
        let mut names: Vec<&String> = entry.symptoms.iter().collect();
        names.sort();
        names.dedup();
        for name in names {
            map.entry(name.clone()).or_default().push(entry.timestamp);
        }
    }
    map
}

fn intervals_secs(times: &[DateTime<Utc>]) -> Vec<f64> {
    times
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
        .collect()
}

fn interval_trend(times: &[DateTime<Utc>]) -> SymptomTrend {
    if times.len() < SYMPTOM_TREND_MIN {
        return SymptomTrend::InsufficientData;
    }
    let intervals = intervals_secs(times);
    let mut shorter = 0;
    let mut longer = 0;
    for w in intervals.windows(2) {
        if w[1] < w[0] {
            shorter += 1;
        } else if w[1] > w[0] {
            longer += 1;
        }
    }
    if shorter > longer {
        SymptomTrend::Worsening
    } else if longer > shorter {
        SymptomTrend::Improving
    } else {
        SymptomTrend::Stable
    }
}

fn co_occurrences(sorted: &[&SymptomEntry], min: usize) -> Vec<SymptomPattern> {
    let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();
    for entry in sorted {
        let mut names: Vec<&String> = entry.symptoms.iter().collect();
        names.sort();
        names.dedup();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                *pairs.entry(((*a).clone(), (*b).clone())).or_default() += 1;
            }
        }
    }

    pairs
        .into_iter()
        .filter(|(_, count)| *count >= min)
        .map(|((a, b), frequency)| SymptomPattern::CoOccurrence {
            symptoms: [a, b],
            frequency,
        })
        .collect()
}

fn cycles(occurrences: &BTreeMap<String, Vec<DateTime<Utc>>>, max_cv: f64) -> Vec<SymptomPattern> {
    occurrences
        .iter()
        .filter(|(_, times)| times.len() >= SYMPTOM_TREND_MIN)
        .filter_map(|(name, times)| {
            let intervals = intervals_secs(times);
            let avg = mean(&intervals);
            if avg <= 0.0 {
                return None;
            }
            let std_dev = variance(&intervals).sqrt();
            if std_dev >= avg * max_cv {
                return None;
            }
            Some(SymptomPattern::Cyclical {
                symptom: name.clone(),
                interval_days: avg / 86_400.0,
                confidence: 1.0 - std_dev / avg,
            })
        })
        .collect()
}
