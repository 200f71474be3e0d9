//! Unit Aggregation
//!
//! Rolls person-level scores and alerts up to unit summaries.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertInstance, AlertSeverity};
use crate::risk::{fatigue_risk, RiskLevel};

/// Weight of the unit mean in [`unit_readiness`]; the minimum gets the rest
pub const MEAN_WEIGHT: f64 = 0.7;

/// Fatigue score at or above which a person counts as at risk
pub const AT_RISK_FATIGUE: f64 = 4.0;

/// Blend of the mean (70%) and minimum (30%) of personnel readiness,
/// rounded to an integer.
///
/// The minimum term keeps a unit's readiness bounded by its worst-off
/// member. Empty input yields 0. Non-finite scores are ignored.
pub fn unit_readiness(scores: &[f64]) -> f64 {
    let valid: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    if valid.is_empty() {
        return 0.0;
    }

    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    let min = valid.iter().copied().fold(f64::INFINITY, f64::min);

    (mean * MEAN_WEIGHT + min * (1.0 - MEAN_WEIGHT)).round()
}

/// Latest scored snapshot of one person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonHealth {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudonym_id: Option<String>,
    pub unit_id: String,
    pub readiness_index: f64,
    pub fatigue_score: f64,
    pub heat_risk: RiskLevel,
    pub is_online: bool,
    pub last_update: DateTime<Utc>,
}

impl PersonHealth {
    /// Critical heat risk or fatigue at [`AT_RISK_FATIGUE`] or above
    pub fn is_at_risk(&self) -> bool {
        self.heat_risk == RiskLevel::Critical || self.fatigue_score >= AT_RISK_FATIGUE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit_id: String,
    pub personnel_count: usize,
    pub online_count: usize,
    pub readiness_index: f64,
    /// Alerts not yet resolved
    pub active_alerts: usize,
    /// Unresolved alerts at critical severity or above
    pub critical_alerts: usize,
    pub heat_risk: RiskLevel,
    pub fatigue_risk: RiskLevel,
    pub at_risk_count: usize,
    pub last_update: Option<DateTime<Utc>>,
}

impl UnitSummary {
    /// Summarize one unit from its members and the alerts raised on them
    pub fn compute<'a>(
        unit_id: &str,
        people: &[&PersonHealth],
        alerts: impl IntoIterator<Item = &'a AlertInstance>,
    ) -> Self {
        let readiness: Vec<f64> = people.iter().map(|p| p.readiness_index).collect();
        let max_fatigue = people
            .iter()
            .map(|p| p.fatigue_score)
            .filter(|f| f.is_finite())
            .fold(0.0, f64::max);

        let (active_alerts, critical_alerts) = alerts
            .into_iter()
            .filter(|a| a.is_open())
            .fold((0, 0), |(active, critical), a| {
                (active + 1, critical + usize::from(a.severity >= AlertSeverity::Critical))
            });

        Self {
            unit_id: unit_id.to_string(),
            personnel_count: people.len(),
            online_count: people.iter().filter(|p| p.is_online).count(),
            readiness_index: unit_readiness(&readiness),
            active_alerts,
            critical_alerts,
            heat_risk: RiskLevel::max_of(people.iter().map(|p| p.heat_risk)),
            fatigue_risk: fatigue_risk(max_fatigue),
            at_risk_count: people.iter().filter(|p| p.is_at_risk()).count(),
            last_update: people.iter().map(|p| p.last_update).max(),
        }
    }
}

/// Group people by unit and summarize each unit.
///
/// Alerts are attributed to the unit of the person they were raised on;
/// alerts on unknown entities are not counted.
pub fn summarize_units(people: &[PersonHealth], alerts: &[AlertInstance]) -> Vec<UnitSummary> {
    let mut units: BTreeMap<&str, Vec<&PersonHealth>> = BTreeMap::new();
    let mut unit_of: HashMap<&str, &str> = HashMap::new();

    for person in people {
        units.entry(person.unit_id.as_str()).or_default().push(person);
        unit_of.insert(person.id.as_str(), person.unit_id.as_str());
    }

    units
        .iter()
        .map(|(unit_id, members)| {
            let unit_alerts = alerts
                .iter()
                .filter(|a| unit_of.get(a.entity_id.as_str()) == Some(unit_id));
            UnitSummary::compute(unit_id, members, unit_alerts)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 6, 0, 0).unwrap()
    }

    fn person(id: &str, unit: &str, readiness: f64, fatigue: f64, heat: RiskLevel) -> PersonHealth {
        PersonHealth {
            id: id.to_string(),
            pseudonym_id: None,
            unit_id: unit.to_string(),
            readiness_index: readiness,
            fatigue_score: fatigue,
            heat_risk: heat,
            is_online: true,
            last_update: t0(),
        }
    }

    fn alert(id: &str, entity: &str, severity: AlertSeverity) -> AlertInstance {
        AlertInstance::new(id.into(), "rule".into(), None, entity.into(), severity, t0())
    }

    #[test]
    fn test_unit_readiness_weighs_minimum() {
        // mean 70, min 40 -> 49 + 12
        assert_eq!(unit_readiness(&[40.0, 80.0, 90.0]), 61.0);
        assert_eq!(unit_readiness(&[]), 0.0);
        assert_eq!(unit_readiness(&[f64::NAN, 50.0]), 50.0);
    }

    #[test]
    fn test_summary_counts() {
        let mut offline = person("c", "alpha", 60.0, 4.2, RiskLevel::Low);
        offline.is_online = false;
        offline.last_update = t0() + Duration::minutes(5);

        let people = vec![
            person("a", "alpha", 80.0, 1.0, RiskLevel::Medium),
            person("b", "alpha", 90.0, 2.0, RiskLevel::Critical),
            offline,
            person("d", "bravo", 70.0, 0.5, RiskLevel::Low),
        ];

        let mut resolved = alert("alert-000003", "a", AlertSeverity::Emergency);
        resolved.auto_resolve(t0()).unwrap();
        let alerts = vec![
            alert("alert-000001", "a", AlertSeverity::Warning),
            alert("alert-000002", "b", AlertSeverity::Critical),
            resolved,
            alert("alert-000004", "d", AlertSeverity::Emergency),
            alert("alert-000005", "ghost", AlertSeverity::Emergency),
        ];

        let summaries = summarize_units(&people, &alerts);
        assert_eq!(summaries.len(), 2);

        let alpha = &summaries[0];
        assert_eq!(alpha.unit_id, "alpha");
        assert_eq!(alpha.personnel_count, 3);
        assert_eq!(alpha.online_count, 2);
        // mean 76.67, min 60 -> 53.67 + 18
        assert_eq!(alpha.readiness_index, 72.0);
        assert_eq!(alpha.active_alerts, 2);
        assert_eq!(alpha.critical_alerts, 1);
        assert_eq!(alpha.heat_risk, RiskLevel::Critical);
        assert_eq!(alpha.fatigue_risk, RiskLevel::Critical);
        assert_eq!(alpha.at_risk_count, 2);
        assert_eq!(alpha.last_update, Some(t0() + Duration::minutes(5)));

        let bravo = &summaries[1];
        assert_eq!(bravo.active_alerts, 1);
        assert_eq!(bravo.critical_alerts, 1);
        assert_eq!(bravo.fatigue_risk, RiskLevel::Low);
    }

    #[test]
    fn test_empty_unit() {
        let summary = UnitSummary::compute("empty", &[], std::iter::empty());
        assert_eq!(summary.readiness_index, 0.0);
        assert_eq!(summary.heat_risk, RiskLevel::Low);
        assert_eq!(summary.last_update, None);
    }
}
