//! Per-Entity Scoring
//!
//! Groups a tick's observations by entity and derives the scores the
//! numeric models and risk classifier can produce from them. Derived
//! scores are fed back as parameters so that alert rules can reference
//! them (`fatigue_score gte 4`, `heat_risk gte 2`, ...).
//!
//! Entities are scored independently of each other. With the `parallel`
//! feature enabled scoring fans out across entities via rayon.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DataQualityError;
use crate::models::{self, VitalStatus};
use crate::risk::{self, RiskLevel};
use crate::samples::VitalSample;

/// Well-known observation parameter names
pub mod params {
    pub const HEART_RATE: &str = "heart_rate";
    pub const RESPIRATORY_RATE: &str = "respiratory_rate";
    pub const SPO2: &str = "spo2";
    pub const SKIN_TEMP: &str = "skin_temp";
    pub const HRV: &str = "hrv";
    pub const RESTING_HR: &str = "resting_hr";
    pub const MAX_HR: &str = "max_hr";
    pub const AGE: &str = "age";
    pub const SLEEP_SCORE: &str = "sleep_score";
    pub const TRAINING_LOAD: &str = "training_load";
    pub const HEAT_EXPOSURE: &str = "heat_exposure";
    pub const ACTIVITY_LOAD: &str = "activity_load";
    pub const ACTIVITY_LEVEL: &str = "activity_level";
    pub const WBGT: &str = "wbgt";
    pub const HEAT_INDEX: &str = "heat_index";
    pub const DRY_BULB_TEMP: &str = "dry_bulb_temp";
    pub const WET_BULB_TEMP: &str = "wet_bulb_temp";
    pub const GLOBE_TEMP: &str = "globe_temp";
    pub const AMBIENT_TEMP: &str = "ambient_temp";
    pub const HUMIDITY: &str = "humidity";

    // Derived
    pub const READINESS_INDEX: &str = "readiness_index";
    pub const FATIGUE_SCORE: &str = "fatigue_score";
    pub const HEAT_RISK: &str = "heat_risk";
    pub const VITAL_STATUS: &str = "vital_status";
    pub const HR_PERCENT_MAX: &str = "hr_percent_max";
}

/// One numeric reading for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_id: String,
    pub parameter: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Latest value per parameter for one entity
pub type ParameterMap = BTreeMap<String, f64>;

/// Group observations by entity, keeping the latest value of each
/// parameter. Ties on timestamp go to the later observation in the batch.
/// Non-finite values are dropped.
pub fn group_observations(observations: &[Observation]) -> BTreeMap<String, ParameterMap> {
    let mut latest: BTreeMap<&str, BTreeMap<&str, (DateTime<Utc>, f64)>> = BTreeMap::new();

    for obs in observations {
        if !obs.value.is_finite() {
            warn!(
                entity_id = %obs.entity_id,
                parameter = %obs.parameter,
                "dropping non-finite observation"
            );
            continue;
        }

        let slot = latest
            .entry(obs.entity_id.as_str())
            .or_default()
            .entry(obs.parameter.as_str())
            .or_insert((obs.timestamp, obs.value));

        if obs.timestamp >= slot.0 {
            *slot = (obs.timestamp, obs.value);
        }
    }

    latest
        .into_iter()
        .map(|(entity, values)| {
            let map = values
                .into_iter()
                .map(|(param, (_, value))| (param.to_string(), value))
                .collect();
            (entity.to_string(), map)
        })
        .collect()
}

/// Scores derived for one entity in one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatigue_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_risk: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vital_status: Option<VitalStatus>,
}

/// Scores plus the derived parameters and rejected inputs behind them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredEntity {
    pub scores: EntityScores,
    pub derived: Vec<(&'static str, f64)>,
    pub data_quality: Vec<DataQualityError>,
}

impl ScoredEntity {
    /// Add derived values to `params` without overwriting observed ones
    pub fn inject_into(&self, params: &mut ParameterMap) {
        for (name, value) in &self.derived {
            params.entry((*name).to_string()).or_insert(*value);
        }
    }
}

/// Derive every score whose inputs are present in `p`.
///
/// Training load, heat exposure, activity load and activity level default
/// to zero when absent. Missing core inputs leave the score unset.
pub fn score_parameters(p: &ParameterMap, at: DateTime<Utc>, indoors: bool) -> ScoredEntity {
    use params::*;

    let get = |name: &str| p.get(name).copied().filter(|v| v.is_finite());
    let mut out = ScoredEntity::default();

    let max_hr = get(MAX_HR).or_else(|| {
        get(AGE)
            .filter(|age| *age >= 0.0)
            .map(|age| models::max_heart_rate(age.round() as u32))
    });
    if let Some(max) = max_hr {
        out.derived.push((MAX_HR, max));
    }

    // Readiness
    if let (Some(hrv), Some(sleep)) = (get(HRV), get(SLEEP_SCORE)) {
        let readiness = models::readiness_index(
            hrv,
            sleep,
            get(TRAINING_LOAD).unwrap_or(0.0),
            get(HEAT_EXPOSURE).unwrap_or(0.0),
        );
        out.scores.readiness_index = Some(readiness);
        out.derived.push((READINESS_INDEX, readiness));
    }

    // Fatigue
    if let (Some(resting), Some(max), Some(sleep)) = (get(RESTING_HR), max_hr, get(SLEEP_SCORE)) {
        match models::fatigue_score(resting, max, sleep, get(ACTIVITY_LOAD).unwrap_or(0.0)) {
            Ok(fatigue) => {
                out.scores.fatigue_score = Some(fatigue);
                out.derived.push((FATIGUE_SCORE, fatigue));
            }
            Err(e) => out.data_quality.push(e),
        }
    }

    // Heat
    let dry = get(DRY_BULB_TEMP).or_else(|| get(AMBIENT_TEMP));
    let wbgt = get(WBGT).or_else(|| {
        let wet = get(WET_BULB_TEMP)?;
        let globe = get(GLOBE_TEMP)?;
        match (indoors, dry) {
            (true, _) => Some(models::wbgt(dry.unwrap_or(wet), wet, globe, true)),
            (false, Some(d)) => Some(models::wbgt(d, wet, globe, false)),
            (false, None) => None,
        }
    });
    let heat_index = get(HEAT_INDEX).or_else(|| Some(models::heat_index(dry?, get(HUMIDITY)?)));

    if let Some(w) = wbgt {
        out.derived.push((WBGT, w));
    }
    if let Some(hi) = heat_index {
        out.derived.push((HEAT_INDEX, hi));
    }

    if wbgt.is_some() || heat_index.is_some() {
        let hr_percent = match (get(HEART_RATE), max_hr) {
            (Some(hr), Some(max)) => match models::heart_rate_percent_of_max(hr, max) {
                Ok(pct) => {
                    out.derived.push((HR_PERCENT_MAX, pct));
                    pct
                }
                Err(e) => {
                    out.data_quality.push(e);
                    0.0
                }
            },
            _ => 0.0,
        };

        let level = risk::heat_risk(
            wbgt.unwrap_or(f64::NEG_INFINITY),
            heat_index.unwrap_or(f64::NEG_INFINITY),
            hr_percent,
            get(ACTIVITY_LEVEL).unwrap_or(0.0),
        );
        out.scores.heat_risk = Some(level);
        out.derived.push((HEAT_RISK, level.ordinal() as f64));
    }

    // Vitals
    if let (Some(hr), Some(rr), Some(spo2), Some(skin)) =
        (get(HEART_RATE), get(RESPIRATORY_RATE), get(SPO2), get(SKIN_TEMP))
    {
        let status = models::vital_status(&VitalSample {
            heart_rate: hr,
            respiratory_rate: rr,
            spo2,
            skin_temp: skin,
            timestamp: at,
        });
        out.derived.push((VITAL_STATUS, status.status.ordinal() as f64));
        out.scores.vital_status = Some(status);
    }

    out
}

/// Score every entity of a grouped batch
#[cfg(feature = "parallel")]
pub fn score_entities(
    groups: &BTreeMap<String, ParameterMap>,
    at: DateTime<Utc>,
    indoors: bool,
) -> BTreeMap<String, ScoredEntity> {
    use rayon::prelude::*;

    groups
        .par_iter()
        .map(|(entity, p)| (entity.clone(), score_parameters(p, at, indoors)))
        .collect()
}

/// Score every entity of a grouped batch
#[cfg(not(feature = "parallel"))]
pub fn score_entities(
    groups: &BTreeMap<String, ParameterMap>,
    at: DateTime<Utc>,
    indoors: bool,
) -> BTreeMap<String, ScoredEntity> {
    groups
        .iter()
        .map(|(entity, p)| (entity.clone(), score_parameters(p, at, indoors)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::params::*;
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 2, 14, 0, 0).unwrap()
    }

    fn obs(entity: &str, parameter: &str, value: f64, offset_secs: i64) -> Observation {
        Observation {
            entity_id: entity.to_string(),
            parameter: parameter.to_string(),
            value,
            timestamp: t0() + Duration::seconds(offset_secs),
        }
    }

    fn map(pairs: &[(&str, f64)]) -> ParameterMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_grouping_keeps_latest() {
        let batch = vec![
            obs("p1", HEART_RATE, 130.0, 30),
            obs("p1", HEART_RATE, 90.0, 10),
            obs("p2", HEART_RATE, 70.0, 0),
            obs("p2", HEART_RATE, 75.0, 0),
            obs("p2", SPO2, f64::NAN, 5),
        ];
        let groups = group_observations(&batch);

        assert_eq!(groups["p1"][HEART_RATE], 130.0);
        // Equal timestamps: later in the batch wins
        assert_eq!(groups["p2"][HEART_RATE], 75.0);
        assert!(!groups["p2"].contains_key(SPO2));
    }

    #[test]
    fn test_full_scoring() {
        let p = map(&[
            (HRV, 60.0),
            (SLEEP_SCORE, 100.0),
            (RESTING_HR, 60.0),
            (AGE, 22.0),
            (HEART_RATE, 175.0),
            (RESPIRATORY_RATE, 22.0),
            (SPO2, 97.0),
            (SKIN_TEMP, 37.0),
            (WBGT, 30.0),
            (ACTIVITY_LEVEL, 0.9),
        ]);
        let scored = score_parameters(&p, t0(), false);

        assert_eq!(scored.scores.readiness_index, Some(88.0));
        assert!(scored.scores.fatigue_score.is_some());
        // wbgt 30 -> 2, 175/193 = 90.7 % with activity 0.9 -> 2
        assert_eq!(scored.scores.heat_risk, Some(RiskLevel::Critical));
        assert_eq!(
            scored.scores.vital_status.as_ref().map(|v| v.status),
            Some(RiskLevel::High)
        );
        assert!(scored.data_quality.is_empty());
        assert!(scored.derived.contains(&(MAX_HR, 193.0)));
        assert!(scored.derived.contains(&(HEAT_RISK, 3.0)));
    }

    #[test]
    fn test_heat_derived_from_raw_temperatures() {
        let p = map(&[(DRY_BULB_TEMP, 32.0), (HUMIDITY, 70.0)]);
        let scored = score_parameters(&p, t0(), false);
        // Heat index 40.4 alone is band 3 -> high
        assert_eq!(scored.scores.heat_risk, Some(RiskLevel::High));
        assert!(scored.derived.contains(&(HEAT_INDEX, 40.4)));
    }

    #[test]
    fn test_missing_inputs_leave_scores_unset() {
        let scored = score_parameters(&map(&[(HEART_RATE, 80.0)]), t0(), false);
        assert_eq!(scored.scores, EntityScores::default());
        assert!(scored.derived.is_empty());
    }

    #[test]
    fn test_zero_max_hr_is_reported() {
        let p = map(&[(RESTING_HR, 60.0), (MAX_HR, 0.0), (SLEEP_SCORE, 80.0)]);
        let scored = score_parameters(&p, t0(), false);
        assert_eq!(scored.scores.fatigue_score, None);
        assert_eq!(scored.data_quality[0].field(), "max_hr");
    }

    #[test]
    fn test_injection_does_not_overwrite_observations() {
        let mut p = map(&[(HRV, 60.0), (SLEEP_SCORE, 100.0), (READINESS_INDEX, 12.0)]);
        let scored = score_parameters(&p, t0(), false);
        scored.inject_into(&mut p);
        assert_eq!(p[READINESS_INDEX], 12.0);
    }

    #[test]
    fn test_score_entities_covers_every_entity() {
        let batch = vec![obs("a", HRV, 50.0, 0), obs("a", SLEEP_SCORE, 70.0, 0), obs("b", SPO2, 99.0, 0)];
        let scored = score_entities(&group_observations(&batch), t0(), false);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored["a"].scores.readiness_index, Some(76.0));
        assert_eq!(scored["b"].scores.readiness_index, None);
    }
}
