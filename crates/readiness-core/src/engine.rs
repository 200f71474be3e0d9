//! Alert Rule Engine
//!
//! Owns per-entity rule state and turns each evaluation tick into alert
//! transitions. One tick:
//!
//! 1. compile the enabled rules (malformed ones are skipped and reported)
//! 2. group the batch per entity and derive scores
//! 3. advance every observed condition's sustain accumulator
//! 4. AND the conditions of each rule and apply the lifecycle
//!
//! Operator actions ([`EngineState::acknowledge`], [`EngineState::resolve`])
//! are explicit calls between ticks. All state lives in [`EngineState`],
//! which serializes so that a storage collaborator can persist it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::alert::{AlertInstance, Transition};
use crate::condition;
use crate::config::EngineConfig;
use crate::error::{InvalidStateError, RuleConfigurationError};
use crate::rules::{compile_rules, AlertRule, CompiledRule};
use crate::scoring::{group_observations, score_entities, EntityScores, Observation, ParameterMap};

/// Sustain tracking of one condition of a rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionTrack {
    /// Comparison the held time was measured against
    pub fingerprint: String,
    /// Seconds the comparison has held; `None` while it does not hold
    pub held_secs: Option<u64>,
    /// Last tick that carried the condition's parameter
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

impl ConditionTrack {
    fn new(fingerprint: String) -> Self {
        Self {
            fingerprint,
            ..Default::default()
        }
    }
}

/// Sustain tracking of one rule for one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrack {
    pub conditions: Vec<ConditionTrack>,
    /// Whether all conditions were satisfied on the last decided evaluation
    pub was_satisfied: bool,
    /// Open instance created by this rule, if any
    pub open_alert: Option<String>,
}

impl RuleTrack {
    /// Track for a rule that may already have an open instance on the
    /// entity, e.g. after the rule was disabled and enabled again.
    fn resume(open_alert: Option<String>) -> Self {
        Self {
            was_satisfied: open_alert.is_some(),
            open_alert,
            ..Default::default()
        }
    }

    /// Line the condition tracks up with the rule. A condition whose
    /// comparison changed starts over.
    fn sync(&mut self, rule: &CompiledRule) {
        self.conditions.truncate(rule.conditions.len());
        for (i, cond) in rule.conditions.iter().enumerate() {
            let fingerprint = cond.fingerprint();
            match self.conditions.get_mut(i) {
                Some(track) if track.fingerprint == fingerprint => {}
                Some(track) => *track = ConditionTrack::new(fingerprint),
                None => self.conditions.push(ConditionTrack::new(fingerprint)),
            }
        }
    }

    /// Advance the conditions whose parameter is present and AND them.
    ///
    /// Held time grows by the seconds since the parameter was last
    /// observed, so slower streams sustain as well as per-tick ones.
    /// Returns `None` if any parameter is missing: nothing is decided and
    /// the missing condition keeps its accumulator.
    fn advance(&mut self, rule: &CompiledRule, params: &ParameterMap, at: DateTime<Utc>) -> Option<bool> {
        self.sync(rule);

        let mut satisfied = Some(true);
        for (cond, track) in rule.conditions.iter().zip(self.conditions.iter_mut()) {
            let Some(value) = params.get(&cond.parameter).copied() else {
                satisfied = None;
                continue;
            };

            let elapsed = track
                .observed_at
                .map_or(0, |prev| (at - prev).num_seconds().max(0) as u64);
            track.observed_at = Some(at);
            track.held_secs = if cond.operator.apply(value, cond.threshold) {
                Some(track.held_secs.map_or(0, |held| held.saturating_add(elapsed)))
            } else {
                None
            };

            let holds = condition::evaluate(
                value,
                cond.operator,
                cond.threshold,
                cond.required_secs,
                track.held_secs.unwrap_or(0),
            );
            satisfied = satisfied.map(|s| s && holds);
        }
        satisfied
    }
}

/// Everything the engine remembers between ticks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub last_tick: Option<DateTime<Utc>>,
    /// entity id -> rule id -> track
    #[serde(default)]
    pub tracks: BTreeMap<String, BTreeMap<String, RuleTrack>>,
    /// Every instance ever created, resolved ones included
    #[serde(default)]
    pub alerts: BTreeMap<String, AlertInstance>,
    #[serde(default)]
    pub next_alert_seq: u64,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert(&self, alert_id: &str) -> Option<&AlertInstance> {
        self.alerts.get(alert_id)
    }

    /// Instances that are not resolved
    pub fn open_alerts(&self) -> impl Iterator<Item = &AlertInstance> {
        self.alerts.values().filter(|a| a.is_open())
    }

    pub fn alerts_for_entity<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a AlertInstance> {
        self.alerts.values().filter(move |a| a.entity_id == entity_id)
    }

    /// Latest non-resolved instance of `rule_id` on `entity_id`
    fn open_alert_for(&self, entity_id: &str, rule_id: &str) -> Option<String> {
        self.alerts
            .values()
            .filter(|a| a.is_open() && a.entity_id == entity_id && a.rule_id == rule_id)
            .max_by_key(|a| a.created_at)
            .map(|a| a.id.clone())
    }

    fn next_alert_id(&mut self) -> String {
        self.next_alert_seq += 1;
        format!("alert-{:06}", self.next_alert_seq)
    }

    /// Operator acknowledgment of a non-resolved alert.
    ///
    /// Sustain tracking continues, so an acknowledged alert can still
    /// escalate.
    pub fn acknowledge(
        &mut self,
        alert_id: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Transition, InvalidStateError> {
        let alert = self
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| InvalidStateError::NotFound { alert_id: alert_id.to_string() })?;

        let from = alert.acknowledge(note, at)?;
        let transition = Transition::of(alert, Some(from), at);
        log_transition(&transition);
        Ok(transition)
    }

    /// Operator resolution with a reason.
    ///
    /// The rule will not reopen this instance; a new one is created once
    /// its conditions clear and trigger again.
    pub fn resolve(
        &mut self,
        alert_id: &str,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<Transition, InvalidStateError> {
        let alert = self
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| InvalidStateError::NotFound { alert_id: alert_id.to_string() })?;

        let from = alert.resolve(reason, at)?;
        let transition = Transition::of(alert, Some(from), at);

        if let Some(track) = self
            .tracks
            .get_mut(&alert.entity_id)
            .and_then(|rules| rules.get_mut(&alert.rule_id))
        {
            if track.open_alert.as_deref() == Some(alert_id) {
                track.open_alert = None;
            }
        }

        log_transition(&transition);
        Ok(transition)
    }
}

/// A rejected input, reported per entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub entity_id: String,
    pub field: String,
    pub message: String,
}

fn serialize_display<S, T>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: std::fmt::Display,
{
    serializer.collect_seq(items.iter().map(|item| item.to_string()))
}

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub scores: BTreeMap<String, EntityScores>,
    pub transitions: Vec<Transition>,
    #[serde(serialize_with = "serialize_display")]
    pub rule_errors: Vec<RuleConfigurationError>,
    pub data_quality: Vec<DataQualityIssue>,
}

fn log_transition(t: &Transition) {
    info!(
        alert_id = %t.alert_id,
        rule_id = %t.rule_id,
        entity_id = %t.entity_id,
        from = t.from.map(|s| s.as_str()).unwrap_or("none"),
        to = %t.to,
        severity = t.severity.as_str(),
        escalation_level = t.escalation_level,
        "alert transition"
    );
}

/// Rule evaluation over ticks
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one tick of observations against the current rule set
    pub fn tick(
        &self,
        state: &mut EngineState,
        at: DateTime<Utc>,
        observations: &[Observation],
        rules: &[AlertRule],
    ) -> TickReport {
        let interval_secs = match state.last_tick {
            Some(prev) if at >= prev => (at - prev).num_seconds().max(0) as u64,
            Some(prev) => {
                warn!(%prev, %at, "tick timestamp went backwards; interval treated as zero");
                0
            }
            None => 0,
        };
        state.last_tick = Some(at);

        let (compiled, rule_errors) = compile_rules(rules);
        prune_tracks(state, rules);

        let mut groups = group_observations(observations);
        let scored = score_entities(&groups, at, self.config.indoors);

        let mut scores = BTreeMap::new();
        let mut data_quality = Vec::new();
        for (entity_id, entity) in scored {
            for err in &entity.data_quality {
                warn!(entity_id = %entity_id, field = err.field(), error = %err, "rejected input");
                data_quality.push(DataQualityIssue {
                    entity_id: entity_id.clone(),
                    field: err.field().to_string(),
                    message: err.to_string(),
                });
            }
            if let Some(params) = groups.get_mut(&entity_id) {
                entity.inject_into(params);
            }
            scores.insert(entity_id, entity.scores);
        }

        let mut transitions = Vec::new();
        for (entity_id, params) in &groups {
            for rule in &compiled {
                self.evaluate_rule(state, entity_id, rule, params, at, &mut transitions);
            }
        }

        debug!(
            %at,
            interval_secs,
            entities = groups.len(),
            rules = compiled.len(),
            transitions = transitions.len(),
            "tick evaluated"
        );

        TickReport {
            at,
            scores,
            transitions,
            rule_errors,
            data_quality,
        }
    }

    fn evaluate_rule(
        &self,
        state: &mut EngineState,
        entity_id: &str,
        rule: &CompiledRule,
        params: &ParameterMap,
        at: DateTime<Utc>,
        transitions: &mut Vec<Transition>,
    ) {
        let tracked = state
            .tracks
            .get(entity_id)
            .is_some_and(|rules| rules.contains_key(&rule.id));
        let recovered = if tracked {
            None
        } else {
            state.open_alert_for(entity_id, &rule.id)
        };

        let track = state
            .tracks
            .entry(entity_id.to_string())
            .or_default()
            .entry(rule.id.clone())
            .or_insert_with(|| RuleTrack::resume(recovered));

        let Some(satisfied) = track.advance(rule, params, at) else {
            debug!(entity_id, rule_id = %rule.id, "parameter missing; rule left undecided");
            return;
        };
        let was_satisfied = std::mem::replace(&mut track.was_satisfied, satisfied);

        let open_id = track
            .open_alert
            .clone()
            .filter(|id| state.alerts.get(id).is_some_and(|a| a.is_open()));

        match (satisfied, open_id) {
            // First tick the AND-combination holds
            (true, None) if !was_satisfied => {
                let alert_id = state.next_alert_id();
                let alert = AlertInstance::new(
                    alert_id.clone(),
                    rule.id.clone(),
                    rule.kind,
                    entity_id.to_string(),
                    rule.severity,
                    at,
                );
                let transition = Transition::of(&alert, None, at).with_actions(rule.activation_actions());
                log_transition(&transition);
                transitions.push(transition);

                state.alerts.insert(alert_id.clone(), alert);
                if let Some(track) = track_mut(state, entity_id, &rule.id) {
                    track.open_alert = Some(alert_id);
                }
            }
            // Still holding after an operator resolution: stay quiet
            (true, None) => {}
            (true, Some(alert_id)) => {
                let Some(after) = self.config.escalation_after_secs else {
                    return;
                };
                let Some(alert) = state.alerts.get_mut(&alert_id) else {
                    return;
                };
                let elapsed = (at - alert.escalation_anchor()).num_seconds().max(0) as u64;
                if alert.escalation_level >= self.config.max_escalation_level || elapsed < after {
                    return;
                }
                if let Ok(from) = alert.escalate(at) {
                    let transition =
                        Transition::of(alert, Some(from), at).with_actions(rule.escalation_actions());
                    log_transition(&transition);
                    transitions.push(transition);
                }
            }
            (false, Some(alert_id)) if self.config.auto_resolve => {
                if let Some(alert) = state.alerts.get_mut(&alert_id) {
                    if let Ok(from) = alert.auto_resolve(at) {
                        let transition = Transition::of(alert, Some(from), at);
                        log_transition(&transition);
                        transitions.push(transition);
                    }
                }
                if let Some(track) = track_mut(state, entity_id, &rule.id) {
                    track.open_alert = None;
                }
            }
            (false, _) => {}
        }
    }
}

fn track_mut<'a>(state: &'a mut EngineState, entity_id: &str, rule_id: &str) -> Option<&'a mut RuleTrack> {
    state.tracks.get_mut(entity_id)?.get_mut(rule_id)
}

/// Drop tracks of rules that are no longer present or enabled. Tracks of
/// enabled rules that failed to compile are kept. Open alerts are left for
/// operator action and picked up again if the rule comes back.
fn prune_tracks(state: &mut EngineState, rules: &[AlertRule]) {
    let enabled: BTreeSet<&str> = rules.iter().filter(|r| r.enabled).map(|r| r.id.as_str()).collect();

    for tracks in state.tracks.values_mut() {
        tracks.retain(|rule_id, _| enabled.contains(rule_id.as_str()));
    }
    state.tracks.retain(|_, tracks| !tracks.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSeverity, AlertState};
    use crate::rules::AlertCondition;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 21, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn hr(value: f64, at: i64) -> Observation {
        Observation {
            entity_id: "p-1".into(),
            parameter: "heart_rate".into(),
            value,
            timestamp: t(at),
        }
    }

    fn tachycardia(duration_secs: u64) -> AlertRule {
        AlertRule {
            id: "tachy".into(),
            name: "Sustained tachycardia".into(),
            description: String::new(),
            enabled: true,
            conditions: vec![AlertCondition {
                parameter: "heart_rate".into(),
                operator: "gt".into(),
                threshold: 120.0,
                duration_secs,
            }],
            actions: vec![],
            priority: 0,
            severity: AlertSeverity::Warning,
            kind: None,
        }
    }

    fn held(state: &EngineState) -> Vec<Option<u64>> {
        state.tracks["p-1"]["tachy"].conditions.iter().map(|c| c.held_secs).collect()
    }

    #[test]
    fn test_accumulator_counts_from_first_holding_tick() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let rules = vec![tachycardia(120)];

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        assert_eq!(held(&state), vec![Some(0)]);

        engine.tick(&mut state, t(60), &[hr(130.0, 60)], &rules);
        assert_eq!(held(&state), vec![Some(60)]);

        engine.tick(&mut state, t(90), &[hr(100.0, 90)], &rules);
        assert_eq!(held(&state), vec![None]);
    }

    #[test]
    fn test_backwards_tick_adds_nothing() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let rules = vec![tachycardia(300)];

        engine.tick(&mut state, t(100), &[hr(130.0, 100)], &rules);
        engine.tick(&mut state, t(40), &[hr(130.0, 40)], &rules);
        assert_eq!(held(&state), vec![Some(0)]);
        assert_eq!(state.last_tick, Some(t(40)));
    }

    #[test]
    fn test_missing_parameter_leaves_rule_undecided() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let rules = vec![tachycardia(0)];
        let spo2 = |at| Observation {
            parameter: "spo2".into(),
            ..hr(97.0, at)
        };

        let report = engine.tick(&mut state, t(0), &[spo2(0)], &rules);
        assert!(report.transitions.is_empty());
        assert!(!state.tracks["p-1"]["tachy"].was_satisfied);

        engine.tick(&mut state, t(60), &[hr(130.0, 60)], &rules);
        let report = engine.tick(&mut state, t(120), &[spo2(120)], &rules);
        assert!(report.transitions.is_empty());
        assert!(state.tracks["p-1"]["tachy"].was_satisfied);
        assert_eq!(held(&state), vec![Some(0)]);
        assert_eq!(state.open_alerts().count(), 1);
    }

    #[test]
    fn test_held_time_spans_ticks_without_the_parameter() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let rules = vec![tachycardia(300)];
        let spo2 = |at| Observation {
            parameter: "spo2".into(),
            ..hr(97.0, at)
        };

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        engine.tick(&mut state, t(60), &[spo2(60)], &rules);
        engine.tick(&mut state, t(120), &[spo2(120)], &rules);
        assert_eq!(held(&state), vec![Some(0)]);

        let report = engine.tick(&mut state, t(300), &[hr(131.0, 300)], &rules);
        assert_eq!(held(&state), vec![Some(300)]);
        assert_eq!(report.transitions.len(), 1);
    }

    #[test]
    fn test_changed_threshold_restarts_accumulator() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let mut rules = vec![tachycardia(300)];

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        engine.tick(&mut state, t(240), &[hr(130.0, 240)], &rules);
        assert_eq!(held(&state), vec![Some(240)]);

        rules[0].conditions[0].threshold = 125.0;
        let report = engine.tick(&mut state, t(300), &[hr(130.0, 300)], &rules);
        assert_eq!(held(&state), vec![Some(0)]);
        assert!(report.transitions.is_empty());

        rules[0].conditions[0].parameter = "pulse".into();
        let pulse = Observation {
            parameter: "pulse".into(),
            ..hr(130.0, 360)
        };
        engine.tick(&mut state, t(360), &[pulse], &rules);
        assert_eq!(held(&state), vec![Some(0)]);
        assert_eq!(state.tracks["p-1"]["tachy"].conditions[0].fingerprint, "pulse gt 125");
    }

    #[test]
    fn test_changed_duration_keeps_held_time() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let mut rules = vec![tachycardia(600)];

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        engine.tick(&mut state, t(240), &[hr(130.0, 240)], &rules);

        rules[0].conditions[0].duration_secs = 300;
        let report = engine.tick(&mut state, t(300), &[hr(130.0, 300)], &rules);
        assert_eq!(held(&state), vec![Some(300)]);
        assert_eq!(report.transitions.len(), 1);
    }

    #[test]
    fn test_alert_ids_are_sequential() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let rules = vec![tachycardia(0)];

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        engine.tick(&mut state, t(10), &[hr(90.0, 10)], &rules);
        engine.tick(&mut state, t(20), &[hr(130.0, 20)], &rules);

        let ids: Vec<&str> = state.alerts.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["alert-000001", "alert-000002"]);
        assert_eq!(state.alerts["alert-000001"].state, AlertState::Resolved);
        assert_eq!(state.open_alerts().count(), 1);
    }

    #[test]
    fn test_disabled_rule_drops_tracks_but_keeps_alert() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let mut rules = vec![tachycardia(0)];

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        rules[0].enabled = false;
        engine.tick(&mut state, t(10), &[hr(130.0, 10)], &rules);

        assert!(state.tracks.is_empty());
        assert_eq!(state.open_alerts().count(), 1);
    }

    #[test]
    fn test_reenabled_rule_resumes_open_alert() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        let mut rules = vec![tachycardia(0)];

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        rules[0].enabled = false;
        engine.tick(&mut state, t(10), &[hr(130.0, 10)], &rules);
        rules[0].enabled = true;
        let report = engine.tick(&mut state, t(20), &[hr(130.0, 20)], &rules);

        assert!(report.transitions.is_empty());
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(
            state.tracks["p-1"]["tachy"].open_alert.as_deref(),
            Some("alert-000001")
        );

        let report = engine.tick(&mut state, t(30), &[hr(90.0, 30)], &rules);
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].alert_id, "alert-000001");
        assert_eq!(state.open_alerts().count(), 0);
    }

    #[test]
    fn test_escalation_delay_near_u64_max_never_fires() {
        let engine = RuleEngine::new(EngineConfig {
            escalation_after_secs: Some(u64::MAX),
            ..EngineConfig::default()
        });
        let mut state = EngineState::new();
        let rules = vec![tachycardia(0)];

        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &rules);
        let later = 10 * 365 * 24 * 3600;
        let report = engine.tick(&mut state, t(later), &[hr(130.0, later)], &rules);

        assert!(report.transitions.is_empty());
        assert_eq!(state.alerts["alert-000001"].escalation_level, 0);
    }

    #[test]
    fn test_unknown_alert_is_not_found() {
        let mut state = EngineState::new();
        assert_eq!(
            state.acknowledge("alert-000042", None, t(0)),
            Err(InvalidStateError::NotFound { alert_id: "alert-000042".into() })
        );
        assert_eq!(state, EngineState::new());
    }

    #[test]
    fn test_state_survives_json() {
        let engine = RuleEngine::default();
        let mut state = EngineState::new();
        engine.tick(&mut state, t(0), &[hr(130.0, 0)], &[tachycardia(0)]);

        let json = serde_json::to_string(&state).unwrap();
        let restored: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
