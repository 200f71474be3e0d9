//! Alert Rule Definitions
//!
//! Rules are configuration owned and versioned outside the engine. They
//! arrive as loosely typed [`AlertRule`] values (operators as text, as they
//! are authored) and are compiled into [`CompiledRule`]s once per tick.
//! A rule that fails to compile is skipped for that tick and reported.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alert::AlertSeverity;
use crate::condition::{Operator, UnknownOperator};
use crate::error::RuleConfigurationError;

/// A threshold condition as authored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    /// Observation parameter this condition reads (e.g. `heart_rate`)
    pub parameter: String,
    /// One of `gt, lt, gte, lte, eq, neq`
    pub operator: String,
    #[serde(alias = "value")]
    pub threshold: f64,
    /// Seconds the comparison must hold continuously (0 = immediately)
    #[serde(default, alias = "duration")]
    pub duration_secs: u64,
}

/// What a dispatch collaborator should do when a rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Notify,
    Escalate,
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Category of the condition a rule watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HeatStress,
    Fatigue,
    VitalAbnormal,
    Device,
    Environmental,
}

fn default_enabled() -> bool {
    true
}

/// An alert rule: all conditions must hold together (AND)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub conditions: Vec<AlertCondition>,
    #[serde(default)]
    pub actions: Vec<AlertAction>,
    /// Higher priorities are evaluated first
    #[serde(default)]
    pub priority: u32,
    /// Severity of instances this rule creates
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default)]
    pub kind: Option<AlertKind>,
}

/// A condition with its operator resolved
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    pub parameter: String,
    pub operator: Operator,
    pub threshold: f64,
    pub required_secs: u64,
}

impl CompiledCondition {
    /// Identity of the comparison, e.g. `heart_rate gt 120`.
    ///
    /// Held time is only meaningful against the same comparison; the
    /// required duration is not part of it.
    pub fn fingerprint(&self) -> String {
        format!("{} {} {}", self.parameter, self.operator, self.threshold)
    }
}

/// A rule that passed validation and is ready to evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub id: String,
    pub priority: u32,
    pub severity: AlertSeverity,
    pub kind: Option<AlertKind>,
    pub conditions: Vec<CompiledCondition>,
    pub actions: Vec<AlertAction>,
}

impl CompiledRule {
    /// Actions to hand over when an instance of this rule activates
    pub fn activation_actions(&self) -> Vec<AlertAction> {
        self.actions
            .iter()
            .filter(|a| a.kind != ActionKind::Escalate)
            .cloned()
            .collect()
    }

    /// Actions to hand over when an instance of this rule escalates
    pub fn escalation_actions(&self) -> Vec<AlertAction> {
        self.actions
            .iter()
            .filter(|a| a.kind == ActionKind::Escalate)
            .cloned()
            .collect()
    }
}

impl TryFrom<&AlertRule> for CompiledRule {
    type Error = RuleConfigurationError;

    fn try_from(rule: &AlertRule) -> Result<Self, Self::Error> {
        if rule.conditions.is_empty() {
            return Err(RuleConfigurationError::EmptyConditions {
                rule_id: rule.id.clone(),
            });
        }

        let conditions = rule
            .conditions
            .iter()
            .enumerate()
            .map(|(index, c)| {
                let operator = c.operator.parse::<Operator>().map_err(|UnknownOperator(op)| {
                    RuleConfigurationError::UnknownOperator {
                        rule_id: rule.id.clone(),
                        index,
                        operator: op,
                    }
                })?;

                if !c.threshold.is_finite() {
                    return Err(RuleConfigurationError::NonFiniteThreshold {
                        rule_id: rule.id.clone(),
                        index,
                        threshold: c.threshold,
                    });
                }

                Ok(CompiledCondition {
                    parameter: c.parameter.clone(),
                    operator,
                    threshold: c.threshold,
                    required_secs: c.duration_secs,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledRule {
            id: rule.id.clone(),
            priority: rule.priority,
            severity: rule.severity,
            kind: rule.kind,
            conditions,
            actions: rule.actions.clone(),
        })
    }
}

/// Compile the enabled rules of a rule set.
///
/// Returns the valid rules ordered by descending priority (then id) and
/// the errors of the rules that were skipped.
pub fn compile_rules(rules: &[AlertRule]) -> (Vec<CompiledRule>, Vec<RuleConfigurationError>) {
    let mut compiled = Vec::new();
    let mut errors = Vec::new();

    for rule in rules.iter().filter(|r| r.enabled) {
        match CompiledRule::try_from(rule) {
            Ok(c) => compiled.push(c),
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "skipping malformed alert rule");
                errors.push(e);
            }
        }
    }

    compiled.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    (compiled, errors)
}
