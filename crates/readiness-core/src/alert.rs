//! Alert Instances
//!
//! An [`AlertInstance`] is created the first time a rule's conditions hold
//! together for the required duration. After that it only changes through
//! acknowledge, escalate and resolve transitions. Resolution is a state,
//! never a removal.
//!
//! | from                            | event               | to           |
//! |---------------------------------|---------------------|--------------|
//! | (none)                          | conditions hold     | active       |
//! | active, escalated, acknowledged | acknowledge         | acknowledged |
//! | active, acknowledged, escalated | escalation due      | escalated    |
//! | active, acknowledged, escalated | resolve / auto-clear| resolved     |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidStateError;
use crate::risk::RiskLevel;
use crate::rules::{AlertAction, AlertKind};

/// Alert severity, ordered `Info < Warning < Critical < Emergency`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational - no action required
    Info,
    /// Attention recommended
    #[default]
    Warning,
    /// Action required
    Critical,
    /// Immediate action required
    Emergency,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Emergency => "emergency",
        }
    }

    /// One band higher, saturating at `Emergency`
    pub fn escalated(&self) -> AlertSeverity {
        match self {
            AlertSeverity::Info => AlertSeverity::Warning,
            AlertSeverity::Warning => AlertSeverity::Critical,
            AlertSeverity::Critical | AlertSeverity::Emergency => AlertSeverity::Emergency,
        }
    }

    /// Severity matching a risk level
    pub fn from_risk(risk: RiskLevel) -> AlertSeverity {
        match risk {
            RiskLevel::Low => AlertSeverity::Info,
            RiskLevel::Medium => AlertSeverity::Warning,
            RiskLevel::High => AlertSeverity::Critical,
            RiskLevel::Critical => AlertSeverity::Emergency,
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, AlertSeverity::Critical | AlertSeverity::Emergency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Active,
    Acknowledged,
    Escalated,
    Resolved,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Active => "active",
            AlertState::Acknowledged => "acknowledged",
            AlertState::Escalated => "escalated",
            AlertState::Resolved => "resolved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertState::Resolved)
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an alert came to be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Resolution {
    /// Conditions cleared on their own
    Auto,
    /// An operator closed the alert
    Operator { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: String,
    pub rule_id: String,
    pub kind: Option<AlertKind>,
    pub entity_id: String,
    pub severity: AlertSeverity,
    pub state: AlertState,
    /// Number of escalations; never decreases
    pub escalation_level: u32,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledgment_note: Option<String>,
    /// Time of the most recent escalation
    pub escalated_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
}

impl AlertInstance {
    pub fn new(
        id: String,
        rule_id: String,
        kind: Option<AlertKind>,
        entity_id: String,
        severity: AlertSeverity,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            rule_id,
            kind,
            entity_id,
            severity,
            state: AlertState::Active,
            escalation_level: 0,
            created_at: at,
            acknowledged_at: None,
            acknowledgment_note: None,
            escalated_at: None,
            resolved_at: None,
            resolution: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.state.is_terminal()
    }

    fn require_open(&self) -> Result<(), InvalidStateError> {
        if self.state.is_terminal() {
            Err(InvalidStateError::Terminal {
                alert_id: self.id.clone(),
                state: self.state,
            })
        } else {
            Ok(())
        }
    }

    /// Start of the current escalation window
    pub fn escalation_anchor(&self) -> DateTime<Utc> {
        self.escalated_at.unwrap_or(self.created_at)
    }

    /// Operator acknowledgment. Does not touch the escalation level.
    pub fn acknowledge(&mut self, note: Option<String>, at: DateTime<Utc>) -> Result<AlertState, InvalidStateError> {
        self.require_open()?;
        let from = self.state;
        self.state = AlertState::Acknowledged;
        self.acknowledged_at = Some(at);
        self.acknowledgment_note = note;
        Ok(from)
    }

    /// Operator resolution with a reason
    pub fn resolve(&mut self, reason: String, at: DateTime<Utc>) -> Result<AlertState, InvalidStateError> {
        self.require_open()?;
        let from = self.state;
        self.state = AlertState::Resolved;
        self.resolved_at = Some(at);
        self.resolution = Some(Resolution::Operator { reason });
        Ok(from)
    }

    /// Conditions cleared
    pub fn auto_resolve(&mut self, at: DateTime<Utc>) -> Result<AlertState, InvalidStateError> {
        self.require_open()?;
        let from = self.state;
        self.state = AlertState::Resolved;
        self.resolved_at = Some(at);
        self.resolution = Some(Resolution::Auto);
        Ok(from)
    }

    /// Raise the escalation level and step severity up one band
    pub fn escalate(&mut self, at: DateTime<Utc>) -> Result<AlertState, InvalidStateError> {
        self.require_open()?;
        let from = self.state;
        self.state = AlertState::Escalated;
        self.escalation_level += 1;
        self.severity = self.severity.escalated();
        self.escalated_at = Some(at);
        Ok(from)
    }
}

/// A state change of one alert, reported to the presentation/storage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub alert_id: String,
    pub rule_id: String,
    pub entity_id: String,
    /// `None` when the alert was just created
    pub from: Option<AlertState>,
    pub to: AlertState,
    pub severity: AlertSeverity,
    pub escalation_level: u32,
    pub at: DateTime<Utc>,
    /// Actions for the dispatch collaborator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<AlertAction>,
}

impl Transition {
    pub fn of(alert: &AlertInstance, from: Option<AlertState>, at: DateTime<Utc>) -> Self {
        Self {
            alert_id: alert.id.clone(),
            rule_id: alert.rule_id.clone(),
            entity_id: alert.entity_id.clone(),
            from,
            to: alert.state,
            severity: alert.severity,
            escalation_level: alert.escalation_level,
            at,
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<AlertAction>) -> Self {
        self.actions = actions;
        self
    }
}
