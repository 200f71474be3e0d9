//! Error types for scoring, rule compilation, alert transitions and configuration

use thiserror::Error;

use crate::alert::AlertState;

/// A sample that cannot be scored without producing NaN or infinity.
///
/// Callers substitute a default or drop the sample; the models never
/// return a non-finite score in place of this error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    /// A denominator field was zero
    #[error("{field} must be non-zero")]
    ZeroDenominator { field: &'static str },
    /// A field that must be strictly positive was not
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    /// A field was NaN or infinite
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
}

impl DataQualityError {
    /// Name of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            DataQualityError::ZeroDenominator { field }
            | DataQualityError::NonPositive { field, .. }
            | DataQualityError::NonFinite { field } => field,
        }
    }
}

/// A rule definition that cannot be evaluated.
///
/// The rule is skipped for the tick in which this is raised; other rules
/// are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleConfigurationError {
    #[error("rule {rule_id} has no conditions")]
    EmptyConditions { rule_id: String },
    #[error("rule {rule_id} condition {index}: unknown operator {operator:?}")]
    UnknownOperator {
        rule_id: String,
        index: usize,
        operator: String,
    },
    #[error("rule {rule_id} condition {index}: threshold {threshold} is not finite")]
    NonFiniteThreshold {
        rule_id: String,
        index: usize,
        threshold: f64,
    },
}

impl RuleConfigurationError {
    pub fn rule_id(&self) -> &str {
        match self {
            RuleConfigurationError::EmptyConditions { rule_id }
            | RuleConfigurationError::UnknownOperator { rule_id, .. }
            | RuleConfigurationError::NonFiniteThreshold { rule_id, .. } => rule_id,
        }
    }
}

/// An operator action on an alert that does not exist or is already resolved.
/// No state is mutated when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStateError {
    #[error("alert {alert_id} not found")]
    NotFound { alert_id: String },
    #[error("alert {alert_id} is {state} and cannot be changed")]
    Terminal { alert_id: String, state: AlertState },
}

/// Failure to load or validate an [`EngineConfig`](crate::config::EngineConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
