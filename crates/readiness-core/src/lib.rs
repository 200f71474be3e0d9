//! Readiness Core - Health & Environmental Risk Scoring
//!
//! Pure computation layer that turns physiological and environmental
//! telemetry into risk scores, readiness indices and alert transitions.
//! Ingestion, storage and presentation are left to callers.
//!
//! # Features
//!
//! - Numeric models: heat index, WBGT, sleep, recovery, fatigue, readiness
//! - Heat and fatigue risk classification, vital-sign banding
//! - Threshold/duration alert rules with an acknowledge/escalate/resolve lifecycle
//! - Person to unit readiness aggregation
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use readiness_core::{AlertRule, EngineState, Observation, RuleEngine};
//!
//! let rules: Vec<AlertRule> = serde_json::from_str(r#"[{
//!     "id": "spo2-low",
//!     "name": "Low oxygen saturation",
//!     "conditions": [{"parameter": "spo2", "operator": "lt", "value": 90}],
//!     "severity": "critical"
//! }]"#).unwrap();
//!
//! let at = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
//! let batch = vec![Observation {
//!     entity_id: "p-1".into(),
//!     parameter: "spo2".into(),
//!     value: 87.0,
//!     timestamp: at,
//! }];
//!
//! let engine = RuleEngine::default();
//! let mut state = EngineState::new();
//! let report = engine.tick(&mut state, at, &batch, &rules);
//!
//! assert_eq!(report.transitions.len(), 1);
//! assert_eq!(state.open_alerts().count(), 1);
//! ```

pub mod samples;
pub mod models;
pub mod risk;
pub mod condition;
pub mod rules;
pub mod alert;
pub mod scoring;
pub mod engine;
pub mod aggregate;
pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use aggregate::{summarize_units, unit_readiness, PersonHealth, UnitSummary};
pub use alert::{AlertInstance, AlertSeverity, AlertState, Resolution, Transition};
pub use condition::Operator;
pub use config::EngineConfig;
pub use engine::{DataQualityIssue, EngineState, RuleEngine, TickReport};
pub use error::{ConfigError, DataQualityError, InvalidStateError, RuleConfigurationError};
pub use models::VitalStatus;
pub use risk::RiskLevel;
pub use rules::{ActionKind, AlertAction, AlertCondition, AlertKind, AlertRule};
pub use samples::{EnvironmentSample, Location, RecoverySample, SleepSample, VitalSample};
pub use scoring::{EntityScores, Observation};
