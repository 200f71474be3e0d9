//! Engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default time an unresolved alert may persist before escalating (15 min)
pub const DEFAULT_ESCALATION_AFTER_SECS: u64 = 900;

/// Default number of escalation steps
pub const DEFAULT_MAX_ESCALATION_LEVEL: u32 = 3;

fn default_escalation_after() -> Option<u64> {
    Some(DEFAULT_ESCALATION_AFTER_SECS)
}

fn default_max_escalation_level() -> u32 {
    DEFAULT_MAX_ESCALATION_LEVEL
}

fn default_auto_resolve() -> bool {
    true
}

/// Tunables of the rule engine and scoring pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds an alert's conditions must keep holding after creation (or
    /// the previous escalation) before it escalates. `None` disables
    /// escalation.
    #[serde(default = "default_escalation_after")]
    pub escalation_after_secs: Option<u64>,
    /// Upper bound on `escalation_level`
    #[serde(default = "default_max_escalation_level")]
    pub max_escalation_level: u32,
    /// Resolve open alerts when their conditions stop holding
    #[serde(default = "default_auto_resolve")]
    pub auto_resolve: bool,
    /// WBGT blend to use when deriving WBGT from raw temperatures
    #[serde(default)]
    pub indoors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escalation_after_secs: default_escalation_after(),
            max_escalation_level: DEFAULT_MAX_ESCALATION_LEVEL,
            auto_resolve: true,
            indoors: false,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escalation_after_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "escalation_after_secs must be positive; use null to disable escalation".to_string(),
            ));
        }
        Ok(())
    }
}
