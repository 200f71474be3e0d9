//! Risk Classification
//!
//! Maps scalar scores and environmental/physiological combinations onto
//! the ordinal [`RiskLevel`] scale.

use serde::{Deserialize, Serialize};

/// Ordinal risk level, totally ordered `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Position on the scale (0 = low, 3 = critical), used when a risk
    /// level is fed back into rule evaluation as a numeric parameter
    pub fn ordinal(&self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }

    /// Highest level in `levels`, or `Low` when empty
    pub fn max_of<I: IntoIterator<Item = RiskLevel>>(levels: I) -> RiskLevel {
        levels.into_iter().max().unwrap_or_default()
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environmental heat severity (0-3).
///
/// Either index crossing a band is enough: WBGT 26/29/32 °C or heat
/// index 32/35/40 °C.
pub fn environmental_severity(wbgt: f64, heat_index: f64) -> u8 {
    if wbgt >= 32.0 || heat_index >= 40.0 {
        3
    } else if wbgt >= 29.0 || heat_index >= 35.0 {
        2
    } else if wbgt >= 26.0 || heat_index >= 32.0 {
        1
    } else {
        0
    }
}

/// Physiological strain (0-2).
///
/// Both heart rate and activity must be elevated together; a high heart
/// rate at rest contributes nothing.
pub fn physiological_strain(hr_percent_of_max: f64, activity_level: f64) -> u8 {
    if hr_percent_of_max > 85.0 && activity_level > 0.7 {
        2
    } else if hr_percent_of_max > 75.0 && activity_level > 0.5 {
        1
    } else {
        0
    }
}

/// Heat illness risk from environment plus physiological strain
///
/// # Arguments
/// * `wbgt` - Wet-bulb globe temperature (°C)
/// * `heat_index` - Heat index (°C)
/// * `hr_percent_of_max` - Current heart rate as a percentage of max
/// * `activity_level` - Normalized activity (0-1)
pub fn heat_risk(wbgt: f64, heat_index: f64, hr_percent_of_max: f64, activity_level: f64) -> RiskLevel {
    let score = environmental_severity(wbgt, heat_index)
        + physiological_strain(hr_percent_of_max, activity_level);

    match score {
        s if s >= 4 => RiskLevel::Critical,
        3 => RiskLevel::High,
        2 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Band a 0-5 fatigue score: ≥4 critical, ≥3 high, ≥2 medium
pub fn fatigue_risk(fatigue_score: f64) -> RiskLevel {
    if fatigue_score >= 4.0 {
        RiskLevel::Critical
    } else if fatigue_score >= 3.0 {
        RiskLevel::High
    } else if fatigue_score >= 2.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
