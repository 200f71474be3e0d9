//! Numeric Models
//!
//! Stateless formulas that turn raw samples into scalar scores. Every
//! function here is pure and deterministic, so scoring can be fanned out
//! across entities without coordination.
//!
//! # Input ranges
//!
//! Inputs are not clamped. Out-of-range readings produce whatever the
//! formula yields; flagging them is the risk classifier's concern. The only
//! failures are invalid denominators, reported as [`DataQualityError`] so
//! that no score is ever NaN or infinite.
//!
//! # Calibration constants
//!
//! The WBGT blend weights each sum to 1.0. The heat-risk bands in
//! [`crate::risk`] (26/29/32 °C) are calibrated against exactly this blend.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DataQualityError;
use crate::risk::RiskLevel;
use crate::samples::{SleepSample, VitalSample};

/// Below this dry-bulb temperature (°C) heat index equals air temperature
pub const HEAT_INDEX_MIN_TEMP_C: f64 = 27.0;

/// Nightly sleep target (minutes)
pub const SLEEP_TARGET_MINUTES: f64 = 480.0;

/// Target share of deep and REM sleep (%)
pub const SLEEP_STAGE_TARGET_PCT: f64 = 20.0;

/// Recovery baselines
pub const BASELINE_HRV_MS: f64 = 60.0;
pub const BASELINE_RESTING_HR: f64 = 60.0;

const WBGT_INDOOR_WET: f64 = 0.7;
const WBGT_INDOOR_GLOBE: f64 = 0.3;
const WBGT_OUTDOOR_WET: f64 = 0.7;
const WBGT_OUTDOOR_GLOBE: f64 = 0.2;
const WBGT_OUTDOOR_DRY: f64 = 0.1;

fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

fn round_to_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn require_finite(field: &'static str, value: f64) -> Result<f64, DataQualityError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DataQualityError::NonFinite { field })
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<f64, DataQualityError> {
    let value = require_finite(field, value)?;
    if value == 0.0 {
        Err(DataQualityError::ZeroDenominator { field })
    } else if value < 0.0 {
        Err(DataQualityError::NonPositive { field, value })
    } else {
        Ok(value)
    }
}

/// Heat index (°C) from air temperature (°C) and relative humidity (%).
///
/// Follows the NWS procedure: the simple Steadman estimate first, and the
/// Rothfusz regression with its low-humidity and high-humidity adjustments
/// once that estimate reaches 80 °F. Rounded to 0.1 °C.
pub fn heat_index(temp_c: f64, humidity_pct: f64) -> f64 {
    if temp_c < HEAT_INDEX_MIN_TEMP_C {
        return temp_c;
    }

    let t = celsius_to_fahrenheit(temp_c);
    let rh = humidity_pct;

    let mut hi = 0.5 * (t + 61.0 + ((t - 68.0) * 1.2) + (rh * 0.094));

    if hi >= 80.0 {
        hi = -42.379 + 2.04901523 * t + 10.14333127 * rh
            - 0.22475541 * t * rh
            - 0.00683783 * t * t
            - 0.05481717 * rh * rh
            + 0.00122874 * t * t * rh
            + 0.00085282 * t * rh * rh
            - 0.00000199 * t * t * rh * rh;

        if rh < 13.0 && (80.0..=112.0).contains(&t) {
            hi -= ((13.0 - rh) / 4.0) * ((17.0 - (t - 95.0).abs()) / 17.0).sqrt();
        } else if rh > 85.0 && (80.0..=87.0).contains(&t) {
            hi += ((rh - 85.0) / 10.0) * ((87.0 - t) / 5.0);
        }
    }

    round_to_tenth(fahrenheit_to_celsius(hi))
}

/// Wet-bulb globe temperature (°C)
///
/// Indoors (no solar load): `0.7·wet + 0.3·globe`.
/// Outdoors: `0.7·wet + 0.2·globe + 0.1·dry`.
pub fn wbgt(dry_bulb: f64, wet_bulb: f64, globe: f64, indoors: bool) -> f64 {
    if indoors {
        WBGT_INDOOR_WET * wet_bulb + WBGT_INDOOR_GLOBE * globe
    } else {
        WBGT_OUTDOOR_WET * wet_bulb + WBGT_OUTDOOR_GLOBE * globe + WBGT_OUTDOOR_DRY * dry_bulb
    }
}

/// Sleep score (0-100)
///
/// | component          | target            | max |
/// |--------------------|-------------------|-----|
/// | duration           | 480 min           | 30  |
/// | deep sleep share   | 20 % of total     | 25  |
/// | REM share          | 20 % of total     | 20  |
/// | fragmentation      | 25 − 2/interrupt  | 25  |
///
/// Stage minutes that exceed the total are tolerated; the per-component
/// caps keep the score bounded.
pub fn sleep_score(sample: &SleepSample) -> Result<f64, DataQualityError> {
    if sample.total_minutes == 0 {
        return Err(DataQualityError::ZeroDenominator {
            field: "total_minutes",
        });
    }

    if !sample.stages_consistent() {
        debug!(
            date = %sample.date,
            total = sample.total_minutes,
            staged = sample.staged_minutes(),
            "sleep stages exceed total"
        );
    }

    let total = sample.total_minutes as f64;
    let duration_score = (total / SLEEP_TARGET_MINUTES * 30.0).min(30.0);

    let deep_pct = sample.deep_minutes as f64 / total * 100.0;
    let deep_score = (deep_pct / SLEEP_STAGE_TARGET_PCT * 25.0).min(25.0);

    let rem_pct = sample.rem_minutes as f64 / total * 100.0;
    let rem_score = (rem_pct / SLEEP_STAGE_TARGET_PCT * 20.0).min(20.0);

    let fragmentation_penalty = (sample.fragmentations as f64 * 2.0).min(25.0);
    let fragmentation_score = 25.0 - fragmentation_penalty;

    Ok((duration_score + deep_score + rem_score + fragmentation_score).round())
}

/// Recovery score
///
/// HRV against a 60 ms baseline (max 30), inverse resting heart rate
/// against 60 bpm (max 25), 25 % of the sleep score and 20 % of hydration.
/// The result is not clamped; callers clamp for display.
pub fn recovery_score(
    hrv: f64,
    resting_hr: f64,
    sleep_score: f64,
    hydration: f64,
) -> Result<f64, DataQualityError> {
    let hrv = require_finite("hrv", hrv)?;
    let resting_hr = require_positive("resting_hr", resting_hr)?;
    let sleep_score = require_finite("sleep_score", sleep_score)?;
    let hydration = require_finite("hydration_level", hydration)?;

    let hrv_score = (hrv / BASELINE_HRV_MS * 30.0).min(30.0);
    let hr_score = (BASELINE_RESTING_HR / resting_hr * 25.0).min(25.0);
    let sleep_component = sleep_score / 100.0 * 25.0;
    let hydration_component = hydration / 100.0 * 20.0;

    Ok((hrv_score + hr_score + sleep_component + hydration_component).round())
}

/// Training guidance for a recovery score
pub fn recovery_recommendation(recovery_score: f64) -> &'static str {
    if recovery_score >= 85.0 {
        "Excellent recovery. Ready for high-intensity training."
    } else if recovery_score >= 70.0 {
        "Good recovery. Suitable for moderate to high intensity."
    } else if recovery_score >= 55.0 {
        "Fair recovery. Consider light to moderate activity."
    } else if recovery_score >= 40.0 {
        "Poor recovery. Rest or very light activity recommended."
    } else {
        "Critical recovery deficit. Rest required. Consult medical staff."
    }
}

/// Fatigue score on a 0-5 scale, one decimal place
///
/// # Arguments
/// * `resting_hr` - Resting heart rate (bpm)
/// * `max_hr` - Maximum heart rate (bpm), must be positive
/// * `sleep_quality` - Sleep score (0-100)
/// * `activity_load` - Recent activity load
pub fn fatigue_score(
    resting_hr: f64,
    max_hr: f64,
    sleep_quality: f64,
    activity_load: f64,
) -> Result<f64, DataQualityError> {
    let max_hr = require_positive("max_hr", max_hr)?;
    let resting_hr = require_finite("resting_hr", resting_hr)?;
    let sleep_quality = require_finite("sleep_quality", sleep_quality)?;
    let activity_load = require_finite("activity_load", activity_load)?;

    let hr_stress = ((resting_hr / max_hr) * 100.0 - 50.0) / 10.0;
    let sleep_factor = (100.0 - sleep_quality) / 20.0;
    let load_factor = activity_load / 20.0;

    let score = hr_stress + sleep_factor + load_factor;
    Ok(round_to_tenth(score).clamp(0.0, 5.0))
}

/// Readiness index (0-100)
///
/// Four independently capped components: HRV (max 30), sleep (max 30),
/// training load (25, minus 5 per unit of load) and heat exposure (15,
/// minus 3 per unit of exposure).
pub fn readiness_index(hrv: f64, sleep_score: f64, training_load: f64, heat_exposure: f64) -> f64 {
    let hrv_component = (hrv / 100.0 * 30.0).clamp(0.0, 30.0);
    let sleep_component = (sleep_score / 100.0 * 30.0).clamp(0.0, 30.0);
    let training_component = (25.0 - training_load * 5.0).clamp(0.0, 25.0);
    let heat_component = (15.0 - heat_exposure * 3.0).clamp(0.0, 15.0);

    (hrv_component + sleep_component + training_component + heat_component)
        .clamp(0.0, 100.0)
        .round()
}

/// Age-predicted maximum heart rate (Tanaka: 208 − 0.7·age)
pub fn max_heart_rate(age: u32) -> f64 {
    (208.0 - 0.7 * age as f64).round().max(0.0)
}

/// Current heart rate as a percentage of maximum
pub fn heart_rate_percent_of_max(current_hr: f64, max_hr: f64) -> Result<f64, DataQualityError> {
    let max_hr = require_positive("max_hr", max_hr)?;
    Ok(current_hr / max_hr * 100.0)
}

/// An out-of-range physiological band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalIssue {
    ElevatedHeartRate,
    LowHeartRate,
    LowOxygenSaturation,
    ElevatedRespiratoryRate,
    LowRespiratoryRate,
    ElevatedSkinTemperature,
}

impl VitalIssue {
    pub fn description(&self) -> &'static str {
        match self {
            VitalIssue::ElevatedHeartRate => "Elevated heart rate",
            VitalIssue::LowHeartRate => "Low heart rate",
            VitalIssue::LowOxygenSaturation => "Low oxygen saturation",
            VitalIssue::ElevatedRespiratoryRate => "Elevated respiratory rate",
            VitalIssue::LowRespiratoryRate => "Low respiratory rate",
            VitalIssue::ElevatedSkinTemperature => "Elevated skin temperature",
        }
    }
}

/// One band's finding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalFinding {
    pub issue: VitalIssue,
    pub risk: RiskLevel,
}

/// Combined vital-sign status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalStatus {
    /// Highest risk across all bands
    pub status: RiskLevel,
    /// Every out-of-range band, in band order
    pub findings: Vec<VitalFinding>,
    pub message: String,
}

fn heart_rate_band(hr: f64) -> Option<VitalFinding> {
    if hr > 100.0 {
        let risk = if hr > 120.0 { RiskLevel::High } else { RiskLevel::Medium };
        Some(VitalFinding { issue: VitalIssue::ElevatedHeartRate, risk })
    } else if hr < 50.0 {
        Some(VitalFinding { issue: VitalIssue::LowHeartRate, risk: RiskLevel::Medium })
    } else {
        None
    }
}

fn spo2_band(spo2: f64) -> Option<VitalFinding> {
    if spo2 < 95.0 {
        let risk = if spo2 < 90.0 { RiskLevel::Critical } else { RiskLevel::High };
        Some(VitalFinding { issue: VitalIssue::LowOxygenSaturation, risk })
    } else {
        None
    }
}

fn respiratory_band(rr: f64) -> Option<VitalFinding> {
    if rr > 20.0 {
        Some(VitalFinding { issue: VitalIssue::ElevatedRespiratoryRate, risk: RiskLevel::Medium })
    } else if rr < 12.0 {
        Some(VitalFinding { issue: VitalIssue::LowRespiratoryRate, risk: RiskLevel::Medium })
    } else {
        None
    }
}

fn skin_temp_band(temp: f64) -> Option<VitalFinding> {
    if temp > 38.0 {
        let risk = if temp > 39.0 { RiskLevel::High } else { RiskLevel::Medium };
        Some(VitalFinding { issue: VitalIssue::ElevatedSkinTemperature, risk })
    } else {
        None
    }
}

/// Classify a vital-sign sample.
///
/// All four bands are always evaluated so the message lists every
/// out-of-range reading; the status is the maximum risk among them.
pub fn vital_status(sample: &VitalSample) -> VitalStatus {
    let findings: Vec<VitalFinding> = [
        heart_rate_band(sample.heart_rate),
        spo2_band(sample.spo2),
        respiratory_band(sample.respiratory_rate),
        skin_temp_band(sample.skin_temp),
    ]
    .into_iter()
    .flatten()
    .collect();

    if findings.is_empty() {
        return VitalStatus {
            status: RiskLevel::Low,
            findings,
            message: "All vitals normal".to_string(),
        };
    }

    let status = RiskLevel::max_of(findings.iter().map(|f| f.risk));
    let message = findings
        .iter()
        .map(|f| f.issue.description())
        .collect::<Vec<_>>()
        .join(", ");

    VitalStatus { status, findings, message }
}
