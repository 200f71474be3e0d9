//! Telemetry Samples
//!
//! Time-stamped physiological and environmental readings as delivered by
//! the sensor collaborator. Samples are consumed read-only; nothing in this
//! crate mutates a sample after it is constructed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models;

/// A single wearable vital-sign reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    /// Heart rate (bpm)
    pub heart_rate: f64,
    /// Respiratory rate (breaths/min)
    pub respiratory_rate: f64,
    /// Peripheral oxygen saturation (0-100 %)
    pub spo2: f64,
    /// Skin temperature (°C)
    pub skin_temp: f64,
    pub timestamp: DateTime<Utc>,
}

/// One night of sleep staging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSample {
    pub total_minutes: u32,
    pub deep_minutes: u32,
    pub light_minutes: u32,
    pub rem_minutes: u32,
    #[serde(default)]
    pub awake_minutes: u32,
    /// Number of times sleep was interrupted
    pub fragmentations: u32,
    pub date: NaiveDate,
}

impl SleepSample {
    /// Minutes attributed to deep, light and REM stages
    pub fn staged_minutes(&self) -> u32 {
        self.deep_minutes
            .saturating_add(self.light_minutes)
            .saturating_add(self.rem_minutes)
    }

    /// Whether the staged minutes fit inside the total.
    ///
    /// Wearables occasionally report more staged time than total time;
    /// scoring tolerates it but callers may want to flag the device.
    pub fn stages_consistent(&self) -> bool {
        self.staged_minutes() <= self.total_minutes
    }
}

/// Daily recovery inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySample {
    /// Heart-rate variability (ms)
    pub hrv: f64,
    /// Resting heart rate (bpm)
    pub resting_hr: f64,
    /// Sleep score (0-100), computed or supplied externally
    pub sleep_score: f64,
    /// Hydration level (0-100)
    pub hydration_level: f64,
}

impl RecoverySample {
    /// Recovery score for this sample, see [`models::recovery_score`]
    pub fn score(&self) -> Result<f64, crate::DataQualityError> {
        models::recovery_score(
            self.hrv,
            self.resting_hr,
            self.sleep_score,
            self.hydration_level,
        )
    }
}

/// Where an environmental sensor is deployed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

/// An environmental sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSample {
    pub location: Location,
    /// Dry-bulb (ambient air) temperature (°C)
    pub dry_bulb_temp: f64,
    /// Natural wet-bulb temperature (°C)
    pub wet_bulb_temp: Option<f64>,
    /// Black-globe temperature (°C)
    pub globe_temp: Option<f64>,
    /// Relative humidity (0-100 %)
    pub humidity: Option<f64>,
    #[serde(default)]
    pub indoors: bool,
    /// Noise level (dBA)
    pub noise_level: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl EnvironmentSample {
    /// WBGT, when both wet-bulb and globe temperatures were measured
    pub fn wbgt(&self) -> Option<f64> {
        match (self.wet_bulb_temp, self.globe_temp) {
            (Some(wet), Some(globe)) => {
                Some(models::wbgt(self.dry_bulb_temp, wet, globe, self.indoors))
            }
            _ => None,
        }
    }

    /// Heat index, when humidity was measured
    pub fn heat_index(&self) -> Option<f64> {
        self.humidity
            .map(|rh| models::heat_index(self.dry_bulb_temp, rh))
    }
}
