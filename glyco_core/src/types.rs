//! Core domain types for Glyco.
//!
//! This module defines the inputs the engine consumes:
//! - Glucose readings and treatment events
//! - Glucose zone thresholds
//! - Pharmacokinetic model parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Readings
// ============================================================================

/// A single CGM sample in mg/dL
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlucoseReading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl GlucoseReading {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Extract the values of a reading slice, preserving order
pub fn values_of(readings: &[GlucoseReading]) -> Vec<f64> {
    readings.iter().map(|r| r.value).collect()
}

// ============================================================================
// Treatments
// ============================================================================

/// Kind of logged treatment
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MealBolus,
    SnackBolus,
    CorrectionBolus,
    /// Long-acting basal injection (peakless, excluded from IOB)
    LongActing,
    /// Immediate + extended bolus
    ComboBolus,
    /// Temporary change of the pump's scheduled basal rate
    TempBasal,
    /// Carbohydrate intake without insulin
    CarbCorrection,
}

impl EventType {
    /// Meal, snack and correction boluses of rapid-acting insulin
    pub fn is_rapid_bolus(self) -> bool {
        matches!(
            self,
            EventType::MealBolus | EventType::SnackBolus | EventType::CorrectionBolus
        )
    }

    pub fn all() -> [EventType; 7] {
        [
            EventType::MealBolus,
            EventType::SnackBolus,
            EventType::CorrectionBolus,
            EventType::LongActing,
            EventType::ComboBolus,
            EventType::TempBasal,
            EventType::CarbCorrection,
        ]
    }

    /// Snake-case name, as stored in the journal
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::MealBolus => "meal_bolus",
            EventType::SnackBolus => "snack_bolus",
            EventType::CorrectionBolus => "correction_bolus",
            EventType::LongActing => "long_acting",
            EventType::ComboBolus => "combo_bolus",
            EventType::TempBasal => "temp_basal",
            EventType::CarbCorrection => "carb_correction",
        }
    }

    /// Parse a CLI-style name ("meal-bolus", "meal_bolus", "temp basal")
    pub fn parse(name: &str) -> Option<EventType> {
        let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "meal_bolus" | "meal" => Some(EventType::MealBolus),
            "snack_bolus" | "snack" => Some(EventType::SnackBolus),
            "correction_bolus" | "correction" => Some(EventType::CorrectionBolus),
            "long_acting" | "basal_injection" => Some(EventType::LongActing),
            "combo_bolus" | "combo" => Some(EventType::ComboBolus),
            "temp_basal" => Some(EventType::TempBasal),
            "carb_correction" | "carbs" => Some(EventType::CarbCorrection),
            _ => None,
        }
    }
}

/// How a temporary basal `rate` is expressed
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateMode {
    /// Units per hour
    Absolute,
    /// Percentage of the scheduled basal rate
    Relative,
}

/// A logged treatment event. Absent amounts mean "not applicable".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Treatment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insulin_units: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_mode: Option<RateMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_insulin_units: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_insulin_units: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Treatment {
    /// A treatment of the given kind with every amount absent
    pub fn new(event_type: EventType, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            event_type,
            occurred_at,
            insulin_units: None,
            carbs_grams: None,
            duration_minutes: None,
            rate: None,
            rate_mode: None,
            immediate_insulin_units: None,
            extended_insulin_units: None,
            notes: None,
        }
    }

    pub fn bolus(event_type: EventType, occurred_at: DateTime<Utc>, units: f64) -> Self {
        Self {
            insulin_units: Some(units),
            ..Self::new(event_type, occurred_at)
        }
    }

    pub fn carbs(occurred_at: DateTime<Utc>, grams: f64) -> Self {
        Self {
            carbs_grams: Some(grams),
            ..Self::new(EventType::CarbCorrection, occurred_at)
        }
    }

    pub fn temp_basal(
        occurred_at: DateTime<Utc>,
        rate: f64,
        mode: RateMode,
        duration_minutes: f64,
    ) -> Self {
        Self {
            rate: Some(rate),
            rate_mode: Some(mode),
            duration_minutes: Some(duration_minutes),
            ..Self::new(EventType::TempBasal, occurred_at)
        }
    }

    pub fn combo_bolus(
        occurred_at: DateTime<Utc>,
        immediate: f64,
        extended: f64,
        duration_minutes: f64,
    ) -> Self {
        Self {
            immediate_insulin_units: Some(immediate),
            extended_insulin_units: Some(extended),
            duration_minutes: Some(duration_minutes),
            ..Self::new(EventType::ComboBolus, occurred_at)
        }
    }

    /// Minutes between this event and `now` (negative for future events)
    pub fn minutes_before(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.occurred_at, now)
    }
}

/// Signed minutes from `earlier` to `later`, millisecond precision
pub fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

// ============================================================================
// Thresholds and model parameters
// ============================================================================

/// mg/dL boundaries of the five glucose zones.
///
/// Ordering (`very_low < low < high < very_high`) is validated by
/// [`crate::Config::validate`], not by the engine.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ThresholdConfig {
    #[serde(default = "default_very_low")]
    pub very_low: f64,
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_very_high")]
    pub very_high: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            very_low: default_very_low(),
            low: default_low(),
            high: default_high(),
            very_high: default_very_high(),
        }
    }
}

fn default_very_low() -> f64 {
    54.0
}

fn default_low() -> f64 {
    70.0
}

fn default_high() -> f64 {
    180.0
}

fn default_very_high() -> f64 {
    250.0
}

/// Insulin and carbohydrate model parameters
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// Duration of insulin action, hours
    #[serde(default = "default_dia_hours")]
    pub dia_hours: f64,
    /// Carbohydrate absorption, grams per hour
    #[serde(default = "default_carb_absorption_rate")]
    pub carb_absorption_rate: f64,
    /// Scheduled basal rate in U/h; 0 disables temp-basal deviation modeling
    #[serde(default)]
    pub basal_rate: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            dia_hours: default_dia_hours(),
            carb_absorption_rate: default_carb_absorption_rate(),
            basal_rate: 0.0,
        }
    }
}

fn default_dia_hours() -> f64 {
    3.0
}

fn default_carb_absorption_rate() -> f64 {
    30.0
}
