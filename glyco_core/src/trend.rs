//! Short-horizon glucose trend.
//!
//! The delta compares two time buckets around the latest reading instead of
//! the last two samples, so a missed or duplicated sample does not produce a
//! spurious jump. The forecast is an AR(2) extrapolation in log space.
//!
//! The forecast is a heuristic projection of the recent trend. It is not a
//! guarantee of future glucose and must not be used for dosing decisions.

use crate::numeric::{mean, round_to};
use crate::types::minutes_between;
use crate::GlucoseReading;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-width of the bucket around the latest reading, minutes
const BUCKET_HALF_WIDTH: f64 = 2.5;
/// Far edge of the previous bucket, minutes before the latest reading
const PREVIOUS_BUCKET_START: f64 = 7.5;
/// Bucket-center gap above which the delta is rescaled to 5 minutes
const INTERPOLATION_GAP_MINUTES: f64 = 9.0;

const AR_COEFFICIENTS: [f64; 2] = [-0.723, 1.716];
const AR_REFERENCE: f64 = 140.0;
const PREDICTION_STEPS: i64 = 12;
const PREDICTION_STEP_MINUTES: i64 = 5;
const PREDICTION_MIN: f64 = 36.0;
const PREDICTION_MAX: f64 = 400.0;

/// Trend arrow derived from the 5-minute delta
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
}

impl TrendDirection {
    pub fn from_delta(delta_per_5min: f64) -> Self {
        match delta_per_5min {
            d if d > 15.0 => TrendDirection::DoubleUp,
            d if d > 10.0 => TrendDirection::SingleUp,
            d if d > 5.0 => TrendDirection::FortyFiveUp,
            d if d >= -5.0 => TrendDirection::Flat,
            d if d >= -10.0 => TrendDirection::FortyFiveDown,
            d if d >= -15.0 => TrendDirection::SingleDown,
            _ => TrendDirection::DoubleDown,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            TrendDirection::DoubleUp => "⇈",
            TrendDirection::SingleUp => "↑",
            TrendDirection::FortyFiveUp => "↗",
            TrendDirection::Flat => "→",
            TrendDirection::FortyFiveDown => "↘",
            TrendDirection::SingleDown => "↓",
            TrendDirection::DoubleDown => "⇊",
        }
    }
}

/// Bucket-averaged glucose change
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlucoseDelta {
    /// Change in mg/dL (per 5 minutes when `interpolated`), 1 decimal
    pub mgdl: f64,
    pub recent_mean: f64,
    pub previous_mean: f64,
    /// Minutes between the two bucket centers
    pub elapsed_minutes: f64,
    /// True when the raw delta was rescaled to a 5-minute rate
    pub interpolated: bool,
    pub direction: TrendDirection,
    /// Timestamp of the latest reading
    pub at: DateTime<Utc>,
}

/// One point of the AR(2) forecast
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictedPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
}

struct Buckets {
    latest: DateTime<Utc>,
    recent_mean: f64,
    previous_mean: f64,
    gap: f64,
    /// Unrounded delta, already normalized when the gap is wide
    delta: f64,
    interpolated: bool,
}

fn buckets(readings: &[GlucoseReading]) -> Option<Buckets> {
    let latest = readings.iter().map(|r| r.timestamp).max()?;

    let mut recent = (Vec::new(), Vec::new());
    let mut previous = (Vec::new(), Vec::new());
    for reading in readings {
        let offset = minutes_between(latest, reading.timestamp);
        if offset.abs() <= BUCKET_HALF_WIDTH {
            recent.0.push(reading.value);
            recent.1.push(offset);
        } else if offset > -PREVIOUS_BUCKET_START && offset < -BUCKET_HALF_WIDTH {
            previous.0.push(reading.value);
            previous.1.push(offset);
        }
    }

    if recent.0.is_empty() || previous.0.is_empty() {
        return None;
    }

    let recent_mean = mean(&recent.0);
    let previous_mean = mean(&previous.0);
    let gap = mean(&recent.1) - mean(&previous.1);
    let (delta, interpolated) = normalize_delta(recent_mean - previous_mean, gap);

    Some(Buckets {
        latest,
        recent_mean,
        previous_mean,
        gap,
        delta,
        interpolated,
    })
}

/// Rescale `raw` to a 5-minute rate when the bucket centers are far apart.
///
/// `bucketed_delta` uses fixed 5-minute buckets, so its gap stays below 7.5
/// minutes and this never rescales there. Wider gaps still get the 5-minute rate.
fn normalize_delta(raw: f64, gap: f64) -> (f64, bool) {
    if gap > INTERPOLATION_GAP_MINUTES {
        (raw * 5.0 / gap, true)
    } else {
        (raw, false)
    }
}

/// Delta between the bucket at the latest reading and the one before it.
///
/// `None` when either bucket has no readings.
pub fn bucketed_delta(readings: &[GlucoseReading]) -> Option<GlucoseDelta> {
    let b = buckets(readings)?;
    Some(GlucoseDelta {
        mgdl: round_to(b.delta, 1),
        recent_mean: round_to(b.recent_mean, 1),
        previous_mean: round_to(b.previous_mean, 1),
        elapsed_minutes: round_to(b.gap, 2),
        interpolated: b.interpolated,
        direction: TrendDirection::from_delta(b.delta),
        at: b.latest,
    })
}

/// Project glucose 60 minutes ahead in 5-minute steps.
///
/// Heuristic only: an AR(2) model with fixed coefficients in log space,
/// anchored at 140 mg/dL and clamped to 36..=400 mg/dL. Empty when the
/// delta buckets cannot be formed.
pub fn predict(readings: &[GlucoseReading]) -> Vec<PredictedPoint> {
    let Some(b) = buckets(readings) else {
        return Vec::new();
    };

    // Previous value one 5-minute step back, consistent with the normalized delta
    let previous = b.recent_mean - b.delta;
    if previous <= 0.0 || b.recent_mean <= 0.0 {
        return Vec::new();
    }

    let mut y = [
        (previous / AR_REFERENCE).ln(),
        (b.recent_mean / AR_REFERENCE).ln(),
    ];

    (1..=PREDICTION_STEPS)
        .map(|step| {
            y = [y[1], AR_COEFFICIENTS[0] * y[0] + AR_COEFFICIENTS[1] * y[1]];
            let value = (AR_REFERENCE * y[1].exp())
                .round()
                .clamp(PREDICTION_MIN, PREDICTION_MAX);
            PredictedPoint {
                at: b.latest + Duration::minutes(step * PREDICTION_STEP_MINUTES),
                value,
            }
        })
        .collect()
}
