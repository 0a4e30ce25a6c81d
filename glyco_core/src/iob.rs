//! Insulin-on-board estimation.
//!
//! Each insulin event decays along a two-phase ("bilinear") curve with a
//! fixed activity peak at 75 minutes:
//! - Rapid boluses decay from their timestamp
//! - Long-acting basal injections are excluded (peakless, multi-hour profile)
//! - Combo boluses split into an immediate bolus plus 5-minute extended segments
//! - Temp basals contribute their deviation from the scheduled rate as
//!   5-minute micro-doses, so IOB goes negative during a suspend

use crate::numeric::round_to;
use crate::{EventType, ModelParameters, RateMode, Treatment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minutes after injection at which rapid-acting insulin activity peaks
pub const PEAK_MINUTES: f64 = 75.0;

/// Width of one delivery segment for extended and temp-basal insulin
pub const SEGMENT_MINUTES: f64 = 5.0;

/// Insulin on board at one instant, in units
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IobResult {
    /// Sum of all contributions; negative when basal was reduced below schedule
    pub total: f64,
    /// Rapid and combo bolus contributions
    pub bolus: f64,
    /// Temp-basal deviation contributions
    pub basal: f64,
    /// Treatments that contributed a nonzero amount
    pub treatment_count: usize,
}

/// Fraction of a dose still active `elapsed` minutes after delivery.
///
/// Phase 1 (up to the peak) decays from 1 to `r_p = 1 - peak / (2 (dia - peak))`,
/// phase 2 decays linearly from `r_p` to zero at `dia`. Phase 1 is the slower
/// phase whenever `dia > 2 * peak`; below that the curve is linear.
/// Zero for negative elapsed time and at or beyond `dia`.
pub fn fraction_remaining(elapsed: f64, dia_minutes: f64) -> f64 {
    if elapsed < 0.0 || elapsed >= dia_minutes {
        return 0.0;
    }

    if dia_minutes <= 2.0 * PEAK_MINUTES {
        return 1.0 - elapsed / dia_minutes;
    }

    let at_peak = 1.0 - PEAK_MINUTES / (2.0 * (dia_minutes - PEAK_MINUTES));
    if elapsed <= PEAK_MINUTES {
        1.0 - (1.0 - at_peak) * elapsed / PEAK_MINUTES
    } else {
        at_peak * (dia_minutes - elapsed) / (dia_minutes - PEAK_MINUTES)
    }
}

/// Compute IOB at `now` from every treatment in the window
pub fn insulin_on_board(
    treatments: &[Treatment],
    now: DateTime<Utc>,
    params: &ModelParameters,
) -> IobResult {
    let dia_minutes = params.dia_hours * 60.0;
    let mut bolus = 0.0;
    let mut basal = 0.0;
    let mut treatment_count = 0;

    for treatment in treatments {
        let elapsed = treatment.minutes_before(now);

        let (bolus_part, basal_part) = match treatment.event_type {
            t if t.is_rapid_bolus() => (
                treatment
                    .insulin_units
                    .map(|units| units * fraction_remaining(elapsed, dia_minutes))
                    .unwrap_or(0.0),
                0.0,
            ),
            EventType::ComboBolus => (combo_bolus_iob(treatment, elapsed, dia_minutes), 0.0),
            EventType::TempBasal if params.basal_rate > 0.0 => (
                0.0,
                temp_basal_iob(treatment, elapsed, dia_minutes, params.basal_rate),
            ),
            _ => (0.0, 0.0),
        };

        if bolus_part != 0.0 || basal_part != 0.0 {
            treatment_count += 1;
        }
        bolus += bolus_part;
        basal += basal_part;
    }

    let result = IobResult {
        total: round_to(bolus + basal, 2),
        bolus: round_to(bolus, 2),
        basal: round_to(basal, 2),
        treatment_count,
    };

    tracing::debug!(
        "IOB at {}: total={} bolus={} basal={} from {} treatments",
        now,
        result.total,
        result.bolus,
        result.basal,
        result.treatment_count
    );

    result
}

/// Immediate part as a standard bolus, extended part as delivered segments
fn combo_bolus_iob(treatment: &Treatment, elapsed: f64, dia_minutes: f64) -> f64 {
    let immediate_units = treatment.immediate_insulin_units.or_else(|| {
        treatment
            .extended_insulin_units
            .is_none()
            .then_some(treatment.insulin_units)
            .flatten()
    });
    let immediate = immediate_units
        .map(|units| units * fraction_remaining(elapsed, dia_minutes))
        .unwrap_or(0.0);

    let extended = match (treatment.extended_insulin_units, treatment.duration_minutes) {
        (Some(units), Some(duration)) if duration > 0.0 => {
            segmented_iob(units / duration, duration, elapsed, dia_minutes)
        }
        (Some(units), Some(_)) => units * fraction_remaining(elapsed, dia_minutes),
        _ => 0.0,
    };

    immediate + extended
}

/// Deviation from the scheduled rate, delivered in 5-minute micro-doses
fn temp_basal_iob(treatment: &Treatment, elapsed: f64, dia_minutes: f64, basal_rate: f64) -> f64 {
    let (Some(rate), Some(duration)) = (treatment.rate, treatment.duration_minutes) else {
        return 0.0;
    };
    if duration <= 0.0 {
        return 0.0;
    }

    let absolute_rate = match treatment.rate_mode.unwrap_or(RateMode::Absolute) {
        RateMode::Absolute => rate,
        RateMode::Relative => basal_rate * rate / 100.0,
    };
    let deviation_per_hour = absolute_rate - basal_rate;

    segmented_iob(deviation_per_hour / 60.0, duration, elapsed, dia_minutes)
}

/// IOB of a constant delivery of `units_per_minute` over `duration` minutes.
///
/// Only the part delivered by `elapsed` counts. Each segment decays from the
/// midpoint of its delivered portion.
fn segmented_iob(units_per_minute: f64, duration: f64, elapsed: f64, dia_minutes: f64) -> f64 {
    let delivered_until = elapsed.min(duration);
    let mut total = 0.0;
    let mut start = 0.0;

    while start < delivered_until {
        let end = (start + SEGMENT_MINUTES).min(delivered_until);
        let minutes = end - start;
        let midpoint = start + minutes / 2.0;
        total += units_per_minute * minutes * fraction_remaining(elapsed - midpoint, dia_minutes);
        start += SEGMENT_MINUTES;
    }

    total
}
