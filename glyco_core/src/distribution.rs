//! Glucose distribution and variability indices.
//!
//! Everything here is computed from one window of readings:
//! histogram, GVI, PGS, J-Index, IQR, mean daily change, out-of-range RMS
//! and time spent in fluctuation.

use crate::numeric::{self, percent, round_to};
use crate::stats::time_in_range;
use crate::types::minutes_between;
use crate::{values_of, GlucoseReading, ThresholdConfig};
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width of a histogram bin, mg/dL
pub const BIN_WIDTH: f64 = 10.0;

/// Rate of change (mg/dL/min) counted as fluctuation
const FLUCTUATION_RATE: f64 = 1.0;
/// Rate of change (mg/dL/min) counted as rapid fluctuation
const RAPID_FLUCTUATION_RATE: f64 = 2.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistogramBin {
    /// Inclusive lower edge
    pub range_start: f64,
    /// Exclusive upper edge
    pub range_end: f64,
    pub count: usize,
    pub percent: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GviClass {
    Low,
    Moderate,
    High,
}

impl GviClass {
    /// `< 1.2` low, `1.2..=1.5` moderate, `> 1.5` high
    pub fn classify(gvi: f64) -> Self {
        if gvi < 1.2 {
            GviClass::Low
        } else if gvi <= 1.5 {
            GviClass::Moderate
        } else {
            GviClass::High
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DistributionReport {
    pub histogram: Vec<HistogramBin>,
    pub gvi: f64,
    pub gvi_class: GviClass,
    pub pgs: f64,
    pub j_index: f64,
    pub iqr: f64,
    pub mean_daily_change: f64,
    pub out_of_range_rms: f64,
    pub time_in_fluctuation: f64,
    pub time_in_rapid_fluctuation: f64,
}

/// Compute every distribution metric for one window
pub fn analyze_distribution(
    readings: &[GlucoseReading],
    thresholds: &ThresholdConfig,
    offset: &FixedOffset,
) -> DistributionReport {
    let values = values_of(readings);
    let mean = numeric::mean(&values);
    let sd = numeric::std_dev(&values);
    let gvi = glycemic_variability_index(readings);
    let out_of_range = time_in_range(readings, thresholds).percent_out_of_range();
    let (fluctuation, rapid) = time_in_fluctuation(readings);

    let report = DistributionReport {
        histogram: histogram(readings),
        gvi,
        gvi_class: GviClass::classify(gvi),
        pgs: patient_glycemic_status(gvi, mean, out_of_range),
        j_index: j_index(mean, sd),
        iqr: interquartile_range(&values),
        mean_daily_change: mean_daily_change(readings, offset),
        out_of_range_rms: out_of_range_rms(readings, thresholds),
        time_in_fluctuation: fluctuation,
        time_in_rapid_fluctuation: rapid,
    };

    tracing::debug!(
        "Distribution over {} readings: GVI={} PGS={} J={}",
        readings.len(),
        report.gvi,
        report.pgs,
        report.j_index
    );
    report
}

/// 10 mg/dL bins from the lowest populated bin to the highest, gaps included
pub fn histogram(readings: &[GlucoseReading]) -> Vec<HistogramBin> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for reading in readings {
        *counts
            .entry((reading.value / BIN_WIDTH).floor() as i64)
            .or_default() += 1;
    }

    let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) else {
        return Vec::new();
    };

    (first..=last)
        .map(|bin| {
            let count = counts.get(&bin).copied().unwrap_or(0);
            HistogramBin {
                range_start: bin as f64 * BIN_WIDTH,
                range_end: (bin + 1) as f64 * BIN_WIDTH,
                count,
                percent: round_to(percent(count, readings.len()), 1),
            }
        })
        .collect()
}

/// Path length of the glucose trace over the length of a flat trace.
///
/// Segment lengths use minutes on the time axis and mg/dL on the value
/// axis. A flat line at the mean spans exactly the total duration, so the
/// ratio is 1.0 only for perfectly constant glucose. Returns 0 with fewer
/// than two readings or no elapsed time.
pub fn glycemic_variability_index(readings: &[GlucoseReading]) -> f64 {
    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        return 0.0;
    };
    let duration = minutes_between(first.timestamp, last.timestamp);
    if readings.len() < 2 || duration <= 0.0 {
        return 0.0;
    }

    let path_length: f64 = readings
        .windows(2)
        .map(|pair| {
            let dt = minutes_between(pair[0].timestamp, pair[1].timestamp);
            let dv = pair[1].value - pair[0].value;
            (dt * dt + dv * dv).sqrt()
        })
        .sum();

    round_to(path_length / duration, 2)
}

/// PGS = GVI × mean glucose × fraction of time out of range
pub fn patient_glycemic_status(gvi: f64, mean: f64, percent_out_of_range: f64) -> f64 {
    round_to(gvi * mean * (percent_out_of_range / 100.0), 2)
}

/// J-Index = 0.001 × (mean + SD)²
pub fn j_index(mean: f64, sd: f64) -> f64 {
    round_to(0.001 * (mean + sd).powi(2), 2)
}

pub fn interquartile_range(values: &[f64]) -> f64 {
    let sorted = numeric::sorted_copy(values);
    round_to(
        numeric::percentile_sorted(&sorted, 75.0) - numeric::percentile_sorted(&sorted, 25.0),
        1,
    )
}

/// Mean absolute difference between consecutive local-day means
pub fn mean_daily_change(readings: &[GlucoseReading], offset: &FixedOffset) -> f64 {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for reading in readings {
        by_day
            .entry(reading.timestamp.with_timezone(offset).date_naive())
            .or_default()
            .push(reading.value);
    }

    let daily_means: Vec<f64> = by_day.values().map(|v| numeric::mean(v)).collect();
    let changes: Vec<f64> = daily_means
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .collect();

    round_to(numeric::mean(&changes), 1)
}

/// Root-mean-square distance of each reading outside `[low, high]` to the
/// violated boundary; in-range readings contribute zero.
pub fn out_of_range_rms(readings: &[GlucoseReading], thresholds: &ThresholdConfig) -> f64 {
    if readings.is_empty() {
        return 0.0;
    }

    let sum_of_squares: f64 = readings
        .iter()
        .map(|r| {
            if r.value < thresholds.low {
                thresholds.low - r.value
            } else if r.value > thresholds.high {
                r.value - thresholds.high
            } else {
                0.0
            }
        })
        .map(|d| d * d)
        .sum();

    round_to((sum_of_squares / readings.len() as f64).sqrt(), 1)
}

/// Percent of consecutive intervals changing faster than 1 and 2 mg/dL/min.
///
/// Intervals with no elapsed time are skipped.
pub fn time_in_fluctuation(readings: &[GlucoseReading]) -> (f64, f64) {
    let rates: Vec<f64> = readings
        .windows(2)
        .filter_map(|pair| {
            let dt = minutes_between(pair[0].timestamp, pair[1].timestamp);
            (dt > 0.0).then(|| ((pair[1].value - pair[0].value) / dt).abs())
        })
        .collect();

    let over = |limit: f64| rates.iter().filter(|r| **r > limit).count();
    (
        round_to(percent(over(FLUCTUATION_RATE), rates.len()), 1),
        round_to(percent(over(RAPID_FLUCTUATION_RATE), rates.len()), 1),
    )
}
