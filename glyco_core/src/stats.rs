//! Summary statistics, time-in-range and hourly pattern tables.

use crate::numeric::{self, percent, round_to};
use crate::{values_of, GlucoseReading, ThresholdConfig};
use chrono::{FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

/// Aggregate statistics over a window of readings
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub cv_percent: f64,
    /// Glucose Management Indicator (%)
    pub gmi: f64,
    /// Nathan/ADAG estimated A1c (%), kept separate from GMI
    pub estimated_a1c: f64,
}

/// Glucose Management Indicator: `3.31 + 0.02392 × mean`, 2 decimals
pub fn gmi(mean: f64) -> f64 {
    round_to(3.31 + 0.02392 * mean, 2)
}

/// Estimated A1c from mean glucose: `(mean + 46.7) / 28.7`, 2 decimals
pub fn estimated_a1c(mean: f64) -> f64 {
    round_to((mean + 46.7) / 28.7, 2)
}

/// Coefficient of variation in percent; 0 when the mean is 0
pub fn coefficient_of_variation(std_dev: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        return 0.0;
    }
    std_dev / mean * 100.0
}

pub fn summarize(readings: &[GlucoseReading]) -> SummaryStats {
    if readings.is_empty() {
        return SummaryStats::default();
    }

    let values = values_of(readings);
    let mean = numeric::mean(&values);
    let std_dev = numeric::std_dev(&values);

    SummaryStats {
        count: values.len(),
        mean: round_to(mean, 1),
        median: round_to(numeric::median(&values), 1),
        std_dev: round_to(std_dev, 1),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        cv_percent: round_to(coefficient_of_variation(std_dev, mean), 1),
        gmi: gmi(mean),
        estimated_a1c: estimated_a1c(mean),
    }
}

// ============================================================================
// Time in range
// ============================================================================

/// One of the five mutually exclusive glucose zones
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GlucoseZone {
    VeryLow,
    Low,
    InRange,
    High,
    VeryHigh,
}

impl GlucoseZone {
    /// `< very_low`, `< low`, `<= high`, `<= very_high`, else very high
    pub fn classify(value: f64, thresholds: &ThresholdConfig) -> Self {
        if value < thresholds.very_low {
            GlucoseZone::VeryLow
        } else if value < thresholds.low {
            GlucoseZone::Low
        } else if value <= thresholds.high {
            GlucoseZone::InRange
        } else if value <= thresholds.very_high {
            GlucoseZone::High
        } else {
            GlucoseZone::VeryHigh
        }
    }
}

/// Reading counts for each zone
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoneCounts {
    pub very_low: usize,
    pub low: usize,
    pub in_range: usize,
    pub high: usize,
    pub very_high: usize,
}

/// Zone percentages, 1 decimal each
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ZonePercentages {
    pub very_low: f64,
    pub low: f64,
    pub in_range: f64,
    pub high: f64,
    pub very_high: f64,
}

impl ZonePercentages {
    pub fn total(&self) -> f64 {
        self.very_low + self.low + self.in_range + self.high + self.very_high
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeInRange {
    pub total: usize,
    pub counts: ZoneCounts,
    pub percentages: ZonePercentages,
}

impl TimeInRange {
    /// Percent of readings outside `[low, high]`, unrounded
    pub fn percent_out_of_range(&self) -> f64 {
        percent(self.total - self.counts.in_range, self.total)
    }
}

pub fn time_in_range(readings: &[GlucoseReading], thresholds: &ThresholdConfig) -> TimeInRange {
    let mut counts = ZoneCounts::default();
    for reading in readings {
        match GlucoseZone::classify(reading.value, thresholds) {
            GlucoseZone::VeryLow => counts.very_low += 1,
            GlucoseZone::Low => counts.low += 1,
            GlucoseZone::InRange => counts.in_range += 1,
            GlucoseZone::High => counts.high += 1,
            GlucoseZone::VeryHigh => counts.very_high += 1,
        }
    }

    let total = readings.len();
    let [very_low, low, in_range, high, very_high] = zone_percentages(
        [
            counts.very_low,
            counts.low,
            counts.in_range,
            counts.high,
            counts.very_high,
        ],
        total,
    );

    TimeInRange {
        total,
        counts,
        percentages: ZonePercentages {
            very_low,
            low,
            in_range,
            high,
            very_high,
        },
    }
}

/// Round zone shares to 1 decimal, keeping the sum within 0.1 of 100.
///
/// Plain rounding can drift by up to 0.2 across five zones; the excess is
/// taken from the zones whose rounding moved them furthest.
fn zone_percentages(counts: [usize; 5], total: usize) -> [f64; 5] {
    if total == 0 {
        return [0.0; 5];
    }

    let exact = counts.map(|count| count as f64 * 1000.0 / total as f64);
    let mut tenths = exact.map(|e| e.round() as i64);
    let mut drift = tenths.iter().sum::<i64>() - 1000;

    while drift.abs() > 1 {
        let direction = drift.signum();
        let furthest = (0..tenths.len())
            .max_by(|&a, &b| {
                let err_a = (tenths[a] as f64 - exact[a]) * direction as f64;
                let err_b = (tenths[b] as f64 - exact[b]) * direction as f64;
                err_a.total_cmp(&err_b)
            })
            .unwrap_or(0);
        tenths[furthest] -= direction;
        drift -= direction;
    }

    tenths.map(|t| t as f64 / 10.0)
}

// ============================================================================
// Hourly patterns
// ============================================================================

/// Distribution of readings for one hour of the day
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HourlyPattern {
    pub hour: u32,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub p5: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Local hour of day (0-23) of a reading under `offset`
pub fn local_hour(reading: &GlucoseReading, offset: &FixedOffset) -> u32 {
    reading.timestamp.with_timezone(offset).hour()
}

/// Group readings by local hour of day, ignoring the date.
///
/// Always returns 24 entries; hours without samples are zeroed.
pub fn hourly_patterns(readings: &[GlucoseReading], offset: &FixedOffset) -> Vec<HourlyPattern> {
    group_by_hour(readings, offset)
        .iter()
        .enumerate()
        .map(|(hour, values)| {
            if values.is_empty() {
                return HourlyPattern {
                    hour: hour as u32,
                    ..HourlyPattern::default()
                };
            }
            let sorted = numeric::sorted_copy(values);
            HourlyPattern {
                hour: hour as u32,
                count: values.len(),
                mean: round_to(numeric::mean(values), 1),
                std_dev: round_to(numeric::std_dev(values), 1),
                p5: numeric::percentile_sorted(&sorted, 5.0).round(),
                p25: numeric::percentile_sorted(&sorted, 25.0).round(),
                p75: numeric::percentile_sorted(&sorted, 75.0).round(),
                p95: numeric::percentile_sorted(&sorted, 95.0).round(),
            }
        })
        .collect()
}

/// Unrounded mean per local hour of day; `None` for hours without samples
pub fn hourly_means(readings: &[GlucoseReading], offset: &FixedOffset) -> Vec<Option<f64>> {
    group_by_hour(readings, offset)
        .iter()
        .map(|values| (!values.is_empty()).then(|| numeric::mean(values)))
        .collect()
}

fn group_by_hour(readings: &[GlucoseReading], offset: &FixedOffset) -> Vec<Vec<f64>> {
    let mut by_hour: Vec<Vec<f64>> = vec![Vec::new(); 24];
    for reading in readings {
        by_hour[local_hour(reading, offset) as usize].push(reading.value);
    }
    by_hour
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    fn readings_of(values: &[f64]) -> Vec<GlucoseReading> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| GlucoseReading::new(at(0, 0) + Duration::minutes(5 * i as i64), *v))
            .collect()
    }

    #[test]
    fn test_gmi_and_a1c_are_distinct() {
        assert_eq!(gmi(154.0), 6.99);
        assert_eq!(gmi(200.0), 8.09);
        assert_eq!(estimated_a1c(200.0), 8.6);
    }

    #[test]
    fn test_summary_stats() {
        let stats = summarize(&readings_of(&[70.0, 80.0, 90.0, 100.0]));
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 85.0);
        assert_eq!(stats.median, 85.0);
        assert_eq!(stats.std_dev, 11.2);
        assert_eq!(stats.min, 70.0);
        assert_eq!(stats.max, 100.0);
        assert_eq!(stats.cv_percent, 13.2);
        assert_eq!(stats.gmi, 5.34);
    }

    #[test]
    fn test_summary_of_empty_window_is_zero() {
        assert_eq!(summarize(&[]), SummaryStats::default());
    }

    #[test]
    fn test_zone_boundaries_are_half_open() {
        let t = ThresholdConfig::default();
        assert_eq!(GlucoseZone::classify(53.9, &t), GlucoseZone::VeryLow);
        assert_eq!(GlucoseZone::classify(54.0, &t), GlucoseZone::Low);
        assert_eq!(GlucoseZone::classify(70.0, &t), GlucoseZone::InRange);
        assert_eq!(GlucoseZone::classify(180.0, &t), GlucoseZone::InRange);
        assert_eq!(GlucoseZone::classify(180.1, &t), GlucoseZone::High);
        assert_eq!(GlucoseZone::classify(250.0, &t), GlucoseZone::High);
        assert_eq!(GlucoseZone::classify(251.0, &t), GlucoseZone::VeryHigh);
    }

    #[test]
    fn test_time_in_range_percentages_sum_to_100() {
        let values = [40.0, 60.0, 65.0, 100.0, 120.0, 150.0, 200.0, 300.0, 90.0];
        let tir = time_in_range(&readings_of(&values), &ThresholdConfig::default());

        assert_eq!(tir.total, 9);
        assert_eq!(tir.counts.very_low, 1);
        assert_eq!(tir.counts.low, 2);
        assert_eq!(tir.counts.in_range, 4);
        assert_eq!(tir.counts.high, 1);
        assert_eq!(tir.counts.very_high, 1);
        assert_eq!(tir.percentages.in_range, 44.4);
        assert!((tir.percentages.total() - 100.0).abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn test_time_in_range_corrects_rounding_drift() {
        // 1/14 rounds to 7.1 four times and 10/14 to 71.4: plain rounding sums to 99.8
        let values = [50.0, 60.0, 200.0, 300.0]
            .into_iter()
            .chain(std::iter::repeat(120.0).take(10))
            .collect::<Vec<_>>();
        let tir = time_in_range(&readings_of(&values), &ThresholdConfig::default());

        assert_eq!(tir.percentages.in_range, 71.4);
        assert_eq!(tir.percentages.very_low, 7.1);
        assert_eq!(tir.percentages.very_high, 7.2);
        assert!((tir.percentages.total() - 100.0).abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn test_time_in_range_of_empty_window() {
        let tir = time_in_range(&[], &ThresholdConfig::default());
        assert_eq!(tir.total, 0);
        assert_eq!(tir.percentages.total(), 0.0);
        assert_eq!(tir.percent_out_of_range(), 0.0);
    }

    #[test]
    fn test_hourly_patterns_group_by_hour_across_days() {
        let readings = vec![
            GlucoseReading::new(at(7, 0), 100.0),
            GlucoseReading::new(at(7, 30), 140.0),
            GlucoseReading::new(at(7, 10) + Duration::days(1), 120.0),
            GlucoseReading::new(at(13, 0), 90.0),
        ];
        let offset = FixedOffset::east_opt(0).unwrap();
        let table = hourly_patterns(&readings, &offset);

        assert_eq!(table.len(), 24);
        assert_eq!(table[7].count, 3);
        assert_eq!(table[7].mean, 120.0);
        assert_eq!(table[7].p5, 102.0);
        assert_eq!(table[7].p25, 110.0);
        assert_eq!(table[7].p75, 130.0);
        assert_eq!(table[7].p95, 138.0);
        assert_eq!(table[13].count, 1);
        assert_eq!(table[13].p95, 90.0);
        assert_eq!(table[0], HourlyPattern::default());
        assert_eq!(table[23].hour, 23);
    }

    #[test]
    fn test_hourly_patterns_respect_offset() {
        let readings = vec![GlucoseReading::new(at(7, 0), 100.0)];
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let table = hourly_patterns(&readings, &offset);
        assert_eq!(table[2].count, 1);
        assert_eq!(table[7].count, 0);
    }

    #[test]
    fn test_hourly_means_are_unrounded() {
        let readings = vec![
            GlucoseReading::new(at(4, 0), 140.0),
            GlucoseReading::new(at(4, 5), 140.0),
            GlucoseReading::new(at(4, 10), 140.12),
        ];
        let offset = FixedOffset::east_opt(0).unwrap();

        let means = hourly_means(&readings, &offset);
        assert_eq!(means.len(), 24);
        assert!((means[4].unwrap() - 140.04).abs() < 1e-9);
        assert!(means[5].is_none());
        assert_eq!(hourly_patterns(&readings, &offset)[4].mean, 140.0);
    }
}
