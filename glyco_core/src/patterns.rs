//! Automated pattern detection over a window of readings.
//!
//! Detectors:
//! - Dawn phenomenon: elevated mean across hours 4-8
//! - Nocturnal hypoglycemia: share of lows between 23:00 and 06:59
//! - High variability: CV% above 40
//!
//! A detector that does not fire produces no record at all.

use crate::numeric::{mean, percent, round_to, std_dev};
use crate::stats::{coefficient_of_variation, hourly_means, local_hour};
use crate::{values_of, GlucoseReading, ThresholdConfig};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const DAWN_HOURS: std::ops::RangeInclusive<u32> = 4..=8;
const NIGHT_HOURS: [u32; 8] = [23, 0, 1, 2, 3, 4, 5, 6];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    DawnPhenomenon,
    NocturnalHypoglycemia,
    HighVariability,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A detected glucose pattern
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatternDetection {
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributing_hours: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_value: Option<f64>,
}

/// Run every detector; results are ordered dawn, nocturnal, variability.
///
/// Thresholds are compared against unrounded statistics; only the values
/// stored on a detection are rounded.
pub fn detect_patterns(
    readings: &[GlucoseReading],
    thresholds: &ThresholdConfig,
    offset: &FixedOffset,
) -> Vec<PatternDetection> {
    let detections: Vec<PatternDetection> = [
        detect_dawn_phenomenon(readings, offset),
        detect_nocturnal_hypoglycemia(readings, thresholds, offset),
        detect_high_variability(readings),
    ]
    .into_iter()
    .flatten()
    .collect();

    tracing::debug!("Detected {} glucose patterns", detections.len());
    detections
}

/// Mean of the hourly means for hours 4-8 above 140 mg/dL
pub fn detect_dawn_phenomenon(
    readings: &[GlucoseReading],
    offset: &FixedOffset,
) -> Option<PatternDetection> {
    let dawn: Vec<(u32, f64)> = hourly_means(readings, offset)
        .into_iter()
        .zip(0u32..)
        .filter(|(_, hour)| DAWN_HOURS.contains(hour))
        .filter_map(|(hour_mean, hour)| hour_mean.map(|m| (hour, m)))
        .collect();
    if dawn.is_empty() {
        return None;
    }

    let average = mean(&dawn.iter().map(|(_, m)| *m).collect::<Vec<_>>());
    let severity = match average {
        a if a > 180.0 => Severity::High,
        a if a > 160.0 => Severity::Medium,
        a if a > 140.0 => Severity::Low,
        _ => return None,
    };

    let average = round_to(average, 1);
    Some(PatternDetection {
        pattern_type: PatternType::DawnPhenomenon,
        severity,
        description: format!(
            "Early-morning glucose averages {} mg/dL between 04:00 and 08:59",
            average
        ),
        contributing_hours: Some(dawn.iter().map(|(hour, _)| *hour).collect()),
        average_value: Some(average),
    })
}

/// Lows during 23:00-06:59 as a share of all readings in the window
pub fn detect_nocturnal_hypoglycemia(
    readings: &[GlucoseReading],
    thresholds: &ThresholdConfig,
    offset: &FixedOffset,
) -> Option<PatternDetection> {
    let mut hours = BTreeSet::new();
    let mut lows = Vec::new();
    for reading in readings {
        let hour = local_hour(reading, offset);
        if reading.value < thresholds.low && NIGHT_HOURS.contains(&hour) {
            lows.push(reading.value);
            hours.insert(hour);
        }
    }

    let share = percent(lows.len(), readings.len());
    let severity = match share {
        s if s > 10.0 => Severity::High,
        s if s > 5.0 => Severity::Medium,
        _ => return None,
    };

    Some(PatternDetection {
        pattern_type: PatternType::NocturnalHypoglycemia,
        severity,
        description: format!(
            "{} overnight readings below {} mg/dL ({}% of all readings)",
            lows.len(),
            thresholds.low,
            round_to(share, 1)
        ),
        contributing_hours: Some(hours.into_iter().collect()),
        average_value: Some(round_to(mean(&lows), 1)),
    })
}

/// CV% above 40 (medium) or 50 (high)
pub fn detect_high_variability(readings: &[GlucoseReading]) -> Option<PatternDetection> {
    let values = values_of(readings);
    if values.is_empty() {
        return None;
    }

    let cv = coefficient_of_variation(std_dev(&values), mean(&values));
    let severity = match cv {
        cv if cv > 50.0 => Severity::High,
        cv if cv > 40.0 => Severity::Medium,
        _ => return None,
    };

    let cv = round_to(cv, 1);
    Some(PatternDetection {
        pattern_type: PatternType::HighVariability,
        severity,
        description: format!("Glucose variability is high (CV {}%, target below 36%)", cv),
        contributing_hours: None,
        average_value: Some(cv),
    })
}
