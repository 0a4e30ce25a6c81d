//! Full glucose report for one time window.
//!
//! Bundles every analysis the engine offers into one serializable record,
//! which the CLI prints as text or JSON.

use crate::cob::carbs_on_board;
use crate::distribution::{analyze_distribution, DistributionReport};
use crate::iob::{insulin_on_board, IobResult};
use crate::patterns::{detect_patterns, PatternDetection};
use crate::stats::{
    hourly_patterns, summarize, time_in_range, HourlyPattern, SummaryStats, TimeInRange,
};
use crate::trend::{bucketed_delta, predict, GlucoseDelta, PredictedPoint};
use crate::{Config, GlucoseReading, Treatment};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The requested time range; `end` is also the evaluation instant for IOB/COB
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days ending at `end`
    pub fn last_days(end: DateTime<Utc>, days: i64) -> Self {
        Self::new(end - Duration::days(days), end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlucoseReport {
    pub window: ReportWindow,
    pub generated_at: DateTime<Utc>,
    pub summary: SummaryStats,
    pub time_in_range: TimeInRange,
    pub hourly: Vec<HourlyPattern>,
    pub patterns: Vec<PatternDetection>,
    pub distribution: DistributionReport,
    pub iob: IobResult,
    pub cob: f64,
    pub delta: Option<GlucoseDelta>,
    /// Heuristic AR(2) extrapolation, not a forecast guarantee
    pub prediction: Vec<PredictedPoint>,
}

/// Run every analysis over the readings inside `window`.
///
/// Treatments may extend before the window start; IOB and COB only consider
/// what is still active at `window.end`.
pub fn build_report(
    readings: &[GlucoseReading],
    treatments: &[Treatment],
    config: &Config,
    window: ReportWindow,
) -> GlucoseReport {
    let mut in_window: Vec<GlucoseReading> = readings
        .iter()
        .copied()
        .filter(|r| window.contains(r.timestamp))
        .collect();
    in_window.sort_by_key(|r| r.timestamp);

    let offset = config.display.offset();
    let report = GlucoseReport {
        window,
        generated_at: Utc::now(),
        summary: summarize(&in_window),
        time_in_range: time_in_range(&in_window, &config.thresholds),
        hourly: hourly_patterns(&in_window, &offset),
        patterns: detect_patterns(&in_window, &config.thresholds, &offset),
        distribution: analyze_distribution(&in_window, &config.thresholds, &offset),
        iob: insulin_on_board(treatments, window.end, &config.model),
        cob: carbs_on_board(treatments, window.end, config.model.carb_absorption_rate),
        delta: bucketed_delta(&in_window),
        prediction: predict(&in_window),
    };

    tracing::info!(
        "Built report for {} .. {}: {} readings, {} patterns",
        window.start,
        window.end,
        report.summary.count,
        report.patterns.len()
    );
    report
}
