#![forbid(unsafe_code)]

//! Core engine for the Glyco glucose monitor.
//!
//! This crate provides:
//! - Domain types (readings, treatments, thresholds, model parameters)
//! - Insulin and carbs on board
//! - Trend deltas and a heuristic 60-minute prediction
//! - Summary statistics, time in range, hourly patterns and pattern detection
//! - Distribution and variability indices
//! - Persistence (JSON-lines journals, CSV import) and a fetch cache

pub mod types;
pub mod error;
pub mod numeric;
pub mod iob;
pub mod cob;
pub mod trend;
pub mod stats;
pub mod patterns;
pub mod distribution;
pub mod report;
pub mod cache;
pub mod config;
pub mod journal;
pub mod import;
pub mod logging;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use cache::FetchCache;
pub use config::Config;
pub use journal::{JournalStore, ReadingSource, TreatmentSource};
pub use import::{import_readings_csv, ImportSummary};
pub use iob::{insulin_on_board, IobResult};
pub use cob::carbs_on_board;
pub use trend::{bucketed_delta, predict, GlucoseDelta, PredictedPoint, TrendDirection};
pub use stats::{hourly_patterns, summarize, time_in_range};
pub use patterns::detect_patterns;
pub use distribution::analyze_distribution;
pub use report::{build_report, GlucoseReport, ReportWindow};
