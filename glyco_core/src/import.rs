//! CGM CSV export import.
//!
//! Expected headers: `timestamp,value` with an optional `unit` column.
//! Timestamps are RFC 3339; values in mmol/L are converted to mg/dL.

use crate::{Error, GlucoseReading, Result};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::Path;

/// mg/dL per mmol/L of glucose
pub const MMOL_TO_MGDL: f64 = 18.0182;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    value: f64,
    #[serde(default)]
    unit: Option<String>,
}

impl TryFrom<CsvRow> for GlucoseReading {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(row.timestamp.trim())
            .map_err(|e| Error::Import(format!("Invalid timestamp {:?}: {}", row.timestamp, e)))?
            .with_timezone(&Utc);

        let value = match row.unit.as_deref().map(|u| u.trim().to_lowercase()) {
            None => row.value,
            Some(unit) if unit.is_empty() || unit == "mg/dl" => row.value,
            Some(unit) if unit == "mmol/l" => row.value * MMOL_TO_MGDL,
            Some(unit) => return Err(Error::Import(format!("Unknown unit {:?}", unit))),
        };

        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Import(format!("Invalid glucose value {}", value)));
        }

        Ok(GlucoseReading::new(timestamp, value))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Read a CGM export, skipping rows that do not parse.
///
/// Returns the readings sorted by timestamp.
pub fn import_readings_csv(path: &Path) -> Result<(Vec<GlucoseReading>, ImportSummary)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut readings = Vec::new();
    let mut summary = ImportSummary::default();

    for (row_num, result) in reader.deserialize::<CsvRow>().enumerate() {
        let parsed = result
            .map_err(Error::from)
            .and_then(GlucoseReading::try_from);
        match parsed {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                summary.skipped += 1;
                tracing::warn!("Skipping row {} of {:?}: {}", row_num + 2, path, e);
            }
        }
    }

    readings.sort_by_key(|r| r.timestamp);
    summary.imported = readings.len();
    tracing::info!(
        "Imported {} readings from {:?} ({} skipped)",
        summary.imported,
        path,
        summary.skipped
    );
    Ok((readings, summary))
}
