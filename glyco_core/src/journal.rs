//! JSON-lines journals for readings and treatments.
//!
//! Records are appended one JSON object per line under an exclusive file
//! lock and read back under a shared lock, so the CLI and a running
//! `glyco watch` can use the same data directory concurrently.

use crate::{EventType, GlucoseReading, Result, Treatment};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

/// Supplies ordered glucose readings for a time range
pub trait ReadingSource {
    fn readings(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<GlucoseReading>>;
}

/// Supplies treatments for a time range, optionally limited to some kinds
pub trait TreatmentSource {
    fn treatments(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: Option<&[EventType]>,
    ) -> Result<Vec<Treatment>>;
}

/// Append-only JSON-lines file with advisory locking
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Append several records under a single lock
    pub fn append_all<T: Serialize>(&self, records: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = BufWriter::new(&file);
        for record in records {
            let line = serde_json::to_string(record)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended {} records to {:?}", records.len(), self.path);
        Ok(())
    }

    /// Read every parseable record; malformed lines are logged and skipped
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut records = Vec::new();

        for (line_num, bytes) in reader.split(b'\n').enumerate() {
            let bytes = bytes?;
            let Ok(line) = std::str::from_utf8(&bytes) else {
                tracing::warn!(
                    "Skipping non-UTF-8 record at {:?} line {}",
                    self.path,
                    line_num + 1
                );
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed record at {:?} line {}: {}",
                        self.path,
                        line_num + 1,
                        e
                    );
                }
            }
        }

        file.unlock()?;
        tracing::debug!("Read {} records from {:?}", records.len(), self.path);
        Ok(records)
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

/// Reading and treatment journals inside one data directory
pub struct JournalStore {
    readings: JsonlJournal,
    treatments: JsonlJournal,
}

impl JournalStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            readings: JsonlJournal::new(data_dir.join("readings.jsonl")),
            treatments: JsonlJournal::new(data_dir.join("treatments.jsonl")),
        }
    }

    pub fn record_reading(&self, reading: &GlucoseReading) -> Result<()> {
        self.readings.append(reading)
    }

    pub fn record_readings(&self, readings: &[GlucoseReading]) -> Result<()> {
        self.readings.append_all(readings)
    }

    /// Append a treatment, assigning an id when it has none
    pub fn record_treatment(&self, treatment: &Treatment) -> Result<Uuid> {
        let id = treatment.id.unwrap_or_else(Uuid::new_v4);
        let stored = Treatment {
            id: Some(id),
            ..treatment.clone()
        };
        self.treatments.append(&stored)?;
        tracing::info!("Recorded {:?} treatment {}", stored.event_type, id);
        Ok(id)
    }

    /// Latest modification time of either journal.
    ///
    /// A change between two polls means new data was recorded.
    pub fn modified_marker(&self) -> Option<SystemTime> {
        self.readings.modified().max(self.treatments.modified())
    }
}

impl ReadingSource for JournalStore {
    fn readings(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<GlucoseReading>> {
        let mut readings: Vec<GlucoseReading> = self
            .readings
            .read_all::<GlucoseReading>()?
            .into_iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .collect();
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }
}

impl TreatmentSource for JournalStore {
    fn treatments(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: Option<&[EventType]>,
    ) -> Result<Vec<Treatment>> {
        let mut treatments: Vec<Treatment> = self
            .treatments
            .read_all::<Treatment>()?
            .into_iter()
            .filter(|t| t.occurred_at >= start && t.occurred_at <= end)
            .filter(|t| filter.map_or(true, |kinds| kinds.contains(&t.event_type)))
            .collect();
        treatments.sort_by_key(|t| t.occurred_at);
        Ok(treatments)
    }
}
