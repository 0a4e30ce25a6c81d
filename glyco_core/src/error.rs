//! Error types for the glyco_core library.
//!
//! The numeric engine itself never fails; these errors come from the
//! layers around it (configuration, journals, CSV import, cache fetches).

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for glyco_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// CGM export could not be imported
    #[error("Import error: {0}")]
    Import(String),

    /// A cached fetch failed (shared with every waiter of that fetch)
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
