//! # emr-etl - Healthcare records ETL
//!
//! Cleans tabular healthcare extracts and loads them into a normalized
//! SQLite schema.
//!
//! emr-etl provides:
//! - Per-dataset field validation for raw CSV extracts (transform stage)
//! - An idempotent four-table schema with declared foreign keys
//! - A header-checked CSV loader with replace-on-conflict writes
//! - A pipeline that loads datasets in foreign-key order with an explicit
//!   outcome per step

pub mod config;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod ui;

// Re-exports for convenient access
pub use pipeline::{FailurePolicy, Pipeline, PipelineReport, StepOutcome};
pub use storage::{EmrStore, LoadMode, LoadReport, StoreOptions, Table};

/// Result type alias for emr-etl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for emr-etl operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cannot reload {table}: {rows} rows in {child} still reference it")]
    ReloadBlocked { table: Table, child: Table, rows: usize },
}

impl Error {
    /// True for failures raised by the database engine
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// True for missing, unreadable or malformed source files
    pub fn is_data_format(&self) -> bool {
        matches!(self, Error::DataFormat(_))
    }
}
