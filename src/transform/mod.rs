//! Transform stage - raw extracts to cleaned, staged files
//!
//! Each dataset has its own field rules. A value that fails its rule is
//! cleared (written back as an empty cell) and logged. A row whose primary
//! key ends up empty cannot be loaded, so it is dropped and counted. The
//! staged files produced here are what the loader reads.

pub mod icd;
pub mod lab;
pub mod patient;
pub mod rules;
pub mod visit;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::storage::Table;
use crate::{Error, Result};

/// Verdict of a field rule for one cell
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Value is fine as is
    Keep,
    /// Value is fine but normalized
    Set(String),
    /// Value is invalid; cleared and logged with the reason
    Clear(&'static str),
    /// Value is missing; cleared without a warning
    Blank,
}

/// An in-memory table of optional string cells
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Frame {
    /// Build a frame from string literals; empty strings become missing cells
    pub fn from_records(name: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| cell(c)).collect())
                .collect(),
        }
    }

    /// Read a raw extract, repairing lines wrapped in stray outer quotes
    pub fn read_raw(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::DataFormat(format!("cannot read {}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::parse(&name, repair_quotes(&text).as_bytes())
            .map_err(|e| Error::DataFormat(format!("{}: {}", path.display(), e)))
    }

    /// Read a well-formed CSV file
    pub fn read_csv(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::DataFormat(format!("cannot read {}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::parse(&name, bytes.as_slice())
            .map_err(|e| Error::DataFormat(format!("{}: {}", path.display(), e)))
    }

    fn parse(name: &str, input: &[u8]) -> csv::Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
        let headers = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(cell).collect());
        }
        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| Error::DataFormat(format!("cannot write {}: {}", path.display(), e)))?;
        let write_err = |e: csv::Error| Error::DataFormat(format!("cannot write {}: {}", path.display(), e));
        writer.write_record(&self.headers).map_err(write_err)?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))
                .map_err(write_err)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.headers.iter().position(|h| h == column).ok_or_else(|| {
            Error::DataFormat(format!("{}: missing column '{}'", self.name, column))
        })
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    pub fn set(&mut self, row: usize, column: &str, value: Option<String>) -> Result<()> {
        let idx = self.column_index(column)?;
        if let Some(slot) = self.rows.get_mut(row).and_then(|r| r.get_mut(idx)) {
            *slot = value;
        }
        Ok(())
    }

    /// Apply a field rule to every cell of `column`, returning how many
    /// cells were cleared.
    pub fn check_column<F>(&mut self, column: &str, mut rule: F) -> Result<usize>
    where
        F: FnMut(Option<&str>) -> Check,
    {
        let idx = self.column_index(column)?;
        let mut cleared = 0;
        for (row_idx, row) in self.rows.iter_mut().enumerate() {
            let Some(slot) = row.get_mut(idx) else {
                continue;
            };
            match rule(slot.as_deref()) {
                Check::Keep => {}
                Check::Set(value) => *slot = Some(value),
                Check::Clear(reason) => {
                    tracing::warn!(
                        "{}: invalid {} at row {}: '{}' ({})",
                        self.name,
                        column,
                        row_idx,
                        slot.as_deref().unwrap_or(""),
                        reason
                    );
                    if slot.take().is_some() {
                        cleared += 1;
                    }
                }
                Check::Blank => {
                    if slot.take().is_some() {
                        cleared += 1;
                    }
                }
            }
        }
        tracing::debug!("{}: {} validation complete", self.name, column);
        Ok(cleared)
    }

    /// Remove rows with no value in `column`, returning how many went.
    pub fn drop_rows_missing(&mut self, column: &str) -> Result<usize> {
        let idx = self.column_index(column)?;
        let before = self.rows.len();
        let mut row_idx = 0;
        self.rows.retain(|row| {
            let keep = row.get(idx).is_some_and(Option::is_some);
            if !keep {
                tracing::warn!("{}: dropping row {} with no {}", self.name, row_idx, column);
            }
            row_idx += 1;
            keep
        });
        Ok(before - self.rows.len())
    }
}

fn cell(raw: &str) -> Option<String> {
    if raw.is_empty() { None } else { Some(raw.to_string()) }
}

/// Drop blank lines, strip one pair of quotes wrapping a whole line and
/// collapse doubled quotes.
pub fn repair_quotes(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.len() >= 2 && line.starts_with('"') && line.ends_with('"') {
                line[1..line.len() - 1].replace("\"\"", "\"")
            } else {
                line.replace("\"\"", "\"")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of cleaning one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformReport {
    pub table: Table,
    /// Rows written to the staged file
    pub rows: usize,
    pub cleared: usize,
    /// Rows left out because their primary key was missing or invalid
    pub dropped: usize,
    pub output: PathBuf,
}

/// Run the field rules for `table` over `frame`
pub fn clean(table: Table, frame: &mut Frame) -> Result<usize> {
    match table {
        Table::IcdReference => icd::clean(frame),
        Table::Patients => patient::clean(frame),
        Table::Visits => visit::clean(frame),
        Table::LabResults => lab::clean(frame),
    }
}

/// Read `<raw_dir>/<raw stem>.csv`, clean it and write
/// `<staging_dir>/<staged stem>.csv`.
pub fn transform_table(table: Table, raw_dir: &Path, staging_dir: &Path) -> Result<TransformReport> {
    let input = raw_dir.join(format!("{}.csv", table.raw_stem()));
    let output = staging_dir.join(format!("{}.csv", table.staged_stem()));

    let mut frame = Frame::read_raw(&input)?;
    tracing::debug!("{}: {} rows loaded", frame.name(), frame.len());
    let cleared = clean(table, &mut frame)?;
    let dropped = frame.drop_rows_missing(table.primary_key())?;

    if !staging_dir.exists() {
        std::fs::create_dir_all(staging_dir)?;
    }
    frame.write_csv(&output)?;
    tracing::info!(table = %table, cleared, dropped, "Data staged to {}", output.display());

    Ok(TransformReport {
        table,
        rows: frame.len(),
        cleared,
        dropped,
        output,
    })
}

/// Transform every dataset, stopping at the first failure
pub fn transform_all(raw_dir: &Path, staging_dir: &Path) -> Result<Vec<TransformReport>> {
    Table::LOAD_ORDER
        .iter()
        .map(|table| transform_table(*table, raw_dir, staging_dir))
        .collect()
}
