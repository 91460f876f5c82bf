//! Table loader - staged CSV into a schema table
//!
//! The header of the staged file is checked against the table descriptor
//! before anything is written. The loader never commits; callers decide the
//! transaction boundary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::{Deserialize, Serialize};

use super::schema::{ColumnType, Table};
use crate::{Error, Result};

/// How rows already in the table are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert new keys, overwrite every column of colliding keys
    #[default]
    Upsert,
    /// Empty the table first so it mirrors the source file exactly
    Reload,
}

impl std::str::FromStr for LoadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "upsert" => Ok(LoadMode::Upsert),
            "reload" | "replace" => Ok(LoadMode::Reload),
            other => Err(Error::Config(format!("unknown load mode: {}", other))),
        }
    }
}

/// Outcome of loading one staged file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub table: Table,
    pub rows: usize,
    pub source: PathBuf,
}

/// A staged file read fully into memory, columns reordered to match the
/// table descriptor.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub table: Table,
    pub rows: Vec<Vec<Value>>,
}

impl StagedFile {
    /// Read and type-check a staged CSV for `table`
    pub fn read(path: &Path, table: Table) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::DataFormat(format!("cannot read {}: {}", path.display(), e)))?;

        let headers = reader
            .headers()
            .map_err(|e| Error::DataFormat(format!("{}: {}", path.display(), e)))?
            .clone();
        let positions = column_positions(path, table, &headers)?;

        let columns = table.columns();
        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let line = idx + 1;
            let record =
                record.map_err(|e| Error::DataFormat(format!("{} row {}: {}", path.display(), line, e)))?;
            if record.len() != headers.len() {
                return Err(Error::DataFormat(format!(
                    "{} row {}: expected {} fields, found {}",
                    path.display(),
                    line,
                    headers.len(),
                    record.len()
                )));
            }

            let mut row = Vec::with_capacity(columns.len());
            for (column, &pos) in columns.iter().zip(&positions) {
                let raw = record.get(pos).unwrap_or("");
                let value = to_value(raw, column.kind).ok_or_else(|| {
                    Error::DataFormat(format!(
                        "{} row {}: '{}' is not a number in column {}",
                        path.display(),
                        line,
                        raw,
                        column.name
                    ))
                })?;
                row.push(value);
            }

            if matches!(row[0], Value::Null) {
                return Err(Error::DataFormat(format!(
                    "{} row {}: empty primary key {}",
                    path.display(),
                    line,
                    table.primary_key()
                )));
            }
            rows.push(row);
        }

        Ok(Self { table, rows })
    }

    /// Write every row into the table using `mode`.
    ///
    /// `Reload` refuses to empty a table that child rows still reference;
    /// use [`clear_tables`] to reload the whole schema.
    pub fn write(&self, conn: &Connection, mode: LoadMode) -> Result<usize> {
        if mode == LoadMode::Reload {
            ensure_unreferenced(conn, self.table)?;
            conn.execute(&format!("DELETE FROM {}", self.table.name()), [])?;
        }

        let mut stmt = conn.prepare(&upsert_sql(self.table))?;
        for row in &self.rows {
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(self.rows.len())
    }
}

/// Load `source` into `table` on `conn`.
///
/// The connection is only borrowed: no commit, no close. Wrap the call in a
/// transaction to make the load atomic.
pub fn load_table(conn: &Connection, source: &Path, table: Table, mode: LoadMode) -> Result<LoadReport> {
    let staged = StagedFile::read(source, table)?;
    tracing::debug!(table = %table, rows = staged.rows.len(), "staged file read");
    let rows = staged.write(conn, mode)?;
    Ok(LoadReport {
        table,
        rows,
        source: source.to_path_buf(),
    })
}

/// Empty every table, children first.
pub fn clear_tables(conn: &Connection) -> Result<()> {
    for table in Table::LOAD_ORDER.iter().rev() {
        let removed = conn.execute(&format!("DELETE FROM {}", table.name()), [])?;
        tracing::debug!(table = %table, removed, "table cleared");
    }
    Ok(())
}

fn ensure_unreferenced(conn: &Connection, table: Table) -> Result<()> {
    for child in table.children() {
        for fk in child.foreign_keys().iter().filter(|fk| fk.parent == table) {
            let sql = format!(
                "SELECT COUNT(*) FROM {child} WHERE {col} IN (SELECT {pcol} FROM {parent})",
                child = child.name(),
                col = fk.column,
                pcol = fk.parent_column,
                parent = table.name(),
            );
            let rows: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            if rows > 0 {
                return Err(Error::ReloadBlocked {
                    table,
                    child,
                    rows: rows as usize,
                });
            }
        }
    }
    Ok(())
}

/// Map each declared column to its position in the file header.
fn column_positions(path: &Path, table: Table, headers: &csv::StringRecord) -> Result<Vec<usize>> {
    let names: Vec<&str> = headers.iter().map(str::trim).collect();

    let mut seen = HashSet::new();
    if let Some(dup) = names.iter().find(|n| !seen.insert(**n)) {
        return Err(Error::DataFormat(format!(
            "{}: duplicate column '{}'",
            path.display(),
            dup
        )));
    }

    let unknown: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| table.column(n).is_none())
        .collect();
    let missing: Vec<&str> = table
        .columns()
        .iter()
        .map(|c| c.name)
        .filter(|c| !names.contains(c))
        .collect();

    if !unknown.is_empty() || !missing.is_empty() {
        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("missing [{}]", missing.join(", ")));
        }
        if !unknown.is_empty() {
            problems.push(format!("unexpected [{}]", unknown.join(", ")));
        }
        return Err(Error::DataFormat(format!(
            "{}: header does not match table {}: {}",
            path.display(),
            table,
            problems.join("; ")
        )));
    }

    Ok(table
        .columns()
        .iter()
        .filter_map(|c| names.iter().position(|n| *n == c.name))
        .collect())
}

/// Empty cells become NULL; REAL columns must parse as numbers.
fn to_value(raw: &str, kind: ColumnType) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Value::Null);
    }
    match kind {
        ColumnType::Text | ColumnType::Date => Some(Value::Text(raw.to_string())),
        ColumnType::Real => trimmed.parse::<f64>().ok().map(Value::Real),
    }
}

fn upsert_sql(table: Table) -> String {
    let columns: Vec<&str> = table.columns().iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns[1..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
        table.name(),
        columns.join(", "),
        placeholders.join(", "),
        table.primary_key(),
        updates.join(", ")
    )
}
