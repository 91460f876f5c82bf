//! SQLite storage implementation

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction};
use serde::Serialize;

use super::schema::{self, Table};
use crate::Result;

/// Connection-level settings applied when a store is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Enforce declared foreign keys (`PRAGMA foreign_keys`)
    pub foreign_keys: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { foreign_keys: true }
    }
}

/// SQLite-backed storage for the EMR tables
pub struct EmrStore {
    conn: Connection,
    options: StoreOptions,
}

impl EmrStore {
    /// Open a database file (creates it and its directory if missing)
    /// and make sure the schema exists.
    pub fn open(path: &Path, options: &StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, options)
    }

    /// Open a database file that must already exist. Never creates the
    /// file; read-only commands use this so a mistyped path is an error.
    pub fn open_existing(path: &Path, options: &StoreOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no database at {}", path.display()),
            )
            .into());
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        Self::with_connection(conn, options)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(options: &StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, options)
    }

    fn with_connection(conn: Connection, options: &StoreOptions) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", options.foreign_keys)?;
        let store = Self {
            conn,
            options: *options,
        };
        store.initialize_schema()?;
        tracing::debug!(foreign_keys = options.foreign_keys, "schema ready");
        Ok(store)
    }

    /// Initialize the database schema. Every statement is `IF NOT EXISTS`,
    /// so this is a no-op on an already initialized database.
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Borrow the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction; dropping it without `commit` rolls back
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Whether foreign-key enforcement is active on this connection
    pub fn foreign_keys_enabled(&self) -> Result<bool> {
        let enabled: i64 = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        Ok(enabled == 1)
    }

    // ========== Table Queries ==========

    /// Names of the user tables currently present in the database
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Count rows in a table
    pub fn count_rows(&self, table: Table) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Fetch one row by primary key, keyed by column name
    pub fn get_row(&self, table: Table, key: &str) -> Result<Option<BTreeMap<String, Value>>> {
        let columns: Vec<&str> = table.columns().iter().map(|c| c.name).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            columns.join(", "),
            table.name(),
            table.primary_key()
        );
        self.conn
            .query_row(&sql, [key], |row| {
                let mut map = BTreeMap::new();
                for (idx, name) in columns.iter().enumerate() {
                    map.insert(name.to_string(), row.get::<_, Value>(idx)?);
                }
                Ok(map)
            })
            .optional()
            .map_err(Into::into)
    }

    /// Rows whose foreign keys point at a missing parent.
    ///
    /// Only meaningful when enforcement is off; with it on, such rows are
    /// rejected at write time.
    pub fn foreign_key_violations(&self) -> Result<Vec<ForeignKeyViolation>> {
        let mut violations = Vec::new();
        for table in Table::LOAD_ORDER {
            for fk in table.foreign_keys() {
                let sql = format!(
                    "SELECT c.{pk}, c.{col} FROM {child} c \
                     LEFT JOIN {parent} p ON p.{pcol} = c.{col} \
                     WHERE c.{col} IS NOT NULL AND p.{pcol} IS NULL \
                     ORDER BY c.{pk}",
                    pk = table.primary_key(),
                    col = fk.column,
                    child = table.name(),
                    parent = fk.parent.name(),
                    pcol = fk.parent_column,
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let found = stmt
                    .query_map([], |row| {
                        Ok(ForeignKeyViolation {
                            table,
                            key: row.get(0)?,
                            column: fk.column,
                            missing: row.get(1)?,
                            parent: fk.parent,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                violations.extend(found);
            }
        }
        Ok(violations)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            icd_reference: self.count_rows(Table::IcdReference)?,
            patients: self.count_rows(Table::Patients)?,
            visits: self.count_rows(Table::Visits)?,
            lab_results: self.count_rows(Table::LabResults)?,
        })
    }
}

/// A child row whose foreign key has no matching parent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyViolation {
    pub table: Table,
    pub key: String,
    pub column: &'static str,
    pub missing: String,
    pub parent: Table,
}

impl std::fmt::Display for ForeignKeyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: {} = '{}' not found in {}",
            self.table, self.key, self.column, self.missing, self.parent
        )
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub icd_reference: usize,
    pub patients: usize,
    pub visits: usize,
    pub lab_results: usize,
}

impl DbStats {
    pub fn rows(&self) -> [(Table, usize); 4] {
        [
            (Table::IcdReference, self.icd_reference),
            (Table::Patients, self.patients),
            (Table::Visits, self.visits),
            (Table::LabResults, self.lab_results),
        ]
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  ICD reference: {}", self.icd_reference)?;
        writeln!(f, "  Patients: {}", self.patients)?;
        writeln!(f, "  Visits: {}", self.visits)?;
        writeln!(f, "  Lab results: {}", self.lab_results)
    }
}
