//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - icd_reference(icd_code, description, effective_date, status)
//! - patients(patient_id, names, date_of_birth, gender, address, phone, insurance)
//! - visits(visit_id, patient_id -> patients, icd_code -> icd_reference, ...)
//! - lab_results(lab_id, visit_id -> visits, ...)

pub mod loader;
pub mod schema;
pub mod sqlite;

pub use loader::{LoadMode, LoadReport, StagedFile, clear_tables, load_table};
pub use schema::{Column, ColumnType, ForeignKey, Table};
pub use sqlite::{DbStats, EmrStore, ForeignKeyViolation, StoreOptions};
