//! Database schema definitions
//!
//! Each table carries an explicit descriptor (ordered, typed columns plus its
//! primary key) that the loader checks staged file headers against.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// SQL to create the ICD reference table
pub const CREATE_ICD_REFERENCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS icd_reference (
    icd_code TEXT PRIMARY KEY,
    description TEXT,
    effective_date DATE,
    status TEXT
)
"#;

/// SQL to create the patients table
pub const CREATE_PATIENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS patients (
    patient_id TEXT PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    date_of_birth DATE,
    gender TEXT,
    address TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    phone TEXT,
    insurance_id TEXT,
    insurance_effective_date DATE
)
"#;

/// SQL to create the visits table
pub const CREATE_VISITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS visits (
    visit_id TEXT PRIMARY KEY,
    patient_id TEXT,
    provider_id TEXT,
    visit_date DATE,
    location TEXT,
    reason_for_visit TEXT,
    icd_code TEXT,
    visit_status TEXT,
    billable_amount REAL,
    currency TEXT,
    follow_up_date DATE,
    FOREIGN KEY (patient_id) REFERENCES patients(patient_id),
    FOREIGN KEY (icd_code) REFERENCES icd_reference(icd_code)
)
"#;

/// SQL to create the lab_results table
pub const CREATE_LAB_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lab_results (
    lab_id TEXT PRIMARY KEY,
    visit_id TEXT,
    test_name TEXT,
    test_value TEXT,
    test_units TEXT,
    reference_range TEXT,
    date_performed DATE,
    date_resulted DATE,
    FOREIGN KEY (visit_id) REFERENCES visits(visit_id)
)
"#;

/// SQL to create indexes on foreign-key columns
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id)",
    "CREATE INDEX IF NOT EXISTS idx_visits_icd ON visits(icd_code)",
    "CREATE INDEX IF NOT EXISTS idx_lab_results_visit ON lab_results(visit_id)",
];

/// All schema creation statements, parents before children
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_ICD_REFERENCE_TABLE,
        CREATE_PATIENTS_TABLE,
        CREATE_VISITS_TABLE,
        CREATE_LAB_RESULTS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Storage class of a column as declared in the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    /// ISO-8601 `YYYY-MM-DD`, stored as text
    Date,
    Real,
}

/// A single column of a table descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
}

const fn text(name: &'static str) -> Column {
    Column { name, kind: ColumnType::Text }
}

const fn date(name: &'static str) -> Column {
    Column { name, kind: ColumnType::Date }
}

const fn real(name: &'static str) -> Column {
    Column { name, kind: ColumnType::Real }
}

const ICD_REFERENCE_COLUMNS: &[Column] = &[
    text("icd_code"),
    text("description"),
    date("effective_date"),
    text("status"),
];

const PATIENT_COLUMNS: &[Column] = &[
    text("patient_id"),
    text("first_name"),
    text("last_name"),
    date("date_of_birth"),
    text("gender"),
    text("address"),
    text("city"),
    text("state"),
    text("zip"),
    text("phone"),
    text("insurance_id"),
    date("insurance_effective_date"),
];

const VISIT_COLUMNS: &[Column] = &[
    text("visit_id"),
    text("patient_id"),
    text("provider_id"),
    date("visit_date"),
    text("location"),
    text("reason_for_visit"),
    text("icd_code"),
    text("visit_status"),
    real("billable_amount"),
    text("currency"),
    date("follow_up_date"),
];

const LAB_RESULT_COLUMNS: &[Column] = &[
    text("lab_id"),
    text("visit_id"),
    text("test_name"),
    text("test_value"),
    text("test_units"),
    text("reference_range"),
    date("date_performed"),
    date("date_resulted"),
];

/// A foreign-key reference declared on a child table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub parent: Table,
    pub parent_column: &'static str,
}

/// The four tables of the EMR schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    IcdReference,
    Patients,
    Visits,
    LabResults,
}

impl Table {
    /// Load order that respects the foreign-key graph
    pub const LOAD_ORDER: [Table; 4] = [
        Table::IcdReference,
        Table::Patients,
        Table::Visits,
        Table::LabResults,
    ];

    /// SQL table name
    pub fn name(&self) -> &'static str {
        match self {
            Table::IcdReference => "icd_reference",
            Table::Patients => "patients",
            Table::Visits => "visits",
            Table::LabResults => "lab_results",
        }
    }

    /// File stem of the raw extract for this table
    pub fn raw_stem(&self) -> &'static str {
        match self {
            Table::IcdReference => "icd_reference",
            Table::Patients => "patient_data",
            Table::Visits => "visit_data",
            Table::LabResults => "lab_results",
        }
    }

    /// File stem of the cleaned, staged file for this table
    pub fn staged_stem(&self) -> &'static str {
        match self {
            Table::IcdReference => "icd_reference_cln",
            Table::Patients => "patient_data_cln",
            Table::Visits => "visit_data_cln",
            Table::LabResults => "lab_results_cln",
        }
    }

    /// Ordered, typed column list
    pub fn columns(&self) -> &'static [Column] {
        match self {
            Table::IcdReference => ICD_REFERENCE_COLUMNS,
            Table::Patients => PATIENT_COLUMNS,
            Table::Visits => VISIT_COLUMNS,
            Table::LabResults => LAB_RESULT_COLUMNS,
        }
    }

    /// Primary key column (always the first declared column)
    pub fn primary_key(&self) -> &'static str {
        self.columns()[0].name
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    pub fn foreign_keys(&self) -> &'static [ForeignKey] {
        match self {
            Table::IcdReference | Table::Patients => &[],
            Table::Visits => &[
                ForeignKey {
                    column: "patient_id",
                    parent: Table::Patients,
                    parent_column: "patient_id",
                },
                ForeignKey {
                    column: "icd_code",
                    parent: Table::IcdReference,
                    parent_column: "icd_code",
                },
            ],
            Table::LabResults => &[ForeignKey {
                column: "visit_id",
                parent: Table::Visits,
                parent_column: "visit_id",
            }],
        }
    }

    /// Tables whose foreign keys point at this one
    pub fn children(&self) -> Vec<Table> {
        Table::LOAD_ORDER
            .into_iter()
            .filter(|t| t.foreign_keys().iter().any(|fk| fk.parent == *self))
            .collect()
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "icd_reference" | "icd" => Ok(Table::IcdReference),
            "patients" | "patient" => Ok(Table::Patients),
            "visits" | "visit" => Ok(Table::Visits),
            "lab_results" | "labs" | "lab" => Ok(Table::LabResults),
            _ => Err(Error::UnknownTable(s.to_string())),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
