//! End-to-end tests for the load stage: staged files in, joined rows out.

use std::path::Path;

use emr_etl::storage::load_table;
use emr_etl::{EmrStore, FailurePolicy, LoadMode, Pipeline, StepOutcome, StoreOptions, Table};
use rusqlite::types::Value;

const ICD: &str = "icd_code,description,effective_date,status\n\
                   A00,Cholera,2020-01-01,Active\n";
const PATIENTS: &str = "patient_id,first_name,last_name,date_of_birth,gender,address,city,state,zip,phone,insurance_id,insurance_effective_date\n\
                        P1,Ana,Lopez,1985-03-02,F,12 Elm Street,Austin,TX,73301,(512) 555-0101,INS001,2023-01-01\n";
const VISITS: &str = "visit_id,patient_id,provider_id,visit_date,location,reason_for_visit,icd_code,visit_status,billable_amount,currency,follow_up_date\n\
                      V1,P1,PR1,2024-01-10,Main Clinic,Diarrhea,A00,Completed,120.50,USD,\n";
const LABS: &str = "lab_id,visit_id,test_name,test_value,test_units,reference_range,date_performed,date_resulted\n\
                    L1,V1,Stool Culture,Positive,,Negative,2024-01-10,2024-01-12\n";

fn stage(dir: &Path, files: &[(Table, &str)]) {
    for (table, contents) in files {
        std::fs::write(dir.join(format!("{}.csv", table.staged_stem())), contents).unwrap();
    }
}

fn stage_all(dir: &Path) {
    stage(
        dir,
        &[
            (Table::IcdReference, ICD),
            (Table::Patients, PATIENTS),
            (Table::Visits, VISITS),
            (Table::LabResults, LABS),
        ],
    );
}

fn total_rows(store: &EmrStore) -> usize {
    store.stats().unwrap().rows().iter().map(|(_, n)| n).sum()
}

#[test]
fn full_load_joins_across_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    stage_all(dir.path());
    let db = dir.path().join("final").join("emr_database.db");

    let mut store = EmrStore::open(&db, &StoreOptions::default()).unwrap();
    let report = Pipeline::new(dir.path()).run(&mut store).unwrap();
    assert!(report.succeeded(), "{:?}", report);
    assert_eq!(report.rows_loaded(), 4);

    let (name, description, test_name): (String, String, String) = store
        .connection()
        .query_row(
            "SELECT p.first_name, i.description, l.test_name
             FROM lab_results l
             JOIN visits v ON v.visit_id = l.visit_id
             JOIN patients p ON p.patient_id = v.patient_id
             JOIN icd_reference i ON i.icd_code = v.icd_code
             WHERE l.lab_id = 'L1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(name, "Ana");
    assert_eq!(description, "Cholera");
    assert_eq!(test_name, "Stool Culture");

    let visit = store.get_row(Table::Visits, "V1").unwrap().unwrap();
    assert_eq!(visit["billable_amount"], Value::Real(120.5));
    assert_eq!(visit["follow_up_date"], Value::Null);
    assert!(store.foreign_key_violations().unwrap().is_empty());
}

#[test]
fn rerunning_the_pipeline_keeps_one_row_per_key() {
    let dir = tempfile::tempdir().unwrap();
    stage_all(dir.path());
    let mut store = EmrStore::open_in_memory(&StoreOptions::default()).unwrap();

    let pipeline = Pipeline::new(dir.path());
    assert!(pipeline.run(&mut store).unwrap().succeeded());

    stage(
        dir.path(),
        &[(
            Table::IcdReference,
            "icd_code,description,effective_date,status\nA00,Cholera due to Vibrio cholerae,2021-06-01,Inactive\n",
        )],
    );
    assert!(pipeline.run(&mut store).unwrap().succeeded());

    assert_eq!(total_rows(&store), 4);
    let icd = store.get_row(Table::IcdReference, "A00").unwrap().unwrap();
    assert_eq!(icd["description"], Value::Text("Cholera due to Vibrio cholerae".into()));
    assert_eq!(icd["status"], Value::Text("Inactive".into()));
}

#[test]
fn missing_lab_file_with_stop_keeps_earlier_tables() {
    let dir = tempfile::tempdir().unwrap();
    stage(
        dir.path(),
        &[(Table::IcdReference, ICD), (Table::Patients, PATIENTS), (Table::Visits, VISITS)],
    );
    let mut store = EmrStore::open_in_memory(&StoreOptions::default()).unwrap();

    let report = Pipeline::new(dir.path()).run(&mut store).unwrap();

    assert!(!report.succeeded());
    let failures: Vec<_> = report.failures().map(|s| s.table).collect();
    assert_eq!(failures, vec![Table::LabResults]);
    assert_eq!(store.count_rows(Table::IcdReference).unwrap(), 1);
    assert_eq!(store.count_rows(Table::Patients).unwrap(), 1);
    assert_eq!(store.count_rows(Table::Visits).unwrap(), 1);
    assert_eq!(store.count_rows(Table::LabResults).unwrap(), 0);
}

#[test]
fn missing_lab_file_with_all_or_nothing_keeps_nothing() {
    let dir = tempfile::tempdir().unwrap();
    stage(
        dir.path(),
        &[(Table::IcdReference, ICD), (Table::Patients, PATIENTS), (Table::Visits, VISITS)],
    );
    let mut store = EmrStore::open_in_memory(&StoreOptions::default()).unwrap();

    let report = Pipeline::new(dir.path())
        .with_policy(FailurePolicy::AllOrNothing)
        .run(&mut store)
        .unwrap();

    assert!(!report.succeeded());
    assert!(matches!(report.outcome(Table::LabResults), Some(StepOutcome::Failed { .. })));
    assert_eq!(report.outcome(Table::Visits), Some(&StepOutcome::Skipped));
    assert_eq!(total_rows(&store), 0);
}

#[test]
fn visits_before_patients_fails_when_enforced() {
    let dir = tempfile::tempdir().unwrap();
    stage(dir.path(), &[(Table::IcdReference, ICD), (Table::Visits, VISITS)]);
    let store = EmrStore::open_in_memory(&StoreOptions::default()).unwrap();
    let visits = dir.path().join("visit_data_cln.csv");

    load_table(
        store.connection(),
        &dir.path().join("icd_reference_cln.csv"),
        Table::IcdReference,
        LoadMode::Upsert,
    )
    .unwrap();
    let err = load_table(store.connection(), &visits, Table::Visits, LoadMode::Upsert).unwrap_err();

    assert!(err.is_storage(), "{err}");
    assert_eq!(store.count_rows(Table::Visits).unwrap(), 0);
}

#[test]
fn visits_before_patients_is_reported_when_unenforced() {
    let dir = tempfile::tempdir().unwrap();
    stage(dir.path(), &[(Table::Visits, VISITS)]);
    let store = EmrStore::open_in_memory(&StoreOptions { foreign_keys: false }).unwrap();

    let report = load_table(
        store.connection(),
        &dir.path().join("visit_data_cln.csv"),
        Table::Visits,
        LoadMode::Upsert,
    )
    .unwrap();
    assert_eq!(report.rows, 1);

    let violations = store.foreign_key_violations().unwrap();
    let columns: Vec<&str> = violations.iter().map(|v| v.column).collect();
    assert_eq!(violations.len(), 2);
    assert!(columns.contains(&"patient_id"));
    assert!(columns.contains(&"icd_code"));
}

#[test]
fn init_is_idempotent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    stage_all(dir.path());
    let db = dir.path().join("emr.db");

    {
        let mut store = EmrStore::open(&db, &StoreOptions::default()).unwrap();
        assert!(Pipeline::new(dir.path()).run(&mut store).unwrap().succeeded());
    }

    let store = EmrStore::open(&db, &StoreOptions::default()).unwrap();
    let mut tables = store.table_names().unwrap();
    tables.sort();
    assert_eq!(tables, vec!["icd_reference", "lab_results", "patients", "visits"]);
    assert_eq!(total_rows(&store), 4);
}

#[test]
fn reload_runs_twice_on_disk_and_single_parent_reload_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    stage_all(dir.path());
    let db = dir.path().join("emr.db");
    let pipeline = Pipeline::new(dir.path()).with_mode(LoadMode::Reload);

    for _ in 0..2 {
        let mut store = EmrStore::open(&db, &StoreOptions::default()).unwrap();
        let report = pipeline.run(&mut store).unwrap();
        assert!(report.succeeded(), "{:?}", report);
        assert_eq!(total_rows(&store), 4);
    }

    let mut store = EmrStore::open_existing(&db, &StoreOptions::default()).unwrap();
    let tx = store.transaction().unwrap();
    let source = pipeline.source_for(Table::Patients);
    let err = load_table(&tx, &source, Table::Patients, LoadMode::Reload).unwrap_err();
    assert!(matches!(err, emr_etl::Error::ReloadBlocked { child: Table::Visits, .. }), "{err}");
    drop(tx);
    assert_eq!(total_rows(&store), 4);
}
