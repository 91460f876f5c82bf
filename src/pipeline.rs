//! Load pipeline - staged files into the store in foreign-key order
//!
//! Every step reports its own outcome. What happens after a failed step is
//! governed by [`FailurePolicy`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::storage::{EmrStore, LoadMode, LoadReport, Table, clear_tables, load_table};

/// What the pipeline does once a step has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the steps already committed, skip the rest
    #[default]
    Stop,
    /// Keep going with the remaining steps
    Continue,
    /// Run every step in one transaction; any failure rolls everything back
    AllOrNothing,
}

impl std::str::FromStr for FailurePolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "stop" => Ok(FailurePolicy::Stop),
            "continue" => Ok(FailurePolicy::Continue),
            "all_or_nothing" | "atomic" => Ok(FailurePolicy::AllOrNothing),
            other => Err(crate::Error::Config(format!("unknown failure policy: {}", other))),
        }
    }
}

/// Outcome of a single load step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Loaded(LoadReport),
    Failed { error: String },
    /// Not attempted, or rolled back with the rest of an atomic run
    Skipped,
}

/// Per-table outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub table: Table,
    pub source: PathBuf,
    pub outcome: StepOutcome,
}

/// Result of a full pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub steps: Vec<StepResult>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.outcome, StepOutcome::Loaded(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
    }

    pub fn rows_loaded(&self) -> usize {
        self.steps
            .iter()
            .map(|s| match &s.outcome {
                StepOutcome::Loaded(report) => report.rows,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome(&self, table: Table) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.table == table).map(|s| &s.outcome)
    }
}

/// Loads the four staged datasets into an [`EmrStore`]
#[derive(Debug, Clone)]
pub struct Pipeline {
    staging_dir: PathBuf,
    mode: LoadMode,
    policy: FailurePolicy,
}

impl Pipeline {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            mode: LoadMode::default(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Staged file for a table: `<staging_dir>/<stem>.csv`
    pub fn source_for(&self, table: Table) -> PathBuf {
        self.staging_dir.join(format!("{}.csv", table.staged_stem()))
    }

    /// Run every load step. Only errors that prevent the run itself
    /// (e.g. opening a transaction) are returned as `Err`; per-step failures
    /// are recorded in the report.
    pub fn run(&self, store: &mut EmrStore) -> Result<PipelineReport> {
        tracing::info!(
            staging = %self.staging_dir.display(),
            policy = ?self.policy,
            mode = ?self.mode,
            "Starting load phase"
        );

        let report = match self.policy {
            FailurePolicy::AllOrNothing => self.run_atomic(store)?,
            FailurePolicy::Stop | FailurePolicy::Continue => self.run_stepwise(store)?,
        };

        if report.succeeded() {
            tracing::info!(rows = report.rows_loaded(), "Data successfully loaded into the database");
        } else {
            for failed in report.failures() {
                if let StepOutcome::Failed { error } = &failed.outcome {
                    tracing::error!(table = %failed.table, "An error occurred: {}", error);
                }
            }
        }
        Ok(report)
    }

    /// One transaction per table. A reload first empties every table,
    /// children first, in its own transaction; the steps then only insert.
    fn run_stepwise(&self, store: &mut EmrStore) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        let mut halted = false;

        if self.mode == LoadMode::Reload {
            let tx = store.transaction()?;
            clear_tables(&tx)?;
            tx.commit()?;
            tracing::info!("Cleared every table for reload");
        }

        for table in Table::LOAD_ORDER {
            let source = self.source_for(table);
            if halted {
                report.steps.push(skipped(table, source));
                continue;
            }

            let tx = store.transaction()?;
            let outcome = match load_table(&tx, &source, table, LoadMode::Upsert) {
                Ok(loaded) => {
                    tx.commit()?;
                    tracing::info!(table = %table, rows = loaded.rows, "Loaded {}", source.display());
                    StepOutcome::Loaded(loaded)
                }
                Err(e) => {
                    // dropping tx rolls this table back
                    drop(tx);
                    halted = self.policy == FailurePolicy::Stop;
                    StepOutcome::Failed { error: e.to_string() }
                }
            };
            report.steps.push(StepResult { table, source, outcome });
        }
        Ok(report)
    }

    /// Every table inside one transaction, including the reload's clearing
    fn run_atomic(&self, store: &mut EmrStore) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        let tx = store.transaction()?;
        let mut failed = false;
        if self.mode == LoadMode::Reload {
            clear_tables(&tx)?;
        }

        for table in Table::LOAD_ORDER {
            let source = self.source_for(table);
            if failed {
                report.steps.push(skipped(table, source));
                continue;
            }
            let outcome = match load_table(&tx, &source, table, LoadMode::Upsert) {
                Ok(loaded) => StepOutcome::Loaded(loaded),
                Err(e) => {
                    failed = true;
                    StepOutcome::Failed { error: e.to_string() }
                }
            };
            report.steps.push(StepResult { table, source, outcome });
        }

        if failed {
            tx.rollback()?;
            for step in &mut report.steps {
                if matches!(step.outcome, StepOutcome::Loaded(_)) {
                    step.outcome = StepOutcome::Skipped;
                }
            }
            tracing::warn!("Load rolled back, no table was changed");
        } else {
            tx.commit()?;
            for step in &report.steps {
                if let StepOutcome::Loaded(loaded) = &step.outcome {
                    tracing::info!(table = %step.table, rows = loaded.rows, "Loaded {}", step.source.display());
                }
            }
        }
        Ok(report)
    }
}

fn skipped(table: Table, source: PathBuf) -> StepResult {
    StepResult {
        table,
        source,
        outcome: StepOutcome::Skipped,
    }
}
