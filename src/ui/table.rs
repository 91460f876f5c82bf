use tabled::{Table, Tabled, settings::Style};

use crate::pipeline::{PipelineReport, StepOutcome};
use crate::storage::DbStats;
use crate::transform::TransformReport;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Rows")]
    pub rows: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            table: label.to_string(),
            rows: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Row counts per table
pub fn stats_table(stats: &DbStats) -> String {
    let mut builder = TableBuilder::new();
    for (table, count) in stats.rows() {
        builder.add_row(table.name(), &count.to_string());
    }
    builder.build()
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Rows")]
    rows: String,
    #[tabled(rename = "Source")]
    source: String,
}

pub fn steps_table(report: &PipelineReport) -> String {
    let rows: Vec<StepRow> = report
        .steps
        .iter()
        .map(|step| {
            let (status, rows) = match &step.outcome {
                StepOutcome::Loaded(load) => ("loaded".to_string(), load.rows.to_string()),
                StepOutcome::Failed { .. } => ("failed".to_string(), "-".to_string()),
                StepOutcome::Skipped => ("skipped".to_string(), "-".to_string()),
            };
            StepRow {
                table: step.table.name().to_string(),
                status,
                rows,
                source: step.source.display().to_string(),
            }
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct TransformRow {
    #[tabled(rename = "Dataset")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Cleared")]
    cleared: usize,
    #[tabled(rename = "Dropped")]
    dropped: usize,
    #[tabled(rename = "Staged")]
    output: String,
}

pub fn transform_table(reports: &[TransformReport]) -> String {
    let rows: Vec<TransformRow> = reports
        .iter()
        .map(|r| TransformRow {
            table: r.table.raw_stem().to_string(),
            rows: r.rows,
            cleared: r.cleared,
            dropped: r.dropped,
            output: r.output.display().to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
