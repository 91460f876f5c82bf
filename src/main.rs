//! emr-etl CLI - clean raw EMR extracts and load them into SQLite

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use emr_etl::config::{self, EtlConfig};
use emr_etl::storage::{EmrStore, LoadMode, Table, load_table};
use emr_etl::ui::{self, Icons};
use emr_etl::{FailurePolicy, Pipeline, PipelineReport, StepOutcome, transform};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "emr-etl")]
#[command(version)]
#[command(about = "Clean EMR extracts and load them into a relational SQLite store")]
#[command(long_about = r#"
emr-etl moves four healthcare datasets (ICD reference codes, patients,
visits, lab results) from raw CSV extracts into a SQLite database:

  raw CSV -> transform (field rules) -> staged CSV -> load (upsert by key)

Example usage:
  emr-etl init --write-config
  emr-etl run
  emr-etl load --policy all-or-nothing
  emr-etl load-table visits data/staged/visit_data_cln.csv
  emr-etl stats --format json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (default: emr-etl.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its four tables
    Init {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Also write a default config file
        #[arg(long)]
        write_config: bool,

        /// Overwrite an existing config file
        #[arg(long, requires = "write_config")]
        force: bool,
    },

    /// Clean the raw extracts into the staging directory
    Transform {
        /// Directory holding the raw extracts
        #[arg(short, long)]
        raw: Option<PathBuf>,

        /// Directory to write the staged files to
        #[arg(short, long)]
        staging: Option<PathBuf>,
    },

    /// Load every staged file in foreign-key order
    Load {
        #[command(flatten)]
        load: LoadArgs,
    },

    /// Load one staged file into one table
    LoadTable {
        /// Target table (icd_reference, patients, visits, lab_results)
        table: Table,

        /// Staged CSV file
        source: PathBuf,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// upsert or reload
        #[arg(short, long)]
        mode: Option<LoadMode>,

        /// Do not enforce foreign keys
        #[arg(long)]
        no_foreign_keys: bool,
    },

    /// Transform, then load
    Run {
        /// Directory holding the raw extracts
        #[arg(short, long)]
        raw: Option<PathBuf>,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Show row counts per table
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Report rows whose foreign keys have no parent
    Check {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct LoadArgs {
    /// Path to the database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Directory holding the staged files
    #[arg(short, long)]
    staging: Option<PathBuf>,

    /// What to do after a failed step: stop, continue or all-or-nothing
    #[arg(short, long)]
    policy: Option<FailurePolicy>,

    /// upsert or reload
    #[arg(short, long)]
    mode: Option<LoadMode>,

    /// Do not enforce foreign keys
    #[arg(long)]
    no_foreign_keys: bool,
}

impl LoadArgs {
    fn apply(self, cfg: &mut EtlConfig) {
        if let Some(database) = self.database {
            cfg.database = database;
        }
        if let Some(staging) = self.staging {
            cfg.staging_dir = staging;
        }
        if let Some(policy) = self.policy {
            cfg.failure_policy = policy;
        }
        if let Some(mode) = self.mode {
            cfg.load_mode = mode;
        }
        if self.no_foreign_keys {
            cfg.foreign_keys = false;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;

    init_logging(cli.verbose, &cfg.log_dir)?;

    match cli.command {
        Commands::Init { database, write_config, force } => {
            if let Some(database) = database {
                cfg.database = database;
            }
            if write_config {
                let path = cli.config.clone().unwrap_or_else(config::default_config_path);
                config::write_config(&path, &cfg, force)?;
                ui::info("Config written", &path.display().to_string());
            }

            let store = EmrStore::open(&cfg.database, &cfg.store_options())?;
            ui::success("Schema ready");
            ui::summary_row("Database:", &cfg.database.display().to_string());
            ui::summary_row("Tables:", &store.table_names()?.join(", "));
        }

        Commands::Transform { raw, staging } => {
            if let Some(raw) = raw {
                cfg.raw_dir = raw;
            }
            if let Some(staging) = staging {
                cfg.staging_dir = staging;
            }
            run_transform(&cfg)?;
        }

        Commands::Load { load } => {
            load.apply(&mut cfg);
            let report = run_load(&cfg)?;
            finish(&report)?;
        }

        Commands::LoadTable { table, source, database, mode, no_foreign_keys } => {
            if let Some(database) = database {
                cfg.database = database;
            }
            if no_foreign_keys {
                cfg.foreign_keys = false;
            }
            let mode = mode.unwrap_or(cfg.load_mode);

            let mut store = EmrStore::open(&cfg.database, &cfg.store_options())?;
            let tx = store.transaction()?;
            let report = load_table(&tx, &source, table, mode)
                .with_context(|| format!("loading {} from {}", table, source.display()))?;
            tx.commit()?;

            ui::step(report.table, &StepOutcome::Loaded(report));
        }

        Commands::Run { raw, load } => {
            if let Some(raw) = raw {
                cfg.raw_dir = raw;
            }
            load.apply(&mut cfg);
            run_transform(&cfg)?;
            let report = run_load(&cfg)?;
            finish(&report)?;
        }

        Commands::Stats { database, format } => {
            if let Some(database) = database {
                cfg.database = database;
            }
            let store = EmrStore::open_existing(&cfg.database, &cfg.store_options())?;
            let stats = store.stats()?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("{} EMR database ({})", Icons::STATS, cfg.database.display());
                    println!("{}", ui::stats_table(&stats));
                }
            }
        }

        Commands::Check { database } => {
            if let Some(database) = database {
                cfg.database = database;
            }
            let store = EmrStore::open_existing(&cfg.database, &cfg.store_options())?;
            let violations = store.foreign_key_violations()?;

            if violations.is_empty() {
                ui::success("No foreign key violations");
            } else {
                ui::warn(&format!("{} foreign key violation(s)", violations.len()));
                for violation in &violations {
                    println!("  {} {}", Icons::LINK, violation);
                }
                anyhow::bail!("{} rows reference missing parents", violations.len());
            }
        }
    }

    Ok(())
}

/// Stdout plus a per-run log file under `log_dir`
fn init_logging(verbose: bool, log_dir: &Path) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    config::ensure_dir(log_dir)?;
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let log_path = log_dir.join(format!("pipeline_{}.log", stamp));
    let file = std::fs::File::create(&log_path)
        .with_context(|| format!("cannot create log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        .with(filter)
        .init();

    tracing::debug!("logging to {}", log_path.display());
    Ok(())
}

fn run_transform(cfg: &EtlConfig) -> anyhow::Result<()> {
    ui::header("Transforming raw extracts");
    ui::summary_row("Raw:", &cfg.raw_dir.display().to_string());
    ui::summary_row("Staging:", &cfg.staging_dir.display().to_string());

    let started = Instant::now();
    let reports = transform::transform_all(&cfg.raw_dir, &cfg.staging_dir)?;
    println!("{}", ui::transform_table(&reports));
    ui::timing(started.elapsed());
    Ok(())
}

fn run_load(cfg: &EtlConfig) -> anyhow::Result<PipelineReport> {
    ui::header("Loading staged files");
    ui::summary_row("Database:", &cfg.database.display().to_string());
    ui::summary_row("Staging:", &cfg.staging_dir.display().to_string());

    let started = Instant::now();
    let mut store = EmrStore::open(&cfg.database, &cfg.store_options())?;
    let pipeline = Pipeline::new(&cfg.staging_dir)
        .with_mode(cfg.load_mode)
        .with_policy(cfg.failure_policy);
    let report = pipeline.run(&mut store)?;
    drop(store);

    ui::section("Steps");
    for step in &report.steps {
        ui::step(step.table, &step.outcome);
    }
    println!("{}", ui::steps_table(&report));
    ui::timing(started.elapsed());
    Ok(report)
}

/// Turn failed steps into a non-zero exit
fn finish(report: &PipelineReport) -> anyhow::Result<()> {
    if report.succeeded() {
        ui::success(&format!("{} rows loaded", report.rows_loaded()));
        return Ok(());
    }

    let failed: Vec<String> = report.failures().map(|s| s.table.to_string()).collect();
    ui::error(&format!("Load failed for: {}", failed.join(", ")));
    anyhow::bail!("{} of {} load steps failed", failed.len(), report.steps.len())
}
