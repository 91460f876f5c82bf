use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::FailurePolicy;
use crate::storage::{LoadMode, StoreOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// SQLite database file
    pub database: PathBuf,
    /// Raw extracts read by the transform stage
    pub raw_dir: PathBuf,
    /// Cleaned files written by transform and read by the loader
    pub staging_dir: PathBuf,
    /// Directory for per-run log files
    pub log_dir: PathBuf,
    pub foreign_keys: bool,
    pub failure_policy: FailurePolicy,
    pub load_mode: LoadMode,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/final/emr_database.db"),
            raw_dir: PathBuf::from("data/raw"),
            staging_dir: PathBuf::from("data/staged"),
            log_dir: PathBuf::from("logs"),
            foreign_keys: true,
            failure_policy: FailurePolicy::default(),
            load_mode: LoadMode::default(),
        }
    }
}

impl EtlConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            foreign_keys: self.foreign_keys,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("emr-etl.toml")
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EtlConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(EtlConfig::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: EtlConfig = toml::from_str(&contents)
        .map_err(|e| crate::Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

pub fn write_config(path: &Path, config: &EtlConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
