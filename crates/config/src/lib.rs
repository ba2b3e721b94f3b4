//! Engine configuration (§6): a single TOML-backed `EngineConfig`, loaded
//! and saved the way the teacher's own `ConfigFile` does — `read_to_string`
//! + `toml::from_str` on the way in, `toml::to_string_pretty` + `write` on
//! the way out — so a partial file still parses thanks to `#[serde(default
//! = "...")]` on every field that has one.

use std::fs::{read_to_string, write};

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};
use wayline_aggregator::AggregatorHosts;

pub const CONFIG_FILE: &str = "wayline.toml";

/// Every environment/configuration knob named in §6, with the defaults
/// stated there.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: Utf8PathBuf,
    pub content_store_path: Utf8PathBuf,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub orphan_retry_interval_ms: u64,
    pub orphan_max_retries: u32,
    pub orphan_max_age_ms: u64,
    pub aggregator_hosts: AggregatorHosts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: Utf8PathBuf::from("wayline.db"),
            content_store_path: Utf8PathBuf::from("wayline-content"),
            batch_size: 3,
            batch_timeout_ms: 1_000,
            orphan_retry_interval_ms: 5_000,
            orphan_max_retries: 3,
            orphan_max_age_ms: 60_000,
            aggregator_hosts: AggregatorHosts::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;
        toml::from_str(&content).wrap_err("failed to parse configuration")
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;
        write(&path, content).wrap_err_with(|| format!("failed to write configuration to {path:?}"))
    }

    /// Only rewrites the file when its serialised content actually changed.
    pub fn save_if_changed(&self, dir: &Utf8Path) -> EyreResult<bool> {
        let path = dir.join(CONFIG_FILE);
        let new_content = toml::to_string_pretty(self)?;

        let changed = match read_to_string(&path) {
            Ok(existing) => existing != new_content,
            Err(_) => true,
        };

        if changed {
            write(&path, new_content).wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;
        }

        Ok(changed)
    }

    pub fn print(&self, format: OutputFormat) -> EyreResult<()> {
        match format {
            OutputFormat::Pretty => println!("{self:#?}"),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(self)?),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Pretty,
}
