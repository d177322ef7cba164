//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database (SQLite file).
    pub source: SourceConfig,

    /// Script output settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Build a configuration for a source file with default migration options.
    pub fn for_source(path: impl Into<PathBuf>) -> Self {
        Self {
            source: SourceConfig { path: path.into() },
            output: OutputConfig::default(),
            migration: MigrationConfig::default(),
        }
    }

    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

/// Source database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Script output configuration. Writing and compressing the stream is done by
/// the caller; these settings are carried so a single YAML file can describe a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output script path. `None` derives `<db stem>_mysql.sql`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Gzip the output stream.
    #[serde(default)]
    pub compress: bool,
}

/// Which parts of the script to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// DDL only (tables, indexes, views, triggers, constraints).
    Structure,
    /// INSERT statements only.
    Data,
    /// Both DDL and data.
    #[default]
    Both,
}

impl ExportMode {
    pub fn includes_structure(self) -> bool {
        matches!(self, ExportMode::Structure | ExportMode::Both)
    }

    pub fn includes_data(self) -> bool {
        matches!(self, ExportMode::Data | ExportMode::Both)
    }
}

impl std::str::FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structure" => Ok(ExportMode::Structure),
            "data" => Ok(ExportMode::Data),
            "both" => Ok(ExportMode::Both),
            other => Err(format!(
                "invalid export mode '{}', expected structure, data or both",
                other
            )),
        }
    }
}

/// Migration behavior configuration.
///
/// Performance-related fields use `Option<T>` to distinguish "not set"
/// (auto-tuned) from "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Emit DROP TABLE / DROP VIEW before CREATE (default: true).
    #[serde(default = "default_true")]
    pub drop_tables: bool,

    /// structure | data | both (default: both).
    #[serde(default)]
    pub export_mode: ExportMode,

    /// Storage engine clause on CREATE TABLE (default: InnoDB).
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Default character set (default: utf8mb4).
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Default collation (default: utf8mb4_unicode_ci).
    #[serde(default = "default_collation")]
    pub collation: String,

    /// Rows per emitted INSERT statement (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Byte threshold above which a blob is externalized (default: 1 MiB).
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: usize,

    /// Destination root for externalized blobs. Unset means always inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_dir: Option<PathBuf>,

    /// Write blob references relative to `blob_dir` instead of absolute.
    #[serde(default)]
    pub relative_blob_paths: bool,

    /// Emit FULLTEXT indexes for text columns and FTS tables.
    #[serde(default)]
    pub fulltext: bool,

    /// Literal partition clause appended to eligible CREATE TABLE statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    /// Literal tablespace appended to CREATE TABLE statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tablespace: Option<String>,

    /// Target MySQL version, e.g. "5.7" or "8.0.13" (default: 8.0).
    #[serde(default = "default_target_version")]
    pub target_version: String,

    /// Compare emitted row counts with source counts (default: false).
    #[serde(default)]
    pub verify_data: bool,

    /// Concurrent table workers. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// INSERT statements buffered per table worker. Auto-tuned based on RAM if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_ahead: Option<usize>,

    /// Longest declared length still mapped to VARCHAR (default: 255).
    #[serde(default = "default_varchar_threshold")]
    pub varchar_threshold: u32,

    /// Precision used for DECIMAL columns without one (default: 10).
    #[serde(default = "default_decimal_precision")]
    pub default_decimal_precision: u32,

    /// Scale used for DECIMAL columns without one (default: 2).
    #[serde(default = "default_decimal_scale")]
    pub default_decimal_scale: u32,

    /// Map 0/1-defaulted INTEGER columns to TINYINT(1) (default: true).
    #[serde(default = "default_true")]
    pub infer_booleans: bool,

    /// Sample max length / integer range per column (default: true).
    #[serde(default = "default_true")]
    pub collect_column_stats: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            drop_tables: true,
            export_mode: ExportMode::default(),
            engine: default_engine(),
            charset: default_charset(),
            collation: default_collation(),
            batch_size: default_batch_size(),
            max_blob_size: default_max_blob_size(),
            blob_dir: None,
            relative_blob_paths: false,
            fulltext: false,
            partition: None,
            tablespace: None,
            target_version: default_target_version(),
            verify_data: false,
            workers: None,
            read_ahead: None,
            varchar_threshold: default_varchar_threshold(),
            default_decimal_precision: default_decimal_precision(),
            default_decimal_scale: default_decimal_scale(),
            infer_booleans: true,
            collect_column_stats: true,
        }
    }
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Workers: half the cores, 1-8. Output is serialized through one sink,
        // so more workers than that only adds memory pressure.
        if self.workers.is_none() {
            self.workers = Some((resources.cpu_cores / 2).clamp(1, 8));
        }

        // Read-ahead: 4 statements per 4GB of RAM, 4-32
        if self.read_ahead.is_none() {
            let buffers = ((resources.total_memory_gb / 4.0) as usize * 4).clamp(4, 32);
            self.read_ahead = Some(buffers);
        }

        info!(
            "Auto-tuned config: workers={}, read_ahead={}",
            self.get_workers(),
            self.get_read_ahead()
        );

        self
    }

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(2)
    }

    pub fn get_read_ahead(&self) -> usize {
        self.read_ahead.unwrap_or(4)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_engine() -> String {
    "InnoDB".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_collation() -> String {
    "utf8mb4_unicode_ci".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_blob_size() -> usize {
    1_048_576
}

fn default_target_version() -> String {
    "8.0".to_string()
}

fn default_varchar_threshold() -> u32 {
    255
}

fn default_decimal_precision() -> u32 {
    10
}

fn default_decimal_scale() -> u32 {
    2
}
