//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::drivers::mysql::MysqlVersion;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, written into the script header.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Output path, derived from the source file name when not configured.
    pub fn output_path(&self) -> PathBuf {
        if let Some(ref path) = self.output.path {
            return path.clone();
        }
        let stem = self
            .source
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dump".to_string());
        let mut name = format!("{}_mysql.sql", stem);
        if self.output.compress {
            name.push_str(".gz");
        }
        self.source.path.with_file_name(name)
    }
}

impl MigrationConfig {
    /// Parsed target dialect version.
    pub fn mysql_version(&self) -> Result<MysqlVersion> {
        MysqlVersion::parse(&self.target_version)
    }

    /// Blob directory as an absolute path, if externalization is enabled.
    pub fn absolute_blob_dir(&self) -> Result<Option<PathBuf>> {
        match self.blob_dir {
            Some(ref dir) if dir.is_absolute() => Ok(Some(dir.clone())),
            Some(ref dir) => Ok(Some(std::env::current_dir()?.join(dir))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_defaults() {
        let config = Config::from_yaml("source:\n  path: app.db\n").unwrap();
        assert!(config.migration.drop_tables);
        assert_eq!(config.migration.export_mode, ExportMode::Both);
        assert_eq!(config.migration.engine, "InnoDB");
        assert_eq!(config.migration.charset, "utf8mb4");
        assert_eq!(config.migration.collation, "utf8mb4_unicode_ci");
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.max_blob_size, 1_048_576);
        assert!(config.migration.blob_dir.is_none());
        assert_eq!(config.migration.target_version, "8.0");
        assert!(!config.migration.verify_data);
    }

    #[test]
    fn test_from_yaml_overrides() {
        let yaml = r#"
source:
  path: /data/app.db
output:
  compress: true
migration:
  drop_tables: false
  export_mode: structure
  engine: MyISAM
  batch_size: 50
  blob_dir: blobs
  partition: "PARTITION BY HASH(id) PARTITIONS 4"
  target_version: "5.7"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(!config.migration.drop_tables);
        assert_eq!(config.migration.export_mode, ExportMode::Structure);
        assert_eq!(config.migration.engine, "MyISAM");
        assert_eq!(config.migration.batch_size, 50);
        assert_eq!(config.migration.blob_dir, Some(PathBuf::from("blobs")));
        assert_eq!(config.output_path(), PathBuf::from("/data/app_mysql.sql.gz"));
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let yaml = "source:\n  path: a.db\nmigration:\n  batch_size: 0\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_hash_is_stable() {
        let a = Config::for_source("a.db");
        let b = Config::for_source("a.db");
        let c = Config::for_source("b.db");
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_export_mode_gates() {
        assert!(ExportMode::Both.includes_structure());
        assert!(ExportMode::Both.includes_data());
        assert!(!ExportMode::Data.includes_structure());
        assert!(!ExportMode::Structure.includes_data());
        assert_eq!("DATA".parse::<ExportMode>().unwrap(), ExportMode::Data);
        assert!("everything".parse::<ExportMode>().is_err());
    }
}
