//! Configuration validation.

use super::Config;
use crate::drivers::mysql::MysqlVersion;
use crate::error::{MigrateError, Result};

const VALID_ENGINES: &[&str] = &["InnoDB", "MyISAM", "MEMORY"];
const VALID_CHARSETS: &[&str] = &["utf8mb4", "utf8", "latin1"];
const VALID_COLLATIONS: &[&str] = &[
    "utf8mb4_unicode_ci",
    "utf8mb4_general_ci",
    "utf8mb4_bin",
    "utf8mb4_0900_ai_ci",
    "utf8_general_ci",
    "utf8_unicode_ci",
    "latin1_swedish_ci",
];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }

    let migration = &config.migration;

    if !VALID_ENGINES.contains(&migration.engine.as_str()) {
        return Err(MigrateError::Config(format!(
            "migration.engine must be one of {}, got '{}'",
            VALID_ENGINES.join(", "),
            migration.engine
        )));
    }
    if !VALID_CHARSETS.contains(&migration.charset.as_str()) {
        return Err(MigrateError::Config(format!(
            "migration.charset must be one of {}, got '{}'",
            VALID_CHARSETS.join(", "),
            migration.charset
        )));
    }
    if !VALID_COLLATIONS.contains(&migration.collation.as_str()) {
        return Err(MigrateError::Config(format!(
            "migration.collation must be one of {}, got '{}'",
            VALID_COLLATIONS.join(", "),
            migration.collation
        )));
    }
    // utf8_general_ci belongs to utf8, not utf8mb4
    let collation_charset = migration.collation.split('_').next().unwrap_or_default();
    if collation_charset != migration.charset {
        return Err(MigrateError::Config(format!(
            "migration.collation '{}' does not belong to charset '{}'",
            migration.collation, migration.charset
        )));
    }

    if migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if let Some(0) = migration.read_ahead {
        return Err(MigrateError::Config(
            "migration.read_ahead must be at least 1".into(),
        ));
    }
    if migration.varchar_threshold == 0 || migration.varchar_threshold > 16_383 {
        return Err(MigrateError::Config(
            "migration.varchar_threshold must be between 1 and 16383".into(),
        ));
    }
    if migration.default_decimal_precision == 0
        || migration.default_decimal_precision > 65
        || migration.default_decimal_scale > 30
        || migration.default_decimal_scale > migration.default_decimal_precision
    {
        return Err(MigrateError::Config(
            "migration.default_decimal_precision/scale must satisfy 0 <= scale <= precision <= 65"
                .into(),
        ));
    }

    let version = MysqlVersion::parse(&migration.target_version)?;
    if migration.fulltext
        && !version.supports_innodb_fulltext()
        && migration.engine != "MyISAM"
    {
        return Err(MigrateError::Config(format!(
            "FULLTEXT indexes on MySQL {} require the MyISAM engine",
            version
        )));
    }
    if migration.collation.contains("_0900_") && !version.supports_0900_collations() {
        return Err(MigrateError::Config(format!(
            "collation {} requires MySQL 8.0, target is {}",
            migration.collation, version
        )));
    }

    if matches!(migration.blob_dir, Some(ref dir) if dir.as_os_str().is_empty()) {
        return Err(MigrateError::Config(
            "migration.blob_dir cannot be empty".into(),
        ));
    }

    Ok(())
}
