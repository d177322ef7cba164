//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Only schema-integrity problems and unreadable sources are fatal. Everything
/// that can be degraded locally is recorded in the
/// [`MigrationReport`](crate::report::MigrationReport) instead of becoming an error.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, out-of-range option, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database could not be opened or queried
    #[error("Source database error: {0}")]
    Source(#[from] rusqlite::Error),

    /// Source catalog could not be read
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Malformed source schema (dangling foreign key, missing column)
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// IO error (script sink, blob files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a run (as opposed to being reportable).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MigrateError::Cancelled)
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::SchemaValidation(_) => 3,
            MigrateError::Source(_) | MigrateError::SchemaExtraction(_) => 4,
            MigrateError::Io(_) => 5,
            MigrateError::Cancelled => 130,
            MigrateError::Transfer { .. } | MigrateError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::SchemaValidation("x".into()).exit_code(), 3);
        assert_eq!(MigrateError::Cancelled.exit_code(), 130);
        assert_eq!(MigrateError::transfer("t", "boom").exit_code(), 1);
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::SchemaValidation("dangling foreign key".into());
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Schema validation failed"));
        assert!(detailed.contains("dangling foreign key"));
    }
}
