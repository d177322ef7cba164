//! Target server version and the DDL features it gates.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{MigrateError, Result};

/// A MySQL server version.
///
/// A version given without a patch level (`"8.0"`) stands for the newest
/// release of that series, so feature gates introduced in a patch release
/// (8.0.13 expression defaults) are treated as available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MysqlVersion {
    pub major: u32,
    pub minor: u32,
    patch: Option<u32>,
}

impl MysqlVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch: Some(patch),
        }
    }

    /// Parse `major.minor[.patch]`, ignoring any vendor suffix (`8.0.36-log`).
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || {
            MigrateError::Config(format!(
                "invalid target version '{}', expected major.minor[.patch]",
                text
            ))
        };
        let numeric: String = text
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(p) => Some(p.parse::<u32>().map_err(|_| invalid())?),
            None => None,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    fn effective_patch(&self) -> u32 {
        self.patch.unwrap_or(u32::MAX)
    }

    fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        *self >= Self::new(major, minor, patch)
    }

    /// Parenthesized expression defaults and literal defaults on TEXT/BLOB/JSON.
    pub fn supports_expression_defaults(&self) -> bool {
        self.at_least(8, 0, 13)
    }

    /// Native JSON column type.
    pub fn supports_json(&self) -> bool {
        self.at_least(5, 7, 8)
    }

    /// FULLTEXT indexes on InnoDB tables.
    pub fn supports_innodb_fulltext(&self) -> bool {
        self.at_least(5, 6, 0)
    }

    /// `utf8mb4_0900_*` collations.
    pub fn supports_0900_collations(&self) -> bool {
        self.at_least(8, 0, 0)
    }
}

impl Ord for MysqlVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.effective_patch()).cmp(&(
            other.major,
            other.minor,
            other.effective_patch(),
        ))
    }
}

impl PartialOrd for MysqlVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MysqlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}
