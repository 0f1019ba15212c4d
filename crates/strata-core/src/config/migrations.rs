use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";

/// Migration discovery and ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding `.sql` migration files.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Ledger table name.
    #[serde(default = "default_table")]
    pub table: String,

    /// Optional template used by `create` instead of the built-in one.
    #[serde(default)]
    pub template: Option<PathBuf>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            table: default_table(),
            template: None,
        }
    }
}

impl MigrationsConfig {
    /// Check that the ledger table name is a plain SQL identifier.
    ///
    /// The name is interpolated into DDL, so anything beyond
    /// `[A-Za-z_][A-Za-z0-9_]*` is rejected.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)
    }
}

/// Validate an unquoted SQL identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.len() <= 63
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StrataError::Config(format!(
            "Invalid ledger table name '{}'",
            name
        )))
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationsConfig::default();
        assert_eq!(config.dir, PathBuf::from("migrations"));
        assert_eq!(config.table, "schema_migrations");
        assert!(config.template.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("schema_migrations").is_ok());
        assert!(validate_identifier("_ledger2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("users; DROP TABLE x").is_err());
        assert!(validate_identifier("public.schema_migrations").is_err());
    }
}
