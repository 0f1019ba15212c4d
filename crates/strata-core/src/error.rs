use thiserror::Error;

/// Core error type for strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Failure reported by a migration's own up/down action.
    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl StrataError {
    /// Shorthand for failing a migration action with a message.
    pub fn migration(message: impl Into<String>) -> Self {
        StrataError::Migration(message.into())
    }
}

/// Result type alias using StrataError.
pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = StrataError::Database("relation does not exist".into());
        assert_eq!(err.to_string(), "Database error: relation does not exist");

        let err = StrataError::migration("boom");
        assert_eq!(err.to_string(), "Migration error: boom");
    }

    #[test]
    fn test_io_conversion() {
        fn open() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))?
        }

        assert!(matches!(open(), Err(StrataError::Io(_))));
    }
}
