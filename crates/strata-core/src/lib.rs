pub mod config;
pub mod error;

pub use config::{DatabaseConfig, LoggingConfig, MigrationsConfig, StrataConfig};
pub use error::{Result, StrataError};
