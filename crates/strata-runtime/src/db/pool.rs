use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use strata_core::config::DatabaseConfig;
use strata_core::error::{Result, StrataError};

/// Database connection wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(StrataError::Config(
                "Database URL is not set (use [database].url, --database-url or DATABASE_URL)"
                    .into(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| StrataError::Database(format!("Failed to connect: {}", e)))?;

        Ok(Self { pool })
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
