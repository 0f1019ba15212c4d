use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};

use strata_core::config::{validate_identifier, DEFAULT_LEDGER_TABLE};
use strata_core::error::{Result, StrataError};

use super::model::LedgerRow;
use super::store::{LedgerStore, LedgerTx};

/// PostgreSQL-backed ledger.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    table: String,
}

impl PgStore {
    /// Ledger in the default `schema_migrations` table.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    /// Ledger in a custom table. The name must be a plain identifier.
    pub fn with_table(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    type Tx = PgTx;

    async fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                batch BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table
        );

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StrataError::Database(format!("Failed to create migrations table: {}", e))
            })?;
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<LedgerRow>> {
        let sql = format!(
            "SELECT id, name, batch, created_at FROM {} ORDER BY id ASC",
            self.table
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                StrataError::Database(format!("Failed to get applied migrations: {}", e))
            })?;

        rows.iter().map(ledger_row).collect()
    }

    async fn find_batch(&self, batch: i64) -> Result<Vec<LedgerRow>> {
        let sql = format!(
            "SELECT id, name, batch, created_at FROM {} WHERE batch = $1 ORDER BY name DESC",
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(batch)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StrataError::Database(format!("Failed to get batch {}: {}", batch, e)))?;

        rows.iter().map(ledger_row).collect()
    }

    async fn begin(&self) -> Result<PgTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StrataError::Database(format!("Failed to begin transaction: {}", e)))?;

        Ok(PgTx {
            tx,
            table: self.table.clone(),
        })
    }
}

/// An open PostgreSQL transaction.
///
/// Dereferences to the underlying connection, so actions can run any sqlx
/// query on it: `sqlx::query("...").execute(&mut **tx).await`.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
    table: String,
}

impl PgTx {
    /// The connection the transaction runs on.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

impl Deref for PgTx {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        &self.tx
    }
}

impl DerefMut for PgTx {
    fn deref_mut(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn insert(&mut self, name: &str, batch: i64) -> Result<LedgerRow> {
        let sql = format!(
            "INSERT INTO {} (name, batch) VALUES ($1, $2) RETURNING id, name, batch, created_at",
            self.table
        );

        let row = sqlx::query(&sql)
            .bind(name)
            .bind(batch)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                StrataError::Database(format!("Failed to record migration '{}': {}", name, e))
            })?;

        ledger_row(&row)
    }

    async fn delete(&mut self, row: &LedgerRow) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);

        sqlx::query(&sql)
            .bind(row.id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                StrataError::Database(format!(
                    "Failed to remove migration record '{}': {}",
                    row.name, e
                ))
            })?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StrataError::Database(format!("Failed to commit: {}", e)))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StrataError::Database(format!("Failed to roll back: {}", e)))
    }
}

fn ledger_row(row: &PgRow) -> Result<LedgerRow> {
    Ok(LedgerRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        batch: row.try_get("batch")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::migrations::{Migration, Migrator};

    #[tokio::test]
    async fn test_with_table_rejects_bad_identifier() {
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/unused");
        let pool = match pool {
            Ok(pool) => pool,
            Err(_) => return,
        };

        assert!(PgStore::with_table(pool.clone(), "ledger; DROP TABLE users").is_err());
        let store = PgStore::with_table(pool, "app_migrations").unwrap();
        assert_eq!(store.table(), "app_migrations");
    }

    // Runs only when TEST_DATABASE_URL points at a disposable database.
    #[tokio::test]
    async fn test_up_down_against_postgres() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();

        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let ledger = format!("strata_test_ledger_{}", suffix);
        let users = format!("strata_test_users_{}", suffix);

        let store = PgStore::with_table(pool.clone(), &ledger).unwrap();

        let create = format!("CREATE TABLE {} (id BIGINT PRIMARY KEY)", users);
        let drop = format!("DROP TABLE {}", users);
        let index = format!("CREATE INDEX {0}_idx ON {0} (id)", users);
        let drop_index = format!("DROP INDEX {}_idx", users);

        let mut migrator = Migrator::init(
            store.clone(),
            vec![
                Migration::sql("001_create_users", &create, &drop),
                Migration::sql("002_add_index", &index, &drop_index),
            ],
        )
        .await
        .unwrap();

        let applied = migrator.up().await.unwrap();
        assert_eq!(applied, vec!["001_create_users", "002_add_index"]);

        let rows = store.find_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.batch == 1));

        let reverted = migrator.down().await.unwrap();
        assert_eq!(reverted, vec!["002_add_index", "001_create_users"]);
        assert!(store.find_all().await.unwrap().is_empty());

        sqlx::query(&format!("DROP TABLE {}", ledger))
            .execute(&pool)
            .await
            .unwrap();
    }
}
