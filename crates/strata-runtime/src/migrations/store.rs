//! Ledger store contract.
//!
//! The engine only talks to the ledger through these two traits: reads happen
//! on the store, every write happens on a transaction that the migration
//! actions share.

use async_trait::async_trait;

use strata_core::error::Result;

use super::model::LedgerRow;

/// Read side of the ledger plus the transaction factory.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Transaction handle passed to migration actions.
    type Tx: LedgerTx;

    /// Create the ledger table if it does not exist.
    async fn ensure_table(&self) -> Result<()>;

    /// All ledger rows.
    async fn find_all(&self) -> Result<Vec<LedgerRow>>;

    /// Rows of one batch, ordered by name descending.
    async fn find_batch(&self, batch: i64) -> Result<Vec<LedgerRow>>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Write side of the ledger, scoped to one transaction.
#[async_trait]
pub trait LedgerTx: Send + Sized {
    /// Record a migration as applied in `batch`.
    async fn insert(&mut self, name: &str, batch: i64) -> Result<LedgerRow>;

    /// Remove a ledger row.
    async fn delete(&mut self, row: &LedgerRow) -> Result<()>;

    /// Execute a single SQL statement inside the transaction.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
