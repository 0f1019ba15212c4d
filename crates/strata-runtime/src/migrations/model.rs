use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;

use strata_core::error::Result;

/// A migration step: runs against the open transaction.
pub type Action<Tx> = Arc<dyn for<'a> Fn(&'a mut Tx) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// A persisted ledger row, one per applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub id: i64,
    pub name: String,
    pub batch: i64,
    pub created_at: DateTime<Utc>,
}

/// A registered migration and its reconciled ledger state.
pub struct Migration<Tx> {
    name: String,
    up: Action<Tx>,
    down: Action<Tx>,
    id: i64,
    batch: i64,
    created_at: Option<DateTime<Utc>>,
    done: bool,
}

impl<Tx> Migration<Tx> {
    /// Create a migration from forward and reverse actions.
    ///
    /// ```ignore
    /// let m = Migration::new(
    ///     "20240101120000_create_users",
    ///     |tx| Box::pin(async move { tx.execute("CREATE TABLE users (id BIGINT)").await }),
    ///     |tx| Box::pin(async move { tx.execute("DROP TABLE users").await }),
    /// );
    /// ```
    pub fn new<U, D>(name: impl Into<String>, up: U, down: D) -> Self
    where
        U: for<'a> Fn(&'a mut Tx) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
        D: for<'a> Fn(&'a mut Tx) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            up: Arc::new(up),
            down: Arc::new(down),
            id: 0,
            batch: 0,
            created_at: None,
            done: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ledger id, 0 until persisted.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Batch the migration was applied in, 0 while pending.
    pub fn batch(&self) -> i64 {
        self.batch
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Whether a matching ledger row exists.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn up_action(&self) -> Action<Tx> {
        self.up.clone()
    }

    pub(crate) fn down_action(&self) -> Action<Tx> {
        self.down.clone()
    }

    pub(crate) fn mark_applied(&mut self, row: &LedgerRow) {
        self.id = row.id;
        self.batch = row.batch;
        self.created_at = Some(row.created_at);
        self.done = true;
    }

    pub(crate) fn mark_pending(&mut self) {
        self.id = 0;
        self.batch = 0;
        self.created_at = None;
        self.done = false;
    }
}

impl<Tx> fmt::Debug for Migration<Tx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("batch", &self.batch)
            .field("created_at", &self.created_at)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
