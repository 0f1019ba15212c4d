//! In-memory ledger.
//!
//! A transaction reads from a snapshot taken at `begin` and records its own
//! inserts, deletes and statements. `commit` applies that changeset to the
//! shared state, re-checking the unique name constraint against rows other
//! transactions committed in the meantime. Rolling back or dropping the
//! transaction discards the changeset. Statements executed by migration
//! actions are kept in a log so their effects can be inspected the same way a
//! table would be.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use strata_core::error::{Result, StrataError};

use super::model::LedgerRow;
use super::store::{LedgerStore, LedgerTx};

#[derive(Debug, Default)]
struct MemoryState {
    table_created: bool,
    rows: Vec<LedgerRow>,
    next_id: i64,
    statements: Vec<String>,
}

/// Ledger kept in process memory. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed ledger rows, in insertion order.
    pub async fn rows(&self) -> Vec<LedgerRow> {
        self.state.lock().await.rows.clone()
    }

    /// Committed statements executed by migration actions.
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    /// Remove a ledger row outside any migration, as an operator would by hand.
    pub async fn remove_row(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.rows.len();
        state.rows.retain(|row| row.name != name);
        state.rows.len() != before
    }

    /// Insert a ledger row outside any migration.
    pub async fn insert_row(&self, name: &str, batch: i64) -> Result<LedgerRow> {
        let mut state = self.state.lock().await;
        if !state.table_created {
            return Err(missing_table());
        }
        check_unique(&state.rows, name)?;

        let row = state.new_row(name, batch);
        state.rows.push(row.clone());
        Ok(row)
    }
}

impl MemoryState {
    /// Ids come from a sequence that is not rolled back, like `BIGSERIAL`.
    fn new_row(&mut self, name: &str, batch: i64) -> LedgerRow {
        self.next_id += 1;
        LedgerRow {
            id: self.next_id,
            name: name.to_string(),
            batch,
            created_at: Utc::now(),
        }
    }
}

fn check_unique(rows: &[LedgerRow], name: &str) -> Result<()> {
    if rows.iter().any(|row| row.name == name) {
        return Err(StrataError::Database(format!(
            "Failed to record migration '{}': duplicate key value violates unique constraint",
            name
        )));
    }
    Ok(())
}

fn missing_table() -> StrataError {
    StrataError::Database("relation \"schema_migrations\" does not exist".into())
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn ensure_table(&self) -> Result<()> {
        self.state.lock().await.table_created = true;
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<LedgerRow>> {
        let state = self.state.lock().await;
        if !state.table_created {
            return Err(missing_table());
        }
        Ok(state.rows.clone())
    }

    async fn find_batch(&self, batch: i64) -> Result<Vec<LedgerRow>> {
        let state = self.state.lock().await;
        if !state.table_created {
            return Err(missing_table());
        }

        let mut rows: Vec<LedgerRow> = state
            .rows
            .iter()
            .filter(|row| row.batch == batch)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(rows)
    }

    async fn begin(&self) -> Result<MemoryTx> {
        let state = self.state.lock().await;
        Ok(MemoryTx {
            state: self.state.clone(),
            table_created: state.table_created,
            view: state.rows.clone(),
            inserted: Vec::new(),
            deleted: Vec::new(),
            statements: Vec::new(),
        })
    }
}

/// Transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    state: Arc<Mutex<MemoryState>>,
    table_created: bool,
    /// Snapshot rows with this transaction's own changes applied.
    view: Vec<LedgerRow>,
    inserted: Vec<LedgerRow>,
    deleted: Vec<i64>,
    statements: Vec<String>,
}

impl MemoryTx {
    /// Statements executed in this transaction so far.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn insert(&mut self, name: &str, batch: i64) -> Result<LedgerRow> {
        if !self.table_created {
            return Err(missing_table());
        }
        check_unique(&self.view, name)?;

        let row = self.state.lock().await.new_row(name, batch);
        self.view.push(row.clone());
        self.inserted.push(row.clone());
        Ok(row)
    }

    async fn delete(&mut self, row: &LedgerRow) -> Result<()> {
        self.view.retain(|r| r.id != row.id);
        if let Some(pos) = self.inserted.iter().position(|r| r.id == row.id) {
            self.inserted.remove(pos);
        } else {
            self.deleted.push(row.id);
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let mut state = self.state.lock().await;

        let mut rows = state.rows.clone();
        rows.retain(|r| !self.deleted.contains(&r.id));
        for row in &self.inserted {
            // Another transaction may have committed the same name since begin.
            check_unique(&rows, &row.name)?;
            rows.push(row.clone());
        }

        state.rows = rows;
        state.statements.extend(self.statements);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_fail_before_table_exists() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.find_all().await,
            Err(StrataError::Database(_))
        ));

        store.ensure_table().await.unwrap();
        store.ensure_table().await.unwrap();
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = MemoryStore::new();
        store.ensure_table().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.execute("CREATE TABLE users").await.unwrap();
        let row = tx.insert("001_create_users", 1).await.unwrap();
        assert_eq!(row.id, 1);
        assert!(store.rows().await.is_empty());

        tx.commit().await.unwrap();
        assert_eq!(store.rows().await, vec![row]);
        assert_eq!(store.statements().await, vec!["CREATE TABLE users"]);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let store = MemoryStore::new();
        store.ensure_table().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.execute("CREATE TABLE users").await.unwrap();
        tx.insert("001_create_users", 1).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.rows().await.is_empty());
        assert!(store.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_unique_name_constraint() {
        let store = MemoryStore::new();
        store.ensure_table().await.unwrap();
        store.insert_row("001_create_users", 1).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert("001_create_users", 2).await.unwrap_err();
        assert!(err.to_string().contains("unique constraint"));
    }

    #[tokio::test]
    async fn test_overlapping_commits_keep_both_rows() {
        let store = MemoryStore::new();
        store.ensure_table().await.unwrap();

        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        a.execute("UP 001_a").await.unwrap();
        a.insert("001_a", 1).await.unwrap();
        b.execute("UP 002_b").await.unwrap();
        b.insert("002_b", 1).await.unwrap();

        b.commit().await.unwrap();
        a.commit().await.unwrap();

        let mut names: Vec<String> = store.rows().await.into_iter().map(|r| r.name).collect();
        names.sort();
        assert_eq!(names, vec!["001_a", "002_b"]);
        assert_eq!(store.statements().await, vec!["UP 002_b", "UP 001_a"]);
    }

    #[tokio::test]
    async fn test_commit_rechecks_unique_name() {
        let store = MemoryStore::new();
        store.ensure_table().await.unwrap();

        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        a.execute("UP 001_a").await.unwrap();
        a.insert("001_a", 1).await.unwrap();
        b.execute("UP 001_a again").await.unwrap();
        b.insert("001_a", 1).await.unwrap();

        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(err.to_string().contains("unique constraint"));

        assert_eq!(store.rows().await.len(), 1);
        assert_eq!(store.statements().await, vec!["UP 001_a"]);
    }

    #[tokio::test]
    async fn test_delete_of_committed_row_keeps_concurrent_insert() {
        let store = MemoryStore::new();
        store.ensure_table().await.unwrap();
        let old = store.insert_row("001_a", 1).await.unwrap();

        let mut down = store.begin().await.unwrap();
        let mut up = store.begin().await.unwrap();
        down.delete(&old).await.unwrap();
        up.insert("002_b", 2).await.unwrap();

        up.commit().await.unwrap();
        down.commit().await.unwrap();

        let names: Vec<String> = store.rows().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["002_b"]);
    }

    #[tokio::test]
    async fn test_find_batch_orders_by_name_descending() {
        let store = MemoryStore::new();
        store.ensure_table().await.unwrap();
        store.insert_row("001_a", 1).await.unwrap();
        store.insert_row("003_c", 2).await.unwrap();
        store.insert_row("002_b", 2).await.unwrap();

        let names: Vec<String> = store
            .find_batch(2)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.name)
            .collect();
        assert_eq!(names, vec!["003_c", "002_b"]);
    }
}
