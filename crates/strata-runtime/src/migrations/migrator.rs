//! Migration registry, reconciliation and the up/down executors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use strata_core::error::{Result, StrataError};

use super::model::{LedgerRow, Migration};
use super::store::{LedgerStore, LedgerTx};

/// Owns the registered migrations and reconciles them with the ledger.
///
/// Registered names are kept in a `BTreeMap`, so every walk over the registry
/// is in ascending name order.
pub struct Migrator<S: LedgerStore> {
    store: S,
    migrations: BTreeMap<String, Migration<S::Tx>>,
    orphaned: BTreeMap<String, LedgerRow>,
    max_batch: i64,
}

/// An applied entry in a [`MigrationReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub name: String,
    pub batch: i64,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Applied/pending state of every registered migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<String>,
    /// Ledger rows with no registered migration.
    pub orphaned: Vec<String>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.pending.is_empty() && self.orphaned.is_empty()
    }
}

impl<S: LedgerStore> Migrator<S> {
    /// Build the registry without touching the store.
    ///
    /// Duplicate names keep the last definition.
    pub fn new(store: S, migrations: impl IntoIterator<Item = Migration<S::Tx>>) -> Self {
        let mut migrator = Self {
            store,
            migrations: BTreeMap::new(),
            orphaned: BTreeMap::new(),
            max_batch: 0,
        };
        for migration in migrations {
            migrator.add_migration(migration);
        }
        migrator
    }

    /// Build the registry and reconcile it with the ledger.
    pub async fn init(
        store: S,
        migrations: impl IntoIterator<Item = Migration<S::Tx>>,
    ) -> Result<Self> {
        let mut migrator = Self::new(store, migrations);
        migrator.reconcile().await?;
        Ok(migrator)
    }

    /// Register a migration. Replaces an existing one with the same name.
    pub fn add_migration(&mut self, migration: Migration<S::Tx>) {
        let name = migration.name().to_string();
        if self.migrations.insert(name.clone(), migration).is_some() {
            warn!("Migration {} registered twice, keeping the last definition", name);
        }
    }

    /// Reload the ledger and recompute applied state and the max batch.
    ///
    /// On error the registry keeps its previous state.
    pub async fn reconcile(&mut self) -> Result<()> {
        self.store.ensure_table().await?;
        let rows = self.store.find_all().await?;

        for migration in self.migrations.values_mut() {
            migration.mark_pending();
        }
        self.orphaned.clear();
        self.max_batch = 0;

        for row in rows {
            self.max_batch = self.max_batch.max(row.batch);
            match self.migrations.get_mut(&row.name) {
                Some(migration) => migration.mark_applied(&row),
                None => {
                    debug!("Ledger row {} has no registered migration", row.name);
                    self.orphaned.insert(row.name.clone(), row);
                }
            }
        }

        debug!(
            "Reconciled {} migrations, max batch {}",
            self.migrations.len(),
            self.max_batch
        );
        Ok(())
    }

    /// Apply every pending migration in one transaction and one new batch.
    ///
    /// Returns the applied names in order. On failure nothing from this call
    /// is kept.
    pub async fn up(&mut self) -> Result<Vec<String>> {
        let batch = self.max_batch + 1;
        let mut tx = self.store.begin().await?;
        let mut applied = Vec::new();

        for (name, migration) in self.migrations.iter().filter(|(_, m)| !m.is_done()) {
            info!("Running migration {}", name);

            let up = migration.up_action();
            if let Err(e) = up(&mut tx).await {
                return Err(abort(tx, e).await);
            }

            match tx.insert(name, batch).await {
                Ok(row) => applied.push(row),
                Err(e) => return Err(abort(tx, e).await),
            }

            info!("Finished running migration {}", name);
        }

        tx.commit().await?;

        if !applied.is_empty() {
            self.max_batch = batch;
            info!("Applied {} migration(s) in batch {}", applied.len(), batch);
        }

        Ok(applied
            .into_iter()
            .map(|row| {
                if let Some(migration) = self.migrations.get_mut(&row.name) {
                    migration.mark_applied(&row);
                }
                row.name
            })
            .collect())
    }

    /// Revert the most recent batch in one transaction.
    ///
    /// Returns the reverted names in order (descending). A ledger without
    /// batches makes this a no-op.
    pub async fn down(&mut self) -> Result<Vec<String>> {
        let batch = self.max_batch;
        let rows = self.store.find_batch(batch).await?;
        let mut tx = self.store.begin().await?;
        let mut reverted = Vec::new();
        let mut skipped = false;

        for row in rows {
            let Some(migration) = self.migrations.get(&row.name) else {
                skipped = true;
                continue;
            };
            if !migration.is_done() || migration.batch() != batch {
                debug!("Skipping {}: not applied in batch {}", row.name, batch);
                skipped = true;
                continue;
            }

            info!("Reverting migration {}", row.name);

            let down = migration.down_action();
            if let Err(e) = down(&mut tx).await {
                return Err(abort(tx, e).await);
            }
            if let Err(e) = tx.delete(&row).await {
                return Err(abort(tx, e).await);
            }

            info!("Finished reverting migration {}", row.name);
            reverted.push(row.name);
        }

        tx.commit().await?;

        for name in &reverted {
            if let Some(migration) = self.migrations.get_mut(name) {
                migration.mark_pending();
            }
        }
        // Skipped rows are still in the ledger at this batch.
        self.max_batch = if skipped {
            batch
        } else {
            self.current_max_batch()
        };

        Ok(reverted)
    }

    /// Applied and pending migrations, sorted by name.
    pub fn status(&self) -> MigrationReport {
        let mut report = MigrationReport::default();

        for (name, migration) in &self.migrations {
            if migration.is_done() {
                report.applied.push(AppliedMigration {
                    name: name.clone(),
                    batch: migration.batch(),
                    applied_at: migration.created_at(),
                });
            } else {
                report.pending.push(name.clone());
            }
        }
        report.orphaned = self.orphaned.keys().cloned().collect();

        report
    }

    /// Highest batch recorded in the ledger, 0 when empty.
    pub fn max_batch(&self) -> i64 {
        self.max_batch
    }

    pub fn migration(&self, name: &str) -> Option<&Migration<S::Tx>> {
        self.migrations.get(name)
    }

    /// Registered migrations in name order.
    pub fn migrations(&self) -> impl Iterator<Item = &Migration<S::Tx>> {
        self.migrations.values()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn current_max_batch(&self) -> i64 {
        let applied = self
            .migrations
            .values()
            .filter(|m| m.is_done())
            .map(|m| m.batch());
        let orphaned = self.orphaned.values().map(|row| row.batch);
        applied.chain(orphaned).max().unwrap_or(0)
    }
}

/// Roll back and hand back the error that caused it.
async fn abort<T: LedgerTx>(tx: T, error: StrataError) -> StrataError {
    if let Err(e) = tx.rollback().await {
        warn!("Failed to roll back migration transaction: {}", e);
    }
    error
}
