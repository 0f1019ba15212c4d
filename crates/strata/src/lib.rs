//! strata - ordered, reversible schema migrations.
//!
//! Embedding applications register their migrations and drive them through a
//! [`Migrator`]:
//!
//! ```ignore
//! use strata::prelude::*;
//!
//! let store = PgStore::new(pool);
//! let mut migrator = Migrator::init(store, vec![
//!     Migration::sql("20240101120000_create_users",
//!         "CREATE TABLE users (id BIGSERIAL PRIMARY KEY)",
//!         "DROP TABLE users"),
//! ]).await?;
//! migrator.up().await?;
//! ```

pub use strata_core;
pub use strata_runtime;

pub use strata_core::{Result, StrataConfig, StrataError};
pub use strata_runtime::migrations::{
    load_migrations_from_dir, LedgerRow, LedgerStore, LedgerTx, MemoryStore, MemoryTx,
    Migration, MigrationGenerator, MigrationReport, Migrator, PgStore, PgTx, SqlMigration,
};
pub use strata_runtime::Database;

/// Prelude module for common imports.
pub mod prelude {
    pub use strata_core::{Result, StrataError};
    pub use strata_runtime::migrations::{
        LedgerStore, LedgerTx, MemoryStore, Migration, Migrator, PgStore,
    };
}
