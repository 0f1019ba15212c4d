mod generator;
mod loader;
mod memory;
mod migrator;
mod model;
mod postgres;
mod store;

pub use generator::{render, MigrationGenerator, DEFAULT_TEMPLATE};
pub use loader::{load_migrations_from_dir, split_sql_statements, SqlMigration};
pub use memory::{MemoryStore, MemoryTx};
pub use migrator::{AppliedMigration, MigrationReport, Migrator};
pub use model::{Action, LedgerRow, Migration};
pub use postgres::{PgStore, PgTx};
pub use store::{LedgerStore, LedgerTx};
