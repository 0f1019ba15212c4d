pub mod db;
pub mod migrations;

pub use db::Database;
pub use migrations::{
    load_migrations_from_dir, LedgerRow, LedgerStore, LedgerTx, MemoryStore, Migration,
    MigrationGenerator, MigrationReport, Migrator, PgStore,
};
