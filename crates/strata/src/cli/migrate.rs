use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::debug;

use strata_core::config::StrataConfig;
use strata_runtime::migrations::{
    load_migrations_from_dir, Migration, MigrationReport, Migrator, PgStore, PgTx,
};
use strata_runtime::Database;

/// Apply all pending migrations.
#[derive(Parser, Debug)]
pub struct UpCommand {}

/// Revert the most recent batch.
#[derive(Parser, Debug)]
pub struct DownCommand {}

/// Show migration status.
#[derive(Parser, Debug)]
pub struct StatusCommand {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Connect, load the migration files and reconcile them with the ledger.
async fn open(config: &StrataConfig) -> Result<(Database, Migrator<PgStore>)> {
    let migrations: Vec<Migration<PgTx>> = load_migrations_from_dir(&config.migrations.dir)?
        .into_iter()
        .map(|m| m.into_migration())
        .collect();

    let db = Database::from_config(&config.database).await?;
    debug!(
        "Reconciling {} migrations against ledger table {}",
        migrations.len(),
        config.migrations.table
    );
    let store = PgStore::with_table(db.pool().clone(), &config.migrations.table)?;
    let migrator = Migrator::init(store, migrations).await?;

    Ok((db, migrator))
}

fn header(title: &str) {
    println!();
    println!("  {} {}", style("STRATA").bold().cyan(), title);
    println!();
}

impl UpCommand {
    pub async fn execute(self, config: &StrataConfig) -> Result<()> {
        let (db, mut migrator) = open(config).await?;
        header("Migrations");

        let result = migrator.up().await;
        db.close().await;
        let applied = result?;

        if applied.is_empty() {
            println!("  {} Nothing to migrate", style("ℹ").blue());
        } else {
            for name in &applied {
                println!("  {} Applied: {}", style("✓").green(), name);
            }
            println!();
            println!(
                "  {} Applied {} migration(s) in batch {}",
                style("✓").green(),
                applied.len(),
                migrator.max_batch()
            );
        }
        println!();
        Ok(())
    }
}

impl DownCommand {
    pub async fn execute(self, config: &StrataConfig) -> Result<()> {
        let (db, mut migrator) = open(config).await?;
        header("Migrations");

        let batch = migrator.max_batch();
        let result = migrator.down().await;
        db.close().await;
        let reverted = result?;

        if reverted.is_empty() {
            println!("  {} No migrations to rollback", style("ℹ").blue());
        } else {
            for name in &reverted {
                println!("  {} Rolled back: {}", style("✓").green(), name);
            }
            println!();
            println!(
                "  {} Rolled back batch {} ({} migration(s))",
                style("✓").green(),
                batch,
                reverted.len()
            );
        }
        println!();
        Ok(())
    }
}

impl StatusCommand {
    pub async fn execute(self, config: &StrataConfig) -> Result<()> {
        let (db, migrator) = open(config).await?;
        let report = migrator.status();
        db.close().await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &MigrationReport) {
    header("Migration Status");

    if report.is_empty() {
        println!("  {} No migrations found", style("ℹ").blue());
        println!();
        return;
    }

    if !report.applied.is_empty() {
        println!("  {} Applied:", style("✓").green());
        for m in &report.applied {
            let at = m
                .applied_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            println!(
                "    {} {} {} {}",
                style(format!("[{}]", m.batch)).dim(),
                style(&m.name).cyan(),
                style("at").dim(),
                at
            );
        }
    }

    if !report.pending.is_empty() {
        if !report.applied.is_empty() {
            println!();
        }
        println!("  {} Pending:", style("○").yellow());
        for name in &report.pending {
            println!("    {} {}", style("→").dim(), style(name).yellow());
        }
    }

    if !report.orphaned.is_empty() {
        println!();
        println!("  {} In ledger but not on disk:", style("!").red());
        for name in &report.orphaned {
            println!("    {} {}", style("?").dim(), style(name).red());
        }
    }

    println!();
    println!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        report.applied.len(),
        report.pending.len()
    );
    println!();
}
