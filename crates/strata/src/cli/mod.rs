mod create;
mod migrate;

pub use create::CreateCommand;
pub use migrate::{DownCommand, StatusCommand, UpCommand};

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata_core::config::{LoggingConfig, StrataConfig};

/// Config file looked up when `--config` is not given.
const DEFAULT_CONFIG: &str = "strata.toml";

/// strata - ordered, reversible schema migrations
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file path (default: strata.toml when present).
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Migrations directory path (overrides config).
    #[arg(short, long, global = true)]
    pub migrations_dir: Option<String>,

    /// Database URL (overrides config and DATABASE_URL).
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new migration file.
    Create(CreateCommand),

    /// Apply all pending migrations as one batch.
    Up(UpCommand),

    /// Revert the most recent batch.
    Down(DownCommand),

    /// Show applied and pending migrations.
    Status(StatusCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let config = self.global.load_config()?;
        init_logging(&config.logging, self.global.verbose);

        match self.command {
            Commands::Create(cmd) => cmd.execute(&config),
            Commands::Up(cmd) => cmd.execute(&config).await,
            Commands::Down(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
        }
    }
}

impl GlobalArgs {
    /// Load the config file and apply command-line overrides.
    pub fn load_config(&self) -> Result<StrataConfig> {
        let mut config = match &self.config {
            Some(path) => {
                if !Path::new(path).exists() {
                    anyhow::bail!("Configuration file not found: {}", path);
                }
                StrataConfig::from_file(path)?
            }
            None if Path::new(DEFAULT_CONFIG).exists() => StrataConfig::from_file(DEFAULT_CONFIG)?,
            None => StrataConfig::default(),
        };

        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        } else if config.database.url.is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                config.database.url = url;
            }
        }

        if let Some(dir) = &self.migrations_dir {
            config.migrations.dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

/// Install the global tracing subscriber. Logs go to stderr; command output
/// stays on stdout.
fn init_logging(config: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}
