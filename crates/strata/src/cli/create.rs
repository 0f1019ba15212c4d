use anyhow::Result;
use clap::Parser;
use console::style;

use strata_core::config::StrataConfig;
use strata_runtime::migrations::MigrationGenerator;

/// Create a new, empty migration file.
#[derive(Parser, Debug)]
pub struct CreateCommand {
    /// Migration name, e.g. `create_users`.
    pub name: String,
}

impl CreateCommand {
    pub fn execute(self, config: &StrataConfig) -> Result<()> {
        let mut generator = MigrationGenerator::new(&config.migrations.dir);
        if let Some(template) = &config.migrations.template {
            generator = generator.with_template(template);
        }

        let path = generator.create(&self.name)?;

        println!(
            "  {} Generated new migration file {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_uses_configured_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = StrataConfig::default();
        config.migrations.dir = dir.path().join("migrations");

        let cmd = CreateCommand {
            name: "create_users".into(),
        };
        cmd.execute(&config).unwrap();

        let files: Vec<String> = std::fs::read_dir(&config.migrations.dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("_create_users.sql"));
    }
}
