use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use strata_core::error::{Result, StrataError};

/// Template used when no custom one is configured.
pub const DEFAULT_TEMPLATE: &str = "\
-- Migration: {{name}}
-- Version: {{version}}
-- Created at: {{created_at}}

-- migrate:up


-- migrate:down

";

/// Scaffolds new migration files.
pub struct MigrationGenerator {
    /// Output directory for migrations.
    output_dir: PathBuf,
    /// Custom template file, read on every `create`.
    template: Option<PathBuf>,
}

impl MigrationGenerator {
    /// Create a new migration generator.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            template: None,
        }
    }

    /// Use a template file instead of [`DEFAULT_TEMPLATE`].
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `<version>_<name>.sql` stamped with the current time.
    pub fn create(&self, name: &str) -> Result<PathBuf> {
        self.create_at(name, Utc::now())
    }

    /// Write `<version>_<name>.sql` with the version taken from `now`.
    pub fn create_at(&self, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
        validate_name(name)?;

        let template = match &self.template {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                StrataError::Template(format!("Unable to read template {:?}: {}", path, e))
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };

        let version = now.format("%Y%m%d%H%M%S").to_string();
        let created_at = now.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let vars = HashMap::from([
            ("name", name),
            ("version", version.as_str()),
            ("created_at", created_at.as_str()),
        ]);
        let content = render(&template, &vars);

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}_{}.sql", version, name));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(content.as_bytes())?;

        info!("Generated new migration file {:?}", path);
        Ok(path)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StrataError::Validation("Migration name is empty".into()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StrataError::Validation(format!(
            "Migration name '{}' may only contain letters, digits and '_'",
            name
        )));
    }
    Ok(())
}

/// Render a template by replacing `{{key}}` placeholders with values.
///
/// Unknown placeholders are left as they are.
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    use crate::migrations::SqlMigration;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_create_writes_timestamped_file() {
        let dir = TempDir::new().unwrap();
        let generator = MigrationGenerator::new(dir.path().join("migrations"));

        let path = generator.create_at("create_users", at()).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "20240305140709_create_users.sql"
        );
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("-- Migration: create_users\n-- Version: 20240305140709\n"));
        assert!(content.contains("-- Created at: 2024-03-05 14:07:09 UTC"));

        // The scaffold parses back into an empty, reversible-shaped migration.
        let parsed = SqlMigration::parse("20240305140709_create_users", &content);
        assert!(parsed.up.is_empty());
        assert!(parsed.down.is_empty());
    }

    #[test]
    fn test_create_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let generator = MigrationGenerator::new(dir.path());

        generator.create_at("create_users", at()).unwrap();
        let err = generator.create_at("create_users", at()).unwrap_err();
        assert!(matches!(err, StrataError::Io(_)));
    }

    #[test]
    fn test_create_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let generator = MigrationGenerator::new(dir.path());

        assert!(matches!(
            generator.create(""),
            Err(StrataError::Validation(_))
        ));
        assert!(matches!(
            generator.create("../escape"),
            Err(StrataError::Validation(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_custom_template() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("template.sql");
        std::fs::write(&template, "-- {{version}} {{name}} {{unknown}}\n").unwrap();

        let generator =
            MigrationGenerator::new(dir.path().join("out")).with_template(&template);
        let path = generator.create_at("add_index", at()).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "-- 20240305140709 add_index {{unknown}}\n");
    }

    #[test]
    fn test_missing_template_is_template_error() {
        let dir = TempDir::new().unwrap();
        let generator =
            MigrationGenerator::new(dir.path()).with_template(dir.path().join("missing.sql"));

        let err = generator.create_at("add_index", at()).unwrap_err();
        assert!(matches!(err, StrataError::Template(_)));
    }

    #[test]
    fn test_render_repeated_and_missing() {
        let vars = HashMap::from([("name", "Bob")]);
        assert_eq!(
            render("{{name}} said {{name}} is {{other}}.", &vars),
            "Bob said Bob is {{other}}."
        );
    }
}
