//! SQL file migrations.
//!
//! A migration file is named like `20240101120000_create_users.sql` and holds
//! both directions, separated by marker lines:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE users (id BIGSERIAL PRIMARY KEY);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```
//!
//! Text before the first marker counts as `up`.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use strata_core::error::{Result, StrataError};

use super::model::Migration;
use super::store::LedgerTx;

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// A migration read from a `.sql` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    /// File stem, e.g. `20240101120000_create_users`.
    pub name: String,
    /// Statements applied by `up`.
    pub up: Vec<String>,
    /// Statements applied by `down`. Empty means irreversible.
    pub down: Vec<String>,
}

impl SqlMigration {
    /// Parse the content of a migration file.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let (up, down) = split_sections(content);
        Self {
            name: name.into(),
            up: split_sql_statements(&up),
            down: split_sql_statements(&down),
        }
    }

    pub fn has_down(&self) -> bool {
        !self.down.is_empty()
    }

    /// Turn into a registry entry running the statements on the transaction.
    pub fn into_migration<Tx: LedgerTx + 'static>(self) -> Migration<Tx> {
        statement_migration(self.name, self.up, self.down)
    }
}

impl<Tx: LedgerTx + 'static> Migration<Tx> {
    /// Migration from raw SQL for each direction.
    pub fn sql(name: impl Into<String>, up: &str, down: &str) -> Self {
        statement_migration(
            name.into(),
            split_sql_statements(up),
            split_sql_statements(down),
        )
    }
}

fn statement_migration<Tx: LedgerTx + 'static>(
    name: String,
    up: Vec<String>,
    down: Vec<String>,
) -> Migration<Tx> {
    let up = Arc::new(up);
    let down = Arc::new(down);
    let label = name.clone();

    Migration::new(
        name,
        move |tx: &mut Tx| {
            let statements = up.clone();
            Box::pin(async move {
                for statement in statements.iter() {
                    tx.execute(statement).await?;
                }
                Ok(())
            })
        },
        move |tx: &mut Tx| {
            let statements = down.clone();
            let label = label.clone();
            Box::pin(async move {
                if statements.is_empty() {
                    warn!("Migration {} has no down section, nothing to revert", label);
                }
                for statement in statements.iter() {
                    tx.execute(statement).await?;
                }
                Ok(())
            })
        },
    )
}

/// Split a file into its `up` and `down` sections.
fn split_sections(content: &str) -> (String, String) {
    let mut up = String::new();
    let mut down = String::new();
    let mut in_down = false;

    for line in content.lines() {
        let marker = line.trim();
        if marker.eq_ignore_ascii_case(UP_MARKER) {
            in_down = false;
            continue;
        }
        if marker.eq_ignore_ascii_case(DOWN_MARKER) {
            in_down = true;
            continue;
        }

        let target = if in_down { &mut down } else { &mut up };
        target.push_str(line);
        target.push('\n');
    }

    (up, down)
}

/// Split SQL into statements on top-level semicolons.
///
/// Semicolons inside single-quoted strings, double-quoted identifiers,
/// dollar-quoted bodies (`$$ ... $$`, `$tag$ ... $tag$`), `--` comments and
/// `/* ... */` comments do not end a statement. Leading comment lines are stripped and comment-only
/// fragments dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        match c {
            '\'' | '"' => {
                let end = find_quote_end(&chars, i + 1, c);
                current.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                current.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_block_comment_end(&chars, i + 2);
                current.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '$' => {
                if let Some(tag) = dollar_tag(&chars, i) {
                    let body_start = i + tag.chars().count();
                    let end = find_dollar_end(&chars, body_start, &tag);
                    current.extend(&chars[i..end]);
                    i = end;
                    continue;
                }
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
                i += 1;
                continue;
            }
            _ => {}
        }

        current.push(c);
        i += 1;
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, fragment: &str) {
    let lines: Vec<&str> = fragment
        .lines()
        .skip_while(|l| {
            let l = l.trim();
            l.is_empty() || l.starts_with("--")
        })
        .collect();
    let statement = lines.join("\n");
    let statement = statement.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
}

/// Index just past the closing quote; doubled quotes are escapes.
fn find_quote_end(chars: &[char], mut i: usize, quote: char) -> usize {
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Index just past the `*/` closing a block comment. Block comments nest.
fn find_block_comment_end(chars: &[char], mut i: usize) -> usize {
    let mut depth = 1;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1).copied()) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// A dollar-quote opener at `start`, e.g. `$$` or `$body$`.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut tag = String::from("$");
    for (offset, &c) in chars[start + 1..].iter().enumerate() {
        if c == '$' {
            tag.push('$');
            return Some(tag);
        }
        let ident = c.is_alphanumeric() || c == '_';
        // Positional parameters like $1 are not tags.
        if !ident || (offset == 0 && c.is_ascii_digit()) {
            return None;
        }
        tag.push(c);
    }
    None
}

fn find_dollar_end(chars: &[char], from: usize, tag: &str) -> usize {
    let tag: Vec<char> = tag.chars().collect();
    let mut i = from;
    while i + tag.len() <= chars.len() {
        if chars[i..i + tag.len()] == tag[..] {
            return i + tag.len();
        }
        i += 1;
    }
    chars.len()
}

/// Load migrations from a directory of `.sql` files, sorted by name.
///
/// A missing directory yields no migrations.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<SqlMigration>> {
    if !dir.exists() {
        debug!("Migrations directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if !path.is_file() || path.extension().map(|e| e != "sql").unwrap_or(true) {
            continue;
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                StrataError::Validation(format!("Invalid migration filename: {:?}", path))
            })?
            .to_string();

        let content = std::fs::read_to_string(&path)?;
        migrations.push(SqlMigration::parse(name, &content));
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));

    debug!("Loaded {} migrations from {:?}", migrations.len(), dir);
    Ok(migrations)
}
