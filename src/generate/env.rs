//! .env credentials file

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use rand::{Rng, distr::Alphanumeric};

/// Length of the generated database password
pub const DB_PASSWORD_LENGTH: usize = 32;

/// Generate a random password from `[A-Za-z0-9]` using the thread-local CSPRNG
pub fn generate_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Credentials shared by the postgres and odoo containers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn generate(database: &str, user: &str) -> Self {
        Self {
            database: database.to_string(),
            user: user.to_string(),
            password: generate_password(DB_PASSWORD_LENGTH),
        }
    }
}

/// Generate .env content
pub fn generate_env_content(creds: &Credentials) -> String {
    format!(
        r#"# PostgreSQL Configuration
POSTGRES_DB={database}
POSTGRES_USER={user}
POSTGRES_PASSWORD={password}

# Odoo Configuration
HOST=postgres
USER={user}
PASSWORD={password}
"#,
        database = creds.database,
        user = creds.user,
        password = creds.password,
    )
}

/// Generate .env file
pub fn generate_env_file(path: &Path, creds: &Credentials) -> Result<()> {
    fs::write(path, generate_env_content(creds)).context("Failed to write .env file")?;
    Ok(())
}

/// Parse `KEY=VALUE` lines, skipping blanks and comments
pub fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }

    vars
}

/// Read an env file if it exists
pub fn read_env_file(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).context(format!("Failed to read env file: {:?}", path))?;
    Ok(Some(parse_env(&content)))
}
