//! Stack configuration
//!
//! Settings are layered: built-in defaults, then the global
//! `config.toml` in the user configuration directory, then
//! `odoo-manager.toml` in the stack directory. Tables are merged key by key,
//! so a stack file only needs the values it changes.

use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-stack configuration file name
pub const STACK_CONFIG_FILE: &str = "odoo-manager.toml";

/// Global configuration file name inside the configuration directory
pub const GLOBAL_CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the global configuration directory
pub const CONFIG_DIR_ENV: &str = "ODM_CONFIG_DIR";

static SQL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

static PROJECT_NAME_INVALID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]").expect("static regex"));

/// Get the global configuration directory
/// Checks ODM_CONFIG_DIR first, then defaults to <config dir>/odoo-manager
pub fn global_config_dir() -> Option<PathBuf> {
    config_dir_from(env::var_os(CONFIG_DIR_ENV))
}

fn config_dir_from(custom_dir: Option<OsString>) -> Option<PathBuf> {
    match custom_dir {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|dir| dir.join("odoo-manager")),
    }
}

/// Which Compose implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeMode {
    /// Probe `docker compose`, then `docker-compose`
    #[default]
    Auto,
    Plugin,
    Standalone,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct StackConfig {
    pub project: ProjectSettings,
    pub odoo: OdooSettings,
    pub postgres: PostgresSettings,
    pub network: NetworkSettings,
    pub runtime: RuntimeSettings,
    pub backup: BackupSettings,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProjectSettings {
    /// Compose project name; defaults to the stack directory name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct OdooSettings {
    pub image: String,
    pub container_name: String,
    /// Host address the web port is published on
    pub bind_address: String,
    pub port: u16,
}

impl Default for OdooSettings {
    fn default() -> Self {
        Self {
            image: "odoo:17".to_string(),
            container_name: "odoo_app".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 8069,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PostgresSettings {
    pub image: String,
    pub container_name: String,
    pub user: String,
    /// Database created by the postgres image and targeted by SQL commands
    pub database: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            image: "postgres:15".to_string(),
            container_name: "odoo_postgres".to_string(),
            user: "odoo".to_string(),
            database: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct NetworkSettings {
    pub name: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            name: "odoo_network".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeSettings {
    pub compose: ComposeMode,
    /// Seconds to wait after starting containers before showing logs
    pub startup_wait_secs: u64,
    /// Default number of log lines for `logs`
    pub log_tail: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            compose: ComposeMode::Auto,
            startup_wait_secs: 10,
            log_tail: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackupSettings {
    /// Number of archives to keep (0 keeps all)
    pub keep: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self { keep: 10 }
    }
}

impl StackConfig {
    /// Load the effective configuration for a stack directory
    pub fn load(stack_dir: &Path) -> Result<Self> {
        Self::load_from(global_config_dir().as_deref(), stack_dir)
    }

    /// Load with an explicit global configuration directory
    pub fn load_from(global_dir: Option<&Path>, stack_dir: &Path) -> Result<Self> {
        let global = global_dir.map(|dir| dir.join(GLOBAL_CONFIG_FILE));
        let stack = stack_dir.join(STACK_CONFIG_FILE);

        let mut layers: Vec<&Path> = Vec::new();
        if let Some(global) = &global {
            layers.push(global);
        }
        layers.push(&stack);

        Self::load_layered(&layers)
    }

    /// Merge the given files over the defaults. Missing files are skipped.
    pub fn load_layered(layers: &[&Path]) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in layers {
            if !path.exists() {
                debug!(path = %path.display(), "config layer not present");
                continue;
            }

            let content = fs::read_to_string(path)
                .context(format!("Failed to read configuration: {:?}", path))?;
            let table: toml::Table = toml::from_str(&content)
                .context(format!("Failed to parse configuration: {:?}", path))?;

            debug!(path = %path.display(), "config layer loaded");
            merge_tables(&mut merged, table);
        }

        let config: StackConfig = toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values that would end up unquoted in SQL or YAML
    pub fn validate(&self) -> Result<()> {
        if !is_sql_identifier(&self.postgres.user) {
            bail!(
                "Invalid postgres.user '{}': use letters, digits and underscores",
                self.postgres.user
            );
        }
        if !is_sql_identifier(&self.postgres.database) {
            bail!(
                "Invalid postgres.database '{}': use letters, digits and underscores",
                self.postgres.database
            );
        }
        if self.odoo.port == 0 {
            bail!("Invalid odoo.port: must be between 1 and 65535");
        }
        if self.network.name.trim().is_empty() {
            bail!("network.name must not be empty");
        }
        if let Some(name) = &self.project.name {
            if sanitize_project_name(name) != *name {
                bail!(
                    "Invalid project.name '{}': use lowercase letters, digits, '-' and '_'",
                    name
                );
            }
        }

        Ok(())
    }

    /// Compose project name for a stack directory
    pub fn project_name(&self, stack_dir: &Path) -> String {
        if let Some(name) = &self.project.name {
            return name.clone();
        }

        let dir_name = stack_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        sanitize_project_name(&dir_name)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Recursively merge `overlay` into `base`; overlay values win
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// True for plain SQL identifiers that are safe to embed unquoted
pub fn is_sql_identifier(value: &str) -> bool {
    SQL_IDENTIFIER.is_match(value)
}

/// Normalize a name the way Compose accepts project names
pub fn sanitize_project_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let cleaned = PROJECT_NAME_INVALID.replace_all(&lowered, "");
    let trimmed = cleaned.trim_start_matches(['-', '_']);

    if trimmed.is_empty() {
        "odoo".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults_match_stock_stack() {
        let config = StackConfig::default();

        assert_eq!(config.odoo.image, "odoo:17");
        assert_eq!(config.odoo.container_name, "odoo_app");
        assert_eq!(config.odoo.port, 8069);
        assert_eq!(config.postgres.image, "postgres:15");
        assert_eq!(config.postgres.container_name, "odoo_postgres");
        assert_eq!(config.postgres.user, "odoo");
        assert_eq!(config.network.name, "odoo_network");
        assert_eq!(config.runtime.compose, ComposeMode::Auto);
        assert_eq!(config.backup.keep, 10);
    }

    #[test]
    fn test_layers_merge_per_key() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("global.toml");
        let stack = dir.path().join(STACK_CONFIG_FILE);

        fs::write(
            &global,
            "[odoo]\nimage = \"odoo:16\"\nport = 9069\n\n[runtime]\ncompose = \"standalone\"\n",
        )
        .unwrap();
        fs::write(&stack, "[odoo]\nport = 10069\n").unwrap();

        let config = StackConfig::load_layered(&[&global, &stack]).unwrap();

        assert_eq!(config.odoo.image, "odoo:16");
        assert_eq!(config.odoo.port, 10069);
        assert_eq!(config.odoo.container_name, "odoo_app");
        assert_eq!(config.runtime.compose, ComposeMode::Standalone);
    }

    #[test]
    fn test_config_dir_override() {
        let dir = TempDir::new().unwrap();

        let resolved = config_dir_from(Some(dir.path().as_os_str().to_owned()));
        assert_eq!(resolved.as_deref(), Some(dir.path()));

        // An empty override falls back to the platform directory
        let fallback = config_dir_from(Some(OsString::new()));
        assert_eq!(fallback, dirs::config_dir().map(|d| d.join("odoo-manager")));
    }

    #[test]
    fn test_load_finds_global_and_stack_files() {
        let global_dir = TempDir::new().unwrap();
        let stack_dir = TempDir::new().unwrap();
        fs::write(
            global_dir.path().join(GLOBAL_CONFIG_FILE),
            "[postgres]\nimage = \"postgres:16\"\n\n[backup]\nkeep = 3\n",
        )
        .unwrap();
        fs::write(stack_dir.path().join(STACK_CONFIG_FILE), "[backup]\nkeep = 5\n").unwrap();

        let config = StackConfig::load_from(Some(global_dir.path()), stack_dir.path()).unwrap();

        assert_eq!(config.postgres.image, "postgres:16");
        assert_eq!(config.backup.keep, 5);
    }

    #[test]
    fn test_missing_layers_give_defaults() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");

        let config = StackConfig::load_layered(&[&missing]).unwrap();
        assert_eq!(config, StackConfig::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let stack = dir.path().join(STACK_CONFIG_FILE);
        fs::write(&stack, "[odoo]\nimgae = \"odoo:16\"\n").unwrap();

        let err = StackConfig::load_layered(&[&stack]).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown field"));
    }

    #[test]
    fn test_unsafe_database_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let stack = dir.path().join(STACK_CONFIG_FILE);
        fs::write(&stack, "[postgres]\ndatabase = \"x; DROP TABLE y\"\n").unwrap();

        let err = StackConfig::load_layered(&[&stack]).unwrap_err();
        assert!(err.to_string().contains("Invalid postgres.database"));
    }

    #[test]
    fn test_project_name_from_directory() {
        let config = StackConfig::default();

        assert_eq!(config.project_name(Path::new("/home/me/My Shop.v2")), "myshopv2");
        assert_eq!(config.project_name(Path::new("/")), "odoo");
    }

    #[test]
    fn test_explicit_project_name_wins() {
        let mut config = StackConfig::default();
        config.project.name = Some("erp".to_string());

        assert_eq!(config.project_name(Path::new("/srv/anything")), "erp");
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = StackConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: StackConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed, config);
        assert!(text.contains("[postgres]"));
    }

    #[test]
    fn test_sql_identifier() {
        assert!(is_sql_identifier("postgres"));
        assert!(is_sql_identifier("_odoo17"));
        assert!(!is_sql_identifier("17odoo"));
        assert!(!is_sql_identifier("odoo-db"));
        assert!(!is_sql_identifier(""));
    }
}
