//! Configuration file management for mealplan.
//!
//! Provides a TOML-based config file at `~/.config/mealplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mealplan_db::config::DbConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5002;

const BIND_ENV: &str = "MEALPLAN_BIND";
const PORT_ENV: &str = "MEALPLAN_PORT";
const OP_TIMEOUT_ENV: &str = "MEALPLAN_OP_TIMEOUT_MS";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Per-operation deadline in milliseconds; absent means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_timeout_ms: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mealplan config directory: `$XDG_CONFIG_HOME/mealplan` or
/// `~/.config/mealplan`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mealplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mealplan")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path())
}

fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // Owner read/write only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct MealplanConfig {
    pub db_config: DbConfig,
    pub bind: String,
    pub port: u16,
    pub op_timeout: Option<Duration>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl MealplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `MEALPLAN_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Bind: `cli_bind` > `MEALPLAN_BIND` > `server.bind` > `0.0.0.0`
    /// - Port: `cli_port` > `MEALPLAN_PORT` > `server.port` > `5002`
    /// - Deadline: `MEALPLAN_OP_TIMEOUT_MS` > `server.op_timeout_ms` > none
    pub fn resolve(
        cli_db_url: Option<&str>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
    ) -> Result<Self> {
        let file_config = load_config().ok();
        let server = file_config.as_ref().map(|cfg| &cfg.server);

        let db_url = match (cli_db_url, env_var(DbConfig::ENV_VAR)) {
            (Some(url), _) => url.to_string(),
            (None, Some(url)) => url,
            (None, None) => file_config
                .as_ref()
                .map(|cfg| cfg.database.url.clone())
                .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_string()),
        };

        let bind = match (cli_bind, env_var(BIND_ENV)) {
            (Some(bind), _) => bind.to_string(),
            (None, Some(bind)) => bind,
            (None, None) => server
                .and_then(|s| s.bind.clone())
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
        };

        let port = match (cli_port, env_var(PORT_ENV)) {
            (Some(port), _) => port,
            (None, Some(raw)) => raw
                .parse()
                .with_context(|| format!("{PORT_ENV} is not a valid port: {raw}"))?,
            (None, None) => server.and_then(|s| s.port).unwrap_or(DEFAULT_PORT),
        };

        let op_timeout_ms = match env_var(OP_TIMEOUT_ENV) {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("{OP_TIMEOUT_ENV} is not a number of milliseconds: {raw}"))?,
            ),
            None => server.and_then(|s| s.op_timeout_ms),
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            bind,
            port,
            op_timeout: op_timeout_ms.map(Duration::from_millis),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
