//! Configuration loading

use anyhow::{Context, Result};
use keygate_auth::AuthConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `KEYGATE_AUTH__TOKEN__SECRET`
const ENV_PREFIX: &str = "KEYGATE";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File the settings were read from, if it existed
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_db_path() -> String {
    "./data/keygate.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

impl Config {
    /// Load configuration from a file, then apply environment overrides
    ///
    /// A missing file is not an error; a missing signing secret is.
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: &str, env: config::Environment) -> Result<Self> {
        let config_path = Path::new(path);

        let mut config: Config = config::Config::builder()
            .add_source(config::File::from(config_path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration from {}", path))?;

        config
            .auth
            .validate()
            .context("Invalid authentication configuration")?;

        config.loaded_from = config_path.is_file().then(|| config_path.to_path_buf());
        Ok(config)
    }
}
