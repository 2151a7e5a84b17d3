//! Configuration file support for tailsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `TAILSYNC_`, e.g., `TAILSYNC_DATABASE_URL`)
//! 3. Config file (~/.config/tailsync/config.toml or ./tailsync.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/tailsync/tailsync.db` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "postgres://localhost/tailsync"  # optional, defaults to SQLite
//!
//! [api]
//! key = "..."  # or use TAILSYNC_API_KEY env var
//! requests_per_second = 4
//!
//! [sync]
//! chain = "ethereum"
//! start_date = "2023-01-01"
//! units = 4
//! workers_per_unit = 4
//! contracts = ["0x..."]
//! tail_interval_secs = 15
//! ```

use std::path::PathBuf;

use chrono::NaiveDate;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use tailsync::Chain;
use tailsync::source::DEFAULT_REQUESTS_PER_SECOND;
use tailsync::sync::{
    DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_RETRY_BACKOFF, DEFAULT_TAIL_INTERVAL, DEFAULT_UNITS,
    DEFAULT_WORKERS_PER_UNIT,
};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    /// Default sync options.
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// Upstream API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key sent as `x-api-key`.
    /// Can also be set via TAILSYNC_API_KEY environment variable.
    pub key: Option<String>,
    /// Proactive request rate.
    pub requests_per_second: u32,
    /// Whether to disable proactive rate limiting.
    pub no_rate_limit: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            no_rate_limit: false,
        }
    }
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub chain: Chain,
    /// First day of the backfill; its month is the first one assigned.
    pub start_date: Option<NaiveDate>,
    pub units: usize,
    pub workers_per_unit: usize,
    /// Contract allow-list (empty = all contracts).
    pub contracts: Vec<String>,
    pub tail_interval_secs: u64,
    pub retry_backoff_secs: u64,
    pub checkpoint_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chain: Chain::default(),
            start_date: None,
            units: DEFAULT_UNITS,
            workers_per_unit: DEFAULT_WORKERS_PER_UNIT,
            contracts: Vec::new(),
            tail_interval_secs: DEFAULT_TAIL_INTERVAL.as_secs(),
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF.as_secs(),
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/tailsync/config.toml)
    /// 3. Local config file (./tailsync.toml)
    /// 4. Environment variables with TAILSYNC_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "tailsync") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("tailsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./tailsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., TAILSYNC_DATABASE_URL -> database.url, TAILSYNC_API_KEY -> api.key
        builder = builder.add_source(
            Environment::with_prefix("TAILSYNC")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("tailsync.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn api_key(&self) -> Option<String> {
        self.api.key.clone().filter(|k| !k.is_empty())
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/tailsync` or `~/.local/state/tailsync`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tailsync").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
