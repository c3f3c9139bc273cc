//! Application configuration.

use serde::Deserialize;
use std::path::Path;

use crate::id::{DEFAULT_SHARE_TOKEN_LENGTH, MAX_SHARE_TOKEN_LENGTH, MIN_SHARE_TOKEN_LENGTH};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration. Required when the ledger runs on the database backend.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Ledger configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Which storage backend holds the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Process-local maps, lost on restart.
    #[default]
    Memory,
    /// Relational database through sea-orm.
    Database,
}

/// Ledger bookkeeping configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Storage backend.
    #[serde(default)]
    pub backend: LedgerBackend,
    /// Amount credited to a file owner per download, in the smallest currency unit.
    #[serde(default = "default_earnings_per_download")]
    pub earnings_per_download: i64,
    /// Whether downloads without a signed-in user earn anything.
    #[serde(default = "default_true")]
    pub credit_anonymous_downloads: bool,
    /// Length of generated share tokens.
    #[serde(default = "default_share_token_length")]
    pub share_token_length: usize,
    /// Limit used by the file listings when the caller gives none.
    #[serde(default = "default_list_limit")]
    pub default_list_limit: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_earnings_per_download() -> i64 {
    450
}

const fn default_true() -> bool {
    true
}

const fn default_share_token_length() -> usize {
    DEFAULT_SHARE_TOKEN_LENGTH
}

const fn default_list_limit() -> u64 {
    10
}

fn default_log_filter() -> String {
    "favisend=info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            earnings_per_download: default_earnings_per_download(),
            credit_anonymous_downloads: true,
            share_token_length: default_share_token_length(),
            default_list_limit: default_list_limit(),
        }
    }
}

impl LedgerConfig {
    /// Share token length, kept within
    /// [`MIN_SHARE_TOKEN_LENGTH`]..=[`MAX_SHARE_TOKEN_LENGTH`].
    #[must_use]
    pub fn effective_share_token_length(&self) -> usize {
        self.share_token_length
            .clamp(MIN_SHARE_TOKEN_LENGTH, MAX_SHARE_TOKEN_LENGTH)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `FAVISEND_ENV`)
    /// 3. Environment variables with `FAVISEND_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("FAVISEND_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("FAVISEND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("FAVISEND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parse configuration from a TOML string, without the environment overlay.
    pub fn from_toml_str(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
