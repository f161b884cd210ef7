//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

use jointfab_types::FabricIndex;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub fabric: FabricConfig,

    #[serde(default)]
    pub commissioning: CommissioningConfig,

    #[serde(default)]
    pub datastore: DatastoreConfig,

    #[serde(default)]
    pub access: AccessConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database holding committed fabrics.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "jointfab_admin=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Fabric table and coordinator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FabricConfig {
    #[serde(default = "default_max_fabrics")]
    pub max_fabrics: usize,

    /// Fabric this node shares with the rest of the ecosystem. Unset
    /// disables both issuance commands.
    #[serde(default = "default_ecosystem_fabric_index")]
    pub ecosystem_fabric_index: Option<FabricIndex>,

    #[serde(default)]
    pub administrator_fabric_index: Option<FabricIndex>,

    /// Seconds an issuance may stay uncommitted before it is reverted.
    #[serde(default = "default_fail_safe_timeout_secs")]
    pub fail_safe_timeout_secs: u64,
}

/// Commissioning window timeout bounds, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct CommissioningConfig {
    #[serde(default = "default_min_timeout_secs")]
    pub min_timeout_secs: u64,

    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatastoreConfig {
    /// Maximum entries per datastore table.
    #[serde(default = "default_datastore_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_max_entries_per_fabric")]
    pub max_entries_per_fabric: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5540
}

fn default_db_path() -> String {
    "jointfab.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_fabrics() -> usize {
    jointfab_fabric::DEFAULT_MAX_FABRICS
}

fn default_ecosystem_fabric_index() -> Option<FabricIndex> {
    Some(FabricIndex::MIN)
}

fn default_fail_safe_timeout_secs() -> u64 {
    jointfab_admin::DEFAULT_FAIL_SAFE_TIMEOUT.as_secs()
}

fn default_min_timeout_secs() -> u64 {
    jointfab_admin::DEFAULT_MIN_COMMISSIONING_TIMEOUT.as_secs()
}

fn default_max_timeout_secs() -> u64 {
    jointfab_admin::DEFAULT_MAX_COMMISSIONING_TIMEOUT.as_secs()
}

fn default_datastore_capacity() -> usize {
    jointfab_datastore::DEFAULT_CAPACITY
}

fn default_max_entries_per_fabric() -> usize {
    jointfab_access::DEFAULT_MAX_ENTRIES_PER_FABRIC
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            max_fabrics: default_max_fabrics(),
            ecosystem_fabric_index: default_ecosystem_fabric_index(),
            administrator_fabric_index: None,
            fail_safe_timeout_secs: default_fail_safe_timeout_secs(),
        }
    }
}

impl Default for CommissioningConfig {
    fn default() -> Self {
        Self {
            min_timeout_secs: default_min_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
        }
    }
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_datastore_capacity(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_entries_per_fabric: default_max_entries_per_fabric(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `JOINTFAB_HOST` overrides `server.host`
/// - `JOINTFAB_PORT` overrides `server.port`
/// - `JOINTFAB_DB_PATH` overrides `database.path`
/// - `JOINTFAB_LOG_LEVEL` overrides `logging.level`
/// - `JOINTFAB_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `JOINTFAB_ECOSYSTEM_FABRIC_INDEX` overrides `fabric.ecosystem_fabric_index`
///   (empty or "none" unsets it)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the resulting settings are inconsistent.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("JOINTFAB_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("JOINTFAB_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("JOINTFAB_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("JOINTFAB_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("JOINTFAB_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(index) = var("JOINTFAB_ECOSYSTEM_FABRIC_INDEX") {
        let index = index.trim();
        if index.is_empty() || index.eq_ignore_ascii_case("none") {
            config.fabric.ecosystem_fabric_index = None;
        } else if let Some(parsed) = index.parse::<u8>().ok().and_then(FabricIndex::new) {
            config.fabric.ecosystem_fabric_index = Some(parsed);
        }
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.commissioning.min_timeout_secs > config.commissioning.max_timeout_secs {
        return Err(ConfigError::Invalid(format!(
            "commissioning.min_timeout_secs ({}) exceeds max_timeout_secs ({})",
            config.commissioning.min_timeout_secs, config.commissioning.max_timeout_secs
        )));
    }
    if config.fabric.max_fabrics == 0 || config.fabric.max_fabrics > usize::from(FabricIndex::MAX.get()) {
        return Err(ConfigError::Invalid(format!(
            "fabric.max_fabrics must be 1..=254, got {}",
            config.fabric.max_fabrics
        )));
    }
    if config.fabric.fail_safe_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "fabric.fail_safe_timeout_secs must be positive".to_string(),
        ));
    }
    Ok(())
}
