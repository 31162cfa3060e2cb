//! # Depot Configuration
//!
//! Settings for the store, the retry policy, the caches and the delete
//! lifecycle.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     DEPOT_DB_PATH=/var/lib/depot/depot.db                               │
//! │     DEPOT_RETRY_MAX=5                                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/depot/depot.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.depot.depot/depot.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "depot.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 500
//! backoff_multiplier = 2.0
//!
//! [cache]
//! preload = true
//!
//! [lifecycle]
//! reserve_deleted_names = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;
use crate::retry::RetryConfig;
use crate::service::WriteOptions;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a free pooled connection (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long SQLite waits on a locked database (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("depot.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    /// Cap for a single wait (milliseconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,

    #[serde(default = "default_true")]
    pub retry_on_connection_failure: bool,

    /// Per-attempt deadline (milliseconds). Unset means no deadline.
    #[serde(default)]
    pub attempt_timeout_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            retry_on_timeout: true,
            retry_on_connection_failure: true,
            attempt_timeout_ms: None,
        }
    }
}

// =============================================================================
// Cache / Lifecycle Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Load every cache when the catalog starts instead of on first read.
    #[serde(default = "default_true")]
    pub preload: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings { preload: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Soft-deleted records keep their name until purged.
    #[serde(default)]
    pub reserve_deleted_names: bool,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete depot configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepotConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

impl DepotConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (depot.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading depot config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load depot config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::ConfigLoadFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Depot config saved");
        Ok(())
    }

    pub fn validate(&self) -> DbResult<()> {
        let db = &self.database;
        if db.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if db.min_connections > db.max_connections {
            return Err(DbError::InvalidConfig(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            )));
        }

        let retry = &self.retry;
        if !(retry.backoff_multiplier >= 1.0) {
            return Err(DbError::InvalidConfig(format!(
                "retry.backoff_multiplier must be at least 1.0, got {}",
                retry.backoff_multiplier
            )));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(DbError::InvalidConfig(
                "retry.max_delay_ms must not be smaller than initial_delay_ms".into(),
            ));
        }
        if retry.attempt_timeout_ms == Some(0) {
            return Err(DbError::InvalidConfig(
                "retry.attempt_timeout_ms must be greater than 0 when set".into(),
            ));
        }

        Ok(())
    }

    /// Applies `DEPOT_*` overrides looked up through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("DEPOT_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = parsed(&lookup, "DEPOT_DB_MAX_CONNECTIONS") {
            self.database.max_connections = max;
        }

        if let Some(max) = parsed(&lookup, "DEPOT_RETRY_MAX") {
            debug!(max_retries = max, "Overriding retry count from environment");
            self.retry.max_retries = max;
        }

        if let Some(delay) = parsed(&lookup, "DEPOT_RETRY_INITIAL_DELAY_MS") {
            self.retry.initial_delay_ms = delay;
        }

        if let Some(multiplier) = parsed(&lookup, "DEPOT_RETRY_MULTIPLIER") {
            self.retry.backoff_multiplier = multiplier;
        }

        if let Some(reserve) = lookup("DEPOT_RESERVE_DELETED_NAMES") {
            match reserve.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.lifecycle.reserve_deleted_names = true,
                "0" | "false" | "no" | "off" => self.lifecycle.reserve_deleted_names = false,
                _ => warn!(value = %reserve, "Unknown DEPOT_RESERVE_DELETED_NAMES value"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "depot", "depot")
            .map(|dirs| dirs.config_dir().join("depot.toml"))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn to_db_config(&self) -> DbConfig {
        let db = &self.database;
        DbConfig::new(db.path.clone())
            .max_connections(db.max_connections)
            .min_connections(db.min_connections)
            .connect_timeout(Duration::from_secs(db.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(db.busy_timeout_ms))
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        let retry = &self.retry;
        RetryConfig::default()
            .max_retries(retry.max_retries)
            .initial_delay(Duration::from_millis(retry.initial_delay_ms))
            .backoff_multiplier(retry.backoff_multiplier)
            .max_delay(Duration::from_millis(retry.max_delay_ms))
            .retry_on_timeout(retry.retry_on_timeout)
            .retry_on_connection_failure(retry.retry_on_connection_failure)
            .attempt_timeout(retry.attempt_timeout_ms.map(Duration::from_millis))
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            reserve_deleted_names: self.lifecycle.reserve_deleted_names,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
