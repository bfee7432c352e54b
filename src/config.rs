//! WolfElect Configuration
//!
//! This module provides configuration structures for the election
//! driver and the storage backend it coordinates through.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main WolfElect configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfElectConfig {
    /// Election timing configuration
    #[serde(default)]
    pub election: ElectionConfig,

    /// Shared store configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Election timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Election name (row key of the claim; distinct names are independent elections)
    #[serde(default = "default_election_name")]
    pub name: String,

    /// How often the driver attempts acquisition or renewal, in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Time since the last heartbeat after which a claim is stale, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Release the claim when the driver is stopped
    #[serde(default)]
    pub release_on_stop: bool,
}

/// Shared store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Always-leader backend for single-process deployments
    Noop,

    /// SQLite database file shared by all participants on one host
    Sqlite {
        /// Database file path
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Claim table name
        #[serde(default = "default_table")]
        table: String,

        /// How long to wait for the write lock, in milliseconds
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },

    /// MySQL / MariaDB server
    Mysql {
        /// Server host
        host: String,

        /// Server port
        #[serde(default = "default_db_port")]
        port: u16,

        /// Database user
        user: String,

        /// Database password
        #[serde(default)]
        password: String,

        /// Database name
        database: String,

        /// Connection pool size
        #[serde(default = "default_pool_size")]
        pool_size: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connect_timeout")]
        connect_timeout_secs: u64,

        /// Claim table name
        #[serde(default = "default_table")]
        table: String,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_election_name() -> String {
    "default".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_timeout_ms() -> u64 {
    25_000
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("/var/lib/wolfelect/election.db")
}

fn default_table() -> String {
    "leader_election".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_db_port() -> u16 {
    3306
}

fn default_pool_size() -> u32 {
    2
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            name: default_election_name(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            timeout_ms: default_timeout_ms(),
            release_on_stop: false,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Noop
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ElectionConfig {
    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Get lease timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the election settings
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::Config("election.name cannot be empty".into()));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(crate::Error::Config(
                "election.heartbeat_interval_ms must be greater than 0".into(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(crate::Error::Config("election.timeout_ms must be greater than 0".into()));
        }

        if self.has_timing_hazard() {
            tracing::warn!(
                "election.heartbeat_interval_ms ({}) >= election.timeout_ms ({}): \
                 a healthy leader may look stale to other processes between renewals",
                self.heartbeat_interval_ms,
                self.timeout_ms
            );
        }

        Ok(())
    }

    /// Check if the leader can appear stale between two of its own renewals
    pub fn has_timing_hazard(&self) -> bool {
        self.heartbeat_interval_ms >= self.timeout_ms
    }
}

impl BackendConfig {
    /// Short backend kind name
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Noop => "noop",
            BackendConfig::Sqlite { .. } => "sqlite",
            BackendConfig::Mysql { .. } => "mysql",
        }
    }

    /// Validate the backend settings
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            BackendConfig::Noop => Ok(()),
            BackendConfig::Sqlite { path, table, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(crate::Error::Config("backend.path cannot be empty".into()));
                }
                validate_table(table)
            }
            BackendConfig::Mysql { host, user, database, table, .. } => {
                if host.is_empty() {
                    return Err(crate::Error::Config("backend.host cannot be empty".into()));
                }
                if user.is_empty() {
                    return Err(crate::Error::Config("backend.user cannot be empty".into()));
                }
                if database.is_empty() {
                    return Err(crate::Error::Config("backend.database cannot be empty".into()));
                }
                validate_table(table)
            }
        }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are accepted
pub fn validate_table(table: &str) -> crate::Result<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(crate::Error::Config(format!(
            "backend.table '{}' is not a valid identifier",
            table
        )))
    }
}

impl WolfElectConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfElectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.election.validate()?;
        self.backend.validate()?;

        if self.has_blocking_hazard() {
            tracing::warn!(
                "backend.busy_timeout_ms is not shorter than election.heartbeat_interval_ms ({}): \
                 a contended attempt can block a runtime worker past the next heartbeat",
                self.election.heartbeat_interval_ms
            );
        }

        Ok(())
    }

    /// Check if a blocked SQLite `begin` can outlast a heartbeat interval
    pub fn has_blocking_hazard(&self) -> bool {
        match &self.backend {
            BackendConfig::Sqlite { busy_timeout_ms, .. } => {
                *busy_timeout_ms >= self.election.heartbeat_interval_ms
            }
            _ => false,
        }
    }
}
