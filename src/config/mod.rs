//! # Migrator Configuration
//!
//! Configuration is consumed by the engine, never owned by it. Values are
//! layered by [`ConfigManager`]: built-in defaults, then an optional TOML
//! file, then `MIGRATOR__SECTION__KEY` environment variables.
//!
//! A missing or unreadable source is never fatal. The loader warns and keeps
//! the defaults; invalid values are replaced the same way.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use migrator_core::config::ConfigManager;
//!
//! let manager = ConfigManager::load();
//! let migration = &manager.config().migration;
//! println!("claiming {} items per batch", migration.batch_size);
//! ```

pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub use loader::ConfigManager;

/// Root configuration for one migrator process
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Connection string; `DATABASE_URL` takes precedence when set
    pub database_url: String,

    /// Identity recorded in `claimed_by`; derived from the host when absent
    pub worker_id: Option<String>,

    pub database: DatabaseConfig,

    pub migration: MigrationConfig,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
            worker_id: None,
            database: DatabaseConfig::default(),
            migration: MigrationConfig::default(),
        }
    }
}

impl MigratorConfig {
    /// Replace invalid values with their defaults, warning for each one
    pub fn sanitized(mut self) -> Self {
        self.migration = self.migration.sanitized();
        if self.database.max_connections == 0 {
            warn!(
                default = defaults::MAX_CONNECTIONS,
                "database.max_connections must be positive; using default"
            );
            self.database.max_connections = defaults::MAX_CONNECTIONS;
        }
        if self
            .worker_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            self.worker_id = None;
        }
        self
    }
}

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::MAX_CONNECTIONS,
            acquire_timeout_seconds: defaults::ACQUIRE_TIMEOUT_SECONDS,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Per-run engine settings, read-only once the run starts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Claim statement; binds `$1` worker id, `$2` batch size, `$3` status ceiling
    pub load_query: String,
    /// Items claimed per round
    pub batch_size: u32,
    /// Items whose status code is at most this value are eligible
    pub status_ceiling: i32,
    /// Processed items between progress flushes
    pub logging_frequency: u32,
    /// Age after which another run may take back an unfinished claim
    pub claim_lease_seconds: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            load_query: defaults::LOAD_QUERY.to_string(),
            batch_size: defaults::BATCH_SIZE,
            status_ceiling: defaults::STATUS_CEILING,
            logging_frequency: defaults::LOGGING_FREQUENCY,
            claim_lease_seconds: defaults::CLAIM_LEASE_SECONDS,
        }
    }
}

impl MigrationConfig {
    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_seconds)
    }

    pub fn sanitized(mut self) -> Self {
        if self.load_query.trim().is_empty() {
            warn!("migration.load_query is empty; using the bundled claim function");
            self.load_query = defaults::LOAD_QUERY.to_string();
        }
        if self.batch_size == 0 {
            warn!(
                default = defaults::BATCH_SIZE,
                "migration.batch_size must be positive; using default"
            );
            self.batch_size = defaults::BATCH_SIZE;
        }
        if self.logging_frequency == 0 {
            warn!(
                default = defaults::LOGGING_FREQUENCY,
                "migration.logging_frequency must be positive; using default"
            );
            self.logging_frequency = defaults::LOGGING_FREQUENCY;
        }
        if self.claim_lease_seconds == 0 {
            warn!(
                default = defaults::CLAIM_LEASE_SECONDS,
                "migration.claim_lease_seconds must be positive; using default"
            );
            self.claim_lease_seconds = defaults::CLAIM_LEASE_SECONDS;
        }
        self
    }
}
