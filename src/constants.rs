//! # System Constants
//!
//! Defaults and fixed names shared by the store, the engine and the binary.

pub use crate::state_machine::{ControllerState, WorkItemStatus};

/// Configuration defaults applied when a source is missing or a value is invalid
pub mod defaults {
    /// Claims go through the bundled SQL function; binds are worker, batch size, status ceiling
    pub const LOAD_QUERY: &str =
        "SELECT identity, status, parent_path, claimed_at FROM claim_work_items($1, $2, $3)";
    pub const BATCH_SIZE: u32 = 50;
    pub const STATUS_CEILING: i32 = 1;
    pub const LOGGING_FREQUENCY: u32 = 10;
    /// Age after which an unfinished claim is considered abandoned
    pub const CLAIM_LEASE_SECONDS: u64 = 3_600;
    pub const MAX_CONNECTIONS: u32 = 5;
    pub const ACQUIRE_TIMEOUT_SECONDS: u64 = 30;
    pub const DATABASE_URL: &str = "postgresql://localhost/legacy_migration_development";
    pub const CONFIG_FILE: &str = "config/migrator.toml";
}

/// Environment variable names understood by the loader and the logger
pub mod env {
    pub const CONFIG_PATH: &str = "MIGRATOR_CONFIG_PATH";
    pub const ENV_PREFIX: &str = "MIGRATOR";
    pub const ENV_SEPARATOR: &str = "__";
    pub const ENVIRONMENT: &str = "MIGRATOR_ENV";
    pub const LOG_FORMAT: &str = "MIGRATOR_LOG_FORMAT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const HOSTNAME: &str = "HOSTNAME";
}

/// Value a blank grouping key is normalized to by the repair pass
pub const DEFAULT_PARENT_PATH: &str = "/";

/// Savepoint name used for the per-item scope inside a batch transaction
pub const ITEM_SAVEPOINT: &str = "migrator_work_item";
