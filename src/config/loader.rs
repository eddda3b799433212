//! Configuration Loader
//!
//! Layers defaults, an optional TOML file and environment variables with the
//! `config` crate. Every failure degrades to defaults with a warning.

use super::MigratorConfig;
use crate::constants::{defaults, env};
use crate::error::Result;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: MigratorConfig,
    source_path: Option<PathBuf>,
    used_defaults: bool,
}

impl ConfigManager {
    /// Load from `MIGRATOR_CONFIG_PATH` (or `config/migrator.toml`) and the process environment
    pub fn load() -> Arc<ConfigManager> {
        let path = std::env::var(env::CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(defaults::CONFIG_FILE));
        Self::load_from_path(&path)
    }

    /// Load from an explicit file and the process environment
    pub fn load_from_path(path: &Path) -> Arc<ConfigManager> {
        Self::load_with_env(path, None)
    }

    /// Load from an explicit file and an explicit environment map
    ///
    /// Passing `Some(map)` replaces the process environment, which keeps tests
    /// from depending on global variables.
    pub fn load_with_env(
        path: &Path,
        environment: Option<HashMap<String, String>>,
    ) -> Arc<ConfigManager> {
        let database_url_override = match &environment {
            Some(map) => map.get(env::DATABASE_URL).cloned(),
            None => std::env::var(env::DATABASE_URL).ok(),
        };

        let (mut config, used_defaults) = match Self::try_load(path, environment) {
            Ok(config) => (config, false),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Configuration could not be loaded; continuing with defaults"
                );
                (MigratorConfig::default(), true)
            }
        };

        if let Some(url) = database_url_override {
            config.database_url = url;
        }

        let config = config.sanitized();
        debug!(
            batch_size = config.migration.batch_size,
            status_ceiling = config.migration.status_ceiling,
            logging_frequency = config.migration.logging_frequency,
            "Migration configuration resolved"
        );

        Arc::new(ConfigManager {
            config,
            source_path: path.exists().then(|| path.to_path_buf()),
            used_defaults,
        })
    }

    fn try_load(
        path: &Path,
        environment: Option<HashMap<String, String>>,
    ) -> Result<MigratorConfig> {
        if !path.exists() {
            warn!(
                path = %path.display(),
                "Configuration file not found; using defaults and environment"
            );
        }

        let settings = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix(env::ENV_PREFIX)
                    .separator(env::ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(environment),
            )
            .build()?;

        let config = settings.try_deserialize::<MigratorConfig>()?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// File the values were read from, if it existed
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// True when loading failed and only defaults are in effect
    pub fn used_defaults(&self) -> bool {
        self.used_defaults
    }

    /// Worker identity: configured value, else host name plus process id, else a fresh id
    pub fn resolve_worker_id(&self) -> String {
        if let Some(worker_id) = &self.config.worker_id {
            return worker_id.clone();
        }
        match std::env::var(env::HOSTNAME) {
            Ok(host) if !host.trim().is_empty() => {
                format!("migrator-{}-{}", host.trim(), std::process::id())
            }
            _ => format!("migrator-{}", Uuid::new_v4()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_values_from_toml_file() {
        let file = write_config(
            r#"
            database_url = "postgresql://db/legacy"
            worker_id = "node-a"

            [migration]
            batch_size = 25
            status_ceiling = 0
            logging_frequency = 5
            "#,
        );

        let manager = ConfigManager::load_with_env(file.path(), Some(HashMap::new()));
        let config = manager.config();
        assert!(!manager.used_defaults());
        assert_eq!(config.database_url, "postgresql://db/legacy");
        assert_eq!(config.migration.batch_size, 25);
        assert_eq!(config.migration.status_ceiling, 0);
        assert_eq!(config.migration.logging_frequency, 5);
        assert_eq!(manager.resolve_worker_id(), "node-a");
        assert_eq!(manager.source_path(), Some(file.path()));
    }

    #[test]
    fn test_derived_worker_id_is_unique_to_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let manager = ConfigManager::load_with_env(&path, Some(HashMap::new()));

        let worker_id = manager.resolve_worker_id();
        assert!(worker_id.starts_with("migrator-"));
        match std::env::var(env::HOSTNAME) {
            Ok(host) if !host.trim().is_empty() => {
                assert_eq!(
                    worker_id,
                    format!("migrator-{}-{}", host.trim(), std::process::id())
                );
            }
            _ => assert!(Uuid::parse_str(worker_id.trim_start_matches("migrator-")).is_ok()),
        }
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[migration]\nbatch_size = 25\n");
        let mut environment = HashMap::new();
        environment.insert(
            "MIGRATOR__MIGRATION__BATCH_SIZE".to_string(),
            "7".to_string(),
        );
        environment.insert(
            "DATABASE_URL".to_string(),
            "postgresql://override/db".to_string(),
        );

        let manager = ConfigManager::load_with_env(file.path(), Some(environment));
        assert_eq!(manager.config().migration.batch_size, 7);
        assert_eq!(manager.config().database_url, "postgresql://override/db");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let manager = ConfigManager::load_with_env(&path, Some(HashMap::new()));
        assert_eq!(manager.config().migration, super::super::MigrationConfig::default());
        assert!(manager.source_path().is_none());
    }

    #[test]
    fn test_unreadable_file_falls_back_to_defaults() {
        let file = write_config("[migration\nbatch_size = = 3");

        let manager = ConfigManager::load_with_env(file.path(), Some(HashMap::new()));
        assert!(manager.used_defaults());
        assert_eq!(manager.config().migration.batch_size, defaults::BATCH_SIZE);
    }

    #[test]
    fn test_invalid_values_are_sanitized() {
        let file = write_config("[migration]\nbatch_size = 0\nlogging_frequency = 0\n");

        let manager = ConfigManager::load_with_env(file.path(), Some(HashMap::new()));
        assert_eq!(manager.config().migration.batch_size, defaults::BATCH_SIZE);
        assert_eq!(
            manager.config().migration.logging_frequency,
            defaults::LOGGING_FREQUENCY
        );
    }
}
