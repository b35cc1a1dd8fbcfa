//! Configuration loading for the reindexer.
//!
//! Layered config: defaults -> config file -> explicit file -> env vars.
//! The default config file lives at ~/.config/resource-reindex/config.{toml,json,...}.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ReindexError;

/// Reindexer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexSettings {
    /// Maximum number of resources reindexed concurrently
    #[serde(default = "default_reindex_thread_count")]
    pub reindex_thread_count: usize,

    /// Backlog of submitted-but-not-started resource tasks before submission waits
    #[serde(default = "default_reindex_queue_capacity")]
    pub reindex_queue_capacity: usize,

    /// When true, scheduled passes are skipped. Forced passes still run.
    #[serde(default)]
    pub scheduling_disabled: bool,

    /// Cron expression for scheduled passes (6-field, with seconds)
    #[serde(default = "default_cron")]
    pub cron: String,

    /// IANA timezone for the cron schedule
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Path to the RocksDB job store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_reindex_thread_count() -> usize {
    4
}

fn default_reindex_queue_capacity() -> usize {
    100
}

fn default_cron() -> String {
    "*/10 * * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "resource-reindex")
        .map(|p| p.data_local_dir().join("jobs"))
        .unwrap_or_else(|| PathBuf::from("./reindex-jobs"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReindexSettings {
    fn default() -> Self {
        Self {
            reindex_thread_count: default_reindex_thread_count(),
            reindex_queue_capacity: default_reindex_queue_capacity(),
            scheduling_disabled: false,
            cron: default_cron(),
            timezone: default_timezone(),
            db_path: default_db_path(),
            log_level: default_log_level(),
        }
    }
}

impl ReindexSettings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/resource-reindex/config)
    /// 3. Explicit config file (optional, must exist)
    /// 4. Environment variables (REINDEX_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, ReindexError> {
        let config_dir = ProjectDirs::from("", "", "resource-reindex")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("reindex_thread_count", default_reindex_thread_count() as i64)
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default(
                "reindex_queue_capacity",
                default_reindex_queue_capacity() as i64,
            )
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("scheduling_disabled", false)
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("cron", default_cron())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("timezone", default_timezone())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("db_path", default_db_path())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // REINDEX_REINDEX_THREAD_COUNT, REINDEX_SCHEDULING_DISABLED, ...
        builder = builder.add_source(
            Environment::with_prefix("REINDEX")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ReindexError::Config(e.to_string()))?;

        let settings: Self = config
            .try_deserialize()
            .map_err(|e| ReindexError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ReindexError> {
        if self.reindex_thread_count == 0 {
            return Err(ReindexError::Config(
                "reindex_thread_count must be > 0".to_string(),
            ));
        }
        if self.reindex_queue_capacity == 0 {
            return Err(ReindexError::Config(
                "reindex_queue_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = ReindexSettings::default();
        assert_eq!(settings.reindex_thread_count, 4);
        assert_eq!(settings.reindex_queue_capacity, 100);
        assert!(!settings.scheduling_disabled);
        assert_eq!(settings.cron, "*/10 * * * * *");
        assert_eq!(settings.timezone, "UTC");
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reindex.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "reindex_thread_count = 8").unwrap();
        writeln!(file, "scheduling_disabled = true").unwrap();
        drop(file);

        let settings = ReindexSettings::load(Some(&path.to_string_lossy())).unwrap();
        assert_eq!(settings.reindex_thread_count, 8);
        assert!(settings.scheduling_disabled);
        assert_eq!(settings.reindex_queue_capacity, 100);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = ReindexSettings::load(Some("/nonexistent/reindex-config.toml"));
        assert!(matches!(result, Err(ReindexError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let settings = ReindexSettings {
            reindex_thread_count: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expanded_db_path_plain() {
        let settings = ReindexSettings {
            db_path: "/var/lib/reindex".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/var/lib/reindex"));
    }

    #[test]
    fn test_settings_serialization() {
        let settings = ReindexSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let decoded: ReindexSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.reindex_thread_count, settings.reindex_thread_count);
        assert_eq!(decoded.cron, settings.cron);
    }
}
