//! When scheduled reindex passes run.

use serde::{Deserialize, Serialize};

use reindex_types::ReindexSettings;

use crate::SchedulerError;

/// Cron schedule for reindex passes and how long shutdown waits for one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Six-field cron expression (second minute hour day month weekday).
    /// Defaults to every ten seconds.
    #[serde(default = "default_cron")]
    pub cron: String,

    /// IANA timezone the cron expression is evaluated in. Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Seconds shutdown waits for an in-flight pass before giving up on it.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_cron() -> String {
    "*/10 * * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Schedule taken from the reindexer settings.
    pub fn from_settings(settings: &ReindexSettings) -> Self {
        Self {
            cron: settings.cron.clone(),
            timezone: settings.timezone.clone(),
            ..Default::default()
        }
    }

    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = cron.into();
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// Resolve the configured timezone.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` for names outside the IANA
    /// database.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.timezone.clone()))
    }
}
