//! Core configuration.
//!
//! # Responsibility
//! - Hold tunables for the auto-save engine and notification center.
//! - Load configuration from JSON with per-field defaults.
//! - Merge partial runtime updates through patch structs.
//!
//! # Invariants
//! - Missing JSON fields fall back to `Default` values.
//! - Patches only overwrite fields that are `Some`.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STORAGE_KEY: &str = "tasks";

/// Auto-save engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Quiet period before the latest queued operation is processed.
    pub debounce_ms: u64,
    /// Retries after the first failed persistence attempt.
    pub max_retries: u32,
    /// Backoff base; retry `n` waits `retry_delay_ms * n`.
    pub retry_delay_ms: u64,
    pub enable_optimistic_updates: bool,
    pub enable_rollback: bool,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            max_retries: 3,
            retry_delay_ms: 1000,
            enable_optimistic_updates: true,
            enable_rollback: true,
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn rollback_enabled(&self) -> bool {
        self.enable_optimistic_updates && self.enable_rollback
    }
}

/// Partial update for [`AutoSaveConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AutoSaveConfigPatch {
    pub debounce_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub enable_optimistic_updates: Option<bool>,
    pub enable_rollback: Option<bool>,
}

impl AutoSaveConfigPatch {
    pub fn apply(&self, config: &mut AutoSaveConfig) {
        if let Some(value) = self.debounce_ms {
            config.debounce_ms = value;
        }
        if let Some(value) = self.max_retries {
            config.max_retries = value;
        }
        if let Some(value) = self.retry_delay_ms {
            config.retry_delay_ms = value;
        }
        if let Some(value) = self.enable_optimistic_updates {
            config.enable_optimistic_updates = value;
        }
        if let Some(value) = self.enable_rollback {
            config.enable_rollback = value;
        }
    }
}

/// Notification center tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub max_notifications: usize,
    pub success_duration_ms: u64,
    pub warning_duration_ms: u64,
    pub info_duration_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_notifications: 5,
            success_duration_ms: 3000,
            warning_duration_ms: 5000,
            info_duration_ms: 4000,
        }
    }
}

/// Partial update for [`NotificationConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationConfigPatch {
    pub max_notifications: Option<usize>,
    pub success_duration_ms: Option<u64>,
    pub warning_duration_ms: Option<u64>,
    pub info_duration_ms: Option<u64>,
}

impl NotificationConfigPatch {
    pub fn apply(&self, config: &mut NotificationConfig) {
        if let Some(value) = self.max_notifications {
            config.max_notifications = value;
        }
        if let Some(value) = self.success_duration_ms {
            config.success_duration_ms = value;
        }
        if let Some(value) = self.warning_duration_ms {
            config.warning_duration_ms = value;
        }
        if let Some(value) = self.info_duration_ms {
            config.info_duration_ms = value;
        }
    }
}

/// Top-level configuration for one core instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub autosave: AutoSaveConfig,
    pub notifications: NotificationConfig,
    /// Key under which the task collection is persisted.
    pub storage_key: String,
    pub log_level: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            autosave: AutoSaveConfig::default(),
            notifications: NotificationConfig::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            log_level: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl CoreConfig {
    /// Parses configuration from a JSON document.
    ///
    /// # Errors
    /// - Returns `Parse` for malformed JSON.
    /// - Returns `Invalid` for an empty storage key or a zero notification limit.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_key cannot be empty".to_string()));
        }
        if self.notifications.max_notifications == 0 {
            return Err(ConfigError::Invalid(
                "notifications.max_notifications must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
