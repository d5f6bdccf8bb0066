//! TOML-based engine configuration.
//!
//! Stores the scheduling knobs a user tunes per installation:
//! - Slot granularity and suggestion limits
//! - Proposal time-to-live
//! - Commit retry, backoff, and timeout settings
//! - Default calendar
//!
//! Configuration is stored at `~/.config/slotwise/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::commit::CommitConfig;
use crate::error::ConfigError;

/// Suggestion and proposal generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Slot size in minutes used for availability tiling
    #[serde(default = "default_granularity")]
    pub granularity_minutes: i64,
    /// Number of suggestions returned per task
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
    /// Days ahead considered when no explicit range is given
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,
    /// Minutes a proposal stays valid
    #[serde(default = "default_proposal_ttl")]
    pub proposal_ttl_minutes: i64,
}

/// Commit engine settings; mirrors [`CommitConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSection {
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff")]
    pub backoff_base_ms: u64,
}

/// Calendar connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_id")]
    pub default_calendar_id: String,
    /// Environment variable holding the API access token
    #[serde(default = "default_token_env")]
    pub access_token_env: String,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/slotwise/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub commit: CommitSection,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

fn default_granularity() -> i64 {
    30
}
fn default_suggestion_limit() -> usize {
    3
}
fn default_horizon_days() -> i64 {
    7
}
fn default_proposal_ttl() -> i64 {
    30
}
fn default_write_timeout() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff() -> u64 {
    500
}
fn default_calendar_id() -> String {
    "primary".into()
}
fn default_token_env() -> String {
    "SLOTWISE_CALENDAR_TOKEN".into()
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            granularity_minutes: default_granularity(),
            suggestion_limit: default_suggestion_limit(),
            horizon_days: default_horizon_days(),
            proposal_ttl_minutes: default_proposal_ttl(),
        }
    }
}

impl Default for CommitSection {
    fn default() -> Self {
        Self {
            write_timeout_secs: default_write_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_calendar_id: default_calendar_id(),
            access_token_env: default_token_env(),
        }
    }
}

/// Configuration directory, `~/.config/slotwise` (or `slotwise-dev` when
/// `SLOTWISE_ENV=dev`).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SLOTWISE_ENV").unwrap_or_else(|_| "production".to_string());
    let dir = if env == "dev" {
        base_dir.join("slotwise-dev")
    } else {
        base_dir.join("slotwise")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

impl EngineConfig {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    /// Load without touching disk state on failure.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Commit engine view of this configuration.
    pub fn commit_config(&self) -> CommitConfig {
        CommitConfig {
            write_timeout_secs: self.commit.write_timeout_secs,
            max_retries: self.commit.max_retries,
            backoff_base_ms: self.commit.backoff_base_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(5..=480).contains(&self.scheduling.granularity_minutes) {
            return Err(ConfigError::InvalidValue {
                key: "scheduling.granularity_minutes".into(),
                message: format!("{} outside 5..=480", self.scheduling.granularity_minutes),
            });
        }
        if self.scheduling.horizon_days < 1 {
            return Err(ConfigError::InvalidValue {
                key: "scheduling.horizon_days".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.scheduling.proposal_ttl_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                key: "scheduling.proposal_ttl_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scheduling.granularity_minutes, 30);
        assert_eq!(parsed.commit.max_retries, 3);
        assert_eq!(parsed.calendar.default_calendar_id, "primary");
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [scheduling]
            granularity_minutes = 15
            "#,
        )
        .unwrap();
        assert_eq!(parsed.scheduling.granularity_minutes, 15);
        assert_eq!(parsed.scheduling.suggestion_limit, 3);
        assert_eq!(parsed.commit.write_timeout_secs, 10);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = EngineConfig::default();
        cfg.scheduling.suggestion_limit = 10;
        cfg.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduling.suggestion_limit, 10);
    }

    #[test]
    fn validation_rejects_bad_granularity() {
        let mut cfg = EngineConfig::default();
        cfg.scheduling.granularity_minutes = 3;
        assert!(cfg.validate().is_err());
    }
}
