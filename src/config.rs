//! Configuration Management
//!
//! Persistent configuration for gcpinv, and the resolution of the settings a
//! run actually uses: command-line flag, then config file, then default.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::loader::LoaderOptions;

pub const DEFAULT_MAX_REQUESTS_IN_FLIGHT: usize = 50;
/// Retries per page when running from the command line
pub const DEFAULT_MAX_RETRIES: u32 = 9;
pub const DEFAULT_MAX_RETRY_TIME: Duration = Duration::from_secs(10);

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Project to inventory when none is given
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub max_requests_in_flight: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Human readable duration such as "10s" or "1m 30s"
    #[serde(default)]
    pub max_retry_time: Option<String>,
    /// Regions always skipped
    #[serde(default)]
    pub exclude_regions: Vec<String>,
    /// Services always skipped
    #[serde(default)]
    pub exclude_services: Vec<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcpinv").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file. A missing or unreadable
    /// file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path().context("No configuration directory on this system")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get effective project (config > gcloud default)
    pub fn effective_project(&self) -> Option<String> {
        self.project_id
            .clone()
            .or_else(crate::gcp::auth::get_default_project)
    }
}

/// Values given on the command line; `None` defers to the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project_id: Option<String>,
    pub max_requests_in_flight: Option<usize>,
    pub max_retries: Option<u32>,
    pub max_retry_time: Option<Duration>,
}

/// Effective settings of one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub project_id: String,
    pub max_requests_in_flight: usize,
    pub max_retries: u32,
    #[serde(serialize_with = "serialize_duration")]
    pub max_retry_time: Duration,
    pub exclude_regions: Vec<String>,
    pub exclude_services: Vec<String>,
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&humantime::format_duration(*d).to_string())
}

impl Settings {
    /// Merge flags over the config file over the defaults
    pub fn resolve(overrides: Overrides, config: &Config) -> Result<Self> {
        let max_retry_time = match (overrides.max_retry_time, &config.max_retry_time) {
            (Some(d), _) => d,
            (None, Some(text)) => humantime::parse_duration(text)
                .with_context(|| format!("Invalid max_retry_time in config: {:?}", text))?,
            (None, None) => DEFAULT_MAX_RETRY_TIME,
        };

        let project_id = overrides
            .project_id
            .or_else(|| config.effective_project())
            .context("No GCP project configured. Set GOOGLE_CLOUD_PROJECT or use --project")?;

        let settings = Self {
            project_id,
            max_requests_in_flight: overrides
                .max_requests_in_flight
                .or(config.max_requests_in_flight)
                .unwrap_or(DEFAULT_MAX_REQUESTS_IN_FLIGHT),
            max_retries: overrides
                .max_retries
                .or(config.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            max_retry_time,
            exclude_regions: config.exclude_regions.clone(),
            exclude_services: config.exclude_services.clone(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            bail!("Project ID must not be empty");
        }
        if self.max_requests_in_flight < 1 {
            bail!(
                "max requests in flight must be at least 1, got {}",
                self.max_requests_in_flight
            );
        }
        Ok(())
    }

    /// Retry policy for every listing of the run
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions::default()
            .with_max_retries(self.max_retries)
            .with_max_backoff(Some(self.max_retry_time))
    }

    /// The config file that reproduces these settings
    pub fn to_config(&self) -> Config {
        Config {
            project_id: Some(self.project_id.clone()),
            max_requests_in_flight: Some(self.max_requests_in_flight),
            max_retries: Some(self.max_retries),
            max_retry_time: Some(humantime::format_duration(self.max_retry_time).to_string()),
            exclude_regions: self.exclude_regions.clone(),
            exclude_services: self.exclude_services.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_project(project: &str) -> Overrides {
        Overrides {
            project_id: Some(project.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_apply() {
        let settings = Settings::resolve(with_project("my-project"), &Config::default()).unwrap();
        assert_eq!(settings.max_requests_in_flight, 50);
        assert_eq!(settings.max_retries, 9);
        assert_eq!(settings.max_retry_time, Duration::from_secs(10));
    }

    #[test]
    fn test_cli_beats_config() {
        let config = Config {
            project_id: Some("from-config".to_string()),
            max_requests_in_flight: Some(5),
            max_retries: Some(2),
            max_retry_time: Some("1m".to_string()),
            ..Default::default()
        };
        let overrides = Overrides {
            max_retries: Some(0),
            ..with_project("from-cli-1")
        };

        let settings = Settings::resolve(overrides, &config).unwrap();
        assert_eq!(settings.project_id, "from-cli-1");
        assert_eq!(settings.max_requests_in_flight, 5);
        assert_eq!(settings.max_retries, 0);
        assert_eq!(settings.max_retry_time, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_requests_in_flight_rejected() {
        let overrides = Overrides {
            max_requests_in_flight: Some(0),
            ..with_project("my-project")
        };
        let err = Settings::resolve(overrides, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_bad_duration_in_config_rejected() {
        let config = Config {
            max_retry_time: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(Settings::resolve(with_project("my-project"), &config).is_err());
    }

    #[test]
    fn test_loader_options_carry_retry_settings() {
        let settings = Settings::resolve(with_project("my-project"), &Config::default()).unwrap();
        let options = settings.loader_options();
        assert_eq!(options.max_retries, 9);
        assert_eq!(options.max_backoff, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let dir = std::env::temp_dir().join(format!("gcpinv-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let settings = Settings::resolve(with_project("my-project"), &Config::default()).unwrap();
        settings.to_config().save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.project_id.as_deref(), Some("my-project"));
        assert_eq!(loaded.max_retry_time.as_deref(), Some("10s"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_or_corrupt_file_gives_defaults() {
        let dir = std::env::temp_dir().join(format!("gcpinv-config-{}", uuid::Uuid::new_v4()));
        assert_eq!(Config::load_from(&dir.join("absent.json")), Config::default());

        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());

        let _ = std::fs::remove_dir_all(dir);
    }
}
