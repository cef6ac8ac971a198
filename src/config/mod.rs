//! Configuration management for genie-stream
//!
//! Implements a hierarchical configuration system:
//! 1. Global config (`~/.config/genie/config.json`)
//! 2. Project config (`./.genie.json`)
//! 3. Environment variables
//! 4. CLI parameters (highest priority)

pub mod settings;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

pub use self::settings::{GlobalConfig, ProjectConfig, StreamSettings};
use crate::{
    error::{GenieError, Result},
    services::credentials::ACCESS_TOKEN_ENV,
    streaming::{ChatSurface, StreamProfile},
};

/// Environment variable overriding [`GlobalConfig::supabase_url`]
pub const SUPABASE_URL_ENV: &str = "GENIE_SUPABASE_URL";

/// Main configuration structure combining global and project settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global configuration
    #[serde(flatten)]
    pub global: GlobalConfig,

    /// Project-specific configuration
    #[serde(skip)]
    pub project: ProjectConfig,
}

impl Config {
    /// Load configuration from files and environment
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed
    pub fn load() -> Result<Self> {
        let global = GlobalConfig::load()?;
        let project = ProjectConfig::load()?;

        let mut config = Self { global, project };
        config.apply_env();
        Ok(config)
    }

    /// Load from explicit file locations, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if either file exists but cannot be read or parsed
    pub fn load_from(global_path: &Path, project_path: &Path) -> Result<Self> {
        let global = GlobalConfig::load_from_path(global_path)?;
        let project = ProjectConfig::load_from_path(project_path)?;

        let mut config = Self { global, project };
        config.apply_env();
        Ok(config)
    }

    /// Apply `GENIE_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Some(url) = non_empty_env(SUPABASE_URL_ENV) {
            self.global.supabase_url = url;
        }
        if let Some(token) = non_empty_env(ACCESS_TOKEN_ENV) {
            self.global.access_token = Some(token);
        }
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("genie")
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get the project config file path in the current directory
    #[must_use]
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".genie.json")
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.global.request_timeout_secs)
    }

    /// Stream profile for a surface with the configured tuning applied
    #[must_use]
    pub fn stream_profile(&self, surface: ChatSurface) -> StreamProfile {
        self.global.stream.profile_for(surface)
    }

    /// Check the settings needed to talk to the backend
    ///
    /// # Errors
    ///
    /// Returns [`GenieError::ConfigValidation`] describing the first problem found
    pub fn validate(&self) -> Result<()> {
        let url = self.global.supabase_url.trim();
        if url.is_empty() {
            return Err(GenieError::ConfigValidation(format!(
                "supabase_url is not set (config file or {SUPABASE_URL_ENV})"
            )));
        }
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(GenieError::ConfigValidation(format!(
                    "supabase_url must be http(s), got {}",
                    parsed.scheme()
                )))
            }
            Err(e) => {
                return Err(GenieError::ConfigValidation(format!(
                    "supabase_url is not a valid URL: {e}"
                )))
            }
        }
        if self.global.request_timeout_secs == 0 {
            return Err(GenieError::ConfigValidation(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.global.stream.max_pending_bytes == 0 {
            return Err(GenieError::ConfigValidation(
                "stream.max_pending_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
