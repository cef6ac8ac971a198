//! Global and project-specific settings

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{GenieError, Result},
    services::request::DEFAULT_MODE,
    streaming::{ChatSurface, StreamProfile, TrailingLinePolicy},
};

/// Global configuration (stored in `~/.config/genie/config.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Project URL hosting the chat functions
    #[serde(default)]
    pub supabase_url: String,

    /// Bearer token of the signed-in user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Deadline for one whole response, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub default_surface: ChatSurface,

    #[serde(default = "default_mode")]
    pub default_mode: String,

    /// Stream tuning shared by every surface
    #[serde(default)]
    pub stream: StreamSettings,
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            default_surface: ChatSurface::default(),
            default_mode: default_mode(),
            stream: StreamSettings::default(),
        }
    }
}

/// Overrides applied on top of a surface's [`StreamProfile`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub max_pending_bytes: usize,
    pub max_continuation_lines: usize,
    pub trailing_line: TrailingLinePolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        let profile = StreamProfile::default();
        Self {
            max_pending_bytes: profile.max_pending_bytes,
            max_continuation_lines: profile.max_continuation_lines,
            trailing_line: profile.trailing_line,
        }
    }
}

impl StreamSettings {
    /// Profile for `surface` with these settings applied
    #[must_use]
    pub fn profile_for(&self, surface: ChatSurface) -> StreamProfile {
        StreamProfile {
            max_pending_bytes: self.max_pending_bytes,
            max_continuation_lines: self.max_continuation_lines,
            trailing_line: self.trailing_line,
            ..surface.profile()
        }
    }
}

impl GlobalConfig {
    /// Load global configuration from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let path = super::Config::global_config_path();
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Save configuration to disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save(&self) -> Result<()> {
        let path = super::Config::global_config_path();
        self.save_to_path(&path)
    }

    /// Save configuration to a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// Project-specific configuration (stored in `./.genie.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Business memory sent with workspace prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_context: Option<Value>,

    /// Extracted document text sent with workspace prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_context: Option<String>,

    /// Coach profile fields sent with coach prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Value>,
}

impl ProjectConfig {
    /// Load project configuration from current directory
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let path = super::Config::project_config_path();
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

fn read_json<T: Default + serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let parse_error = |message: String| GenieError::ConfigParse {
        path: path.to_path_buf(),
        message,
    };
    let contents = fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))
}
