//! Configuration types and loading
//!
//! Two levels of configuration exist for a mounted slot:
//! - `UploaderConfig`: class-level defaults shared by every slot
//! - `MountOptions`: per-slot overrides declared when the slot is mounted
//!
//! `MountRegistry` ties both together and answers option lookups.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Options a mounter may look up for its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploaderOption {
    /// Column the slot persists into, when different from the slot name
    MountOn,
    IgnoreIntegrityErrors,
    IgnoreProcessingErrors,
    IgnoreDownloadErrors,
}

impl UploaderOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MountOn => "mount_on",
            Self::IgnoreIntegrityErrors => "ignore_integrity_errors",
            Self::IgnoreProcessingErrors => "ignore_processing_errors",
            Self::IgnoreDownloadErrors => "ignore_download_errors",
        }
    }

}

impl FromStr for UploaderOption {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mount_on" => Ok(Self::MountOn),
            "ignore_integrity_errors" => Ok(Self::IgnoreIntegrityErrors),
            "ignore_processing_errors" => Ok(Self::IgnoreProcessingErrors),
            "ignore_download_errors" => Ok(Self::IgnoreDownloadErrors),
            _ => Err(ConfigError::InvalidValue {
                key: "uploader option".to_string(),
                message: format!("unknown option {s:?}"),
            }),
        }
    }
}

impl std::fmt::Display for UploaderOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    String(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Bool(_) => None,
        }
    }
}

/// Class-level uploader configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Record integrity errors instead of raising them
    pub ignore_integrity_errors: bool,
    /// Record processing errors instead of raising them
    pub ignore_processing_errors: bool,
    /// Record download errors instead of raising them
    pub ignore_download_errors: bool,
    /// Storage prefix for cached (not yet stored) files
    pub cache_dir: String,
    /// Storage prefix for stored files
    pub store_dir: String,
    /// Base URL prepended to storage keys
    pub base_url: String,
    /// Accepted extensions (empty = accept all)
    pub extension_allowlist: Vec<String>,
    /// Rejected extensions
    pub extension_denylist: Vec<String>,
    /// Maximum accepted file size in bytes
    pub max_file_size: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            ignore_integrity_errors: true,
            ignore_processing_errors: true,
            ignore_download_errors: true,
            cache_dir: "uploads/tmp".to_string(),
            store_dir: "uploads".to_string(),
            base_url: "/uploads".to_string(),
            extension_allowlist: vec![],
            extension_denylist: vec![],
            max_file_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Config file error: {0}")]
    FileError(String),
}

impl UploaderConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let parse_bool = |v: String| v == "true" || v == "1" || v == "yes";

        if let Ok(v) = std::env::var("UPLOADER_IGNORE_INTEGRITY_ERRORS") {
            config.ignore_integrity_errors = parse_bool(v);
        }
        if let Ok(v) = std::env::var("UPLOADER_IGNORE_PROCESSING_ERRORS") {
            config.ignore_processing_errors = parse_bool(v);
        }
        if let Ok(v) = std::env::var("UPLOADER_IGNORE_DOWNLOAD_ERRORS") {
            config.ignore_download_errors = parse_bool(v);
        }

        if let Ok(dir) = std::env::var("UPLOADER_CACHE_DIR") {
            config.cache_dir = dir;
        }
        if let Ok(dir) = std::env::var("UPLOADER_STORE_DIR") {
            config.store_dir = dir;
        }
        if let Ok(url) = std::env::var("UPLOADER_BASE_URL") {
            config.base_url = url;
        }

        if let Ok(list) = std::env::var("UPLOADER_EXTENSION_ALLOWLIST") {
            config.extension_allowlist = split_list(&list);
        }
        if let Ok(list) = std::env::var("UPLOADER_EXTENSION_DENYLIST") {
            config.extension_denylist = split_list(&list);
        }

        if let Ok(size) = std::env::var("UPLOADER_MAX_FILE_SIZE") {
            config.max_file_size = size.parse().map_err(|_| ConfigError::InvalidValue {
                key: "UPLOADER_MAX_FILE_SIZE".to_string(),
                message: format!("expected a byte count, got {size:?}"),
            })?;
        }

        Ok(config)
    }

    /// Load configuration from a file, with `UPLOADER_*` variables layered on top
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config: Self = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("UPLOADER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("extension_allowlist")
                    .with_list_parse_key("extension_denylist"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::FileError(e.to_string()))?;

        config.extension_allowlist = normalize_list(&config.extension_allowlist);
        config.extension_denylist = normalize_list(&config.extension_denylist);
        Ok(config)
    }

    /// Class-level value for an option
    pub fn get(&self, option: UploaderOption) -> Option<OptionValue> {
        match option {
            UploaderOption::MountOn => None,
            UploaderOption::IgnoreIntegrityErrors => {
                Some(OptionValue::Bool(self.ignore_integrity_errors))
            }
            UploaderOption::IgnoreProcessingErrors => {
                Some(OptionValue::Bool(self.ignore_processing_errors))
            }
            UploaderOption::IgnoreDownloadErrors => {
                Some(OptionValue::Bool(self.ignore_download_errors))
            }
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_list(list: &[String]) -> Vec<String> {
    split_list(&list.join(","))
}

/// Per-slot overrides; unset fields fall back to `UploaderConfig`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MountOptions {
    pub mount_on: Option<String>,
    pub ignore_integrity_errors: Option<bool>,
    pub ignore_processing_errors: Option<bool>,
    pub ignore_download_errors: Option<bool>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount_on(mut self, column: impl Into<String>) -> Self {
        self.mount_on = Some(column.into());
        self
    }

    pub fn ignore_integrity_errors(mut self, ignore: bool) -> Self {
        self.ignore_integrity_errors = Some(ignore);
        self
    }

    pub fn ignore_processing_errors(mut self, ignore: bool) -> Self {
        self.ignore_processing_errors = Some(ignore);
        self
    }

    pub fn ignore_download_errors(mut self, ignore: bool) -> Self {
        self.ignore_download_errors = Some(ignore);
        self
    }

    /// Locally set value for an option
    pub fn get(&self, option: UploaderOption) -> Option<OptionValue> {
        match option {
            UploaderOption::MountOn => self.mount_on.clone().map(OptionValue::String),
            UploaderOption::IgnoreIntegrityErrors => {
                self.ignore_integrity_errors.map(OptionValue::Bool)
            }
            UploaderOption::IgnoreProcessingErrors => {
                self.ignore_processing_errors.map(OptionValue::Bool)
            }
            UploaderOption::IgnoreDownloadErrors => {
                self.ignore_download_errors.map(OptionValue::Bool)
            }
        }
    }
}

/// Class-level table of mounted slots
#[derive(Debug, Clone, Default)]
pub struct MountRegistry {
    defaults: UploaderConfig,
    mounts: HashMap<String, MountOptions>,
}

impl MountRegistry {
    pub fn new(defaults: UploaderConfig) -> Self {
        Self {
            defaults,
            mounts: HashMap::new(),
        }
    }

    /// Declare a slot
    pub fn mount(mut self, slot: impl Into<String>, options: MountOptions) -> Self {
        self.mounts.insert(slot.into(), options);
        self
    }

    pub fn is_mounted(&self, slot: &str) -> bool {
        self.mounts.contains_key(slot)
    }

    /// Resolve an option: slot override first, then the class default
    pub fn uploader_option(&self, slot: &str, option: UploaderOption) -> Option<OptionValue> {
        self.mounts
            .get(slot)
            .and_then(|opts| opts.get(option))
            .or_else(|| self.defaults.get(option))
    }
}
