use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::generative::GenerationConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub const DEFAULT_MODELS: [&str; 3] = [
    "gemini-1.5-flash-latest",
    "gemini-2.0-flash-001",
    "gemini-2.5-flash",
];

/// Process-wide settings. Built once at startup and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub upload_dir: PathBuf,
    pub keep_uploads: bool,
    pub max_upload_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub models: Vec<String>,
    pub default_model: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub generation: GenerationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: utils::cache_dir().join("uploads"),
            keep_uploads: false,
            max_upload_bytes: 16 * 1024 * 1024, // 16MB
            allowed_extensions: vec!["txt".to_string()],
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            default_model: DEFAULT_MODELS[0].to_string(),
            api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            request_timeout_secs: 120,
            generation: GenerationConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        if self.models.is_empty() {
            return Err(ConfigError::ValidationError(
                "models must list at least one model".to_string(),
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be blank".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads the config at `config_path`, falling back to defaults when the file
/// does not exist. A file that exists but does not parse or validate is an
/// error.
pub async fn load_config_from_file(config_path: &Path) -> Result<AppConfig, ConfigError> {
    let config = match tokio::fs::read_to_string(config_path).await {
        Ok(raw_config) => serde_json::from_str::<AppConfig>(&raw_config)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    config.validate()?;
    Ok(config)
}

/// Saves the config to the given path
pub async fn save_config_to_file(config: &AppConfig, config_path: &PathBuf) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw_config = serde_json::to_string_pretty(config)?;
    tokio::fs::write(config_path, raw_config).await?;
    Ok(())
}
