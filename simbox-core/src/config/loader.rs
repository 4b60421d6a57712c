//! Configuration loader

use std::path::Path;

use simbox_utils::{config_file, Result, SimboxError};
use url::Url;

use super::AppConfig;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<AppConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| SimboxError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| SimboxError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Url::parse(&config.remote.api_base_url).map_err(|e| {
            SimboxError::config(format!(
                "api_base_url '{}' is not a valid URL: {}",
                config.remote.api_base_url, e
            ))
        })?;

        let namespace = config.remote.namespace.trim();
        if namespace.is_empty() || namespace.contains('/') {
            return Err(SimboxError::config(
                "namespace must be non-empty and contain no '/'",
            ));
        }

        if config.remote.request_timeout_secs == 0 {
            return Err(SimboxError::config("request_timeout_secs must be at least 1"));
        }

        if config.sync.interval_secs == 0 {
            return Err(SimboxError::config("sync interval_secs must be at least 1"));
        }

        if config.sync.max_retries == 0 {
            return Err(SimboxError::config("sync max_retries must be at least 1"));
        }

        if config.terminal.columns == 0 || config.terminal.rows == 0 {
            return Err(SimboxError::config("terminal columns and rows must be non-zero"));
        }

        if config.terminal.exec_timeout_secs == 0 {
            return Err(SimboxError::config("exec_timeout_secs must be at least 1"));
        }

        if config.domains.retry_interval_secs == 0 {
            return Err(SimboxError::config(
                "domains retry_interval_secs must be at least 1",
            ));
        }

        if config.domains.max_attempts == Some(0) {
            return Err(SimboxError::config("domains max_attempts must be at least 1"));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<AppConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }
}
