//! Configuration Loader
//!
//! Handles loading and merging client configuration from multiple sources.

use crate::config::options::ClientConfig;
use crate::error::{RestError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "RESTGATE_CONFIG";

/// Environment variable overriding the API base URL
pub const BASE_URL_ENV: &str = "RESTGATE_BASE_URL";

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    /// Merged document; deserialized into `ClientConfig` on demand
    merged: Value,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self::defaults()?;

        loader.load_from_default_paths()?;

        // Load .env file if present
        let _ = dotenvy::dotenv();
        loader.apply_env_overrides();

        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self::defaults()?;
        loader.load_from_file(path)?;
        Ok(loader)
    }

    fn defaults() -> Result<Self> {
        let merged = serde_json::to_value(ClientConfig::default())
            .map_err(|e| RestError::Config(format!("Failed to encode defaults: {}", e)))?;
        Ok(Self { merged })
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                self.load_from_file(&path)?;
            }
        }

        Ok(())
    }

    /// Get list of config paths to check, lowest precedence first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".restgate").join("config.json"));
        }

        // 2. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("restgate").join("config.json"));
        }

        // 3. Current directory
        paths.push(PathBuf::from("restgate.json"));

        // 4. Environment variable
        if let Ok(custom_path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(custom_path));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RestError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let overlay: Value = serde_json::from_str(&content).map_err(|e| {
            RestError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        if !overlay.is_object() {
            return Err(RestError::Config(format!(
                "{} must contain a JSON object",
                path.display()
            )));
        }

        tracing::debug!(path = %path.display(), "loaded config file");
        self.merge(overlay);
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        let token_env = self
            .merged
            .get("token_env")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut overlay = serde_json::Map::new();
        if let Some(token) = token_env.and_then(|name| std::env::var(name).ok()) {
            overlay.insert("token".to_string(), Value::String(token));
        }
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            overlay.insert("base_url".to_string(), Value::String(url));
        }

        self.merge(Value::Object(overlay));
    }

    /// Merge another document into this one (later values override earlier)
    fn merge(&mut self, other: Value) {
        merge_values(&mut self.merged, other);
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> Result<ClientConfig> {
        serde_json::from_value(self.merged)
            .map_err(|e| RestError::Config(format!("Invalid configuration: {}", e)))
    }
}

/// Deep-merge objects; any non-object value in `overlay` replaces the base
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
