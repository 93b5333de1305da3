//! Configuration File Loading
//!
//! Finds and parses the configuration file. An explicit path wins; otherwise
//! the search paths are tried in order and the first readable file is used.

use super::{ConfigError, FileConfig};
use crate::error::Result;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "NETREPEAT_CONFIG";

/// Configuration file loader
pub struct ConfigLoader {
    /// Candidate configuration files, most specific first
    search_paths: Vec<PathBuf>,
    /// Path of the file actually loaded
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension, TOML unless it says `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }
}

impl ConfigLoader {
    /// Create a loader using the default search paths
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            current_path: None,
        }
    }

    /// Load the first configuration found, or the built-in defaults
    pub fn load(&mut self) -> Result<FileConfig> {
        for path in &self.search_paths {
            if !path.is_file() {
                continue;
            }

            match Self::load_file(path) {
                Ok(config) => {
                    debug!("Loaded configuration from {}", path.display());
                    self.current_path = Some(path.clone());
                    return Ok(config);
                }
                Err(e) => {
                    warn!("Failed to load config from {}: {}", path.display(), e);
                    continue;
                }
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(FileConfig::default())
    }

    /// Load a specific file; a missing file is an error
    pub fn load_from_path(&mut self, path: &Path) -> Result<FileConfig> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }

        let config = Self::load_file(path)?;
        self.current_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse one configuration file
    pub fn load_file(path: &Path) -> Result<FileConfig> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Self::parse(&content, ConfigFormat::from_path(path))?)
    }

    /// Parse configuration text
    pub fn parse(content: &str, format: ConfigFormat) -> std::result::Result<FileConfig, ConfigError> {
        let parsed = match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };

        parsed.map_err(|reason| ConfigError::Parse {
            format: format.name().to_string(),
            reason,
        })
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(path) = env::var(CONFIG_ENV) {
            if !path.is_empty() {
                paths.push(PathBuf::from(path));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("netrepeat").join("config.toml"));
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join("netrepeat.toml"));
        }

        paths
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
