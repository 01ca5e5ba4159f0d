//! Service configuration loaded from TOML.
//!
//! The file named by `WATERMAP_CONFIG` is used when set, otherwise the
//! configuration embedded from `config/default.toml`. `BIND_ADDR` and
//! `PORT` override the `[server]` section.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use watermap_cluster::ClusterOptions;
use watermap_point_models::SourceConfig;
use watermap_search::SearchLimits;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "WATERMAP_CONFIG";

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Errors from loading the service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
    /// Source of the clustered, searchable entities.
    pub entities: SourceConfig,
    /// Optional place gazetteer searched alongside the entities.
    #[serde(default)]
    pub places: Option<SourceConfig>,
    /// Cluster construction tuning.
    #[serde(default)]
    pub cluster: ClusterOptions,
    /// Search result caps.
    #[serde(default)]
    pub search: SearchLimits,
}

impl ServiceConfig {
    /// Loads the configuration from `WATERMAP_CONFIG` or the embedded
    /// default, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse,
    /// or describes unusable settings.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                log::debug!("{CONFIG_ENV} not set, using embedded default config");
                Self::from_toml_str(DEFAULT_CONFIG)?
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is invalid.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.cluster
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("[cluster] {e}")))?;
        if self.search.max_results == 0 {
            return Err(ConfigError::Invalid(
                "[search] max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind_addr) = std::env::var("BIND_ADDR") {
            self.server.bind_addr = bind_addr;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}
