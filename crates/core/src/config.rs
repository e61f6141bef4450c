//! TOML-based configuration for the bridge.
//!
//! Everything has a usable default; an absent file section means "use the
//! defaults", and a missing file is an error only when a path is given
//! explicitly.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::graph::DEFAULT_BRANCH_BATCH_SIZE;
use crate::mapping::EXPERIMENTAL_PREFIX;

/// Top-level bridge configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Id-space translation settings.
    #[serde(default)]
    pub mapping: MappingConfig,

    /// Missing-revision discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Id-space translation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Mapping-version prefix used when encoding new revision ids.
    #[serde(default = "default_mapping_version")]
    pub default_version: String,
}

fn default_mapping_version() -> String {
    EXPERIMENTAL_PREFIX.into()
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            default_version: default_mapping_version(),
        }
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Parent ids looked up per `branches` request during expansion.
    #[serde(default = "default_branch_batch_size")]
    pub branch_batch_size: usize,
}

fn default_branch_batch_size() -> usize {
    DEFAULT_BRANCH_BATCH_SIZE
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            branch_batch_size: default_branch_batch_size(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate a configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: BridgeConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Check value-level constraints the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "log.level".into(),
                    detail: format!("unknown level '{}'", other),
                });
            }
        }
        if self.mapping.default_version.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "mapping.default_version".into(),
                detail: "must not be empty".into(),
            });
        }
        if self.discovery.branch_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "discovery.branch_batch_size".into(),
                detail: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
