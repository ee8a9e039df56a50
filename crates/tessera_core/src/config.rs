//! Runtime configuration.
//!
//! # Responsibility
//! - Describe one runtime context: asset base, registry location, cache and
//!   render policy, logging.
//! - Load from TOML with every field optional.
//!
//! # Invariants
//! - A validated config has `template_cache.max_size >= 1` and a non-empty
//!   manifest file name.

use crate::assets::AssetPaths;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST_FILE: &str = "extensions-manifest.json";
pub const DEFAULT_TEMPLATE_CACHE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deployment sub-directory, e.g. `/my-app/`.
    pub base_path: String,
    pub manifest_file: String,
    /// Registry database file; in-memory when absent.
    pub db_path: Option<PathBuf>,
    pub template_cache: TemplateCacheConfig,
    pub render: RenderConfig,
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_path: "/".to_string(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            db_path: None,
            template_cache: TemplateCacheConfig::default(),
            render: RenderConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateCacheConfig {
    pub enabled: bool,
    pub max_size: usize,
}

impl Default for TemplateCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: DEFAULT_TEMPLATE_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Coalesce refreshes to one render per frame.
    pub debounce: bool,
    /// Replace a failing component's output with a placeholder.
    pub error_boundary: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce: true,
            error_boundary: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.template_cache.max_size == 0 {
            return Err(ConfigError::Invalid(
                "template_cache.max_size must be at least 1".to_string(),
            ));
        }
        if self.manifest_file.trim().trim_start_matches('/').is_empty() {
            return Err(ConfigError::Invalid(
                "manifest_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn asset_paths(&self) -> AssetPaths {
        AssetPaths::new(&self.base_path, &self.manifest_file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Read { path: PathBuf, message: String },
    Parse(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "cannot read config {}: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid config syntax: {message}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RuntimeConfig, DEFAULT_TEMPLATE_CACHE_SIZE};

    #[test]
    fn empty_toml_yields_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.template_cache.max_size, DEFAULT_TEMPLATE_CACHE_SIZE);
        assert!(config.render.debounce);
    }

    #[test]
    fn parses_partial_sections() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            base_path = "/my-app/"
            db_path = "/tmp/registry.db"

            [template_cache]
            max_size = 5

            [render]
            debounce = false
            "#,
        )
        .unwrap();
        assert_eq!(config.asset_paths().base_path(), "/my-app");
        assert_eq!(config.template_cache.max_size, 5);
        assert!(config.template_cache.enabled);
        assert!(!config.render.debounce);
        assert!(config.render.error_boundary);
    }

    #[test]
    fn rejects_zero_cache_size() {
        let err = RuntimeConfig::from_toml_str("[template_cache]\nmax_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
