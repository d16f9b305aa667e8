// TOML config adapter - Configuration file discovery, loading and rendering

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::app::config::AppConfig;
use crate::error::{QuiclipError, QuiclipResult};

/// Locations searched when no config file is given, in order
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["quiclip.toml", "config/quiclip.toml"];

/// TOML configuration adapter
pub struct TomlConfigAdapter;

impl TomlConfigAdapter {
    /// First default config file that exists relative to `base`
    pub fn discover(base: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.is_file())
    }

    /// Load a config file; keys it leaves out keep their defaults
    pub fn load(path: &Path) -> QuiclipResult<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuiclipError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content).map_err(|e| match e {
            QuiclipError::Config { message } => {
                QuiclipError::config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse TOML text into a config
    pub fn parse(content: &str) -> QuiclipResult<AppConfig> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| QuiclipError::config(format!("invalid TOML config: {}", e)))?;
        debug!(?config, "Parsed configuration");
        Ok(config)
    }

    /// Serialize a config back to TOML
    pub fn render(config: &AppConfig) -> QuiclipResult<String> {
        toml::to_string_pretty(config)
            .map_err(|e| QuiclipError::config(format!("failed to serialize config: {}", e)))
    }
}
