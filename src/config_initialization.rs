//! Configuration initialization and hierarchy management

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::adapters::TomlConfigAdapter;
use crate::app::config::AppConfig;
use crate::cli::Cli;
use crate::error::{QuiclipError, QuiclipResult};

/// Build the effective configuration: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(cli: &Cli) -> Result<AppConfig> {
    // Step 1 and 2: defaults, overlaid by a config file if one is given or found
    let file = match &cli.config {
        Some(path) => Some(path.clone()),
        None => TomlConfigAdapter::discover(&std::env::current_dir()?),
    };
    let mut config = match &file {
        Some(path) => TomlConfigAdapter::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };

    // Step 3: environment variables
    apply_environment(&mut config, |key| std::env::var(key).ok())
        .context("applying QUICLIP_* environment overrides")?;

    // Step 4: command-line flags
    apply_cli_overrides(&mut config, cli);

    config.validate().context("invalid configuration")?;
    debug!(config_file = ?file, "Configuration resolved");
    Ok(config)
}

/// Apply `QUICLIP_*` overrides read through `lookup`
pub fn apply_environment<F>(config: &mut AppConfig, lookup: F) -> QuiclipResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(value) = non_empty("QUICLIP_MEDIA_ROOT") {
        config.media_root = PathBuf::from(value);
    }
    if let Some(value) = non_empty("QUICLIP_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(value);
    }
    if let Some(value) = non_empty("QUICLIP_TEMP_DIR") {
        config.temp_dir = PathBuf::from(value);
    }
    if let Some(value) = non_empty("QUICLIP_FFMPEG") {
        config.ffmpeg_path = PathBuf::from(value);
    }
    if let Some(value) = non_empty("QUICLIP_FFPROBE") {
        config.ffprobe_path = PathBuf::from(value);
    }
    if let Some(value) = non_empty("QUICLIP_WORKERS") {
        config.workers = value.trim().parse().map_err(|_| {
            QuiclipError::config(format!("QUICLIP_WORKERS must be a number, got '{}'", value))
        })?;
    }
    if let Some(value) = non_empty("QUICLIP_LOG_LEVEL") {
        config.logging.level = value.parse()?;
    }
    Ok(())
}

/// Apply command-line flags on top of everything else
pub fn apply_cli_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(root) = &cli.media_root {
        config.media_root = root.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if cli.overwrite {
        config.overwrite = true;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
}
