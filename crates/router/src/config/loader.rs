use std::path::{Path, PathBuf};

use tierroute_common::config::SystemConfig;

use super::validation;

/// Load and validate configuration from the given config directory.
///
/// Fails loudly with clear error messages if anything is misconfigured; the
/// service refuses to start on validation failure.
pub fn load_config(config_dir: &Path) -> Result<SystemConfig, ConfigError> {
    tracing::info!(config_dir = %config_dir.display(), "Loading configuration");

    let system_path = config_dir.join("system.toml");
    let content = std::fs::read_to_string(&system_path).map_err(|e| ConfigError::FileRead {
        path: system_path.clone(),
        source: e,
    })?;

    let config: SystemConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: system_path,
        detail: e.to_string(),
    })?;

    validation::validate(&config)?;

    tracing::info!(
        backends = config.backends.len(),
        refresh_seconds = config.router.refresh_seconds,
        "Configuration loaded successfully"
    );

    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}
